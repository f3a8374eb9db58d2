//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGINT (Ctrl-C) → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     trigger → every subscribed loop observes it → loops exit after their current round
//! ```
//!
//! # Design Decisions
//! - Shutdown is a broadcast: any number of loops subscribe independently
//! - Loops finish the round in flight; nothing is cancelled mid-probe

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::spawn_signal_handler;
