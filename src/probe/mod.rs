//! TCP reachability probing.
//!
//! # Data Flow
//! ```text
//! Periodic timer (or a single `check`)
//!     → tcp.rs connects to every target concurrently
//!     → each connect runs through resilient_operation
//!       (attempt timeout → retry → per-target circuit breaker)
//!     → ProbeReport: per-target outcome + breaker snapshots
//! ```
//!
//! # Design Decisions
//! - One breaker per target name, shared through the registry
//! - Probe failures log at the configured level (debug by default); a
//!   down dependency is reported through the report and metrics, not alerts
//! - An open breaker short-circuits the connect until its reset timer elapses

pub mod tcp;

pub use tcp::{ProbeError, ProbeOutcome, ProbeReport, TcpProber};
