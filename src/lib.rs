//! Resilience primitives for calls to unreliable dependencies.
//!
//! Timeouts, retries with jittered backoff, circuit breakers and error
//! classification, composable into a single resilient call, plus the
//! TCP probe that drives them from configuration.

pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod probe;
pub mod resilience;

pub use config::ResilienceConfig;
pub use lifecycle::Shutdown;
pub use resilience::{resilient_operation, ClassifiedError, ResilienceInvocation};
