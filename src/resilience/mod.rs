//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to a dependency:
//!     → timeouts.rs (enforce a per-attempt deadline)
//!     → On failure: classify.rs (typed, retry-aware error)
//!     → retries.rs (retry with backoff while the classification allows it)
//!     → circuit_breaker.rs (one outcome per logical call, open on high failure rate)
//!     → composer.rs (metrics and logging around the whole stack)
//! ```
//!
//! # Design Decisions
//! - Timeouts are innermost so every retry attempt gets its own deadline
//! - The breaker is outermost so retries do not each count against it
//! - Breakers are shared per resource name through an explicit registry
//! - All resilience logic is protocol-agnostic

pub mod backoff;
pub mod circuit_breaker;
pub mod classify;
pub mod composer;
pub mod error;
pub mod registry;
pub mod retries;
pub mod timeouts;

pub use circuit_breaker::{BreakerConfig, BreakerMetricsSnapshot, CircuitBreaker, CircuitState};
pub use classify::{passthrough, ClassifiedError, Classifier, ErrorKind, IoClassifier};
pub use composer::{resilient_operation, FailureLogLevel, ResilienceInvocation};
pub use error::{CircuitOpenError, Failure, TimeoutError};
pub use registry::BreakerRegistry;
pub use retries::{retry_operation, RetryConfig};
pub use timeouts::execute_with_timeout;
