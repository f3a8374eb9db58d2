//! Raw failure types produced by the resilience layers.
//!
//! # Taxonomy
//! - `Operation`: raised by the wrapped call itself
//! - `Timeout`: raised by the timeout guard or the retry-sequence ceiling
//! - `CircuitOpen`: raised by a circuit breaker without invoking the call
//!
//! Layers are generic over any error type that can absorb the failures they
//! produce (`From<TimeoutError>`, `From<CircuitOpenError>`), so a caller can
//! use a single layer with its own error enum. The composer uses [`Failure`].

use std::time::Duration;

use thiserror::Error;

/// A deadline expired before the operation settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation timed out after {}ms", .timeout.as_millis())]
pub struct TimeoutError {
    timeout: Duration,
}

impl TimeoutError {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// The configured deadline that expired.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout.as_millis() as u64
    }
}

/// A circuit breaker rejected the call without invoking it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("circuit breaker '{name}' is open")]
pub struct CircuitOpenError {
    pub name: String,
    /// True when the breaker is half-open and its single probe is still running.
    pub probe_in_flight: bool,
}

/// Any failure surfaced by a composed resilient call, before classification.
#[derive(Debug, Error)]
pub enum Failure<E> {
    #[error(transparent)]
    Operation(E),

    #[error(transparent)]
    Timeout(#[from] TimeoutError),

    #[error(transparent)]
    CircuitOpen(#[from] CircuitOpenError),
}

impl<E> Failure<E> {
    /// The operation's own error, if this failure came from the call itself.
    pub fn operation_error(&self) -> Option<&E> {
        match self {
            Failure::Operation(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Failure::Timeout(_))
    }

    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Failure::CircuitOpen(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_error_carries_duration() {
        let err = TimeoutError::new(Duration::from_millis(250));
        assert_eq!(err.timeout(), Duration::from_millis(250));
        assert_eq!(err.timeout_ms(), 250);
        assert_eq!(err.to_string(), "operation timed out after 250ms");
    }

    #[test]
    fn test_failure_variants_are_distinct() {
        let op: Failure<std::io::Error> =
            Failure::Operation(std::io::Error::other("boom"));
        let timeout: Failure<std::io::Error> = TimeoutError::new(Duration::from_secs(1)).into();
        let open: Failure<std::io::Error> = CircuitOpenError {
            name: "db".into(),
            probe_in_flight: false,
        }
        .into();

        assert!(op.operation_error().is_some());
        assert!(timeout.is_timeout() && !timeout.is_circuit_open());
        assert!(open.is_circuit_open() && open.operation_error().is_none());
        assert_eq!(open.to_string(), "circuit breaker 'db' is open");
    }
}
