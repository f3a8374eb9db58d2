//! Error classification.
//!
//! # Responsibilities
//! - Turn any raw failure into a [`ClassifiedError`] with a stable kind
//! - Carry an explicit retryable designation used by the retry predicate
//! - Provide metric-safe labels for each kind
//!
//! # Design Decisions
//! - Closed set of kinds; callers match exhaustively instead of downcasting
//! - Classification is advisory: it decides retry and labels, the raw
//!   failure stays reachable through `source()`
//! - Classifying an already-classified error returns it unchanged

use std::error::Error as StdError;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::resilience::error::Failure;

/// Stable discriminator for a classified failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// A deadline expired.
    Timeout { timeout: Duration },
    /// A circuit breaker rejected the call.
    CircuitOpen { name: String },
    /// Connection could not be established or was dropped.
    Connection,
    /// The remote side asked us to slow down.
    RateLimited,
    /// The dependency reported itself temporarily unavailable.
    Unavailable,
    InvalidInput,
    PermissionDenied,
    NotFound,
    Internal,
}

impl ErrorKind {
    /// Label used for the `error_type` metric tag and log fields.
    pub fn label(&self) -> &'static str {
        match self {
            ErrorKind::Timeout { .. } => "timeout",
            ErrorKind::CircuitOpen { .. } => "circuit_open",
            ErrorKind::Connection => "connection",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::PermissionDenied => "permission_denied",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Internal => "internal",
        }
    }

    /// Whether failures of this kind are transient by default.
    pub fn default_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::Timeout { .. }
                | ErrorKind::Connection
                | ErrorKind::RateLimited
                | ErrorKind::Unavailable
        )
    }
}

type Source = Arc<dyn StdError + Send + Sync + 'static>;

/// A typed, retry-aware failure.
#[derive(Debug, Clone, Error)]
#[error("{} error: {message}", .kind.label())]
pub struct ClassifiedError {
    kind: ErrorKind,
    message: String,
    retryable: bool,
    #[source]
    source: Option<Source>,
}

impl ClassifiedError {
    /// Create an error whose retryability follows the kind's default.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        let retryable = kind.default_retryable();
        Self {
            kind,
            message: message.into(),
            retryable,
            source: None,
        }
    }

    pub fn timeout(timeout: Duration) -> Self {
        Self::new(
            ErrorKind::Timeout { timeout },
            format!("timed out after {}ms", timeout.as_millis()),
        )
    }

    /// Circuit-open errors are never retryable: the breaker already decided.
    pub fn circuit_open(name: impl Into<String>) -> Self {
        let name = name.into();
        let message = format!("circuit breaker '{}' is open", name);
        Self::new(ErrorKind::CircuitOpen { name }, message)
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Connection, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unavailable, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Override the kind's default retryability.
    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// Attach the raw failure this error was classified from.
    pub fn with_source<S>(mut self, source: S) -> Self
    where
        S: StdError + Send + Sync + 'static,
    {
        self.source = Some(Arc::new(source));
        self
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_retryable(&self) -> bool {
        self.retryable
    }
}

/// Maps raw failures into [`ClassifiedError`]s.
///
/// Implementors only need [`Classifier::classify_error`]; timeouts and
/// circuit-open rejections have fixed classifications that can be
/// overridden through [`Classifier::classify`].
pub trait Classifier<E>: Send + Sync {
    /// Classify an error raised by the wrapped operation.
    fn classify_error(&self, error: &E) -> ClassifiedError;

    fn classify(&self, failure: &Failure<E>) -> ClassifiedError {
        match failure {
            Failure::Operation(e) => self.classify_error(e),
            Failure::Timeout(t) => ClassifiedError::timeout(t.timeout()),
            Failure::CircuitOpen(c) => ClassifiedError::circuit_open(c.name.clone()),
        }
    }
}

impl<E, F> Classifier<E> for F
where
    F: Fn(&E) -> ClassifiedError + Send + Sync,
{
    fn classify_error(&self, error: &E) -> ClassifiedError {
        self(error)
    }
}

/// Classifier for operations that already return [`ClassifiedError`].
pub fn passthrough(error: &ClassifiedError) -> ClassifiedError {
    error.clone()
}

/// Classifier for operations failing with [`std::io::Error`].
#[derive(Debug, Clone, Copy, Default)]
pub struct IoClassifier;

impl Classifier<io::Error> for IoClassifier {
    fn classify_error(&self, error: &io::Error) -> ClassifiedError {
        let kind = match error.kind() {
            io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof => ErrorKind::Connection,
            io::ErrorKind::TimedOut => ErrorKind::Timeout {
                timeout: Duration::ZERO,
            },
            io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => ErrorKind::Unavailable,
            io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
            io::ErrorKind::NotFound => ErrorKind::NotFound,
            io::ErrorKind::InvalidInput
            | io::ErrorKind::InvalidData
            | io::ErrorKind::AddrNotAvailable => ErrorKind::InvalidInput,
            _ => ErrorKind::Internal,
        };
        ClassifiedError::new(kind, error.to_string())
    }
}
