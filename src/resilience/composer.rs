//! Resilient operation composition.
//!
//! # Data Flow
//! ```text
//! resilient_operation(op, invocation)
//!     → timeouts.rs   (per attempt, innermost)
//!     → retries.rs    (re-applies the timeout on every attempt)
//!     → circuit_breaker.rs (one outcome per logical call, outermost)
//!     → metrics + log line around the whole stack
//! ```
//!
//! # Design Decisions
//! - The order is fixed: retries inside the breaker never count individually
//!   against its failure window
//! - Classification runs fresh on every failed attempt, so a reclassified
//!   error stops the retry loop
//! - Callers always receive a [`ClassifiedError`]; the raw failure stays
//!   reachable through `source()`
//! - Circuit-open rejections skip the classifier

use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::observability::metrics::{with_label, Labels, OperationMetrics};
use crate::resilience::circuit_breaker::CircuitBreaker;
use crate::resilience::classify::{ClassifiedError, Classifier};
use crate::resilience::error::Failure;
use crate::resilience::retries::{retry_operation, RetryConfig};
use crate::resilience::timeouts::execute_with_timeout;

/// Severity used when a resilient operation finally fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureLogLevel {
    #[default]
    Error,
    Warn,
    Info,
    /// For health probes, where failures are expected and must not page anyone.
    Debug,
}

impl FailureLogLevel {
    /// Level for intermediate retry lines: never above warn, never above the
    /// final failure level.
    pub fn retry_level(self) -> FailureLogLevel {
        match self {
            FailureLogLevel::Error => FailureLogLevel::Warn,
            other => other,
        }
    }

    fn log_retry(self, operation: &str, attempt: u32, error: &dyn fmt::Display) {
        match self.retry_level() {
            FailureLogLevel::Error | FailureLogLevel::Warn => {
                tracing::warn!(operation, attempt, error = %error, "Retrying operation")
            }
            FailureLogLevel::Info => {
                tracing::info!(operation, attempt, error = %error, "Retrying operation")
            }
            FailureLogLevel::Debug => {
                tracing::debug!(operation, attempt, error = %error, "Retrying operation")
            }
        }
    }

    fn log(self, operation: &str, error: &ClassifiedError, duration_ms: f64) {
        let error_type = error.kind().label();
        let retryable = error.is_retryable();
        match self {
            FailureLogLevel::Error => tracing::error!(
                operation, error_type, retryable, duration_ms, error = %error,
                "Resilient operation failed"
            ),
            FailureLogLevel::Warn => tracing::warn!(
                operation, error_type, retryable, duration_ms, error = %error,
                "Resilient operation failed"
            ),
            FailureLogLevel::Info => tracing::info!(
                operation, error_type, retryable, duration_ms, error = %error,
                "Resilient operation failed"
            ),
            FailureLogLevel::Debug => tracing::debug!(
                operation, error_type, retryable, duration_ms, error = %error,
                "Resilient operation failed"
            ),
        }
    }
}

pub type RetryPredicate = Arc<dyn Fn(&ClassifiedError) -> bool + Send + Sync>;

/// Everything one resilient call needs. Cheap to clone; build once, run many.
pub struct ResilienceInvocation<E> {
    name: String,
    classifier: Arc<dyn Classifier<E>>,
    should_retry: RetryPredicate,
    retry: Option<RetryConfig>,
    breaker: Option<Arc<CircuitBreaker>>,
    timeout: Option<Duration>,
    metrics: OperationMetrics,
    labels: Labels,
    failure_level: FailureLogLevel,
}

impl<E> ResilienceInvocation<E> {
    /// A bare invocation: no timeout, no retry, no breaker, no metrics.
    pub fn new(name: impl Into<String>, classifier: impl Classifier<E> + 'static) -> Self {
        Self {
            name: name.into(),
            classifier: Arc::new(classifier),
            should_retry: Arc::new(ClassifiedError::is_retryable),
            retry: None,
            breaker: None,
            timeout: None,
            metrics: OperationMetrics::default(),
            labels: Labels::new(),
            failure_level: FailureLogLevel::default(),
        }
    }

    /// Replace the default predicate (`ClassifiedError::is_retryable`).
    pub fn with_should_retry<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&ClassifiedError) -> bool + Send + Sync + 'static,
    {
        self.should_retry = Arc::new(predicate);
        self
    }

    pub fn with_retry(mut self, config: RetryConfig) -> Self {
        self.retry = Some(config);
        self
    }

    pub fn with_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    /// Per-attempt deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_metrics(mut self, metrics: OperationMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_labels(mut self, labels: Labels) -> Self {
        self.labels = labels;
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_failure_level(mut self, level: FailureLogLevel) -> Self {
        self.failure_level = level;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn breaker(&self) -> Option<&Arc<CircuitBreaker>> {
        self.breaker.as_ref()
    }

    fn classify(&self, failure: &Failure<E>) -> ClassifiedError {
        match failure {
            Failure::CircuitOpen(e) => ClassifiedError::circuit_open(e.name.clone()),
            _ => self.classifier.classify(failure),
        }
    }

    /// Run `operation` through this invocation's layers.
    pub async fn run<F, Fut, T>(&self, operation: F) -> Result<T, ClassifiedError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: StdError + Send + Sync + 'static,
    {
        resilient_operation(operation, self).await
    }
}

impl<E> Clone for ResilienceInvocation<E> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            classifier: self.classifier.clone(),
            should_retry: self.should_retry.clone(),
            retry: self.retry.clone(),
            breaker: self.breaker.clone(),
            timeout: self.timeout,
            metrics: self.metrics.clone(),
            labels: self.labels.clone(),
            failure_level: self.failure_level,
        }
    }
}

impl<E> fmt::Debug for ResilienceInvocation<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResilienceInvocation")
            .field("name", &self.name)
            .field("retry", &self.retry)
            .field("breaker", &self.breaker.as_ref().map(|b| b.name()))
            .field("timeout", &self.timeout)
            .field("metrics", &self.metrics)
            .field("labels", &self.labels)
            .field("failure_level", &self.failure_level)
            .finish()
    }
}

/// Wrap `operation` with timeout → retry → circuit breaker and record
/// latency and outcome metrics around the whole stack.
pub async fn resilient_operation<F, Fut, T, E>(
    mut operation: F,
    invocation: &ResilienceInvocation<E>,
) -> Result<T, ClassifiedError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: StdError + Send + Sync + 'static,
{
    let start = Instant::now();
    let name = invocation.name.as_str();
    let labels = with_label(&invocation.labels, "operation", name);

    let timeout = invocation.timeout;
    let on_timeout = |deadline: Duration| {
        tracing::debug!(
            operation = name,
            timeout_ms = deadline.as_millis() as u64,
            "Attempt timed out"
        );
    };
    let on_timeout = &on_timeout;

    let mut attempt = || {
        let pending = operation();
        async move {
            let guarded = async move { pending.await.map_err(Failure::Operation) };
            match timeout {
                Some(deadline) => execute_with_timeout(guarded, deadline, Some(on_timeout)).await,
                None => guarded.await,
            }
        }
    };

    let should_retry = |failure: &Failure<E>| (invocation.should_retry)(&invocation.classify(failure));
    let on_retry = |retry: u32, failure: &Failure<E>| {
        invocation.metrics.record_retry(retry, &labels);
        invocation.failure_level.log_retry(name, retry, failure);
    };

    let retried = async {
        match &invocation.retry {
            Some(config) => retry_operation(&mut attempt, should_retry, config, Some(&on_retry)).await,
            None => attempt().await,
        }
    };

    let result = match &invocation.breaker {
        Some(breaker) => breaker.execute(|| retried).await,
        None => retried.await,
    };

    let duration_ms = start.elapsed().as_secs_f64() * 1000.0;
    invocation.metrics.record_latency(duration_ms, &labels);

    match result {
        Ok(value) => {
            invocation.metrics.record_success(&labels);
            tracing::debug!(operation = name, duration_ms, "Resilient operation succeeded");
            Ok(value)
        }
        Err(failure) => {
            let classified = invocation.classify(&failure);
            let classified = if classified.source().is_some() {
                classified
            } else {
                classified.with_source(failure)
            };
            invocation
                .metrics
                .record_error(classified.kind().label(), &labels);
            invocation.failure_level.log(name, &classified, duration_ms);
            Err(classified)
        }
    }
}
