//! Retry logic.
//!
//! # Responsibilities
//! - Re-invoke a failed operation with exponential backoff + jitter
//! - Abort immediately when the caller's predicate rejects the error
//! - Bound the whole retry sequence with an optional ceiling
//!
//! # Design Decisions
//! - The caller decides retryability; the engine never inspects errors
//! - Errors are never wrapped: the caller sees exactly what the operation raised
//! - Exhaustion surfaces the last error, preserving the root cause
//! - The sequence ceiling is a hard limit over attempts and delays together

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::resilience::backoff::calculate_backoff;
use crate::resilience::error::TimeoutError;

/// Retry configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of retries (not counting the initial attempt).
    pub max_retries: u32,

    /// Delay before the first retry in milliseconds.
    pub initial_delay_ms: u64,

    /// Upper bound on a single backoff delay in milliseconds.
    pub max_delay_ms: u64,

    /// Multiplier applied to the delay after each retry.
    pub backoff_factor: f64,

    /// Ceiling over the entire retry sequence in milliseconds.
    pub operation_timeout_ms: Option<u64>,

    /// Jitter as a fraction of the delay (0.0 to 1.0).
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 100,
            max_delay_ms: 400,
            backoff_factor: 2.0,
            operation_timeout_ms: Some(5000),
            jitter: 0.2,
        }
    }
}

impl RetryConfig {
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    /// Set the ceiling over the whole retry sequence (`None` disables it).
    pub fn with_operation_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.operation_timeout_ms = timeout.map(|d| d.as_millis() as u64);
        self
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    pub fn operation_timeout(&self) -> Option<Duration> {
        self.operation_timeout_ms.map(Duration::from_millis)
    }
}

/// Execute `operation` with retries.
///
/// `should_retry` is consulted after every failure. `on_retry` receives the
/// 1-based retry number and the error that triggered it, after the backoff
/// delay and right before the operation is invoked again.
pub async fn retry_operation<F, Fut, T, E, P>(
    mut operation: F,
    should_retry: P,
    config: &RetryConfig,
    on_retry: Option<&(dyn Fn(u32, &E) + Send + Sync)>,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: From<TimeoutError>,
{
    let attempts = async {
        let mut retry = 0u32;
        loop {
            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if !should_retry(&error) || retry >= config.max_retries {
                return Err(error);
            }

            retry += 1;
            let delay = calculate_backoff(retry, config);
            tracing::trace!(
                attempt = retry,
                delay_ms = delay.as_millis() as u64,
                "Backing off before retry"
            );
            tokio::time::sleep(delay).await;

            if let Some(hook) = on_retry {
                hook(retry, &error);
            }
        }
    };

    match config.operation_timeout() {
        Some(ceiling) => match tokio::time::timeout(ceiling, attempts).await {
            Ok(result) => result,
            Err(_) => {
                tracing::debug!(
                    timeout_ms = ceiling.as_millis() as u64,
                    "Retry sequence exceeded its ceiling"
                );
                Err(TimeoutError::new(ceiling).into())
            }
        },
        None => attempts.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Debug, PartialEq)]
    enum TestError {
        Transient(u32),
        Fatal,
        Timeout(Duration),
    }

    impl From<TimeoutError> for TestError {
        fn from(e: TimeoutError) -> Self {
            TestError::Timeout(e.timeout())
        }
    }

    fn fast_config(max_retries: u32) -> RetryConfig {
        RetryConfig::default()
            .with_max_retries(max_retries)
            .with_initial_delay(Duration::from_millis(1))
            .with_max_delay(Duration::from_millis(5))
            .with_backoff_factor(1.0)
            .with_jitter(0.0)
    }

    fn is_transient(e: &TestError) -> bool {
        matches!(e, TestError::Transient(_))
    }

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.initial_delay_ms, 100);
        assert_eq!(config.max_delay_ms, 400);
        assert!((config.backoff_factor - 2.0).abs() < f64::EPSILON);
        assert_eq!(config.operation_timeout(), Some(Duration::from_millis(5000)));
    }

    #[tokio::test]
    async fn test_recovers_after_two_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = retry_operation(
            || {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        Err(TestError::Transient(n))
                    } else {
                        Ok("recovered")
                    }
                }
            },
            is_transient,
            &fast_config(2),
            None,
        )
        .await;

        assert_eq!(result.unwrap(), "recovered");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_on_retry_numbering() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_hook = seen.clone();
        let hook = move |attempt: u32, _: &TestError| {
            seen_hook.lock().unwrap().push(attempt);
        };
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = retry_operation(
            || {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    if n < 3 {
                        Err(TestError::Transient(n))
                    } else {
                        Ok(n)
                    }
                }
            },
            is_transient,
            &fast_config(3),
            Some(&hook),
        )
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_non_retryable_aborts_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), _> = retry_operation(
            || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(TestError::Fatal)
                }
            },
            is_transient,
            &fast_config(3),
            None,
        )
        .await;

        assert_eq!(result.unwrap_err(), TestError::Fatal);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhaustion_surfaces_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), _> = retry_operation(
            || {
                let counter = counter.clone();
                async move { Err(TestError::Transient(counter.fetch_add(1, Ordering::SeqCst))) }
            },
            is_transient,
            &fast_config(2),
            None,
        )
        .await;

        assert_eq!(result.unwrap_err(), TestError::Transient(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_sequence_ceiling() {
        let config = fast_config(100)
            .with_initial_delay(Duration::from_millis(20))
            .with_max_delay(Duration::from_millis(20))
            .with_operation_timeout(Some(Duration::from_millis(50)));

        let result: Result<(), _> = retry_operation(
            || async { Err(TestError::Transient(0)) },
            is_transient,
            &config,
            None,
        )
        .await;

        assert_eq!(
            result.unwrap_err(),
            TestError::Timeout(Duration::from_millis(50))
        );
    }
}
