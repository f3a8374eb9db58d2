//! Timeout enforcement.
//!
//! # Responsibilities
//! - Race an operation against a deadline
//! - Report expiry through an optional hook before failing
//! - Surface the configured deadline in the error
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities; the timer is dropped with the race
//! - Timeout errors are distinct from other errors
//! - The losing operation future is dropped, never polled again

use std::future::Future;
use std::time::Duration;

use crate::resilience::error::TimeoutError;

/// Run `operation` with a deadline.
///
/// On expiry `on_timeout` is invoked with the configured duration and the
/// call fails with [`TimeoutError`]. A late result is discarded.
pub async fn execute_with_timeout<Fut, T, E>(
    operation: Fut,
    timeout: Duration,
    on_timeout: Option<&(dyn Fn(Duration) + Send + Sync)>,
) -> Result<T, E>
where
    Fut: Future<Output = Result<T, E>>,
    E: From<TimeoutError>,
{
    match tokio::time::timeout(timeout, operation).await {
        Ok(result) => result,
        Err(_) => {
            if let Some(hook) = on_timeout {
                hook(timeout);
            }
            Err(TimeoutError::new(timeout).into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_fast_operation_wins() {
        let fired = Arc::new(AtomicU32::new(0));
        let hook_fired = fired.clone();
        let hook = move |_: Duration| {
            hook_fired.fetch_add(1, Ordering::SeqCst);
        };

        let result: Result<&str, TimeoutError> = execute_with_timeout(
            async { Ok("fast") },
            Duration::from_millis(200),
            Some(&hook),
        )
        .await;

        assert_eq!(result.unwrap(), "fast");
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_slow_operation_times_out_with_exact_duration() {
        let fired = Arc::new(AtomicU32::new(0));
        let hook_fired = fired.clone();
        let hook = move |d: Duration| {
            assert_eq!(d, Duration::from_millis(20));
            hook_fired.fetch_add(1, Ordering::SeqCst);
        };

        let result: Result<(), TimeoutError> = execute_with_timeout(
            async {
                tokio::time::sleep(Duration::from_millis(500)).await;
                Ok(())
            },
            Duration::from_millis(20),
            Some(&hook),
        )
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.timeout(), Duration::from_millis(20));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_operation_error_passes_through() {
        #[derive(Debug, PartialEq)]
        enum TestError {
            Boom,
            Timeout(u64),
        }

        impl From<TimeoutError> for TestError {
            fn from(e: TimeoutError) -> Self {
                TestError::Timeout(e.timeout_ms())
            }
        }

        let result: Result<(), TestError> =
            execute_with_timeout(async { Err(TestError::Boom) }, Duration::from_secs(1), None)
                .await;
        assert_eq!(result.unwrap_err(), TestError::Boom);
    }
}
