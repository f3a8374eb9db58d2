//! Exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;

use crate::resilience::retries::RetryConfig;

/// Calculate the delay before retry `attempt` (1-based).
///
/// The base delay is `min(max_delay, initial_delay * backoff_factor^(attempt - 1))`,
/// then scaled by a random factor in `[1 - jitter, 1 + jitter]`.
pub fn calculate_backoff(attempt: u32, config: &RetryConfig) -> Duration {
    if attempt == 0 {
        return Duration::from_millis(0);
    }

    let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
    let delay_ms = config.initial_delay_ms as f64 * config.backoff_factor.powi(exponent);
    let capped_delay = delay_ms.min(config.max_delay_ms as f64);

    let jitter = config.jitter.clamp(0.0, 1.0);
    let factor = if jitter > 0.0 {
        rand::thread_rng().gen_range((1.0 - jitter)..=(1.0 + jitter))
    } else {
        1.0
    };

    Duration::from_millis((capped_delay * factor).max(0.0).round() as u64)
}
