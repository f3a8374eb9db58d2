//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (thresholds in [0, 1], delays ordered, timeouts > 0)
//! - Check target names are unique and addresses parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ResilienceConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ResilienceConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Validate `config`, collecting every error.
pub fn validate_config(config: &ResilienceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let retry = &config.retry;
    if retry.initial_delay_ms > retry.max_delay_ms {
        errors.push(ValidationError::new(
            "retry.initial_delay_ms",
            format!(
                "must not exceed retry.max_delay_ms ({} > {})",
                retry.initial_delay_ms, retry.max_delay_ms
            ),
        ));
    }
    if retry.backoff_factor.is_nan() || retry.backoff_factor < 1.0 {
        errors.push(ValidationError::new("retry.backoff_factor", "must be at least 1.0"));
    }
    if !(0.0..=1.0).contains(&retry.jitter) {
        errors.push(ValidationError::new("retry.jitter", "must be between 0.0 and 1.0"));
    }
    if retry.operation_timeout_ms == Some(0) {
        errors.push(ValidationError::new("retry.operation_timeout_ms", "must be greater than 0"));
    }

    let breaker = &config.breaker;
    if !(0.0..=1.0).contains(&breaker.failure_threshold) {
        errors.push(ValidationError::new(
            "breaker.failure_threshold",
            "must be between 0.0 and 1.0",
        ));
    }
    if breaker.volume_threshold == 0 {
        errors.push(ValidationError::new("breaker.volume_threshold", "must be at least 1"));
    }
    if breaker.reset_timeout_ms == 0 {
        errors.push(ValidationError::new("breaker.reset_timeout_ms", "must be greater than 0"));
    }
    if breaker.rolling_window_ms == 0 {
        errors.push(ValidationError::new("breaker.rolling_window_ms", "must be greater than 0"));
    }
    if breaker.buckets == 0 {
        errors.push(ValidationError::new("breaker.buckets", "must be at least 1"));
    }

    if config.timeouts.attempt_ms == Some(0) {
        errors.push(ValidationError::new("timeouts.attempt_ms", "must be greater than 0"));
    }
    if config.probe.interval_secs == 0 {
        errors.push(ValidationError::new("probe.interval_secs", "must be greater than 0"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("invalid socket address '{}'", config.observability.metrics_address),
        ));
    }

    let mut seen = HashSet::new();
    for (i, target) in config.targets.iter().enumerate() {
        let field = format!("targets[{}]", i);
        if target.name.trim().is_empty() {
            errors.push(ValidationError::new(format!("{}.name", field), "must not be empty"));
        } else if !seen.insert(target.name.as_str()) {
            errors.push(ValidationError::new(
                format!("{}.name", field),
                format!("duplicate target name '{}'", target.name),
            ));
        }
        if target.address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::new(
                format!("{}.address", field),
                format!("invalid socket address '{}'", target.address),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::TargetConfig;

    fn target(name: &str, address: &str) -> TargetConfig {
        TargetConfig {
            name: name.to_string(),
            address: address.to_string(),
            labels: Default::default(),
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&ResilienceConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = ResilienceConfig::default();
        config.retry.initial_delay_ms = 1000;
        config.retry.max_delay_ms = 10;
        config.breaker.failure_threshold = 1.5;
        config.breaker.volume_threshold = 0;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "retry.initial_delay_ms",
                "breaker.failure_threshold",
                "breaker.volume_threshold"
            ]
        );
    }

    #[test]
    fn test_rejects_bad_targets() {
        let mut config = ResilienceConfig::default();
        config.targets = vec![
            target("db", "127.0.0.1:5432"),
            target("db", "127.0.0.1:5433"),
            target("", "not-an-address"),
        ];

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors[0].message.contains("duplicate"));
        assert_eq!(errors[1].field, "targets[2].name");
        assert_eq!(errors[2].field, "targets[2].address");
    }

    #[test]
    fn test_metrics_address_checked_only_when_enabled() {
        let mut config = ResilienceConfig::default();
        config.observability.metrics_address = "nope".into();
        assert!(validate_config(&config).is_ok());

        config.observability.metrics_enabled = true;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "observability.metrics_address");
    }
}
