//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the probe.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::resilience::{BreakerConfig, FailureLogLevel, RetryConfig};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ResilienceConfig {
    /// Retry settings applied to every target.
    pub retry: RetryConfig,

    /// Circuit breaker settings used when a target's breaker is first created.
    pub breaker: BreakerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Probe loop settings.
    pub probe: ProbeConfig,

    /// Endpoints to probe.
    pub targets: Vec<TargetConfig>,
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Deadline for a single attempt in milliseconds (`None` disables it).
    pub attempt_ms: Option<u64>,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            attempt_ms: Some(1000),
        }
    }
}

impl TimeoutConfig {
    pub fn attempt(&self) -> Option<Duration> {
        self.attempt_ms.map(Duration::from_millis)
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines instead of human-readable ones.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Probe loop configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Interval between probe rounds in seconds.
    pub interval_secs: u64,

    /// Log level for failed probes. Probes expect failures, so this defaults to debug.
    pub failure_log_level: FailureLogLevel,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            interval_secs: 10,
            failure_log_level: FailureLogLevel::Debug,
        }
    }
}

/// A TCP endpoint to probe.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TargetConfig {
    /// Target identifier; also the circuit breaker name.
    pub name: String,

    /// Address to connect to (e.g., "127.0.0.1:5432").
    pub address: String,

    /// Extra metric labels for this target.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}
