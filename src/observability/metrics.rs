//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define the sink interfaces the resilience layers report into
//! - Back those sinks with the `metrics` facade
//! - Expose a Prometheus-compatible scrape endpoint
//!
//! # Metrics
//! - `resilience_operation_duration_ms` (histogram): latency per operation
//! - `resilience_operation_success_total` (counter): successful calls
//! - `resilience_operation_errors_total` (counter): failed calls by `error_type`
//! - `resilience_operation_retries_total` (counter): retries by `attempt`
//! - `resilience_circuit_breaker_state` (gauge): 1=closed, 0.5=half-open, 0=open
//!
//! # Design Decisions
//! - A failing sink never aborts a call: sink panics are caught and the
//!   observation is dropped with a warning
//! - Every sink is optional; a missing sink changes nothing but the metric
//! - Labels are passed per call so one sink serves many operations

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Label};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Metric label set. Ordered so exported series are stable.
pub type Labels = BTreeMap<String, String>;

pub const OPERATION_DURATION: &str = "resilience_operation_duration_ms";
pub const OPERATION_SUCCESS: &str = "resilience_operation_success_total";
pub const OPERATION_ERRORS: &str = "resilience_operation_errors_total";
pub const OPERATION_RETRIES: &str = "resilience_operation_retries_total";
pub const BREAKER_STATE: &str = "resilience_circuit_breaker_state";

/// Records a latency observation in milliseconds.
pub trait LatencySink: Send + Sync {
    fn record(&self, duration_ms: f64, labels: &Labels);
}

/// Monotonic counter.
pub trait CounterSink: Send + Sync {
    fn add(&self, value: u64, labels: &Labels);
}

/// Up/down gauge adjusted by deltas.
pub trait GaugeSink: Send + Sync {
    fn adjust(&self, delta: f64, labels: &Labels);
}

/// Sink handles for one resilient operation. All fields optional.
#[derive(Clone, Default)]
pub struct OperationMetrics {
    pub latency: Option<Arc<dyn LatencySink>>,
    pub success: Option<Arc<dyn CounterSink>>,
    pub errors: Option<Arc<dyn CounterSink>>,
    pub retries: Option<Arc<dyn CounterSink>>,
}

impl OperationMetrics {
    /// Sinks backed by the global `metrics` recorder under the standard names.
    pub fn recorder() -> Self {
        register_metrics();
        Self {
            latency: Some(Arc::new(RecorderHistogram::new(OPERATION_DURATION))),
            success: Some(Arc::new(RecorderCounter::new(OPERATION_SUCCESS))),
            errors: Some(Arc::new(RecorderCounter::new(OPERATION_ERRORS))),
            retries: Some(Arc::new(RecorderCounter::new(OPERATION_RETRIES))),
        }
    }

    pub fn record_latency(&self, duration_ms: f64, labels: &Labels) {
        if let Some(sink) = &self.latency {
            guarded(OPERATION_DURATION, || sink.record(duration_ms, labels));
        }
    }

    pub fn record_success(&self, labels: &Labels) {
        if let Some(sink) = &self.success {
            guarded(OPERATION_SUCCESS, || sink.add(1, labels));
        }
    }

    pub fn record_error(&self, error_type: &str, labels: &Labels) {
        if let Some(sink) = &self.errors {
            let labels = with_label(labels, "error_type", error_type);
            guarded(OPERATION_ERRORS, || sink.add(1, &labels));
        }
    }

    pub fn record_retry(&self, attempt: u32, labels: &Labels) {
        if let Some(sink) = &self.retries {
            let labels = with_label(labels, "attempt", &attempt.to_string());
            guarded(OPERATION_RETRIES, || sink.add(1, &labels));
        }
    }
}

/// Run one sink call, dropping the observation if the sink panics.
pub(crate) fn guarded(metric: &str, record: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(record)).is_err() {
        tracing::warn!(metric, "Metrics sink panicked, observation dropped");
    }
}

impl std::fmt::Debug for OperationMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationMetrics")
            .field("latency", &self.latency.is_some())
            .field("success", &self.success.is_some())
            .field("errors", &self.errors.is_some())
            .field("retries", &self.retries.is_some())
            .finish()
    }
}

/// Copy `labels` with one extra entry.
pub fn with_label(labels: &Labels, key: &str, value: &str) -> Labels {
    let mut labels = labels.clone();
    labels.insert(key.to_string(), value.to_string());
    labels
}

fn to_metric_labels(labels: &Labels) -> Vec<Label> {
    labels
        .iter()
        .map(|(k, v)| Label::new(k.clone(), v.clone()))
        .collect()
}

/// Histogram sink writing to the global recorder.
#[derive(Debug, Clone)]
pub struct RecorderHistogram {
    name: &'static str,
}

impl RecorderHistogram {
    pub fn new(name: &'static str) -> Self {
        Self { name }
    }
}

impl LatencySink for RecorderHistogram {
    fn record(&self, duration_ms: f64, labels: &Labels) {
        histogram!(self.name, to_metric_labels(labels)).record(duration_ms);
    }
}

/// Counter sink writing to the global recorder.
#[derive(Debug, Clone)]
pub struct RecorderCounter {
    name: &'static str,
}

impl RecorderCounter {
    pub fn new(name: &'static str) -> Self {
        Self { name }
    }
}

impl CounterSink for RecorderCounter {
    fn add(&self, value: u64, labels: &Labels) {
        counter!(self.name, to_metric_labels(labels)).increment(value);
    }
}

/// Gauge sink writing to the global recorder.
#[derive(Debug, Clone)]
pub struct RecorderGauge {
    name: &'static str,
}

impl RecorderGauge {
    pub fn new(name: &'static str) -> Self {
        Self { name }
    }

    /// Gauge for circuit breaker state under the standard name.
    pub fn breaker_state() -> Self {
        register_metrics();
        Self::new(BREAKER_STATE)
    }
}

impl GaugeSink for RecorderGauge {
    fn adjust(&self, delta: f64, labels: &Labels) {
        gauge!(self.name, to_metric_labels(labels)).increment(delta);
    }
}

static METRICS_REGISTERED: OnceLock<()> = OnceLock::new();

/// Registers metric descriptions. Idempotent.
pub fn register_metrics() {
    METRICS_REGISTERED.get_or_init(|| {
        describe_histogram!(
            OPERATION_DURATION,
            metrics::Unit::Milliseconds,
            "Resilient operation latency in milliseconds"
        );
        describe_counter!(OPERATION_SUCCESS, "Resilient operations that succeeded");
        describe_counter!(OPERATION_ERRORS, "Resilient operations that failed, by error type");
        describe_counter!(OPERATION_RETRIES, "Retry attempts, by attempt number");
        describe_gauge!(
            BREAKER_STATE,
            "Circuit breaker state (1 = closed, 0.5 = half-open, 0 = open)"
        );
    });
}

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => {
            register_metrics();
            tracing::info!(address = %addr, "Metrics endpoint listening");
        }
        Err(e) => {
            tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter");
        }
    }
}
