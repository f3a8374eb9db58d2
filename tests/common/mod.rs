//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use resilience_core::observability::metrics::{
    CounterSink, GaugeSink, LatencySink, Labels, OperationMetrics,
};
use resilience_core::resilience::RetryConfig;

/// In-memory sink recording every observation with its labels.
#[derive(Default)]
pub struct Recording {
    entries: Mutex<Vec<(f64, Labels)>>,
}

impl Recording {
    pub fn entries(&self) -> Vec<(f64, Labels)> {
        self.entries.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// Sum of all recorded values.
    pub fn total(&self) -> f64 {
        self.entries.lock().unwrap().iter().map(|(v, _)| v).sum()
    }

    /// Values of `key` across all entries, in recording order.
    pub fn label_values(&self, key: &str) -> Vec<String> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(_, labels)| labels.get(key).cloned())
            .collect()
    }

    fn push(&self, value: f64, labels: &Labels) {
        self.entries.lock().unwrap().push((value, labels.clone()));
    }
}

impl LatencySink for Recording {
    fn record(&self, duration_ms: f64, labels: &Labels) {
        self.push(duration_ms, labels);
    }
}

impl CounterSink for Recording {
    fn add(&self, value: u64, labels: &Labels) {
        self.push(value as f64, labels);
    }
}

impl GaugeSink for Recording {
    fn adjust(&self, delta: f64, labels: &Labels) {
        self.push(delta, labels);
    }
}

/// One recording sink per operation metric.
pub struct RecordedMetrics {
    pub latency: Arc<Recording>,
    pub success: Arc<Recording>,
    pub errors: Arc<Recording>,
    pub retries: Arc<Recording>,
}

impl RecordedMetrics {
    pub fn new() -> Self {
        Self {
            latency: Arc::new(Recording::default()),
            success: Arc::new(Recording::default()),
            errors: Arc::new(Recording::default()),
            retries: Arc::new(Recording::default()),
        }
    }

    pub fn sinks(&self) -> OperationMetrics {
        OperationMetrics {
            latency: Some(self.latency.clone()),
            success: Some(self.success.clone()),
            errors: Some(self.errors.clone()),
            retries: Some(self.retries.clone()),
        }
    }
}

/// Retry config with millisecond delays and no jitter.
pub fn fast_retry(max_retries: u32) -> RetryConfig {
    RetryConfig::default()
        .with_max_retries(max_retries)
        .with_initial_delay(Duration::from_millis(1))
        .with_max_delay(Duration::from_millis(5))
        .with_backoff_factor(1.0)
        .with_jitter(0.0)
}

/// An address nothing is listening on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Start a backend on `addr` that accepts and immediately drops connections.
/// Abort the handle to take the backend down again.
pub async fn start_backend(addr: SocketAddr) -> JoinHandle<()> {
    let listener = TcpListener::bind(addr).await.unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((socket, _)) => drop(socket),
                Err(_) => break,
            }
        }
    })
}
