//! Active TCP probing.
//!
//! # Responsibilities
//! - Periodically connect to each configured target
//! - Route every connect through the resilience stack
//! - Summarize outcomes and breaker state per round

use std::collections::BTreeMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use serde::Serialize;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::time;

use crate::config::{ResilienceConfig, TargetConfig};
use crate::observability::metrics::OperationMetrics;
use crate::resilience::{
    BreakerMetricsSnapshot, BreakerRegistry, CircuitState, IoClassifier, ResilienceInvocation,
};

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("target '{name}' has an invalid address '{address}'")]
    InvalidAddress { name: String, address: String },
}

/// Result of probing one target once.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeOutcome {
    pub target: String,
    pub address: SocketAddr,
    pub healthy: bool,
    pub latency_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub breaker_state: CircuitState,
}

/// One probe round.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub outcomes: Vec<ProbeOutcome>,
    pub breakers: BTreeMap<String, BreakerMetricsSnapshot>,
}

impl ProbeReport {
    pub fn all_healthy(&self) -> bool {
        self.outcomes.iter().all(|o| o.healthy)
    }

    pub fn unhealthy_count(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.healthy).count()
    }
}

struct ProbeTarget {
    name: String,
    address: SocketAddr,
    invocation: ResilienceInvocation<io::Error>,
}

pub struct TcpProber {
    targets: Vec<ProbeTarget>,
    registry: Arc<BreakerRegistry>,
    interval: Duration,
}

impl TcpProber {
    /// Build a prober for every target in `config`. Breakers come from
    /// `registry`, keyed by target name.
    pub fn new(
        config: &ResilienceConfig,
        registry: Arc<BreakerRegistry>,
        metrics: OperationMetrics,
    ) -> Result<Self, ProbeError> {
        let targets = config
            .targets
            .iter()
            .map(|target| build_target(target, config, &registry, &metrics))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            targets,
            registry,
            interval: Duration::from_secs(config.probe.interval_secs),
        })
    }

    pub fn registry(&self) -> &Arc<BreakerRegistry> {
        &self.registry
    }

    pub fn target_names(&self) -> Vec<&str> {
        self.targets.iter().map(|t| t.name.as_str()).collect()
    }

    /// Probe every target once, concurrently.
    pub async fn check_all(&self) -> ProbeReport {
        let outcomes = join_all(self.targets.iter().map(probe_target)).await;
        ProbeReport {
            outcomes,
            breakers: self.registry.snapshots(),
        }
    }

    /// Probe on the configured interval until `shutdown` fires.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            targets = self.targets.len(),
            "Prober starting"
        );

        let mut ticker = time::interval(self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.check_all().await;
                    for outcome in report.outcomes.iter().filter(|o| !o.healthy) {
                        tracing::info!(
                            target_name = %outcome.target,
                            address = %outcome.address,
                            breaker_state = %outcome.breaker_state,
                            error_type = outcome.error_type.unwrap_or("unknown"),
                            "Target unreachable"
                        );
                    }
                    tracing::info!(
                        total = report.outcomes.len(),
                        unhealthy = report.unhealthy_count(),
                        "Probe round complete"
                    );
                }
                _ = shutdown.recv() => {
                    tracing::info!("Prober received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

fn build_target(
    target: &TargetConfig,
    config: &ResilienceConfig,
    registry: &BreakerRegistry,
    metrics: &OperationMetrics,
) -> Result<ProbeTarget, ProbeError> {
    let address: SocketAddr = target
        .address
        .parse()
        .map_err(|_| ProbeError::InvalidAddress {
            name: target.name.clone(),
            address: target.address.clone(),
        })?;

    let breaker = registry.get_or_create(&target.name, &config.breaker);
    let mut invocation = ResilienceInvocation::new(target.name.clone(), IoClassifier)
        .with_retry(config.retry.clone())
        .with_breaker(breaker)
        .with_metrics(metrics.clone())
        .with_labels(target.labels.clone())
        .with_label("address", target.address.clone())
        .with_failure_level(config.probe.failure_log_level);
    if let Some(timeout) = config.timeouts.attempt() {
        invocation = invocation.with_timeout(timeout);
    }

    Ok(ProbeTarget {
        name: target.name.clone(),
        address,
        invocation,
    })
}

async fn probe_target(target: &ProbeTarget) -> ProbeOutcome {
    let start = Instant::now();
    let address = target.address;

    let result = target
        .invocation
        .run(move || async move { TcpStream::connect(address).await.map(drop) })
        .await;

    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    let breaker_state = target
        .invocation
        .breaker()
        .map(|b| b.state())
        .unwrap_or(CircuitState::Closed);

    match result {
        Ok(()) => ProbeOutcome {
            target: target.name.clone(),
            address,
            healthy: true,
            latency_ms,
            error_type: None,
            error: None,
            breaker_state,
        },
        Err(e) => ProbeOutcome {
            target: target.name.clone(),
            address,
            healthy: false,
            latency_ms,
            error_type: Some(e.kind().label()),
            error: Some(e.to_string()),
            breaker_state,
        },
    }
}
