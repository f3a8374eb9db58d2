//! resilience-probe
//!
//! Probes TCP dependencies through the resilience stack and reports their
//! reachability and circuit breaker state.
//!
//! # Architecture Overview
//!
//! ```text
//!   config.toml ──▶ config::load_config ──▶ ResilienceConfig
//!                                                │
//!                                                ▼
//!   ┌──────────────────────────────────────────────────────────────┐
//!   │ probe::TcpProber                                             │
//!   │   for each target:                                           │
//!   │     resilient_operation(TcpStream::connect)                  │
//!   │       timeout ──▶ retry ──▶ circuit breaker (per target)     │
//!   └──────────────────────────────────────────────────────────────┘
//!           │                         │
//!           ▼                         ▼
//!   ProbeReport (JSON)        metrics (Prometheus) + tracing logs
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use resilience_core::config::load_config;
use resilience_core::lifecycle::{spawn_signal_handler, Shutdown};
use resilience_core::observability::logging::init_logging;
use resilience_core::observability::metrics::{init_metrics, OperationMetrics, RecorderGauge};
use resilience_core::probe::TcpProber;
use resilience_core::resilience::BreakerRegistry;

#[derive(Parser)]
#[command(name = "resilience-probe", version)]
#[command(about = "Probe TCP dependencies through timeouts, retries and circuit breakers", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "resilience.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Probe every target once and print the report as JSON
    Check,
    /// Probe on the configured interval until Ctrl-C
    Watch,
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    init_logging(&config.observability);

    tracing::info!(
        config = %cli.config.display(),
        targets = config.targets.len(),
        max_retries = config.retry.max_retries,
        "Configuration loaded"
    );

    let mut registry = BreakerRegistry::new();
    let mut metrics = OperationMetrics::default();
    if config.observability.metrics_enabled {
        init_metrics(config.observability.metrics_address.parse()?);
        registry = registry.with_state_gauge(Arc::new(RecorderGauge::breaker_state()), Default::default());
        metrics = OperationMetrics::recorder();
    }

    let prober = TcpProber::new(&config, Arc::new(registry), metrics)?;

    match cli.command {
        Commands::Check => {
            let report = prober.check_all().await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.all_healthy() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Watch => {
            let shutdown = Arc::new(Shutdown::new());
            let rx = shutdown.subscribe();
            spawn_signal_handler(shutdown.clone());
            prober.run(rx).await;
            tracing::info!("Shutdown complete");
        }
    }

    Ok(ExitCode::SUCCESS)
}
