//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Resilience layers produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (latency histogram, outcome/retry counters, breaker gauge)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging for machine parsing
//! - Metric sinks are injected, so the core never depends on an exporter
//! - Metrics are cheap (atomic increments behind the `metrics` facade)

pub mod logging;
pub mod metrics;
