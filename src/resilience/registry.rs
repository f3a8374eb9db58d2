//! Named circuit breaker registry.
//!
//! # Responsibilities
//! - Hand out one shared breaker per resource name
//! - Create breakers lazily on first use
//! - Reset or clear breakers for operations and tests
//!
//! # Design Decisions
//! - One owner per name: config applies only when the breaker is first
//!   created; later configs for the same name are ignored
//! - Breakers are never replaced once created
//! - The registry is an explicit value shared via `Arc`, not a global, so
//!   tests build isolated registries

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::observability::metrics::{GaugeSink, Labels};
use crate::resilience::circuit_breaker::{BreakerConfig, BreakerMetricsSnapshot, CircuitBreaker};

#[derive(Default)]
pub struct BreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    state_gauge: Option<Arc<dyn GaugeSink>>,
    labels: Labels,
}

impl BreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `gauge` to every breaker this registry creates from now on.
    pub fn with_state_gauge(mut self, gauge: Arc<dyn GaugeSink>, labels: Labels) -> Self {
        self.state_gauge = Some(gauge);
        self.labels = labels;
        self
    }

    /// Return the breaker for `name`, creating it with `config` if absent.
    pub fn get_or_create(&self, name: &str, config: &BreakerConfig) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(name) {
            return existing.clone();
        }

        let candidate = CircuitBreaker::new(name, config.clone());
        let candidate = match &self.state_gauge {
            Some(gauge) => candidate.with_unreported_gauge(gauge.clone(), &self.labels),
            None => candidate,
        };

        let (breaker, created) = match self.breakers.entry(name.to_string()) {
            Entry::Occupied(entry) => (entry.get().clone(), false),
            Entry::Vacant(entry) => (entry.insert(Arc::new(candidate)).clone(), true),
        };

        // Gauge sinks may read the registry; report outside the shard lock.
        if created {
            tracing::debug!(breaker = %name, "Created circuit breaker");
            breaker.report_current_level();
        }
        breaker
    }

    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(|b| b.clone())
    }

    /// Force the named breaker closed. Returns false if it does not exist.
    pub fn reset(&self, name: &str) -> bool {
        match self.get(name) {
            Some(breaker) => {
                breaker.reset();
                true
            }
            None => false,
        }
    }

    /// Drop every breaker.
    pub fn clear(&self) {
        self.breakers.clear();
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.breakers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Snapshot of every breaker keyed by name.
    pub fn snapshots(&self) -> BTreeMap<String, BreakerMetricsSnapshot> {
        // `metrics()` may publish a gauge update, so no shard lock is held here.
        let breakers: Vec<(String, Arc<CircuitBreaker>)> = self
            .breakers
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        breakers
            .into_iter()
            .map(|(name, breaker)| (name, breaker.metrics()))
            .collect()
    }
}

impl std::fmt::Debug for BreakerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BreakerRegistry")
            .field("breakers", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::circuit_breaker::CircuitState;
    use crate::resilience::error::CircuitOpenError;
    use std::sync::{Mutex, OnceLock, Weak};
    use std::time::Duration;

    /// Gauge that reads the registry it reports for.
    #[derive(Default)]
    struct SnapshottingGauge {
        registry: OnceLock<Weak<BreakerRegistry>>,
        seen: Mutex<Vec<usize>>,
    }

    impl GaugeSink for SnapshottingGauge {
        fn adjust(&self, _: f64, _: &Labels) {
            if let Some(registry) = self.registry.get().and_then(Weak::upgrade) {
                let count = registry.snapshots().len();
                self.seen.lock().unwrap().push(count);
            }
        }
    }

    #[test]
    fn test_gauge_can_read_registry_during_creation() {
        let gauge = Arc::new(SnapshottingGauge::default());
        let registry =
            Arc::new(BreakerRegistry::new().with_state_gauge(gauge.clone(), Labels::new()));
        gauge.registry.set(Arc::downgrade(&registry)).unwrap();

        registry.get_or_create("db", &BreakerConfig::default());
        registry.get_or_create("db", &BreakerConfig::default());
        registry.get_or_create("cache", &BreakerConfig::default());

        assert_eq!(*gauge.seen.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_same_name_returns_same_breaker() {
        let registry = BreakerRegistry::new();
        let a = registry.get_or_create("db", &BreakerConfig::default());
        let b = registry.get_or_create("db", &BreakerConfig::default());
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_first_config_wins() {
        let registry = BreakerRegistry::new();
        let first = BreakerConfig::default().with_volume_threshold(2);
        let second = BreakerConfig::default().with_volume_threshold(50);

        registry.get_or_create("db", &first);
        let breaker = registry.get_or_create("db", &second);
        assert_eq!(breaker.config().volume_threshold, 2);
    }

    #[tokio::test]
    async fn test_reset_and_clear() {
        let registry = BreakerRegistry::new();
        let config = BreakerConfig::default()
            .with_volume_threshold(1)
            .with_reset_timeout(Duration::from_secs(60));
        let breaker = registry.get_or_create("api", &config);

        let _: Result<(), CircuitOpenError> = breaker
            .execute(|| async {
                Err(CircuitOpenError {
                    name: "upstream".into(),
                    probe_in_flight: false,
                })
            })
            .await;
        assert_eq!(breaker.state(), CircuitState::Open);

        assert!(registry.reset("api"));
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(!registry.reset("missing"));

        registry.clear();
        assert!(registry.is_empty());
        assert!(registry.get("api").is_none());
    }

    #[test]
    fn test_isolated_registries() {
        let one = BreakerRegistry::new();
        let two = BreakerRegistry::new();
        one.get_or_create("db", &BreakerConfig::default());
        assert_eq!(one.names(), vec!["db".to_string()]);
        assert!(two.is_empty());
    }

    #[test]
    fn test_snapshots() {
        let registry = BreakerRegistry::new();
        registry.get_or_create("b", &BreakerConfig::default());
        registry.get_or_create("a", &BreakerConfig::default());

        let snapshots = registry.snapshots();
        assert_eq!(snapshots.keys().cloned().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(snapshots["a"].state, CircuitState::Closed);
    }
}
