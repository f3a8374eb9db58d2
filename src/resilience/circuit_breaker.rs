//! Circuit breaker for dependency protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: dependency assumed down, calls fail fast
//! - Half-Open: testing if the dependency recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: failure rate >= threshold, with total >= volume threshold
//! Open → Half-Open: after reset timeout
//! Half-Open → Closed: probe call succeeds (window cleared)
//! Half-Open → Open: probe call fails (timer restarts)
//! ```
//!
//! # Design Decisions
//! - Rate is computed over a rolling window of time buckets
//! - The threshold is evaluated when a failure is recorded, never on success
//! - Volume threshold prevents tripping on a cold start
//! - Fail fast in Open state (the operation is never invoked)
//! - Single probe in Half-Open (prevents hammering a recovering dependency)
//! - An abandoned probe counts as a failed probe
//! - Outcomes of calls admitted before a state change or reset are dropped
//! - The state gauge is adjusted outside the state lock

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::observability::metrics::{guarded, with_label, GaugeSink, Labels, BREAKER_STATE};
use crate::resilience::error::CircuitOpenError;

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    /// Numeric level reported through the state gauge.
    pub fn level(self) -> f64 {
        match self {
            CircuitState::Closed => 1.0,
            CircuitState::HalfOpen => 0.5,
            CircuitState::Open => 0.0,
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        };
        f.write_str(s)
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Failure rate (0.0 to 1.0) at which the circuit opens.
    pub failure_threshold: f64,

    /// Time spent open before a probe is allowed, in milliseconds.
    pub reset_timeout_ms: u64,

    /// Minimum completed calls in the window before the rate is evaluated.
    pub volume_threshold: u32,

    /// Span of the rolling window in milliseconds.
    pub rolling_window_ms: u64,

    /// Number of buckets the rolling window is divided into.
    pub buckets: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 0.5,
            reset_timeout_ms: 30_000,
            volume_threshold: 10,
            rolling_window_ms: 10_000,
            buckets: 10,
        }
    }
}

impl BreakerConfig {
    pub fn with_failure_threshold(mut self, threshold: f64) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn with_reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_volume_threshold(mut self, volume: u32) -> Self {
        self.volume_threshold = volume;
        self
    }

    pub fn with_rolling_window(mut self, window: Duration, buckets: u32) -> Self {
        self.rolling_window_ms = window.as_millis() as u64;
        self.buckets = buckets;
        self
    }

    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }

    pub fn rolling_window(&self) -> Duration {
        Duration::from_millis(self.rolling_window_ms)
    }
}

/// Point-in-time view of a breaker, derived from its rolling window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakerMetricsSnapshot {
    pub state: CircuitState,
    pub failures: u64,
    pub successes: u64,
    pub total_requests: u64,
    pub failure_rate: f64,
}

#[derive(Debug)]
struct Bucket {
    started_at: Instant,
    failures: u64,
    successes: u64,
}

/// Outcome counts over the last `span`, kept as a ring of time buckets.
#[derive(Debug)]
struct RollingWindow {
    buckets: VecDeque<Bucket>,
    span: Duration,
    bucket_span: Duration,
}

impl RollingWindow {
    fn new(span: Duration, buckets: u32) -> Self {
        let bucket_span = span / buckets.max(1);
        Self {
            buckets: VecDeque::new(),
            span,
            bucket_span: bucket_span.max(Duration::from_millis(1)),
        }
    }

    fn record(&mut self, now: Instant, success: bool) {
        self.evict(now);
        let fresh = matches!(
            self.buckets.back(),
            Some(b) if now.duration_since(b.started_at) < self.bucket_span
        );
        if !fresh {
            self.buckets.push_back(Bucket {
                started_at: now,
                failures: 0,
                successes: 0,
            });
        }
        if let Some(bucket) = self.buckets.back_mut() {
            if success {
                bucket.successes += 1;
            } else {
                bucket.failures += 1;
            }
        }
    }

    /// (failures, successes) inside the window.
    fn counts(&mut self, now: Instant) -> (u64, u64) {
        self.evict(now);
        self.buckets
            .iter()
            .fold((0, 0), |(f, s), b| (f + b.failures, s + b.successes))
    }

    fn evict(&mut self, now: Instant) {
        while let Some(front) = self.buckets.front() {
            if now.duration_since(front.started_at) >= self.span {
                self.buckets.pop_front();
            } else {
                break;
            }
        }
    }

    fn clear(&mut self) {
        self.buckets.clear();
    }
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
    window: RollingWindow,
    /// Bumped on every state change and reset; outcomes from an older
    /// generation are dropped.
    generation: u64,
    /// Level last reported to the state gauge.
    reported_level: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Normal,
    Probe,
}

/// Gauge delta computed under the lock, published after it is released.
type PendingLevel = Option<f64>;

/// Circuit breaker guarding one named resource.
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<Inner>,
    state_gauge: Option<Arc<dyn GaugeSink>>,
    gauge_labels: Labels,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        let window = RollingWindow::new(config.rolling_window(), config.buckets);
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                opened_at: None,
                probe_in_flight: false,
                window,
                generation: 0,
                reported_level: 0.0,
            }),
            state_gauge: None,
            gauge_labels: Labels::new(),
        }
    }

    pub fn with_defaults(name: impl Into<String>) -> Self {
        Self::new(name, BreakerConfig::default())
    }

    /// Report state changes through `gauge`, tagged with `labels` plus `breaker`.
    ///
    /// The gauge is immediately moved from 0 to the current state's level.
    pub fn with_state_gauge(self, gauge: Arc<dyn GaugeSink>, labels: &Labels) -> Self {
        let breaker = self.with_unreported_gauge(gauge, labels);
        breaker.report_current_level();
        breaker
    }

    /// Attach `gauge` without reporting the initial level yet.
    pub(crate) fn with_unreported_gauge(mut self, gauge: Arc<dyn GaugeSink>, labels: &Labels) -> Self {
        self.gauge_labels = with_label(labels, "breaker", &self.name);
        self.state_gauge = Some(gauge);
        self
    }

    /// Move the gauge to the current state's level.
    pub(crate) fn report_current_level(&self) {
        let pending = {
            let mut inner = self.lock();
            let level = inner.state.level();
            self.level_delta(&mut inner, level)
        };
        self.publish(pending);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Current state, applying a due Open → Half-Open transition.
    pub fn state(&self) -> CircuitState {
        let (state, pending) = {
            let mut inner = self.lock();
            let pending = self.refresh(&mut inner, Instant::now());
            (inner.state, pending)
        };
        self.publish(pending);
        state
    }

    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    /// Snapshot of the rolling window.
    pub fn metrics(&self) -> BreakerMetricsSnapshot {
        let now = Instant::now();
        let (snapshot, pending) = {
            let mut inner = self.lock();
            let pending = self.refresh(&mut inner, now);
            let (failures, successes) = inner.window.counts(now);
            let total_requests = failures + successes;
            let failure_rate = if total_requests == 0 {
                0.0
            } else {
                failures as f64 / total_requests as f64
            };
            let snapshot = BreakerMetricsSnapshot {
                state: inner.state,
                failures,
                successes,
                total_requests,
                failure_rate,
            };
            (snapshot, pending)
        };
        self.publish(pending);
        snapshot
    }

    /// Force the circuit closed and clear its window.
    pub fn reset(&self) {
        let pending = {
            let mut inner = self.lock();
            inner.window.clear();
            inner.opened_at = None;
            inner.probe_in_flight = false;
            inner.generation += 1;
            self.transition(&mut inner, CircuitState::Closed)
        };
        self.publish(pending);
        tracing::info!(breaker = %self.name, "Circuit breaker reset");
    }

    /// Execute an operation through the circuit breaker.
    ///
    /// While open the operation is never invoked and the call fails with
    /// [`CircuitOpenError`].
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<CircuitOpenError>,
    {
        let permit = self.admit()?;
        let result = operation().await;
        permit.complete(result.is_ok());
        result
    }

    fn admit(&self) -> Result<Permit<'_>, CircuitOpenError> {
        let (admitted, pending) = {
            let mut inner = self.lock();
            let pending = self.refresh(&mut inner, Instant::now());
            (self.try_admit(&mut inner), pending)
        };
        self.publish(pending);
        admitted
    }

    fn try_admit(&self, inner: &mut Inner) -> Result<Permit<'_>, CircuitOpenError> {
        let admission = match inner.state {
            CircuitState::Closed => Admission::Normal,
            CircuitState::Open => {
                tracing::debug!(breaker = %self.name, "Circuit open, failing fast");
                return Err(CircuitOpenError {
                    name: self.name.clone(),
                    probe_in_flight: false,
                });
            }
            CircuitState::HalfOpen if inner.probe_in_flight => {
                return Err(CircuitOpenError {
                    name: self.name.clone(),
                    probe_in_flight: true,
                });
            }
            CircuitState::HalfOpen => {
                inner.probe_in_flight = true;
                Admission::Probe
            }
        };

        Ok(Permit {
            breaker: self,
            admission,
            generation: inner.generation,
            completed: false,
        })
    }

    fn record(&self, admission: Admission, generation: u64, success: bool) {
        let pending = {
            let mut inner = self.lock();
            self.apply_outcome(&mut inner, admission, generation, success)
        };
        self.publish(pending);
    }

    fn apply_outcome(
        &self,
        inner: &mut Inner,
        admission: Admission,
        generation: u64,
        success: bool,
    ) -> PendingLevel {
        // Admitted before the last state change or reset.
        if inner.generation != generation {
            tracing::debug!(breaker = %self.name, "Dropping outcome from a previous circuit generation");
            return None;
        }

        let now = Instant::now();
        match (inner.state, admission) {
            (CircuitState::HalfOpen, Admission::Probe) => {
                inner.probe_in_flight = false;
                if success {
                    inner.window.clear();
                    inner.opened_at = None;
                    self.transition(inner, CircuitState::Closed)
                } else {
                    inner.opened_at = Some(now);
                    self.transition(inner, CircuitState::Open)
                }
            }
            (CircuitState::Closed, Admission::Normal) => {
                inner.window.record(now, success);
                if success {
                    return None;
                }
                let (failures, successes) = inner.window.counts(now);
                let total = failures + successes;
                if total >= u64::from(self.config.volume_threshold)
                    && failures as f64 / total as f64 >= self.config.failure_threshold
                {
                    inner.opened_at = Some(now);
                    self.transition(inner, CircuitState::Open)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    fn refresh(&self, inner: &mut Inner, now: Instant) -> PendingLevel {
        if inner.state != CircuitState::Open {
            return None;
        }
        let due = inner
            .opened_at
            .map_or(true, |opened| now.duration_since(opened) >= self.config.reset_timeout());
        if !due {
            return None;
        }
        inner.probe_in_flight = false;
        self.transition(inner, CircuitState::HalfOpen)
    }

    fn transition(&self, inner: &mut Inner, to: CircuitState) -> PendingLevel {
        let from = inner.state;
        if from == to {
            return None;
        }
        inner.state = to;
        inner.generation += 1;

        match to {
            CircuitState::Open => {
                tracing::warn!(breaker = %self.name, %from, %to, "Circuit breaker opened")
            }
            _ => tracing::info!(breaker = %self.name, %from, %to, "Circuit breaker state changed"),
        }

        self.level_delta(inner, to.level())
    }

    fn level_delta(&self, inner: &mut Inner, level: f64) -> PendingLevel {
        self.state_gauge.as_ref()?;
        let delta = level - inner.reported_level;
        inner.reported_level = level;
        (delta != 0.0).then_some(delta)
    }

    /// Must be called without holding the state lock.
    fn publish(&self, pending: PendingLevel) {
        if let (Some(delta), Some(gauge)) = (pending, &self.state_gauge) {
            guarded(BREAKER_STATE, || gauge.adjust(delta, &self.gauge_labels));
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("config", &self.config)
            .finish()
    }
}

/// Admission ticket for one call. Dropping an uncompleted probe fails it.
struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    admission: Admission,
    generation: u64,
    completed: bool,
}

impl Permit<'_> {
    fn complete(mut self, success: bool) {
        self.completed = true;
        self.breaker.record(self.admission, self.generation, success);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.completed && self.admission == Admission::Probe {
            self.breaker.record(Admission::Probe, self.generation, false);
        }
    }
}
