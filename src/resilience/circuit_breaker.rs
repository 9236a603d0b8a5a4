//! # Circuit Breaker Implementation
//!
//! Tracks the health of one named dependency with the classic three-state
//! machine: Closed (normal operation), Open (failing fast) and Half-Open
//! (limited probes testing recovery).
//!
//! All state lives behind a single mutex so that `allow`, `on_success` and
//! `on_failure` are linearizable: with `max_half_open_requests == 1` exactly
//! one concurrent caller receives the first probe permit. Observer callbacks
//! run after the lock is released.
//!
//! Time comes from `tokio::time::Instant`, so tests can drive the open timeout
//! with a paused runtime clock.

use crate::resilience::events::{NoopObserver, SharedObserver};
use crate::resilience::CircuitBreakerMetrics;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Circuit breaker states representing the current operational mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CircuitState {
    /// Normal operation - all calls are allowed through
    Closed,
    /// Failure mode - all calls fail fast without executing
    Open,
    /// Testing recovery - limited calls allowed to test dependency health
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Why [`CircuitBreaker::allow`] denied a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RejectReason {
    /// Open and the cool-down has not elapsed
    CircuitOpen,
    /// Half-open and all probe slots are taken
    ProbeLimitExceeded,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::CircuitOpen => write!(f, "circuit open"),
            RejectReason::ProbeLimitExceeded => write!(f, "half-open probe limit exceeded"),
        }
    }
}

/// Configuration for a single circuit breaker, immutable after construction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening circuit
    pub failure_threshold: u32,

    /// Time to wait in open state before probing
    pub open_timeout: Duration,

    /// Concurrent probes allowed while half-open
    pub max_half_open_requests: u32,

    /// Closed-state failure counts are cleared at this interval (zero disables)
    pub rolling_interval: Duration,
}

impl CircuitBreakerConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.failure_threshold == 0 {
            return Err("failure_threshold must be greater than 0".to_string());
        }

        if self.open_timeout.is_zero() {
            return Err("open_timeout must be greater than 0".to_string());
        }

        if self.max_half_open_requests == 0 {
            return Err("max_half_open_requests must be greater than 0".to_string());
        }

        Ok(())
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            open_timeout: Duration::from_secs(10),
            max_half_open_requests: 1,
            rolling_interval: Duration::from_secs(30),
        }
    }
}

/// Ticket returned by a successful [`CircuitBreaker::allow`]
///
/// Hand it back through exactly one of `on_success`, `on_failure` or
/// `release`. Permits issued before the most recent state transition still
/// count in the metrics but cannot move the state machine.
#[derive(Debug)]
#[must_use = "a permit must be reported back to the breaker"]
pub struct Permit {
    generation: u64,
    probe: bool,
    issued_at: Instant,
}

impl Permit {
    /// Whether this permit is a half-open probe
    pub fn is_probe(&self) -> bool {
        self.probe
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    /// Bumped on every transition so stale outcomes can be recognized
    generation: u64,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    /// Start of the current closed-state counting window
    window_started: Instant,
    half_open_in_flight: u32,
    metrics: CircuitBreakerMetrics,
}

type Transition = (CircuitState, CircuitState);

impl BreakerState {
    fn transition(&mut self, to: CircuitState, now: Instant) -> Transition {
        let from = self.state;
        self.state = to;
        self.generation += 1;
        self.half_open_in_flight = 0;
        self.consecutive_failures = 0;
        self.metrics.transitions += 1;

        match to {
            CircuitState::Open => self.opened_at = Some(now),
            CircuitState::Closed => {
                self.opened_at = None;
                self.window_started = now;
            }
            CircuitState::HalfOpen => {}
        }

        (from, to)
    }

    fn record(&mut self, permit: &Permit, now: Instant, success: bool) {
        self.metrics.total_calls += 1;
        self.metrics.total_duration += now.saturating_duration_since(permit.issued_at);
        if success {
            self.metrics.success_count += 1;
        } else {
            self.metrics.failure_count += 1;
        }
    }

    fn finish_probe(&mut self, permit: &Permit) {
        if permit.probe && permit.generation == self.generation {
            self.half_open_in_flight = self.half_open_in_flight.saturating_sub(1);
        }
    }
}

/// Circuit breaker guarding one named dependency
pub struct CircuitBreaker {
    /// Dependency name for logging and metrics
    name: String,

    config: CircuitBreakerConfig,

    inner: Mutex<BreakerState>,

    observer: SharedObserver,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("state", &self.state())
            .finish()
    }
}

impl CircuitBreaker {
    /// Create a breaker without an observer
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self::with_observer(name, config, Arc::new(NoopObserver))
    }

    pub fn with_observer(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        observer: SharedObserver,
    ) -> Self {
        let name = name.into();
        debug!(
            component = %name,
            failure_threshold = config.failure_threshold,
            open_timeout_ms = config.open_timeout.as_millis() as u64,
            max_half_open_requests = config.max_half_open_requests,
            "Circuit breaker initialized"
        );

        Self {
            name,
            config,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                generation: 0,
                consecutive_failures: 0,
                opened_at: None,
                window_started: Instant::now(),
                half_open_in_flight: 0,
                metrics: CircuitBreakerMetrics::new(),
            }),
            observer,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Ask whether a new call may proceed
    pub fn allow(&self) -> Result<Permit, RejectReason> {
        let now = Instant::now();
        let mut transition = None;

        let decision = {
            let mut inner = self.inner.lock();
            let decision = match inner.state {
                CircuitState::Closed => Ok(Permit {
                    generation: inner.generation,
                    probe: false,
                    issued_at: now,
                }),
                CircuitState::Open => {
                    let cooled_down = inner
                        .opened_at
                        .map_or(true, |at| now.saturating_duration_since(at) >= self.config.open_timeout);

                    if cooled_down {
                        transition = Some(inner.transition(CircuitState::HalfOpen, now));
                        inner.half_open_in_flight = 1;
                        Ok(Permit {
                            generation: inner.generation,
                            probe: true,
                            issued_at: now,
                        })
                    } else {
                        Err(RejectReason::CircuitOpen)
                    }
                }
                CircuitState::HalfOpen => {
                    if inner.half_open_in_flight < self.config.max_half_open_requests {
                        inner.half_open_in_flight += 1;
                        Ok(Permit {
                            generation: inner.generation,
                            probe: true,
                            issued_at: now,
                        })
                    } else {
                        Err(RejectReason::ProbeLimitExceeded)
                    }
                }
            };
            if decision.is_err() {
                inner.metrics.rejected_count += 1;
            }
            decision
        };

        self.notify(transition);
        if let Err(reason) = decision {
            self.observer.on_rejected(&self.name, reason);
        }
        decision
    }

    /// Report a successful call
    pub fn on_success(&self, permit: Permit) {
        let now = Instant::now();
        let transition = {
            let mut inner = self.inner.lock();
            inner.record(&permit, now, true);

            if permit.generation != inner.generation {
                None
            } else {
                match inner.state {
                    CircuitState::Closed => {
                        inner.consecutive_failures = 0;
                        None
                    }
                    CircuitState::HalfOpen => Some(inner.transition(CircuitState::Closed, now)),
                    CircuitState::Open => None,
                }
            }
        };
        self.notify(transition);
    }

    /// Report a failed call
    pub fn on_failure(&self, permit: Permit) {
        let now = Instant::now();
        let transition = {
            let mut inner = self.inner.lock();
            inner.record(&permit, now, false);

            if permit.generation != inner.generation {
                None
            } else {
                match inner.state {
                    CircuitState::Closed => {
                        self.roll_window(&mut inner, now);
                        inner.consecutive_failures += 1;
                        if inner.consecutive_failures >= self.config.failure_threshold {
                            Some(inner.transition(CircuitState::Open, now))
                        } else {
                            None
                        }
                    }
                    CircuitState::HalfOpen => Some(inner.transition(CircuitState::Open, now)),
                    CircuitState::Open => None,
                }
            }
        };
        self.notify(transition);
    }

    /// Return a permit without an outcome, e.g. when the caller canceled
    pub fn release(&self, permit: Permit) {
        self.inner.lock().finish_probe(&permit);
    }

    /// Force circuit to open state (for emergency situations)
    pub fn force_open(&self) {
        warn!(component = %self.name, "Circuit breaker forced open");
        let transition = self
            .inner
            .lock()
            .transition_if_changed(CircuitState::Open, Instant::now());
        self.notify(transition);
    }

    /// Force circuit to closed state (for emergency recovery)
    pub fn force_closed(&self) {
        warn!(component = %self.name, "Circuit breaker forced closed");
        let transition = self
            .inner
            .lock()
            .transition_if_changed(CircuitState::Closed, Instant::now());
        self.notify(transition);
    }

    /// Get current metrics snapshot
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let inner = self.inner.lock();
        let mut snapshot = inner.metrics.clone();
        snapshot.current_state = inner.state;
        snapshot.consecutive_failures = inner.consecutive_failures;
        snapshot.half_open_in_flight = inner.half_open_in_flight;
        snapshot.with_derived()
    }

    /// Closed with a low failure rate
    pub fn is_healthy(&self) -> bool {
        let metrics = self.metrics();
        if metrics.current_state != CircuitState::Closed {
            return false;
        }
        // Too few calls to judge
        metrics.total_calls < 10 || metrics.is_healthy()
    }

    fn roll_window(&self, inner: &mut BreakerState, now: Instant) {
        let interval = self.config.rolling_interval;
        if interval.is_zero() {
            return;
        }
        if now.saturating_duration_since(inner.window_started) >= interval {
            inner.consecutive_failures = 0;
            inner.window_started = now;
        }
    }

    fn notify(&self, transition: Option<Transition>) {
        if let Some((from, to)) = transition {
            self.observer.on_state_change(&self.name, from, to);
        }
    }
}

impl BreakerState {
    /// Transition unless already in `to`
    fn transition_if_changed(&mut self, to: CircuitState, now: Instant) -> Option<Transition> {
        (self.state != to).then(|| self.transition(to, now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::events::BreakerObserver;

    #[derive(Debug, Default)]
    struct RecordingObserver {
        transitions: Mutex<Vec<Transition>>,
        rejections: Mutex<Vec<RejectReason>>,
    }

    impl BreakerObserver for RecordingObserver {
        fn on_state_change(&self, _dependency: &str, from: CircuitState, to: CircuitState) {
            self.transitions.lock().push((from, to));
        }

        fn on_rejected(&self, _dependency: &str, reason: RejectReason) {
            self.rejections.lock().push(reason);
        }
    }

    fn config(failure_threshold: u32, max_half_open_requests: u32) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold,
            open_timeout: Duration::from_secs(10),
            max_half_open_requests,
            rolling_interval: Duration::ZERO,
        }
    }

    fn fail(breaker: &CircuitBreaker) {
        let permit = breaker.allow().expect("call should be allowed");
        breaker.on_failure(permit);
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_exactly_once_at_threshold() {
        let observer = Arc::new(RecordingObserver::default());
        let breaker = CircuitBreaker::with_observer("store", config(3, 1), observer.clone());

        fail(&breaker);
        fail(&breaker);
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.metrics().consecutive_failures, 2);

        fail(&breaker);
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(breaker.metrics().consecutive_failures, 0);

        assert_eq!(breaker.allow().unwrap_err(), RejectReason::CircuitOpen);
        assert_eq!(
            *observer.transitions.lock(),
            vec![(CircuitState::Closed, CircuitState::Open)]
        );
        assert_eq!(*observer.rejections.lock(), vec![RejectReason::CircuitOpen]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_consecutive_failures() {
        let breaker = CircuitBreaker::new("cache", config(3, 1));

        fail(&breaker);
        fail(&breaker);
        let permit = breaker.allow().unwrap();
        breaker.on_success(permit);
        assert_eq!(breaker.metrics().consecutive_failures, 0);

        fail(&breaker);
        fail(&breaker);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_after_timeout_grants_single_probe() {
        let breaker = CircuitBreaker::new("broker", config(1, 1));
        fail(&breaker);

        tokio::time::advance(Duration::from_secs(9)).await;
        assert_eq!(breaker.allow().unwrap_err(), RejectReason::CircuitOpen);

        tokio::time::advance(Duration::from_secs(1)).await;
        let probe = breaker.allow().expect("probe after open timeout");
        assert!(probe.is_probe());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        assert_eq!(breaker.allow().unwrap_err(), RejectReason::ProbeLimitExceeded);

        breaker.on_success(probe);
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.metrics().consecutive_failures, 0);
        assert!(!breaker.allow().unwrap().is_probe());
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens_and_resets_opened_at() {
        let breaker = CircuitBreaker::new("store", config(1, 1));
        fail(&breaker);

        tokio::time::advance(Duration::from_secs(10)).await;
        let probe = breaker.allow().unwrap();

        tokio::time::advance(Duration::from_secs(4)).await;
        breaker.on_failure(probe);
        assert_eq!(breaker.state(), CircuitState::Open);

        // Cool-down restarts from the probe failure, not the first trip
        tokio::time::advance(Duration::from_secs(7)).await;
        assert_eq!(breaker.allow().unwrap_err(), RejectReason::CircuitOpen);

        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(breaker.allow().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_limit_and_stale_success() {
        let breaker = CircuitBreaker::new("store", config(1, 2));
        fail(&breaker);
        tokio::time::advance(Duration::from_secs(10)).await;

        let first = breaker.allow().unwrap();
        let second = breaker.allow().unwrap();
        assert_eq!(breaker.allow().unwrap_err(), RejectReason::ProbeLimitExceeded);
        assert_eq!(breaker.metrics().half_open_in_flight, 2);

        // One probe fails: back to open, the other probe's success is stale
        breaker.on_failure(first);
        breaker.on_success(second);
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_frees_probe_slot() {
        let breaker = CircuitBreaker::new("broker", config(1, 1));
        fail(&breaker);
        tokio::time::advance(Duration::from_secs(10)).await;

        let probe = breaker.allow().unwrap();
        breaker.release(probe);
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        let probe = breaker.allow().expect("slot freed by release");
        breaker.on_success(probe);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rolling_interval_clears_failures() {
        let breaker = CircuitBreaker::new(
            "cache",
            CircuitBreakerConfig {
                rolling_interval: Duration::from_secs(30),
                ..config(3, 1)
            },
        );

        fail(&breaker);
        fail(&breaker);
        tokio::time::advance(Duration::from_secs(31)).await;

        fail(&breaker);
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.metrics().consecutive_failures, 1);
    }

    #[test]
    fn test_concurrent_allow_grants_at_most_probe_limit() {
        let breaker = Arc::new(CircuitBreaker::new(
            "store",
            CircuitBreakerConfig {
                open_timeout: Duration::from_millis(20),
                ..config(1, 1)
            },
        ));
        fail(&breaker);
        std::thread::sleep(Duration::from_millis(30));

        let barrier = Arc::new(std::sync::Barrier::new(16));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let breaker = Arc::clone(&breaker);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    breaker.allow().is_ok()
                })
            })
            .collect();

        let granted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|granted| *granted)
            .count();
        assert_eq!(granted, 1);
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert_eq!(breaker.metrics().rejected_count, 15);
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_operations() {
        let observer = Arc::new(RecordingObserver::default());
        let breaker = CircuitBreaker::with_observer("store", config(5, 1), observer.clone());

        breaker.force_open();
        assert_eq!(breaker.state(), CircuitState::Open);
        breaker.force_open();

        breaker.force_closed();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(observer.transitions.lock().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_metrics_and_health() {
        let breaker = CircuitBreaker::new("store", config(5, 1));
        for _ in 0..9 {
            let permit = breaker.allow().unwrap();
            tokio::time::advance(Duration::from_millis(10)).await;
            breaker.on_success(permit);
        }
        fail(&breaker);

        let metrics = breaker.metrics();
        assert_eq!(metrics.total_calls, 10);
        assert_eq!(metrics.failure_count, 1);
        assert_eq!(metrics.average_duration, Duration::from_millis(9));
        assert_eq!(metrics.failure_rate, 0.1);
        assert!(!breaker.is_healthy());
    }

    #[test]
    fn test_config_validation() {
        assert!(CircuitBreakerConfig::default().validate().is_ok());
        assert!(CircuitBreakerConfig {
            max_half_open_requests: 0,
            ..Default::default()
        }
        .validate()
        .is_err());
        assert!(CircuitBreakerConfig {
            open_timeout: Duration::ZERO,
            ..Default::default()
        }
        .validate()
        .is_err());
    }
}
