//! Shared helpers for integration tests

#![allow(dead_code)]

use parking_lot::Mutex;
use resilience_core::resilience::{
    BreakerObserver, CircuitBreaker, CircuitBreakerConfig, CircuitState, RejectReason,
    ResilientExecutor,
};
use std::sync::Arc;
use std::time::Duration;

/// Observer that records every event for later assertions
#[derive(Debug, Default)]
pub struct RecordingObserver {
    pub transitions: Mutex<Vec<(String, CircuitState, CircuitState)>>,
    pub rejections: Mutex<Vec<(String, RejectReason)>>,
}

impl RecordingObserver {
    pub fn transitions(&self) -> Vec<(CircuitState, CircuitState)> {
        self.transitions
            .lock()
            .iter()
            .map(|(_, from, to)| (*from, *to))
            .collect()
    }

    pub fn rejection_count(&self) -> usize {
        self.rejections.lock().len()
    }
}

impl BreakerObserver for RecordingObserver {
    fn on_state_change(&self, dependency: &str, from: CircuitState, to: CircuitState) {
        self.transitions.lock().push((dependency.to_string(), from, to));
    }

    fn on_rejected(&self, dependency: &str, reason: RejectReason) {
        self.rejections.lock().push((dependency.to_string(), reason));
    }
}

pub fn breaker_config(failure_threshold: u32, open_timeout: Duration) -> CircuitBreakerConfig {
    CircuitBreakerConfig {
        failure_threshold,
        open_timeout,
        max_half_open_requests: 1,
        rolling_interval: Duration::ZERO,
    }
}

/// Executor with a recording observer attached
pub fn observed_executor(
    name: &str,
    config: CircuitBreakerConfig,
) -> (ResilientExecutor, Arc<RecordingObserver>) {
    let observer = Arc::new(RecordingObserver::default());
    let breaker = CircuitBreaker::with_observer(name, config, observer.clone());
    (
        ResilientExecutor::new(Arc::new(breaker)).with_timeout(Duration::from_secs(1)),
        observer,
    )
}
