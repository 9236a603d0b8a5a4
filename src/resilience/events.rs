//! Breaker event hook
//!
//! Observers receive state transitions and rejected calls after the breaker
//! has released its lock. Implementations run on the caller's task and must
//! not block.

use crate::resilience::{CircuitState, RejectReason};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// Receives breaker events for telemetry
pub trait BreakerObserver: Send + Sync + fmt::Debug {
    fn on_state_change(&self, dependency: &str, from: CircuitState, to: CircuitState);

    fn on_rejected(&self, dependency: &str, reason: RejectReason) {
        let _ = (dependency, reason);
    }
}

/// Shared observer handle, injected into breakers at construction
pub type SharedObserver = Arc<dyn BreakerObserver>;

/// Turns breaker events into structured log records
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl BreakerObserver for TracingObserver {
    fn on_state_change(&self, dependency: &str, from: CircuitState, to: CircuitState) {
        match to {
            CircuitState::Open => warn!(
                component = %dependency,
                from = %from,
                to = %to,
                "Circuit breaker state changed"
            ),
            _ => info!(
                component = %dependency,
                from = %from,
                to = %to,
                "Circuit breaker state changed"
            ),
        }
    }

    fn on_rejected(&self, dependency: &str, reason: RejectReason) {
        warn!(component = %dependency, reason = %reason, "Call rejected by circuit breaker");
    }
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl BreakerObserver for NoopObserver {
    fn on_state_change(&self, _dependency: &str, _from: CircuitState, _to: CircuitState) {}
}
