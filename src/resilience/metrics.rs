//! # Circuit Breaker Metrics
//!
//! Point-in-time snapshot of a breaker's counters, suitable for health
//! endpoints and periodic log summaries.

use crate::resilience::CircuitState;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Metrics for a single circuit breaker instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerMetrics {
    /// Calls that were allowed and reported an outcome
    pub total_calls: u64,

    pub success_count: u64,

    pub failure_count: u64,

    /// Calls denied without contacting the dependency
    pub rejected_count: u64,

    /// Current consecutive failure count (non-zero only while closed)
    pub consecutive_failures: u32,

    /// Probes currently running while half-open
    pub half_open_in_flight: u32,

    /// Number of state transitions since construction
    pub transitions: u64,

    /// Total duration of all completed operations
    pub total_duration: Duration,

    pub current_state: CircuitState,

    /// Failure rate (0.0 to 1.0) over completed calls
    pub failure_rate: f64,

    /// Average duration of completed calls
    pub average_duration: Duration,
}

impl CircuitBreakerMetrics {
    pub fn new() -> Self {
        Self {
            total_calls: 0,
            success_count: 0,
            failure_count: 0,
            rejected_count: 0,
            consecutive_failures: 0,
            half_open_in_flight: 0,
            transitions: 0,
            total_duration: Duration::ZERO,
            current_state: CircuitState::Closed,
            failure_rate: 0.0,
            average_duration: Duration::ZERO,
        }
    }

    /// Fill in the derived rates from the raw counters
    pub(crate) fn with_derived(mut self) -> Self {
        if self.total_calls > 0 {
            self.failure_rate = self.failure_count as f64 / self.total_calls as f64;
            self.average_duration = self.total_duration / self.total_calls.min(u32::MAX as u64) as u32;
        }
        self
    }

    /// Check if metrics indicate healthy operation
    pub fn is_healthy(&self) -> bool {
        match self.current_state {
            CircuitState::Closed => self.failure_rate < 0.1,
            CircuitState::Open => false,
            CircuitState::HalfOpen => true,
        }
    }

    pub fn state_description(&self) -> &'static str {
        match self.current_state {
            CircuitState::Closed => "Healthy - Normal operation",
            CircuitState::Open => "Failing - Rejecting all calls",
            CircuitState::HalfOpen => "Recovering - Testing dependency health",
        }
    }

    /// Format metrics for logging
    pub fn format_summary(&self) -> String {
        format!(
            "State: {} | Calls: {} | Failures: {} | Rejected: {} | Avg Duration: {}ms",
            self.state_description(),
            self.total_calls,
            self.failure_count,
            self.rejected_count,
            self.average_duration.as_millis()
        )
    }
}

impl Default for CircuitBreakerMetrics {
    fn default() -> Self {
        Self::new()
    }
}
