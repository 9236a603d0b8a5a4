//! # Backoff Policy
//!
//! Maps a 1-based attempt number to the wait before the next attempt:
//! `base_delay * multiplier^(attempt - 1)`, capped at `max_delay`, optionally
//! spread by a symmetric jitter.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Exponential backoff with an optional cap and jitter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    base_delay: Duration,
    multiplier: f64,
    max_delay: Option<Duration>,
    jitter_fraction: f64,
}

impl BackoffPolicy {
    /// Constant delay of `base_delay` until configured otherwise
    pub fn new(base_delay: Duration) -> Self {
        Self {
            base_delay,
            multiplier: 1.0,
            max_delay: None,
            jitter_fraction: 0.0,
        }
    }

    /// Growth factor per attempt; values below 1.0 are treated as 1.0
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = if multiplier.is_finite() {
            multiplier.max(1.0)
        } else {
            1.0
        };
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    /// Spread each delay uniformly over `[d * (1 - j), d * (1 + j)]`
    pub fn with_jitter(mut self, jitter_fraction: f64) -> Self {
        self.jitter_fraction = if jitter_fraction.is_finite() {
            jitter_fraction.clamp(0.0, 0.99)
        } else {
            0.0
        };
        self
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    pub fn max_delay(&self) -> Option<Duration> {
        self.max_delay
    }

    /// Delay without jitter; monotonically non-decreasing in `attempt`
    pub fn nominal_delay(&self, attempt: u32) -> Duration {
        let cap = self.max_delay.unwrap_or(Duration::MAX);
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let nanos = (self.base_delay.as_nanos() as f64 * self.multiplier.powi(exponent)).round();

        // Anything past u64 nanos (~584 years) saturates to the cap
        if !nanos.is_finite() || nanos >= u64::MAX as f64 {
            return cap;
        }
        Duration::from_nanos(nanos as u64).min(cap)
    }

    /// Delay before the attempt following `attempt`
    pub fn delay(&self, attempt: u32) -> Duration {
        if self.jitter_fraction == 0.0 {
            return self.nominal_delay(attempt);
        }
        self.delay_with(attempt, &mut rand::thread_rng())
    }

    /// Same as [`delay`](Self::delay) with a caller-supplied random source
    pub fn delay_with<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let nominal = self.nominal_delay(attempt);
        if self.jitter_fraction == 0.0 || nominal.is_zero() {
            return nominal;
        }

        let spread = rng.gen_range(-self.jitter_fraction..=self.jitter_fraction);
        let jittered =
            Duration::try_from_secs_f64(nominal.as_secs_f64() * (1.0 + spread)).unwrap_or(nominal);
        match self.max_delay {
            Some(max) => jittered.min(max),
            None => jittered,
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
            .with_multiplier(2.0)
            .with_max_delay(Duration::from_secs(30))
    }
}
