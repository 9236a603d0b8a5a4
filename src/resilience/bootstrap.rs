//! # Connection Bootstrapper
//!
//! Establishes a dependency handle at startup: dial, verify liveness, and on
//! failure wait according to a [`BackoffPolicy`] before trying again. Every
//! dial, liveness check and wait is bounded by the configured timeout and
//! interrupted by cancellation.
//!
//! A handle that dialed but failed its liveness check is closed before the
//! next attempt, so no half-initialized connection ever leaks out.

use crate::error::{BoxError, ResilienceError};
use crate::resilience::BackoffPolicy;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A freshly dialed connection that can prove it is usable
#[async_trait]
pub trait LiveHandle: Send + Sync {
    /// Cheap round trip to the dependency (`SELECT 1`, `PING`, ...)
    async fn check_liveness(&self) -> Result<(), BoxError>;

    /// Release the handle; errors are logged, never returned
    async fn close(&self);
}

/// Retry parameters for a single dependency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BootstrapConfig {
    /// Total attempts including the first; 0 is treated as 1
    pub max_attempts: u32,
    pub backoff: BackoffPolicy,
    /// Upper bound for each dial and each liveness check
    pub timeout: Duration,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: BackoffPolicy::default(),
            timeout: Duration::from_secs(5),
        }
    }
}

/// Reason a single attempt did not produce a usable handle
#[derive(Debug, thiserror::Error)]
pub enum AttemptError {
    #[error("dial failed: {0}")]
    Dial(#[source] BoxError),

    #[error("dial timed out after {}ms", .0.as_millis())]
    DialTimeout(Duration),

    #[error("liveness check failed: {0}")]
    Liveness(#[source] BoxError),

    #[error("liveness check timed out after {}ms", .0.as_millis())]
    LivenessTimeout(Duration),
}

enum AttemptOutcome<H> {
    Connected(H),
    Failed(AttemptError),
    Canceled,
}

/// Dials a dependency until it answers or the attempt budget runs out
#[derive(Debug, Clone)]
pub struct ConnectionBootstrapper {
    dependency: String,
    config: BootstrapConfig,
}

impl ConnectionBootstrapper {
    pub fn new(dependency: impl Into<String>, config: BootstrapConfig) -> Self {
        Self {
            dependency: dependency.into(),
            config,
        }
    }

    pub fn dependency(&self) -> &str {
        &self.dependency
    }

    pub fn config(&self) -> &BootstrapConfig {
        &self.config
    }

    /// Dial until a handle passes its liveness check.
    ///
    /// Returns `Canceled` as soon as `cancel` fires (a pending attempt is not
    /// counted), or `BootstrapExhausted` carrying the last attempt's error.
    pub async fn connect<H, D, Fut, E>(
        &self,
        cancel: &CancellationToken,
        mut dial: D,
    ) -> Result<H, ResilienceError>
    where
        H: LiveHandle,
        D: FnMut() -> Fut,
        Fut: Future<Output = Result<H, E>>,
        E: Into<BoxError>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut last_error: Option<AttemptError> = None;

        for attempt in 1..=max_attempts {
            if cancel.is_cancelled() {
                return Err(self.canceled());
            }

            match self.attempt(cancel, &mut dial).await {
                AttemptOutcome::Connected(handle) => {
                    info!(
                        component = %self.dependency,
                        attempt = attempt,
                        "Dependency connection established"
                    );
                    return Ok(handle);
                }
                AttemptOutcome::Canceled => return Err(self.canceled()),
                AttemptOutcome::Failed(error) => {
                    warn!(
                        component = %self.dependency,
                        attempt = attempt,
                        max_attempts = max_attempts,
                        error = %error,
                        "Dependency connection attempt failed"
                    );
                    last_error = Some(error);
                }
            }

            if attempt < max_attempts {
                let delay = self.config.backoff.delay(attempt);
                debug!(
                    component = %self.dependency,
                    delay_ms = delay.as_millis() as u64,
                    "Waiting before next connection attempt"
                );
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(self.canceled()),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        let source: BoxError = match last_error {
            Some(error) => Box::new(error),
            None => "no connection attempt was made".into(),
        };
        Err(ResilienceError::BootstrapExhausted {
            dependency: self.dependency.clone(),
            attempts: max_attempts,
            source,
        })
    }

    async fn attempt<H, D, Fut, E>(&self, cancel: &CancellationToken, dial: &mut D) -> AttemptOutcome<H>
    where
        H: LiveHandle,
        D: FnMut() -> Fut,
        Fut: Future<Output = Result<H, E>>,
        E: Into<BoxError>,
    {
        let timeout = self.config.timeout;

        let dialed = tokio::select! {
            biased;
            _ = cancel.cancelled() => return AttemptOutcome::Canceled,
            dialed = tokio::time::timeout(timeout, dial()) => dialed,
        };
        let handle = match dialed {
            Ok(Ok(handle)) => handle,
            Ok(Err(error)) => return AttemptOutcome::Failed(AttemptError::Dial(error.into())),
            Err(_) => return AttemptOutcome::Failed(AttemptError::DialTimeout(timeout)),
        };

        let checked = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            checked = tokio::time::timeout(timeout, handle.check_liveness()) => Some(checked),
        };
        match checked {
            Some(Ok(Ok(()))) => AttemptOutcome::Connected(handle),
            Some(Ok(Err(error))) => {
                handle.close().await;
                AttemptOutcome::Failed(AttemptError::Liveness(error))
            }
            Some(Err(_)) => {
                handle.close().await;
                AttemptOutcome::Failed(AttemptError::LivenessTimeout(timeout))
            }
            None => {
                handle.close().await;
                AttemptOutcome::Canceled
            }
        }
    }

    fn canceled(&self) -> ResilienceError {
        ResilienceError::Canceled {
            dependency: self.dependency.clone(),
            phase: "bootstrap",
        }
    }
}
