//! # Resilient Executor
//!
//! Runs a single dependency call through a circuit breaker. A rejected call
//! never invokes the operation; an allowed call runs exactly once and its
//! outcome is reported back to the breaker. The executor does not retry, and
//! the operation's own error is returned unchanged inside
//! [`ExecuteError::OperationFailed`].

use crate::error::{BoxError, ResilienceError};
use crate::resilience::{CircuitBreaker, Permit, RejectReason};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Outcome of a guarded call that did not succeed
#[derive(Debug, thiserror::Error)]
pub enum ExecuteError<E> {
    /// Breaker denied the call; the operation was not invoked
    #[error("{dependency}: call rejected by circuit breaker ({reason})")]
    CircuitRejected {
        dependency: String,
        reason: RejectReason,
    },

    /// The operation exceeded the executor deadline (recorded as a failure)
    #[error("{dependency}: operation timed out after {}ms", timeout.as_millis())]
    Timeout {
        dependency: String,
        timeout: Duration,
    },

    /// The caller canceled; nothing was recorded against the breaker
    #[error("{dependency}: operation canceled")]
    Canceled { dependency: String },

    /// The operation ran and failed (recorded as a failure)
    #[error("operation failed: {0}")]
    OperationFailed(E),
}

impl<E> ExecuteError<E> {
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::CircuitRejected { .. })
    }

    /// The dependency error, if the operation itself failed
    pub fn operation_error(&self) -> Option<&E> {
        match self {
            Self::OperationFailed(e) => Some(e),
            _ => None,
        }
    }

    /// Convert into the crate-level taxonomy
    pub fn into_resilience_error(self, dependency: &str) -> ResilienceError
    where
        E: Into<BoxError>,
    {
        match self {
            Self::CircuitRejected { dependency, reason } => {
                ResilienceError::CircuitRejected { dependency, reason }
            }
            Self::Timeout { dependency, timeout } => ResilienceError::Timeout { dependency, timeout },
            Self::Canceled { dependency } => ResilienceError::Canceled {
                dependency,
                phase: "operation",
            },
            Self::OperationFailed(source) => ResilienceError::OperationFailed {
                dependency: dependency.to_string(),
                source: source.into(),
            },
        }
    }
}

/// Releases the permit if the call future is dropped before it reports back
struct PermitGuard<'a> {
    breaker: &'a CircuitBreaker,
    permit: Option<Permit>,
}

impl PermitGuard<'_> {
    fn success(mut self) {
        if let Some(permit) = self.permit.take() {
            self.breaker.on_success(permit);
        }
    }

    fn failure(mut self) {
        if let Some(permit) = self.permit.take() {
            self.breaker.on_failure(permit);
        }
    }
}

impl Drop for PermitGuard<'_> {
    fn drop(&mut self) {
        if let Some(permit) = self.permit.take() {
            self.breaker.release(permit);
        }
    }
}

/// Run `op` through `breaker` with no deadline and no cancellation
pub async fn execute<T, E, F, Fut>(breaker: &CircuitBreaker, op: F) -> Result<T, ExecuteError<E>>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    run(breaker, None, None, op).await
}

async fn run<T, E, F, Fut>(
    breaker: &CircuitBreaker,
    timeout: Option<Duration>,
    cancel: Option<&CancellationToken>,
    op: F,
) -> Result<T, ExecuteError<E>>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let dependency = || breaker.name().to_string();

    if cancel.is_some_and(CancellationToken::is_cancelled) {
        return Err(ExecuteError::Canceled {
            dependency: dependency(),
        });
    }

    let permit = breaker.allow().map_err(|reason| {
        debug!(component = %breaker.name(), reason = %reason, "Call rejected without contacting dependency");
        ExecuteError::CircuitRejected {
            dependency: dependency(),
            reason,
        }
    })?;
    let guard = PermitGuard {
        breaker,
        permit: Some(permit),
    };

    let bounded = async {
        match timeout {
            Some(limit) => tokio::time::timeout(limit, op()).await.ok(),
            None => Some(op().await),
        }
    };

    let outcome = match cancel {
        Some(token) => tokio::select! {
            biased;
            _ = token.cancelled() => {
                // guard drop releases the permit without an outcome
                drop(guard);
                return Err(ExecuteError::Canceled { dependency: dependency() });
            }
            outcome = bounded => outcome,
        },
        None => bounded.await,
    };

    match outcome {
        Some(Ok(value)) => {
            guard.success();
            Ok(value)
        }
        Some(Err(error)) => {
            guard.failure();
            Err(ExecuteError::OperationFailed(error))
        }
        None => {
            guard.failure();
            Err(ExecuteError::Timeout {
                dependency: dependency(),
                timeout: timeout.unwrap_or_default(),
            })
        }
    }
}

/// Breaker plus per-call deadline, owned by one adapter
#[derive(Debug, Clone)]
pub struct ResilientExecutor {
    breaker: Arc<CircuitBreaker>,
    timeout: Option<Duration>,
}

impl ResilientExecutor {
    pub fn new(breaker: Arc<CircuitBreaker>) -> Self {
        Self {
            breaker,
            timeout: None,
        }
    }

    /// Bound every call by `timeout`; expiry counts as a dependency failure
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn name(&self) -> &str {
        self.breaker.name()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub async fn execute<T, E, F, Fut>(&self, op: F) -> Result<T, ExecuteError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        run(&self.breaker, self.timeout, None, op).await
    }

    /// Like [`execute`](Self::execute), returning `Canceled` as soon as
    /// `cancel` fires; a canceled call is not counted against the breaker
    pub async fn execute_cancellable<T, E, F, Fut>(
        &self,
        cancel: &CancellationToken,
        op: F,
    ) -> Result<T, ExecuteError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        run(&self.breaker, self.timeout, Some(cancel), op).await
    }
}
