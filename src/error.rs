//! # Error Taxonomy
//!
//! Crate-level error type shared by the bootstrapper, the executor and every
//! adapter. The variants map onto the failure classes a service boundary cares
//! about: "temporarily unavailable" versus "the call ran and failed".

use crate::config::ConfigurationError;
use crate::resilience::RejectReason;
use std::time::Duration;

/// Boxed dependency error carried inside [`ResilienceError`]
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, thiserror::Error)]
pub enum ResilienceError {
    /// All connection attempts failed; fatal at startup
    #[error("{dependency}: bootstrap exhausted after {attempts} attempts: {source}")]
    BootstrapExhausted {
        dependency: String,
        attempts: u32,
        #[source]
        source: BoxError,
    },

    /// Caller-supplied cancellation fired
    #[error("{dependency}: canceled during {phase}")]
    Canceled {
        dependency: String,
        phase: &'static str,
    },

    /// Breaker denied the call; the dependency was not contacted
    #[error("{dependency}: call rejected by circuit breaker ({reason})")]
    CircuitRejected {
        dependency: String,
        reason: RejectReason,
    },

    /// The underlying call ran and failed
    #[error("{dependency}: operation failed: {source}")]
    OperationFailed {
        dependency: String,
        #[source]
        source: BoxError,
    },

    /// The underlying call exceeded its deadline
    #[error("{dependency}: operation timed out after {}ms", timeout.as_millis())]
    Timeout {
        dependency: String,
        timeout: Duration,
    },

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

/// Response class a service boundary should use for an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Dependency known-unhealthy or unreachable: "service temporarily unavailable"
    Unavailable,
    /// The dependency executed the call and reported an error
    Failed,
    /// The caller gave up
    Canceled,
    /// Invalid configuration; a deployment problem
    Misconfigured,
}

impl ResilienceError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::BootstrapExhausted { .. } | Self::CircuitRejected { .. } | Self::Timeout { .. } => {
                ErrorClass::Unavailable
            }
            Self::OperationFailed { .. } => ErrorClass::Failed,
            Self::Canceled { .. } => ErrorClass::Canceled,
            Self::Configuration(_) => ErrorClass::Misconfigured,
        }
    }

    /// HTTP status a boundary handler should answer with
    pub fn status_code(&self) -> u16 {
        match self.class() {
            ErrorClass::Unavailable => 503,
            ErrorClass::Failed | ErrorClass::Misconfigured => 500,
            // nginx convention for "client closed request"
            ErrorClass::Canceled => 499,
        }
    }

    pub fn is_unavailable(&self) -> bool {
        self.class() == ErrorClass::Unavailable
    }

    /// Name of the dependency the error originated from, if any
    pub fn dependency(&self) -> Option<&str> {
        match self {
            Self::BootstrapExhausted { dependency, .. }
            | Self::Canceled { dependency, .. }
            | Self::CircuitRejected { dependency, .. }
            | Self::OperationFailed { dependency, .. }
            | Self::Timeout { dependency, .. } => Some(dependency),
            Self::Configuration(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ResilienceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_classification() {
        let rejected = ResilienceError::CircuitRejected {
            dependency: "cache".to_string(),
            reason: RejectReason::CircuitOpen,
        };
        assert_eq!(rejected.class(), ErrorClass::Unavailable);
        assert_eq!(rejected.status_code(), 503);

        let timeout = ResilienceError::Timeout {
            dependency: "store".to_string(),
            timeout: Duration::from_millis(250),
        };
        assert!(timeout.is_unavailable());
        assert_eq!(timeout.to_string(), "store: operation timed out after 250ms");

        let exhausted = ResilienceError::BootstrapExhausted {
            dependency: "broker".to_string(),
            attempts: 3,
            source: "connection refused".into(),
        };
        assert!(exhausted.is_unavailable());
        assert_eq!(exhausted.dependency(), Some("broker"));
    }

    #[test]
    fn test_operation_failure_is_not_unavailable() {
        let failed = ResilienceError::OperationFailed {
            dependency: "store".to_string(),
            source: "duplicate key".into(),
        };
        assert_eq!(failed.class(), ErrorClass::Failed);
        assert_eq!(failed.status_code(), 500);
        assert!(std::error::Error::source(&failed).is_some());

        let canceled = ResilienceError::Canceled {
            dependency: "broker".to_string(),
            phase: "consume",
        };
        assert_eq!(canceled.class(), ErrorClass::Canceled);
    }
}
