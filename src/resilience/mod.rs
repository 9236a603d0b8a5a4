//! # Resilience Module
//!
//! Fault-tolerance primitives shared by every dependency adapter.
//!
//! ## Architecture
//!
//! - **Backoff**: delay schedule between connection attempts
//! - **Connection Bootstrapper**: startup dialing with retry and cancellation
//! - **Circuit Breakers**: stop calling a dependency that keeps failing
//! - **Resilient Executor**: one guarded call; the breaker decides, the
//!   operation runs at most once, the outcome is reported back
//! - **Events and Metrics**: observer hook for transitions plus counters
//!
//! ## Usage
//!
//! ```rust,no_run
//! use resilience_core::resilience::{CircuitBreaker, CircuitBreakerConfig, ResilientExecutor};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! let breaker = Arc::new(CircuitBreaker::new("store", CircuitBreakerConfig::default()));
//! let executor = ResilientExecutor::new(breaker).with_timeout(Duration::from_secs(5));
//!
//! let rows = executor
//!     .execute(|| async { Ok::<u64, std::io::Error>(1) })
//!     .await?;
//! # let _ = rows;
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod bootstrap;
pub mod circuit_breaker;
pub mod events;
pub mod executor;
pub mod metrics;

pub use backoff::BackoffPolicy;
pub use bootstrap::{AttemptError, BootstrapConfig, ConnectionBootstrapper, LiveHandle};
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitState, Permit, RejectReason,
};
pub use events::{BreakerObserver, NoopObserver, SharedObserver, TracingObserver};
pub use executor::{execute, ExecuteError, ResilientExecutor};
pub use metrics::CircuitBreakerMetrics;
