//! # Cache Adapter
//!
//! [`Cache`] wraps any [`CacheService`] provider in a breaker-protected
//! executor. Providers:
//!
//! - [`RedisCacheService`]: production backend over a multiplexed connection
//! - [`InMemoryCacheService`]: process-local backend for tests and development
//!
//! ## Usage
//!
//! ```rust,no_run
//! use resilience_core::adapters::Cache;
//! use resilience_core::config::RedisConfig;
//! use resilience_core::resilience::TracingObserver;
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! let cache = Cache::connect(
//!     &RedisConfig::default(),
//!     &CancellationToken::new(),
//!     Arc::new(TracingObserver),
//! )
//! .await?;
//!
//! cache.set("session:42", "alice", Duration::from_secs(900)).await?;
//! let user = cache.get("session:42").await?;
//! # let _ = user;
//! # Ok(())
//! # }
//! ```

pub mod errors;
pub mod providers;
pub mod traits;

pub use errors::{CacheError, CacheResult};
pub use providers::{InMemoryCacheService, RedisCacheService};
pub use traits::CacheService;

use crate::adapters::resilient_executor;
use crate::config::loader::redact_url;
use crate::config::RedisConfig;
use crate::error::ResilienceError;
use crate::resilience::{
    CircuitBreaker, ConnectionBootstrapper, ExecuteError, ResilientExecutor, SharedObserver,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Error returned by cache adapter calls
pub type CacheCallError = ExecuteError<CacheError>;

/// Breaker-protected cache client
pub struct Cache<S = RedisCacheService> {
    service: Arc<S>,
    executor: ResilientExecutor,
}

impl<S> Clone for Cache<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            executor: self.executor.clone(),
        }
    }
}

impl<S: CacheService> fmt::Debug for Cache<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("provider", &self.service.provider_name())
            .field("executor", &self.executor)
            .finish()
    }
}

impl Cache<RedisCacheService> {
    pub const DEPENDENCY: &'static str = "cache";

    /// Connect to Redis with retry; each attempt is verified with `PING`
    pub async fn connect(
        config: &RedisConfig,
        cancel: &CancellationToken,
        observer: SharedObserver,
    ) -> Result<Self, ResilienceError> {
        let resilience = &config.resilience;
        let service = ConnectionBootstrapper::new(Self::DEPENDENCY, resilience.bootstrap_config())
            .connect(cancel, || RedisCacheService::connect(&config.url))
            .await?;

        info!(url = %redact_url(&config.url), "Cache connected");

        Ok(Self::new(
            service,
            resilient_executor(Self::DEPENDENCY, resilience, observer),
        ))
    }
}

impl<S: CacheService> Cache<S> {
    pub fn new(service: S, executor: ResilientExecutor) -> Self {
        Self {
            service: Arc::new(service),
            executor,
        }
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        self.executor.breaker()
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, CacheCallError> {
        self.executor.execute(|| self.service.get(key)).await
    }

    /// Store `value` under `key`; `Duration::ZERO` means no expiration, as
    /// does a TTL too long for the backend to represent
    pub async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheCallError> {
        self.executor.execute(|| self.service.set(key, value, ttl)).await
    }

    pub async fn delete(&self, key: &str) -> Result<bool, CacheCallError> {
        self.executor.execute(|| self.service.delete(key)).await
    }

    pub async fn ping(&self) -> Result<(), CacheCallError> {
        self.executor.execute(|| self.service.ping()).await
    }

    /// Decode a JSON value stored with [`set_json`](Self::set_json)
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheCallError> {
        match self.get(key).await? {
            Some(raw) => serde_json::from_str(&raw).map(Some).map_err(|e| {
                ExecuteError::OperationFailed(CacheError::SerializationError(e.to_string()))
            }),
            None => Ok(None),
        }
    }

    pub async fn set_json<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<(), CacheCallError> {
        let raw = serde_json::to_string(value).map_err(|e| {
            ExecuteError::OperationFailed(CacheError::SerializationError(e.to_string()))
        })?;
        self.set(key, &raw, ttl).await
    }

    pub async fn close(&self) {
        self.service.close().await;
        info!(provider = self.service.provider_name(), "Cache closed");
    }
}
