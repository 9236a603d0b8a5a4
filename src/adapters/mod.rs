//! # Dependency Adapters
//!
//! Thin clients for the store, cache and broker. Each adapter is created
//! through [`ConnectionBootstrapper`](crate::resilience::ConnectionBootstrapper)
//! and owns one [`ResilientExecutor`]; every public method is a single
//! underlying call through that executor. Adapters never retry on their own.

pub mod broker;
pub mod cache;
pub mod store;

pub use broker::{BrokerConsumer, BrokerError, BrokerMessage, BrokerProducer};
pub use cache::{Cache, CacheError, CacheService, InMemoryCacheService, RedisCacheService};
pub use store::{Store, StoreError};

use crate::config::DependencyConfig;
use crate::resilience::{CircuitBreaker, ResilientExecutor, SharedObserver};
use std::sync::Arc;

/// Executor for one dependency, built from its resilience settings
pub fn resilient_executor(
    dependency: &str,
    config: &DependencyConfig,
    observer: SharedObserver,
) -> ResilientExecutor {
    let breaker = CircuitBreaker::with_observer(dependency, config.circuit_breaker_config(), observer);
    ResilientExecutor::new(Arc::new(breaker)).with_timeout(config.timeout())
}
