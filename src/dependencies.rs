//! # Startup Wiring
//!
//! Bootstraps every configured dependency in order (store, cache, producer,
//! consumer). Startup fails as a whole: if any dependency cannot be reached,
//! the handles opened before it are closed and the error is returned.

use crate::adapters::{BrokerConsumer, BrokerProducer, Cache, Store};
use crate::config::ServiceConfig;
use crate::error::ResilienceError;
use crate::logging::log_dependency_operation;
use crate::resilience::{CircuitBreaker, CircuitBreakerMetrics, SharedObserver};
use std::str::FromStr;
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Which dependencies to bootstrap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DependencySet {
    pub store: bool,
    pub cache: bool,
    pub producer: bool,
    pub consumer: bool,
}

impl DependencySet {
    pub const fn all() -> Self {
        Self {
            store: true,
            cache: true,
            producer: true,
            consumer: true,
        }
    }

    pub const fn none() -> Self {
        Self {
            store: false,
            cache: false,
            producer: false,
            consumer: false,
        }
    }
}

impl Default for DependencySet {
    fn default() -> Self {
        Self::all()
    }
}

impl FromStr for DependencySet {
    type Err = String;

    /// Comma-separated names: `store`, `cache`, `producer`, `consumer`,
    /// `broker` (both broker sides) or `all`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut set = Self::none();
        for name in s.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            match name {
                "all" => set = Self::all(),
                "store" | "database" => set.store = true,
                "cache" | "redis" => set.cache = true,
                "producer" => set.producer = true,
                "consumer" => set.consumer = true,
                "broker" => {
                    set.producer = true;
                    set.consumer = true;
                }
                other => return Err(format!("unknown dependency '{}'", other)),
            }
        }
        Ok(set)
    }
}

/// Connected dependency handles
#[derive(Debug, Default)]
pub struct Dependencies {
    pub store: Option<Store>,
    pub cache: Option<Cache>,
    pub producer: Option<BrokerProducer>,
    pub consumer: Option<BrokerConsumer>,
}

impl Dependencies {
    /// Bootstrap every dependency in `config`
    pub async fn connect(
        config: &ServiceConfig,
        cancel: &CancellationToken,
        observer: SharedObserver,
    ) -> Result<Self, ResilienceError> {
        Self::connect_selected(config, DependencySet::all(), cancel, observer).await
    }

    pub async fn connect_selected(
        config: &ServiceConfig,
        selection: DependencySet,
        cancel: &CancellationToken,
        observer: SharedObserver,
    ) -> Result<Self, ResilienceError> {
        let mut deps = Self::default();

        if let Err(error) = deps.open(config, selection, cancel, observer).await {
            deps.close().await;
            return Err(error);
        }
        Ok(deps)
    }

    async fn open(
        &mut self,
        config: &ServiceConfig,
        selection: DependencySet,
        cancel: &CancellationToken,
        observer: SharedObserver,
    ) -> Result<(), ResilienceError> {
        if selection.store {
            let store = timed(
                Store::DEPENDENCY,
                Store::connect(&config.database, cancel, observer.clone()),
            )
            .await?;
            self.store = Some(store);
        }

        if selection.cache {
            let cache = timed(
                Cache::DEPENDENCY,
                Cache::connect(&config.redis, cancel, observer.clone()),
            )
            .await?;
            self.cache = Some(cache);
        }

        if selection.producer {
            let producer = timed(
                BrokerProducer::DEPENDENCY,
                BrokerProducer::connect(&config.broker, cancel, observer.clone()),
            )
            .await?;
            self.producer = Some(producer);
        }

        if selection.consumer {
            let consumer = timed(
                BrokerConsumer::DEPENDENCY,
                BrokerConsumer::connect(&config.broker, cancel, observer),
            )
            .await?;
            self.consumer = Some(consumer);
        }

        Ok(())
    }

    /// Breakers of every connected dependency
    pub fn breakers(&self) -> Vec<Arc<CircuitBreaker>> {
        let mut breakers = Vec::new();
        if let Some(store) = &self.store {
            breakers.push(store.breaker().clone());
        }
        if let Some(cache) = &self.cache {
            breakers.push(cache.breaker().clone());
        }
        if let Some(producer) = &self.producer {
            breakers.push(producer.breaker().clone());
        }
        if let Some(consumer) = &self.consumer {
            breakers.push(consumer.breaker().clone());
        }
        breakers
    }

    /// Metrics snapshot per dependency, keyed by breaker name
    pub fn health(&self) -> Vec<(String, CircuitBreakerMetrics)> {
        self.breakers()
            .iter()
            .map(|breaker| (breaker.name().to_string(), breaker.metrics()))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_none() && self.cache.is_none() && self.producer.is_none() && self.consumer.is_none()
    }

    /// Close every open handle, consumers first
    pub async fn close(&mut self) {
        if let Some(consumer) = self.consumer.take() {
            consumer.close().await;
        }
        if let Some(producer) = self.producer.take() {
            producer.close().await;
        }
        if let Some(cache) = self.cache.take() {
            cache.close().await;
        }
        if let Some(store) = self.store.take() {
            store.close().await;
        }
    }
}

async fn timed<T, F>(dependency: &str, connect: F) -> Result<T, ResilienceError>
where
    F: std::future::Future<Output = Result<T, ResilienceError>>,
{
    let started = Instant::now();
    let result = connect.await;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    match &result {
        Ok(_) => log_dependency_operation(dependency, "bootstrap", "connected", Some(elapsed_ms), None),
        Err(error) => {
            let details = error.to_string();
            log_dependency_operation(dependency, "bootstrap", "failed", Some(elapsed_ms), Some(&details))
        }
    }
    result
}
