//! Cache service trait definition

use super::errors::CacheResult;
use std::time::Duration;

/// Trait defining cache operations
///
/// Implemented by concrete cache providers (Redis, in-memory). Providers are
/// plain clients: no retries and no circuit breaking, both of which belong to
/// the [`Cache`](super::Cache) adapter.
pub trait CacheService: Send + Sync {
    /// Get a value from the cache by key
    ///
    /// Returns `Ok(Some(value))` on cache hit, `Ok(None)` on cache miss.
    fn get(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = CacheResult<Option<String>>> + Send;

    /// Set a value; a zero `ttl` stores the value without expiration
    fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> impl std::future::Future<Output = CacheResult<()>> + Send;

    /// Delete a specific key; returns whether the key existed
    fn delete(&self, key: &str) -> impl std::future::Future<Output = CacheResult<bool>> + Send;

    /// Round trip to the backend
    fn ping(&self) -> impl std::future::Future<Output = CacheResult<()>> + Send;

    /// Stop accepting calls and release the connection
    fn close(&self) -> impl std::future::Future<Output = ()> + Send;

    /// Get the name of the cache provider
    fn provider_name(&self) -> &'static str;
}
