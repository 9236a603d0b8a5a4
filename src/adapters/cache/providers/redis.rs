//! Redis cache provider
//!
//! Uses a single `redis::aio::MultiplexedConnection`. Unlike
//! `ConnectionManager` it does not reconnect behind the caller's back, so a
//! broken connection surfaces as errors the circuit breaker can count.

use crate::adapters::cache::errors::{CacheError, CacheResult};
use crate::adapters::cache::traits::CacheService;
use crate::config::loader::redact_url;
use crate::error::BoxError;
use crate::resilience::LiveHandle;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Longest `PX` value accepted; Redis rejects expiry times that overflow
/// its signed millisecond clock
const MAX_EXPIRE_MS: u64 = (i64::MAX / 2) as u64;

/// `PX` argument for `ttl`: zero and out-of-range TTLs mean no expiry,
/// sub-millisecond TTLs round up so the key still expires
fn expire_millis(ttl: Duration) -> Option<u64> {
    if ttl.is_zero() {
        return None;
    }
    u64::try_from(ttl.as_millis())
        .ok()
        .filter(|ms| *ms <= MAX_EXPIRE_MS)
        .map(|ms| ms.max(1))
}

/// Redis-backed cache service
#[derive(Clone)]
pub struct RedisCacheService {
    connection: MultiplexedConnection,
    closed: Arc<AtomicBool>,
}

impl std::fmt::Debug for RedisCacheService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCacheService")
            .field("connection", &"MultiplexedConnection")
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

impl RedisCacheService {
    /// Open a client and establish the multiplexed connection
    pub async fn connect(url: &str) -> CacheResult<Self> {
        let client = redis::Client::open(url).map_err(|e| {
            CacheError::ConnectionError(format!("Failed to create Redis client: {}", e))
        })?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| {
                CacheError::ConnectionError(format!("Failed to connect to Redis: {}", e))
            })?;

        debug!(url = %redact_url(url), "Redis cache service connected");

        Ok(Self {
            connection,
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    fn connection(&self) -> CacheResult<MultiplexedConnection> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CacheError::Closed);
        }
        Ok(self.connection.clone())
    }
}

impl CacheService for RedisCacheService {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.connection()?;
        let result: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::BackendError(format!("Redis GET failed: {}", e)))?;

        if result.is_some() {
            debug!(key = key, "Cache HIT");
        } else {
            debug!(key = key, "Cache MISS");
        }

        Ok(result)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        let mut conn = self.connection()?;
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);

        let ttl_ms = expire_millis(ttl);
        if let Some(ms) = ttl_ms {
            cmd.arg("PX").arg(ms);
        }

        cmd.query_async::<()>(&mut conn)
            .await
            .map_err(|e| CacheError::BackendError(format!("Redis SET failed: {}", e)))?;

        debug!(key = key, ttl_ms = ttl_ms, "Cache SET");
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        let mut conn = self.connection()?;

        let removed: u64 = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::BackendError(format!("Redis DEL failed: {}", e)))?;

        debug!(key = key, removed = removed, "Cache DEL");
        Ok(removed > 0)
    }

    async fn ping(&self) -> CacheResult<()> {
        let mut conn = self.connection()?;
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::BackendError(format!("Redis PING failed: {}", e)))?;

        if pong == "PONG" {
            Ok(())
        } else {
            Err(CacheError::BackendError(format!(
                "unexpected PING reply: {}",
                pong
            )))
        }
    }

    async fn close(&self) {
        // The multiplexed connection shuts down once the last clone drops
        self.closed.store(true, Ordering::Release);
    }

    fn provider_name(&self) -> &'static str {
        "redis"
    }
}

#[async_trait]
impl LiveHandle for RedisCacheService {
    async fn check_liveness(&self) -> Result<(), BoxError> {
        CacheService::ping(self).await?;
        Ok(())
    }

    async fn close(&self) {
        CacheService::close(self).await;
    }
}
