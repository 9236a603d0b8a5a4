//! # In-Memory Cache Service
//!
//! Process-local cache for tests and single-instance development setups.
//! Expiry uses `tokio::time::Instant`, so TTL behaviour follows paused test
//! time. An availability switch simulates a backend outage.

use crate::adapters::cache::errors::{CacheError, CacheResult};
use crate::adapters::cache::traits::CacheService;
use crate::error::BoxError;
use crate::resilience::LiveHandle;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Debug, Default)]
struct Inner {
    entries: DashMap<String, CacheEntry>,
    unavailable: AtomicBool,
    closed: AtomicBool,
    /// Backend calls received, including failed ones
    calls: AtomicU64,
}

/// DashMap-backed cache; clones share the same storage
#[derive(Debug, Clone, Default)]
pub struct InMemoryCacheService {
    inner: Arc<Inner>,
}

impl InMemoryCacheService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: every call fails until switched back
    pub fn set_available(&self, available: bool) {
        self.inner.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Number of calls that reached this backend
    pub fn call_count(&self) -> u64 {
        self.inner.calls.load(Ordering::SeqCst)
    }

    /// Live (unexpired) entries
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.inner
            .entries
            .iter()
            .filter(|entry| !entry.is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn enter(&self) -> CacheResult<()> {
        self.inner.calls.fetch_add(1, Ordering::SeqCst);
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(CacheError::Closed);
        }
        if self.inner.unavailable.load(Ordering::SeqCst) {
            return Err(CacheError::BackendError(
                "in-memory cache marked unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

impl CacheService for InMemoryCacheService {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        self.enter()?;
        let now = Instant::now();
        self.inner.entries.remove_if(key, |_, entry| entry.is_expired(now));
        Ok(self.inner.entries.get(key).map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        self.enter()?;
        // A TTL past the clock's range never expires
        let expires_at = if ttl.is_zero() {
            None
        } else {
            Instant::now().checked_add(ttl)
        };
        self.inner.entries.insert(
            key.to_string(),
            CacheEntry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        self.enter()?;
        let now = Instant::now();
        Ok(self
            .inner
            .entries
            .remove(key)
            .is_some_and(|(_, entry)| !entry.is_expired(now)))
    }

    async fn ping(&self) -> CacheResult<()> {
        self.enter()
    }

    async fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.entries.clear();
    }

    fn provider_name(&self) -> &'static str {
        "in_memory"
    }
}

#[async_trait]
impl LiveHandle for InMemoryCacheService {
    async fn check_liveness(&self) -> Result<(), BoxError> {
        CacheService::ping(self).await?;
        Ok(())
    }

    async fn close(&self) {
        CacheService::close(self).await;
    }
}
