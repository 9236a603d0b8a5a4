//! # In-Memory Broker
//!
//! Single-queue broker for tests and development. Implements both transport
//! traits, so one instance can back a producer and a consumer at once.
//!
//! ## Features
//!
//! - **At-least-once**: fetched messages stay unacked until `ack`; they can be
//!   requeued with [`InMemoryBroker::requeue_unacked`]
//! - **Fault injection**: publish and fetch can be switched to fail
//! - **Thread-Safe**: Uses `tokio::sync::RwLock` for concurrent access

use super::errors::{BrokerError, BrokerResult};
use super::message::{BrokerMessage, Delivery};
use super::transport::{ConsumerTransport, ProducerTransport};
use crate::error::BoxError;
use crate::resilience::LiveHandle;
use async_trait::async_trait;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct QueueState {
    ready: VecDeque<(BrokerMessage, bool)>,
    /// Delivery tag -> message, ordered so requeueing keeps fetch order
    unacked: BTreeMap<u64, BrokerMessage>,
    next_tag: u64,
    acked: Vec<BrokerMessage>,
}

#[derive(Debug, Default)]
struct Inner {
    state: RwLock<QueueState>,
    fail_publish: AtomicBool,
    fail_fetch: AtomicBool,
    closed: AtomicBool,
    publish_calls: AtomicU64,
    fetch_calls: AtomicU64,
}

/// In-memory broker; clones share the same queue
#[derive(Debug, Clone)]
pub struct InMemoryBroker {
    queue: String,
    inner: Arc<Inner>,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new("tasks")
    }
}

impl InMemoryBroker {
    pub fn new(queue: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
            inner: Arc::new(Inner::default()),
        }
    }

    pub fn fail_publishes(&self, fail: bool) {
        self.inner.fail_publish.store(fail, Ordering::SeqCst);
    }

    pub fn fail_fetches(&self, fail: bool) {
        self.inner.fail_fetch.store(fail, Ordering::SeqCst);
    }

    /// Publish attempts that reached the broker, including failed ones
    pub fn publish_calls(&self) -> u64 {
        self.inner.publish_calls.load(Ordering::SeqCst)
    }

    /// Fetch attempts that reached the broker, including failed ones
    pub fn fetch_calls(&self) -> u64 {
        self.inner.fetch_calls.load(Ordering::SeqCst)
    }

    /// Messages waiting to be fetched
    pub async fn ready_len(&self) -> usize {
        self.inner.state.read().await.ready.len()
    }

    pub async fn unacked_len(&self) -> usize {
        self.inner.state.read().await.unacked.len()
    }

    /// Acknowledged messages in ack order
    pub async fn acked(&self) -> Vec<BrokerMessage> {
        self.inner.state.read().await.acked.clone()
    }

    /// Put every unacknowledged message back at the head of the queue,
    /// marked as redelivered
    pub async fn requeue_unacked(&self) -> usize {
        let mut state = self.inner.state.write().await;
        let unacked = std::mem::take(&mut state.unacked);
        let count = unacked.len();
        for (_, message) in unacked.into_iter().rev() {
            state.ready.push_front((message, true));
        }
        count
    }

    fn ensure_open(&self) -> BrokerResult<()> {
        if self.inner.closed.load(Ordering::SeqCst) {
            Err(BrokerError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ProducerTransport for InMemoryBroker {
    async fn publish(&self, message: &BrokerMessage) -> BrokerResult<()> {
        self.inner.publish_calls.fetch_add(1, Ordering::SeqCst);
        self.ensure_open()?;
        if self.inner.fail_publish.load(Ordering::SeqCst) {
            return Err(BrokerError::Nacked {
                destination: self.queue.clone(),
            });
        }

        self.inner
            .state
            .write()
            .await
            .ready
            .push_back((message.clone(), false));
        Ok(())
    }

    fn destination(&self) -> &str {
        &self.queue
    }
}

#[async_trait]
impl ConsumerTransport for InMemoryBroker {
    async fn fetch(&self) -> BrokerResult<Option<Delivery>> {
        self.inner.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.ensure_open()?;
        if self.inner.fail_fetch.load(Ordering::SeqCst) {
            return Err(BrokerError::fetch(&self.queue, "broker unavailable"));
        }

        let mut state = self.inner.state.write().await;
        let Some((message, redelivered)) = state.ready.pop_front() else {
            return Ok(None);
        };
        state.next_tag += 1;
        let delivery_tag = state.next_tag;
        state.unacked.insert(delivery_tag, message.clone());

        Ok(Some(Delivery {
            delivery_tag,
            redelivered,
            message,
        }))
    }

    async fn ack(&self, delivery_tag: u64) -> BrokerResult<()> {
        self.ensure_open()?;
        let mut state = self.inner.state.write().await;
        match state.unacked.remove(&delivery_tag) {
            Some(message) => {
                state.acked.push(message);
                Ok(())
            }
            None => Err(BrokerError::ack(&self.queue, delivery_tag, "unknown delivery tag")),
        }
    }

    fn queue(&self) -> &str {
        &self.queue
    }
}

#[async_trait]
impl LiveHandle for InMemoryBroker {
    async fn check_liveness(&self) -> Result<(), BoxError> {
        self.ensure_open()?;
        Ok(())
    }

    async fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
    }
}
