//! Transport traits
//!
//! The producer and consumer adapters are generic over these, so the AMQP
//! implementation and the in-memory broker share the same resilience path.

use super::errors::BrokerResult;
use super::message::{BrokerMessage, Delivery};
use crate::resilience::LiveHandle;
use async_trait::async_trait;

/// Publishing side of a broker connection
#[async_trait]
pub trait ProducerTransport: LiveHandle {
    /// Publish and wait for the broker's acknowledgement
    async fn publish(&self, message: &BrokerMessage) -> BrokerResult<()>;

    /// Where messages end up, for logging
    fn destination(&self) -> &str;
}

/// Fetching side of a broker connection
#[async_trait]
pub trait ConsumerTransport: LiveHandle {
    /// Next message, or `None` when the queue is empty
    async fn fetch(&self) -> BrokerResult<Option<Delivery>>;

    async fn ack(&self, delivery_tag: u64) -> BrokerResult<()>;

    fn queue(&self) -> &str;
}
