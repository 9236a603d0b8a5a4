//! Breaker-protected message producer

use super::amqp::AmqpProducerTransport;
use super::errors::BrokerError;
use super::message::BrokerMessage;
use super::transport::ProducerTransport;
use crate::adapters::resilient_executor;
use crate::config::loader::redact_url;
use crate::config::BrokerConfig;
use crate::error::ResilienceError;
use crate::resilience::{
    CircuitBreaker, ConnectionBootstrapper, ExecuteError, ResilientExecutor, SharedObserver,
};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Error returned by producer calls
pub type ProduceError = ExecuteError<BrokerError>;

/// Publishes keyed messages and waits for the broker's acknowledgement.
///
/// Sends are synchronous per call, so messages produced by one task with the
/// same key arrive in call order. Delivery is at-least-once: a publish whose
/// acknowledgement times out may still have been stored.
pub struct BrokerProducer<T = AmqpProducerTransport> {
    transport: Arc<T>,
    executor: ResilientExecutor,
}

impl<T> Clone for BrokerProducer<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            executor: self.executor.clone(),
        }
    }
}

impl<T: ProducerTransport> std::fmt::Debug for BrokerProducer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerProducer")
            .field("destination", &self.transport.destination())
            .field("executor", &self.executor)
            .finish()
    }
}

impl BrokerProducer<AmqpProducerTransport> {
    pub const DEPENDENCY: &'static str = "broker-producer";

    pub async fn connect(
        config: &BrokerConfig,
        cancel: &CancellationToken,
        observer: SharedObserver,
    ) -> Result<Self, ResilienceError> {
        let resilience = &config.resilience;
        let transport = ConnectionBootstrapper::new(Self::DEPENDENCY, resilience.bootstrap_config())
            .connect(cancel, || {
                AmqpProducerTransport::connect(&config.url, &config.exchange, &config.queue)
            })
            .await?;

        info!(
            url = %redact_url(&config.url),
            destination = %transport.destination(),
            "Broker producer connected"
        );

        Ok(Self::new(
            transport,
            resilient_executor(Self::DEPENDENCY, resilience, observer),
        ))
    }
}

impl<T: ProducerTransport> BrokerProducer<T> {
    pub fn new(transport: T, executor: ResilientExecutor) -> Self {
        Self {
            transport: Arc::new(transport),
            executor,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        self.executor.breaker()
    }

    /// Publish `value` under `key`, returning once the broker acknowledged it
    pub async fn produce(
        &self,
        cancel: &CancellationToken,
        key: impl Into<Vec<u8>>,
        value: impl Into<Vec<u8>>,
    ) -> Result<(), ProduceError> {
        self.send(cancel, BrokerMessage::new(key, value)).await
    }

    pub async fn produce_json<V: Serialize>(
        &self,
        cancel: &CancellationToken,
        key: impl Into<Vec<u8>>,
        value: &V,
    ) -> Result<(), ProduceError> {
        let message = BrokerMessage::json(key, value).map_err(ExecuteError::OperationFailed)?;
        self.send(cancel, message).await
    }

    /// Publish a prepared message; `produced_at` is set to the send time
    pub async fn send(
        &self,
        cancel: &CancellationToken,
        mut message: BrokerMessage,
    ) -> Result<(), ProduceError> {
        message.produced_at = Utc::now();
        let transport = &self.transport;
        self.executor
            .execute_cancellable(cancel, || transport.publish(&message))
            .await
    }

    pub async fn close(&self) {
        self.transport.close().await;
        info!(destination = %self.transport.destination(), "Broker producer closed");
    }
}
