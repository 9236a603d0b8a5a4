//! Breaker-protected message consumer

use super::amqp::AmqpConsumerTransport;
use super::errors::BrokerError;
use super::message::{BrokerMessage, Delivery};
use super::transport::ConsumerTransport;
use crate::adapters::resilient_executor;
use crate::config::loader::redact_url;
use crate::config::BrokerConfig;
use crate::error::ResilienceError;
use crate::resilience::{
    CircuitBreaker, ConnectionBootstrapper, ExecuteError, ResilientExecutor, SharedObserver,
};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Pulls messages one at a time and hands them to a handler.
///
/// Every fetch and ack goes through the consumer's executor. A handler error
/// is logged and the message is acknowledged anyway, so one bad message never
/// blocks the queue.
pub struct BrokerConsumer<T = AmqpConsumerTransport> {
    transport: Arc<T>,
    executor: ResilientExecutor,
    retry_delay: Duration,
    poll_interval: Duration,
}

impl<T> Clone for BrokerConsumer<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            executor: self.executor.clone(),
            retry_delay: self.retry_delay,
            poll_interval: self.poll_interval,
        }
    }
}

impl<T: ConsumerTransport> fmt::Debug for BrokerConsumer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerConsumer")
            .field("queue", &self.transport.queue())
            .field("executor", &self.executor)
            .field("retry_delay", &self.retry_delay)
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

enum Wait {
    Elapsed,
    Canceled,
}

impl BrokerConsumer<AmqpConsumerTransport> {
    pub const DEPENDENCY: &'static str = "broker-consumer";

    pub async fn connect(
        config: &BrokerConfig,
        cancel: &CancellationToken,
        observer: SharedObserver,
    ) -> Result<Self, ResilienceError> {
        let resilience = &config.resilience;
        let transport = ConnectionBootstrapper::new(Self::DEPENDENCY, resilience.bootstrap_config())
            .connect(cancel, || {
                AmqpConsumerTransport::connect(&config.url, &config.queue, &config.group)
            })
            .await?;

        info!(
            url = %redact_url(&config.url),
            queue = %config.queue,
            group = %config.group,
            "Broker consumer connected"
        );

        Ok(Self::new(
            transport,
            resilient_executor(Self::DEPENDENCY, resilience, observer),
            resilience.retry_delay(),
            config.poll_interval(),
        ))
    }
}

impl<T: ConsumerTransport> BrokerConsumer<T> {
    /// `retry_delay` is the pause after a failed or rejected fetch,
    /// `poll_interval` the pause after an empty one
    pub fn new(
        transport: T,
        executor: ResilientExecutor,
        retry_delay: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            transport: Arc::new(transport),
            executor,
            retry_delay,
            poll_interval,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        self.executor.breaker()
    }

    /// Consume until `cancel` fires.
    ///
    /// Returns `Ok(())` on cancellation. Returns an error only when the
    /// transport reports it has been closed.
    pub async fn consume<H, Fut, E>(
        &self,
        cancel: &CancellationToken,
        mut handler: H,
    ) -> Result<(), ResilienceError>
    where
        H: FnMut(BrokerMessage) -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: fmt::Display,
    {
        let queue = self.transport.queue();
        info!(queue = %queue, "Consumer started");

        loop {
            let transport = &self.transport;
            let fetched = self
                .executor
                .execute_cancellable(cancel, || transport.fetch())
                .await;

            let pause = match fetched {
                Ok(Some(delivery)) => {
                    self.handle(cancel, delivery, &mut handler).await;
                    None
                }
                Ok(None) => Some(self.poll_interval),
                Err(ExecuteError::Canceled { .. }) => break,
                Err(ExecuteError::OperationFailed(BrokerError::Closed)) => {
                    return Err(ExecuteError::<BrokerError>::OperationFailed(BrokerError::Closed)
                        .into_resilience_error(self.executor.name()));
                }
                Err(ExecuteError::CircuitRejected { reason, .. }) => {
                    debug!(queue = %queue, reason = %reason, "Fetch rejected, backing off");
                    Some(self.retry_delay)
                }
                Err(error) => {
                    warn!(queue = %queue, error = %error, "Fetch failed, backing off");
                    Some(self.retry_delay)
                }
            };

            if let Some(delay) = pause {
                if let Wait::Canceled = wait(cancel, delay).await {
                    break;
                }
            } else if cancel.is_cancelled() {
                break;
            }
        }

        info!(queue = %queue, "Consumer stopped");
        Ok(())
    }

    async fn handle<H, Fut, E>(&self, cancel: &CancellationToken, delivery: Delivery, handler: &mut H)
    where
        H: FnMut(BrokerMessage) -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: fmt::Display,
    {
        let queue = self.transport.queue();
        let delivery_tag = delivery.delivery_tag;
        let message_id = delivery.message.id;
        let key = delivery.message.key_lossy().into_owned();

        if let Err(error) = handler(delivery.message).await {
            warn!(
                queue = %queue,
                key = %key,
                message_id = %message_id,
                redelivered = delivery.redelivered,
                error = %error,
                "Message handler failed, skipping message"
            );
        }

        // Ack even if cancellation arrived while the handler ran
        let transport = &self.transport;
        let acked = self.executor.execute(|| transport.ack(delivery_tag)).await;
        if let Err(error) = acked {
            // Unacked messages are redelivered by the broker
            warn!(
                queue = %queue,
                message_id = %message_id,
                cancelled = cancel.is_cancelled(),
                error = %error,
                "Ack failed"
            );
        }
    }

    pub async fn close(&self) {
        self.transport.close().await;
        info!(queue = %self.transport.queue(), "Broker consumer closed");
    }
}

async fn wait(cancel: &CancellationToken, delay: Duration) -> Wait {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Wait::Canceled,
        _ = tokio::time::sleep(delay) => Wait::Elapsed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::broker::in_memory::InMemoryBroker;
    use crate::adapters::broker::transport::ProducerTransport;
    use crate::resilience::{CircuitBreakerConfig, CircuitState};
    use parking_lot::Mutex;
    use tokio::time::Instant;

    fn consumer(broker: &InMemoryBroker, failure_threshold: u32) -> BrokerConsumer<InMemoryBroker> {
        let breaker = CircuitBreaker::new(
            "broker-consumer",
            CircuitBreakerConfig {
                failure_threshold,
                open_timeout: Duration::from_secs(10),
                max_half_open_requests: 1,
                rolling_interval: Duration::ZERO,
            },
        );
        BrokerConsumer::new(
            broker.clone(),
            ResilientExecutor::new(Arc::new(breaker)).with_timeout(Duration::from_secs(1)),
            Duration::from_secs(1),
            Duration::from_millis(250),
        )
    }

    async fn publish(broker: &InMemoryBroker, keys: &[&str]) {
        for key in keys {
            broker
                .publish(&BrokerMessage::new(*key, key.as_bytes().to_vec()))
                .await
                .unwrap();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_handles_in_fetch_order_and_acks() {
        let broker = InMemoryBroker::new("orders");
        publish(&broker, &["a", "b", "c", "d"]).await;
        let consumer = consumer(&broker, 3);
        let cancel = CancellationToken::new();

        let seen = Mutex::new(Vec::new());
        consumer
            .consume(&cancel, |message| {
                seen.lock().push(message.key_lossy().into_owned());
                if seen.lock().len() == 4 {
                    cancel.cancel();
                }
                async { Ok::<_, String>(()) }
            })
            .await
            .unwrap();

        assert_eq!(*seen.lock(), ["a", "b", "c", "d"]);
        assert_eq!(broker.acked().await.len(), 4);
        assert_eq!(broker.unacked_len().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_handler_error_skips_and_acks() {
        let broker = InMemoryBroker::default();
        publish(&broker, &["ok-1", "poison", "ok-2"]).await;
        let consumer = consumer(&broker, 3);
        let cancel = CancellationToken::new();

        let calls = Mutex::new(0);
        consumer
            .consume(&cancel, |message| {
                *calls.lock() += 1;
                if *calls.lock() == 3 {
                    cancel.cancel();
                }
                async move {
                    if message.key == b"poison" {
                        Err(format!("cannot process {}", message.id))
                    } else {
                        Ok(())
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(*calls.lock(), 3);
        let acked: Vec<String> = broker
            .acked()
            .await
            .iter()
            .map(|m| m.key_lossy().into_owned())
            .collect();
        assert_eq!(acked, ["ok-1", "poison", "ok-2"]);
        // Handler errors are not dependency failures
        assert_eq!(consumer.breaker().metrics().failure_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_while_idle_returns_promptly() {
        let broker = InMemoryBroker::default();
        let consumer = BrokerConsumer::new(
            broker.clone(),
            ResilientExecutor::new(Arc::new(CircuitBreaker::new(
                "broker-consumer",
                CircuitBreakerConfig::default(),
            ))),
            Duration::from_secs(1),
            Duration::from_secs(60),
        );
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let result = consumer
            .consume(&cancel, |_| async { Ok::<_, String>(()) })
            .await;

        assert!(result.is_ok());
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(broker.fetch_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_fetches_open_breaker() {
        let broker = InMemoryBroker::default();
        broker.fail_fetches(true);
        let consumer = consumer(&broker, 2);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5_500)).await;
            trigger.cancel();
        });

        // t=0 and t=1 fail and open the breaker; t=2..=5 are rejected
        consumer
            .consume(&cancel, |_| async { Ok::<_, String>(()) })
            .await
            .unwrap();

        assert_eq!(broker.fetch_calls(), 2);
        assert_eq!(consumer.breaker().state(), CircuitState::Open);
        assert_eq!(consumer.breaker().metrics().rejected_count, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_transport_ends_consume_with_error() {
        let broker = InMemoryBroker::default();
        let consumer = consumer(&broker, 3);
        consumer.close().await;

        let err = consumer
            .consume(&CancellationToken::new(), |_| async { Ok::<_, String>(()) })
            .await
            .unwrap_err();
        assert!(matches!(err, ResilienceError::OperationFailed { .. }));
    }
}
