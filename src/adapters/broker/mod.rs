//! # Broker Adapters
//!
//! Keyed message production and pull-based consumption over AMQP, both
//! protected by a circuit breaker.
//!
//! - [`BrokerProducer`]: synchronous publish with broker acknowledgement
//! - [`BrokerConsumer`]: cancellable consume loop, skip-on-handler-error
//! - [`InMemoryBroker`]: transport for tests and local development
//!
//! ## Usage
//!
//! ```rust,no_run
//! use resilience_core::adapters::broker::{BrokerConsumer, BrokerMessage};
//! use resilience_core::config::BrokerConfig;
//! use resilience_core::resilience::TracingObserver;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[derive(serde::Deserialize)]
//! struct TaskCreated {
//!     task_id: u64,
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! let cancel = CancellationToken::new();
//! let consumer =
//!     BrokerConsumer::connect(&BrokerConfig::default(), &cancel, Arc::new(TracingObserver)).await?;
//!
//! consumer
//!     .consume(&cancel, |message: BrokerMessage| async move {
//!         let event: TaskCreated = message.decode_json()?;
//!         println!("task {} created", event.task_id);
//!         Ok::<_, resilience_core::adapters::BrokerError>(())
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod amqp;
pub mod consumer;
pub mod errors;
pub mod in_memory;
pub mod message;
pub mod producer;
pub mod transport;

pub use amqp::{AmqpConsumerTransport, AmqpProducerTransport};
pub use consumer::BrokerConsumer;
pub use errors::{BrokerError, BrokerResult};
pub use in_memory::InMemoryBroker;
pub use message::{BrokerMessage, Delivery};
pub use producer::{BrokerProducer, ProduceError};
pub use transport::{ConsumerTransport, ProducerTransport};
