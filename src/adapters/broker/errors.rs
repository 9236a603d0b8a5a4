//! Broker error types

use thiserror::Error;

/// Errors raised by broker transports
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Broker connection error: {0}")]
    Connection(String),

    #[error("Publish to '{destination}' failed: {reason}")]
    Publish { destination: String, reason: String },

    /// The broker answered the publish with a negative acknowledgement
    #[error("Publish to '{destination}' was not acknowledged by the broker")]
    Nacked { destination: String },

    #[error("Fetch from '{queue}' failed: {reason}")]
    Fetch { queue: String, reason: String },

    #[error("Ack of delivery {delivery_tag} on '{queue}' failed: {reason}")]
    Ack {
        queue: String,
        delivery_tag: u64,
        reason: String,
    },

    #[error("Message serialization error: {0}")]
    Serialization(String),

    #[error("Broker handle is closed")]
    Closed,
}

impl BrokerError {
    pub fn connection(reason: impl std::fmt::Display) -> Self {
        Self::Connection(reason.to_string())
    }

    pub fn publish(destination: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Publish {
            destination: destination.into(),
            reason: reason.to_string(),
        }
    }

    pub fn fetch(queue: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Fetch {
            queue: queue.into(),
            reason: reason.to_string(),
        }
    }

    pub fn ack(queue: impl Into<String>, delivery_tag: u64, reason: impl std::fmt::Display) -> Self {
        Self::Ack {
            queue: queue.into(),
            delivery_tag,
            reason: reason.to_string(),
        }
    }
}

pub type BrokerResult<T> = Result<T, BrokerError>;
