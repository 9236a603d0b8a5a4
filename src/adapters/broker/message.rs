//! Broker message model

use super::errors::{BrokerError, BrokerResult};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::borrow::Cow;
use uuid::Uuid;

/// A keyed message as produced and consumed through the broker
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerMessage {
    pub id: Uuid,
    /// Opaque ordering key; ordering holds only among messages sharing a queue
    pub key: Vec<u8>,
    pub payload: Vec<u8>,
    /// Set when the message is built and restamped when a producer sends it
    pub produced_at: DateTime<Utc>,
}

impl BrokerMessage {
    pub fn new(key: impl Into<Vec<u8>>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            key: key.into(),
            payload: payload.into(),
            produced_at: Utc::now(),
        }
    }

    /// Serialize `value` as the JSON payload
    pub fn json<T: Serialize>(key: impl Into<Vec<u8>>, value: &T) -> BrokerResult<Self> {
        let payload =
            serde_json::to_vec(value).map_err(|e| BrokerError::Serialization(e.to_string()))?;
        Ok(Self::new(key, payload))
    }

    /// Key for log output; invalid UTF-8 is replaced
    pub fn key_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.key)
    }

    /// Decode the payload as JSON
    pub fn decode_json<T: DeserializeOwned>(&self) -> BrokerResult<T> {
        serde_json::from_slice(&self.payload).map_err(|e| {
            BrokerError::Serialization(format!("message {} is not valid JSON: {}", self.id, e))
        })
    }
}

/// A fetched message that still has to be acknowledged
#[derive(Debug, Clone)]
pub struct Delivery {
    pub delivery_tag: u64,
    pub redelivered: bool,
    pub message: BrokerMessage,
}
