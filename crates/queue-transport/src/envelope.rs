//! Wire envelope carried inside raw queue messages.
//!
//! The envelope's logical shape is the compatibility surface between
//! processes using this transport; the codec decides the byte layout.

use crate::address::QueueAddress;
use crate::error::SerializationError;
use crate::message::{MessageId, MessageIntent, Timestamp, TransportMessage};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

/// Serializable record of a [`TransportMessage`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireEnvelope {
    pub id: String,
    #[serde(with = "bytes_serde")]
    pub body: Bytes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    pub recoverable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_to_be_received_ms: Option<u64>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub message_intent: MessageIntent,
    pub time_sent: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_for_correlation: Option<String>,
}

/// Custom serialization for Bytes
mod bytes_serde {
    use base64::{engine::general_purpose, Engine as _};
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let encoded = general_purpose::STANDARD.encode(bytes);
        encoded.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Bytes, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        let decoded = general_purpose::STANDARD
            .decode(encoded)
            .map_err(serde::de::Error::custom)?;
        Ok(Bytes::from(decoded))
    }
}

impl WireEnvelope {
    /// Build an envelope from a message that already carries its identifier
    pub fn from_message(message: &TransportMessage) -> Result<Self, SerializationError> {
        let id = message
            .id
            .as_ref()
            .ok_or_else(|| SerializationError::InvalidEnvelope {
                message: "message has no identifier".to_string(),
            })?;

        Ok(Self {
            id: id.as_str().to_string(),
            body: message.body.clone(),
            correlation_id: message.correlation_id.clone(),
            recoverable: message.recoverable,
            reply_to_address: message.reply_to_address.as_ref().map(|a| a.to_string()),
            time_to_be_received_ms: message
                .time_to_be_received
                .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
            headers: message.headers.clone(),
            message_intent: message.intent,
            time_sent: message.time_sent.as_datetime(),
            id_for_correlation: message.id_for_correlation.clone(),
        })
    }

    /// Rebuild the transport message; every field must be reconstructible
    pub fn into_message(self) -> Result<TransportMessage, SerializationError> {
        let id = MessageId::from_str(&self.id).map_err(|e| SerializationError::InvalidEnvelope {
            message: e.to_string(),
        })?;

        let reply_to_address = self
            .reply_to_address
            .as_deref()
            .map(QueueAddress::parse)
            .transpose()
            .map_err(|e| SerializationError::InvalidEnvelope {
                message: format!("reply-to address: {}", e),
            })?;

        Ok(TransportMessage {
            id: Some(id),
            body: self.body,
            correlation_id: self.correlation_id,
            recoverable: self.recoverable,
            reply_to_address,
            time_to_be_received: self.time_to_be_received_ms.map(Duration::from_millis),
            headers: self.headers,
            intent: self.message_intent,
            time_sent: Timestamp::from_datetime(self.time_sent),
            id_for_correlation: self.id_for_correlation,
        })
    }
}

#[cfg(test)]
#[path = "envelope_tests.rs"]
mod tests;
