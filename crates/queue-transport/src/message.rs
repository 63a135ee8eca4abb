//! Transport message types and core domain identifiers.

use crate::address::QueueAddress;
use crate::error::ValidationError;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

// ============================================================================
// Core Domain Identifiers
// ============================================================================

/// Validated storage queue name.
///
/// Storage queues accept 3-63 lowercase ASCII letters, digits and single
/// hyphens; the name may not start or end with a hyphen.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QueueName(String);

impl QueueName {
    /// Create new queue name with validation
    pub fn new(name: String) -> Result<Self, ValidationError> {
        if name.len() < 3 || name.len() > 63 {
            return Err(ValidationError::OutOfRange {
                field: "queue_name".to_string(),
                message: "must be 3-63 characters".to_string(),
            });
        }

        if !name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(ValidationError::InvalidFormat {
                field: "queue_name".to_string(),
                message: "only lowercase ASCII letters, digits and hyphens allowed".to_string(),
            });
        }

        if name.starts_with('-') || name.ends_with('-') || name.contains("--") {
            return Err(ValidationError::InvalidFormat {
                field: "queue_name".to_string(),
                message: "no leading/trailing hyphens or consecutive hyphens".to_string(),
            });
        }

        Ok(Self(name))
    }

    /// Get queue name as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for QueueName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for QueueName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for QueueName {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<QueueName> for String {
    fn from(name: QueueName) -> Self {
        name.0
    }
}

/// Transport-assigned message identifier, unique per send
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    /// Generate new random message ID
    pub fn new() -> Self {
        let id = uuid::Uuid::new_v4();
        Self(id.to_string())
    }

    /// Get message ID as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MessageId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ValidationError::Required {
                field: "message_id".to_string(),
            });
        }

        Ok(Self(s.to_string()))
    }
}

/// Timestamp wrapper for consistent time handling
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create timestamp for current time
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Create timestamp from DateTime
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Get underlying DateTime
    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M:%S UTC"))
    }
}

impl FromStr for Timestamp {
    type Err = chrono::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let dt = s.parse::<DateTime<Utc>>()?;
        Ok(Self::from_datetime(dt))
    }
}

// ============================================================================
// Message Types
// ============================================================================

/// Why a message was sent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MessageIntent {
    #[default]
    Send,
    Publish,
    Subscribe,
    Unsubscribe,
    Reply,
}

/// The application-level unit of communication.
///
/// `id` is `None` until the message has been sent or received; a send always
/// overwrites it with a fresh identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportMessage {
    pub id: Option<MessageId>,
    pub body: Bytes,
    pub correlation_id: Option<String>,
    pub recoverable: bool,
    pub reply_to_address: Option<QueueAddress>,
    /// Advisory expiry; `None` means the message never expires
    pub time_to_be_received: Option<Duration>,
    pub headers: HashMap<String, String>,
    pub intent: MessageIntent,
    pub time_sent: Timestamp,
    pub id_for_correlation: Option<String>,
}

impl TransportMessage {
    /// Create new message with body
    pub fn new(body: Bytes) -> Self {
        Self {
            id: None,
            body,
            correlation_id: None,
            recoverable: true,
            reply_to_address: None,
            time_to_be_received: None,
            headers: HashMap::new(),
            intent: MessageIntent::Send,
            time_sent: Timestamp::now(),
            id_for_correlation: None,
        }
    }

    /// Add correlation ID for request/response tracking
    pub fn with_correlation_id(mut self, correlation_id: String) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    /// Mark the message as (non-)recoverable
    pub fn with_recoverable(mut self, recoverable: bool) -> Self {
        self.recoverable = recoverable;
        self
    }

    /// Set the address replies should be sent to
    pub fn with_reply_to(mut self, address: QueueAddress) -> Self {
        self.reply_to_address = Some(address);
        self
    }

    /// Set advisory time-to-be-received
    pub fn with_time_to_be_received(mut self, ttbr: Duration) -> Self {
        self.time_to_be_received = Some(ttbr);
        self
    }

    /// Add message header
    pub fn with_header(mut self, key: String, value: String) -> Self {
        self.headers.insert(key, value);
        self
    }

    /// Set message intent
    pub fn with_intent(mut self, intent: MessageIntent) -> Self {
        self.intent = intent;
        self
    }

    /// Set the identifier used for correlating replies
    pub fn with_id_for_correlation(mut self, id: String) -> Self {
        self.id_for_correlation = Some(id);
        self
    }

    /// Body as UTF-8 text, if it is valid UTF-8
    pub fn body_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    /// Check whether the advisory time-to-be-received has elapsed.
    ///
    /// A deadline beyond the representable date range never expires.
    pub fn is_expired(&self) -> bool {
        let deadline = self
            .time_to_be_received
            .and_then(|ttbr| chrono::Duration::from_std(ttbr).ok())
            .and_then(|ttbr| self.time_sent.as_datetime().checked_add_signed(ttbr));

        match deadline {
            Some(deadline) => Utc::now() >= deadline,
            None => false,
        }
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
