//! Raw queue client trait and provider-level message types.
//!
//! A [`RawQueueClient`] exposes the primitives of a remote at-least-once,
//! lease-based queue. The transport never talks to a queue service except
//! through this trait.

use crate::error::ProviderError;
use crate::message::{QueueName, Timestamp};
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

/// Lease handle that must be presented to delete a leased message.
///
/// Every lease produces a new receipt; a receipt from an expired lease no
/// longer deletes the message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PopReceipt(String);

impl PopReceipt {
    /// Create new pop receipt
    pub fn new(receipt: impl Into<String>) -> Self {
        Self(receipt.into())
    }

    /// Get receipt string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PopReceipt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Provider-level message: opaque bytes plus the provider's id and lease
#[derive(Debug, Clone, PartialEq)]
pub struct RawMessage {
    /// Provider-assigned identifier
    pub message_id: String,
    /// Lease handle; `None` for peeked messages
    pub pop_receipt: Option<PopReceipt>,
    pub body: Bytes,
    /// Number of times the message has been leased
    pub dequeue_count: u32,
    pub inserted_at: Timestamp,
    /// When the current lease lapses and the message becomes visible again
    pub next_visible_at: Option<Timestamp>,
}

/// Primitives of a remote lease-based queue
#[async_trait]
pub trait RawQueueClient: Send + Sync {
    /// Check whether the queue exists
    async fn exists(&self, queue: &QueueName) -> Result<bool, ProviderError>;

    /// Create the queue if missing; returns `true` when it was created
    async fn create_if_absent(&self, queue: &QueueName) -> Result<bool, ProviderError>;

    /// Remove every message from the queue
    async fn clear(&self, queue: &QueueName) -> Result<(), ProviderError>;

    /// Append a message
    async fn add(&self, queue: &QueueName, body: Bytes) -> Result<(), ProviderError>;

    /// Look at the first visible message without leasing it
    async fn peek(&self, queue: &QueueName) -> Result<Option<RawMessage>, ProviderError>;

    /// Lease up to `count` visible messages, hiding each for `lease`.
    ///
    /// Messages are returned in queue order.
    async fn get_batch(
        &self,
        queue: &QueueName,
        count: u32,
        lease: Duration,
    ) -> Result<Vec<RawMessage>, ProviderError>;

    /// Delete a leased message.
    ///
    /// Returns [`ProviderError::NotFound`] when the message is already gone
    /// or its lease has been superseded.
    async fn delete(&self, queue: &QueueName, message: &RawMessage) -> Result<(), ProviderError>;

    /// Short provider name for logs
    fn provider_name(&self) -> &'static str;

    /// Largest batch a single `get_batch` call can return
    fn max_batch_size(&self) -> u32;
}
