//! In-memory raw queue client for testing and development.
//!
//! This module provides a lease-based queue that behaves like a storage queue:
//! - Messages are leased, not removed, by `get_batch`
//! - Each lease issues a fresh pop receipt and bumps the dequeue count
//! - A message reappears once its lease lapses
//! - Deletes require the receipt of the current lease
//!
//! Visibility is tracked with `tokio::time::Instant`, so tests running with a
//! paused clock can advance past leases deterministically.

use crate::client::{PopReceipt, RawMessage, RawQueueClient};
use crate::error::ProviderError;
use crate::message::{QueueName, Timestamp};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::time::Instant;

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

// ============================================================================
// Internal Storage Structures
// ============================================================================

#[derive(Default)]
struct QueueStorage {
    queues: HashMap<QueueName, VecDeque<StoredMessage>>,
}

impl QueueStorage {
    fn queue_mut(&mut self, queue: &QueueName) -> Result<&mut VecDeque<StoredMessage>, ProviderError> {
        self.queues
            .get_mut(queue)
            .ok_or_else(|| not_found_queue(queue))
    }
}

/// A message stored in the queue with lease metadata
#[derive(Clone)]
struct StoredMessage {
    message_id: String,
    body: Bytes,
    inserted_at: Timestamp,
    dequeue_count: u32,
    visible_at: Instant,
    pop_receipt: Option<String>,
}

impl StoredMessage {
    fn is_visible(&self, now: Instant) -> bool {
        now >= self.visible_at
    }

    fn to_raw(&self, now: Instant) -> RawMessage {
        let remaining = self.visible_at.saturating_duration_since(now);
        RawMessage {
            message_id: self.message_id.clone(),
            pop_receipt: self.pop_receipt.clone().map(PopReceipt::new),
            body: self.body.clone(),
            dequeue_count: self.dequeue_count,
            inserted_at: self.inserted_at.clone(),
            next_visible_at: chrono::Duration::from_std(remaining)
                .ok()
                .map(|d| Timestamp::from_datetime(chrono::Utc::now() + d)),
        }
    }
}

fn not_found_queue(queue: &QueueName) -> ProviderError {
    ProviderError::NotFound {
        resource: format!("queue '{}'", queue),
    }
}

// ============================================================================
// InMemoryQueueClient
// ============================================================================

/// In-memory raw queue client.
///
/// Clones share the same storage, so a test can hand one clone to a transport
/// and inspect the queues through another.
#[derive(Clone, Default)]
pub struct InMemoryQueueClient {
    storage: Arc<RwLock<QueueStorage>>,
}

impl InMemoryQueueClient {
    /// Create new empty client
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages in the queue, visible or leased
    pub fn approximate_message_count(&self, queue: &QueueName) -> usize {
        self.read()
            .queues
            .get(queue)
            .map(VecDeque::len)
            .unwrap_or(0)
    }

    /// Number of messages that could be leased right now
    pub fn visible_message_count(&self, queue: &QueueName) -> usize {
        let now = Instant::now();
        self.read()
            .queues
            .get(queue)
            .map(|q| q.iter().filter(|m| m.is_visible(now)).count())
            .unwrap_or(0)
    }

    fn read(&self) -> RwLockReadGuard<'_, QueueStorage> {
        self.storage.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, QueueStorage> {
        self.storage.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for InMemoryQueueClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryQueueClient")
            .field("queues", &self.read().queues.len())
            .finish()
    }
}

#[async_trait]
impl RawQueueClient for InMemoryQueueClient {
    async fn exists(&self, queue: &QueueName) -> Result<bool, ProviderError> {
        Ok(self.read().queues.contains_key(queue))
    }

    async fn create_if_absent(&self, queue: &QueueName) -> Result<bool, ProviderError> {
        let mut storage = self.write();
        if storage.queues.contains_key(queue) {
            return Ok(false);
        }
        storage.queues.insert(queue.clone(), VecDeque::new());
        Ok(true)
    }

    async fn clear(&self, queue: &QueueName) -> Result<(), ProviderError> {
        self.write().queue_mut(queue)?.clear();
        Ok(())
    }

    async fn add(&self, queue: &QueueName, body: Bytes) -> Result<(), ProviderError> {
        let mut storage = self.write();
        let messages = storage.queue_mut(queue)?;
        messages.push_back(StoredMessage {
            message_id: uuid::Uuid::new_v4().to_string(),
            body,
            inserted_at: Timestamp::now(),
            dequeue_count: 0,
            visible_at: Instant::now(),
            pop_receipt: None,
        });
        Ok(())
    }

    async fn peek(&self, queue: &QueueName) -> Result<Option<RawMessage>, ProviderError> {
        let now = Instant::now();
        let storage = self.read();
        let messages = storage.queues.get(queue).ok_or_else(|| not_found_queue(queue))?;

        Ok(messages.iter().find(|m| m.is_visible(now)).map(|m| {
            let mut raw = m.to_raw(now);
            raw.pop_receipt = None;
            raw
        }))
    }

    async fn get_batch(
        &self,
        queue: &QueueName,
        count: u32,
        lease: Duration,
    ) -> Result<Vec<RawMessage>, ProviderError> {
        let now = Instant::now();
        let mut storage = self.write();
        let messages = storage.queue_mut(queue)?;

        let mut leased = Vec::new();
        for stored in messages.iter_mut() {
            if leased.len() as u32 >= count {
                break;
            }
            if !stored.is_visible(now) {
                continue;
            }

            stored.visible_at = now + lease;
            stored.dequeue_count += 1;
            stored.pop_receipt = Some(uuid::Uuid::new_v4().to_string());
            leased.push(stored.to_raw(now));
        }

        Ok(leased)
    }

    async fn delete(&self, queue: &QueueName, message: &RawMessage) -> Result<(), ProviderError> {
        let mut storage = self.write();
        let messages = storage.queue_mut(queue)?;

        let receipt = message.pop_receipt.as_ref().map(PopReceipt::as_str);
        let position = messages.iter().position(|m| {
            m.message_id == message.message_id && m.pop_receipt.as_deref() == receipt
        });

        match position {
            Some(index) if receipt.is_some() => {
                messages.remove(index);
                Ok(())
            }
            _ => Err(ProviderError::NotFound {
                resource: format!("message '{}' in queue '{}'", message.message_id, queue),
            }),
        }
    }

    fn provider_name(&self) -> &'static str {
        "in-memory"
    }

    fn max_batch_size(&self) -> u32 {
        u32::MAX
    }
}
