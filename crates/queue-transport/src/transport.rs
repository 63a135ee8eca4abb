//! Queue transport: the façade over codec, raw client, prefetch buffer,
//! backoff controller and transaction enlistment.
//!
//! # Ownership
//!
//! One [`QueueTransport`] serves one logical consumer. `receive` and
//! `has_message` take `&mut self` because they mutate the prefetch buffer and
//! backoff state without locks; run one transport per consumer task. Sending
//! needs no instance state, so [`QueueTransport::sender`] hands out cheap
//! [`QueueSender`] clones for concurrent producers.
//!
//! # Delivery semantics
//!
//! - Outside a transaction, `receive` deletes every fetched message before it
//!   is handed out. A crash between the delete and processing loses the
//!   message (at-most-once).
//! - Inside a transaction, deletes are deferred to commit; rollback leaves the
//!   leased message to reappear when its lease lapses (at-least-once).
//! - Each batch fetch leases every message for
//!   `message_invisible_time × batch_size`. This policy is inherited and
//!   reproduced as-is, even though it over-leases small batches.

use crate::address::QueueAddress;
use crate::backoff::BackoffController;
use crate::client::{RawMessage, RawQueueClient};
use crate::codec::{JsonCodec, MessageCodec};
use crate::enlistment::{delete_leased, QueueEnlistment};
use crate::envelope::WireEnvelope;
use crate::error::{RemoteOperation, TransportError};
use crate::message::{MessageId, QueueName, Timestamp, TransportMessage};
use crate::prefetch::PrefetchBuffer;
use crate::settings::TransportSettings;
use crate::transaction::Transaction;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

#[cfg(test)]
#[path = "transport_tests.rs"]
mod tests;

// ============================================================================
// QueueSender
// ============================================================================

/// Stateless send half of a transport; cheap to clone and share
#[derive(Clone)]
pub struct QueueSender {
    client: Arc<dyn RawQueueClient>,
    codec: Arc<dyn MessageCodec>,
}

impl QueueSender {
    /// Send a message to an existing queue.
    ///
    /// Assigns a fresh identifier to `message` (overwriting any previous one),
    /// stamps `time_sent` and returns the identifier. Inside an ambient [`Transaction`] the add is deferred
    /// until commit and skipped on rollback; otherwise it happens now and any
    /// client failure is returned unchanged, without retry.
    #[instrument(skip_all, fields(destination = %destination))]
    pub async fn send(
        &self,
        message: &mut TransportMessage,
        destination: &QueueAddress,
    ) -> Result<MessageId, TransportError> {
        let queue = destination.queue();
        let exists = self
            .client
            .exists(queue)
            .await
            .map_err(|e| TransportError::remote(RemoteOperation::Exists, e))?;
        if !exists {
            return Err(TransportError::QueueNotFound {
                queue_name: queue.to_string(),
            });
        }

        let message_id = MessageId::new();
        message.id = Some(message_id.clone());
        message.time_sent = Timestamp::now();

        let envelope = WireEnvelope::from_message(message)?;
        let payload = Bytes::from(self.codec.encode(&envelope)?);

        match Transaction::current() {
            Some(transaction) => {
                transaction.enlist_volatile(Box::new(QueueEnlistment::Send {
                    client: Arc::clone(&self.client),
                    queue: queue.clone(),
                    payload,
                }))?;
                debug!(
                    message_id = %message_id,
                    transaction_id = %transaction.id(),
                    "Send deferred until transaction commits"
                );
            }
            None => {
                self.client
                    .add(queue, payload)
                    .await
                    .map_err(|e| TransportError::remote(RemoteOperation::Add, e))?;
                debug!(message_id = %message_id, "Message sent");
            }
        }

        Ok(message_id)
    }
}

impl std::fmt::Debug for QueueSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueSender")
            .field("provider", &self.client.provider_name())
            .field("codec", &self.codec.codec_id())
            .finish()
    }
}

// ============================================================================
// QueueTransport
// ============================================================================

/// Send/receive façade bound to one receive queue
pub struct QueueTransport {
    sender: QueueSender,
    settings: TransportSettings,
    receive_address: Option<QueueAddress>,
    transactional: bool,
    prefetch: PrefetchBuffer,
    backoff: BackoffController,
}

impl QueueTransport {
    /// Create transport with the JSON codec; settings are validated
    pub fn new(
        client: Arc<dyn RawQueueClient>,
        settings: TransportSettings,
    ) -> Result<Self, TransportError> {
        settings.validate()?;

        if settings.batch_size > client.max_batch_size() {
            warn!(
                batch_size = settings.batch_size,
                max_batch_size = client.max_batch_size(),
                provider = client.provider_name(),
                "Configured batch size exceeds what the provider returns per fetch"
            );
        }

        Ok(Self {
            sender: QueueSender {
                client,
                codec: Arc::new(JsonCodec),
            },
            backoff: BackoffController::from_settings(&settings),
            settings,
            receive_address: None,
            transactional: false,
            prefetch: PrefetchBuffer::new(),
        })
    }

    /// Replace the envelope codec
    pub fn with_codec(mut self, codec: Arc<dyn MessageCodec>) -> Self {
        self.sender.codec = codec;
        self
    }

    /// Bind the transport to its receive queue.
    ///
    /// Creates the queue if needed and clears it when `purge_on_startup` is
    /// set. With `transactional = false`, received messages are always deleted
    /// immediately, even inside an ambient transaction.
    pub async fn init(
        &mut self,
        address: &QueueAddress,
        transactional: bool,
    ) -> Result<(), TransportError> {
        let client = self.client();
        let queue = address.queue();

        let created = client
            .create_if_absent(queue)
            .await
            .map_err(|e| TransportError::remote(RemoteOperation::Create, e))?;

        if self.settings.purge_on_startup {
            client
                .clear(queue)
                .await
                .map_err(|e| TransportError::remote(RemoteOperation::Clear, e))?;
            info!(queue = %queue, "Purged receive queue on startup");
        }

        self.receive_address = Some(address.clone());
        self.transactional = transactional;
        self.prefetch.clear();
        self.backoff.reset();

        info!(
            queue = %queue,
            created,
            transactional,
            provider = client.provider_name(),
            "Transport initialized"
        );
        Ok(())
    }

    /// Send half of this transport
    pub fn sender(&self) -> QueueSender {
        self.sender.clone()
    }

    /// Send a message; see [`QueueSender::send`]
    pub async fn send(
        &self,
        message: &mut TransportMessage,
        destination: &QueueAddress,
    ) -> Result<MessageId, TransportError> {
        self.sender.send(message, destination).await
    }

    /// Take the next message, fetching a new batch when the buffer is empty.
    ///
    /// Returns `Ok(None)` when the queue has nothing visible. A fetch feeds the
    /// idle backoff without sleeping: an empty fetch grows the wait the next
    /// [`QueueTransport::has_message`] applies, a non-empty one resets it.
    pub async fn receive(&mut self) -> Result<Option<TransportMessage>, TransportError> {
        let queue = self.receive_queue()?.clone();

        if self.prefetch.is_empty() {
            let fetched = self.fetch_batch(&queue).await?;
            self.backoff.observe(fetched > 0);
            if fetched == 0 {
                return Ok(None);
            }
        }

        match self.prefetch.pop() {
            Some(raw) => self.decode(raw).map(Some),
            None => Ok(None),
        }
    }

    /// Non-destructive existence check that drives the idle backoff.
    ///
    /// Buffered messages count as available without a remote call. When the
    /// queue is empty this waits for the current backoff before returning.
    pub async fn has_message(&mut self) -> Result<bool, TransportError> {
        if !self.prefetch.is_empty() {
            self.backoff.observe(true);
            return Ok(true);
        }

        let queue = self.receive_queue()?.clone();
        let peeked = self
            .client()
            .peek(&queue)
            .await
            .map_err(|e| TransportError::remote(RemoteOperation::Peek, e))?;

        let saw_message = peeked.is_some();
        self.backoff.observe_and_wait(saw_message).await;
        Ok(saw_message)
    }

    /// Clear the receive queue and drop buffered messages
    pub async fn purge(&mut self) -> Result<(), TransportError> {
        let queue = self.receive_queue()?.clone();
        self.client()
            .clear(&queue)
            .await
            .map_err(|e| TransportError::remote(RemoteOperation::Clear, e))?;
        self.prefetch.clear();
        info!(queue = %queue, "Purged receive queue");
        Ok(())
    }

    /// Check whether a queue exists without creating it
    pub async fn queue_exists(&self, address: &QueueAddress) -> Result<bool, TransportError> {
        self.client()
            .exists(address.queue())
            .await
            .map_err(|e| TransportError::remote(RemoteOperation::Exists, e))
    }

    /// Lower the number of messages leased per fetch to at most `max`.
    ///
    /// Never raises the configured size; applies from the next fetch. The
    /// batch lease shrinks with it.
    pub fn limit_batch_size(&mut self, max: u32) {
        let limited = self.settings.batch_size.min(max.max(1));
        if limited != self.settings.batch_size {
            debug!(
                configured = self.settings.batch_size,
                limited, "Limiting receive batch size"
            );
            self.settings.batch_size = limited;
        }
    }

    pub fn settings(&self) -> &TransportSettings {
        &self.settings
    }

    /// Receive queue set by [`QueueTransport::init`]
    pub fn receive_address(&self) -> Option<&QueueAddress> {
        self.receive_address.as_ref()
    }

    pub fn is_transactional(&self) -> bool {
        self.transactional
    }

    /// Wait the next idle existence check starts from
    pub fn current_backoff(&self) -> Duration {
        self.backoff.current_wait()
    }

    /// Messages fetched but not yet handed out
    pub fn prefetched_count(&self) -> usize {
        self.prefetch.len()
    }

    fn client(&self) -> Arc<dyn RawQueueClient> {
        Arc::clone(&self.sender.client)
    }

    fn receive_queue(&self) -> Result<&QueueName, TransportError> {
        self.receive_address
            .as_ref()
            .map(QueueAddress::queue)
            .ok_or(TransportError::NotInitialized)
    }

    /// Lease a batch and settle each message: delete now, or enlist the delete
    /// in the ambient transaction. Settled messages enter the buffer in fetch
    /// order; on failure, messages not yet settled are left to their leases.
    async fn fetch_batch(&mut self, queue: &QueueName) -> Result<usize, TransportError> {
        let client = self.client();
        let lease = self.settings.batch_lease_duration();

        let batch = client
            .get_batch(queue, self.settings.batch_size, lease)
            .await
            .map_err(|e| TransportError::remote(RemoteOperation::GetBatch, e))?;

        if batch.is_empty() {
            return Ok(0);
        }

        let transaction = if self.transactional {
            Transaction::current()
        } else {
            None
        };

        debug!(
            queue = %queue,
            fetched = batch.len(),
            lease_ms = lease.as_millis() as u64,
            transaction_id = transaction.as_ref().map(Transaction::id),
            "Fetched batch"
        );

        let fetched = batch.len();
        for raw in batch {
            match &transaction {
                Some(transaction) => {
                    transaction.enlist_volatile(Box::new(QueueEnlistment::Delete {
                        client: Arc::clone(&client),
                        queue: queue.clone(),
                        message: raw.clone(),
                    }))?;
                }
                None => delete_leased(client.as_ref(), queue, &raw).await?,
            }
            self.prefetch.push(raw);
        }

        Ok(fetched)
    }

    fn decode(&self, raw: RawMessage) -> Result<TransportMessage, TransportError> {
        let deserialization_failed = |source| TransportError::DeserializationFailed {
            message_id: raw.message_id.clone(),
            source,
        };

        let envelope = self
            .sender
            .codec
            .decode(&raw.body)
            .map_err(deserialization_failed)?;
        let message = envelope.into_message().map_err(deserialization_failed)?;

        debug!(
            provider_message_id = %raw.message_id,
            message_id = ?message.id,
            dequeue_count = raw.dequeue_count,
            "Received message"
        );
        if message.is_expired() {
            warn!(
                provider_message_id = %raw.message_id,
                message_id = ?message.id,
                time_sent = %message.time_sent,
                "Received message is past its time to be received"
            );
        }
        Ok(message)
    }
}

impl std::fmt::Debug for QueueTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueTransport")
            .field("sender", &self.sender)
            .field("receive_address", &self.receive_address)
            .field("transactional", &self.transactional)
            .field("prefetched", &self.prefetch.len())
            .field("backoff", &self.backoff.current_wait())
            .finish()
    }
}
