//! Queue side effects deferred until a transaction completes.
//!
//! - Send: the add happens on commit; rollback drops the serialized message.
//! - Delete: the delete of a leased message happens on commit; rollback does
//!   nothing and the lease expires on its own, making the message visible to
//!   other consumers again.

use crate::client::{RawMessage, RawQueueClient};
use crate::error::{RemoteOperation, TransportError};
use crate::message::QueueName;
use crate::transaction::{ParticipantFuture, TransactionParticipant};
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Send or delete operation owned by a transaction until its outcome
pub enum QueueEnlistment {
    Send {
        client: Arc<dyn RawQueueClient>,
        queue: QueueName,
        payload: Bytes,
    },
    Delete {
        client: Arc<dyn RawQueueClient>,
        queue: QueueName,
        message: RawMessage,
    },
}

impl fmt::Debug for QueueEnlistment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Send { queue, payload, .. } => f
                .debug_struct("Send")
                .field("queue", queue)
                .field("payload_len", &payload.len())
                .finish(),
            Self::Delete { queue, message, .. } => f
                .debug_struct("Delete")
                .field("queue", queue)
                .field("message_id", &message.message_id)
                .finish(),
        }
    }
}

impl TransactionParticipant for QueueEnlistment {
    fn commit(self: Box<Self>) -> ParticipantFuture<Result<(), TransportError>> {
        Box::pin(async move {
            match *self {
                Self::Send {
                    client,
                    queue,
                    payload,
                } => {
                    client
                        .add(&queue, payload)
                        .await
                        .map_err(|e| TransportError::remote(RemoteOperation::Add, e))?;
                    debug!(queue = %queue, "Committed deferred send");
                    Ok(())
                }
                Self::Delete {
                    client,
                    queue,
                    message,
                } => delete_leased(client.as_ref(), &queue, &message).await,
            }
        })
    }

    fn rollback(self: Box<Self>) -> ParticipantFuture<()> {
        Box::pin(async move {
            match *self {
                Self::Send { queue, .. } => {
                    debug!(queue = %queue, "Rolled back deferred send; message discarded");
                }
                Self::Delete { queue, message, .. } => {
                    debug!(
                        queue = %queue,
                        message_id = %message.message_id,
                        "Rolled back receive; message reappears when its lease expires"
                    );
                }
            }
        })
    }
}

/// Delete a leased message, treating "already gone" as success
pub(crate) async fn delete_leased(
    client: &dyn RawQueueClient,
    queue: &QueueName,
    message: &RawMessage,
) -> Result<(), TransportError> {
    match client.delete(queue, message).await {
        Ok(()) => {
            debug!(queue = %queue, message_id = %message.message_id, "Deleted message");
            Ok(())
        }
        Err(e) if e.is_not_found() => {
            warn!(
                queue = %queue,
                message_id = %message.message_id,
                "Message already removed; ignoring delete"
            );
            Ok(())
        }
        Err(e) => Err(TransportError::remote(RemoteOperation::Delete, e)),
    }
}

#[cfg(test)]
#[path = "enlistment_tests.rs"]
mod tests;
