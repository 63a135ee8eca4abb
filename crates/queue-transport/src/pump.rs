//! Receive loop driving a [`QueueTransport`] and a message handler.
//!
//! Each message is received and handled inside its own [`Transaction`]:
//! the transaction commits when the handler succeeds and rolls back when it
//! fails. Sends made by the handler through the transport join the same
//! transaction.
//!
//! A transactional transport enlists the delete of every message in a fetched
//! batch into the transaction current at fetch time, so the pump fetches one
//! message at a time from such a transport.

use crate::error::TransportError;
use crate::message::{MessageId, TransportMessage};
use crate::transaction::Transaction;
use crate::transport::QueueTransport;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

#[cfg(test)]
#[path = "pump_tests.rs"]
mod tests;

/// Application callback for received messages
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Process one message; an error rolls back its transaction
    async fn handle(&self, message: TransportMessage) -> anyhow::Result<()>;
}

/// Result of a single [`MessagePump::process_next`] call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Nothing was available
    Empty,
    /// Handler succeeded and the transaction committed
    Succeeded(MessageId),
    /// Handler failed and the transaction rolled back
    Failed(MessageId),
}

/// Counters accumulated by a pump
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpStats {
    pub received: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Transport or transaction failures
    pub errors: u64,
}

/// Single-consumer receive loop
pub struct MessagePump<H> {
    transport: QueueTransport,
    handler: H,
    stats: PumpStats,
    error_delay: Duration,
}

impl<H: MessageHandler> MessagePump<H> {
    /// Create pump over an initialized transport.
    ///
    /// A transactional transport is limited to single-message fetches. After a
    /// transport error the loop pauses for the idle ceiling.
    pub fn new(mut transport: QueueTransport, handler: H) -> Self {
        if transport.is_transactional() && transport.settings().batch_size > 1 {
            warn!(
                batch_size = transport.settings().batch_size,
                "Transactional pump fetches one message per transaction"
            );
            transport.limit_batch_size(1);
        }

        let error_delay = transport.settings().maximum_wait_time_when_idle();
        Self {
            transport,
            handler,
            stats: PumpStats::default(),
            error_delay,
        }
    }

    /// Pause applied after a transport error
    pub fn with_error_delay(mut self, delay: Duration) -> Self {
        self.error_delay = delay;
        self
    }

    pub fn stats(&self) -> PumpStats {
        self.stats
    }

    pub fn transport(&self) -> &QueueTransport {
        &self.transport
    }

    pub fn into_transport(self) -> QueueTransport {
        self.transport
    }

    /// Receive and handle at most one message in a fresh transaction
    pub async fn process_next(&mut self) -> Result<ProcessOutcome, TransportError> {
        let transaction = Transaction::new();
        let transport = &mut self.transport;
        let handler = &self.handler;

        let attempt = transaction
            .scope(async {
                let Some(message) = transport.receive().await? else {
                    return Ok(None);
                };
                let message_id = message.id.clone().unwrap_or_default();
                let result = handler.handle(message).await;
                Ok::<_, TransportError>(Some((message_id, result)))
            })
            .await;

        match attempt {
            Ok(None) => {
                transaction.rollback().await?;
                Ok(ProcessOutcome::Empty)
            }
            Ok(Some((message_id, Ok(())))) => {
                self.stats.received += 1;
                if let Err(e) = transaction.commit().await {
                    self.stats.errors += 1;
                    return Err(e);
                }
                self.stats.succeeded += 1;
                debug!(message_id = %message_id, "Message handled");
                Ok(ProcessOutcome::Succeeded(message_id))
            }
            Ok(Some((message_id, Err(handler_error)))) => {
                self.stats.received += 1;
                self.stats.failed += 1;
                warn!(
                    message_id = %message_id,
                    error = %handler_error,
                    "Handler failed; rolling back"
                );
                transaction.rollback().await?;
                Ok(ProcessOutcome::Failed(message_id))
            }
            Err(e) => {
                self.stats.errors += 1;
                if let Err(rollback_error) = transaction.rollback().await {
                    warn!(error = %rollback_error, "Rollback after receive failure failed");
                }
                Err(e)
            }
        }
    }

    /// Run until `shutdown` becomes `true` or its sender is dropped
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> PumpStats {
        let queue = self
            .transport
            .receive_address()
            .map(|a| a.to_string())
            .unwrap_or_default();
        info!(queue = %queue, "Message pump started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let available = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                result = self.transport.has_message() => result,
            };

            match available {
                Ok(false) => continue,
                Ok(true) => {}
                Err(e) => {
                    self.stats.errors += 1;
                    error!(error = %e, "Existence check failed");
                    if pause(&mut shutdown, self.error_delay).await {
                        break;
                    }
                    continue;
                }
            }

            if let Err(e) = self.process_next().await {
                error!(error = %e, "Message processing failed");
                if pause(&mut shutdown, self.error_delay).await {
                    break;
                }
            }
        }

        info!(
            queue = %queue,
            received = self.stats.received,
            succeeded = self.stats.succeeded,
            failed = self.stats.failed,
            errors = self.stats.errors,
            "Message pump stopped"
        );
        self.stats
    }
}

/// Sleep for `delay`; returns `true` if shutdown was requested meanwhile
async fn pause(shutdown: &mut watch::Receiver<bool>, delay: Duration) -> bool {
    tokio::select! {
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
        _ = tokio::time::sleep(delay) => false,
    }
}
