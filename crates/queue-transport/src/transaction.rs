//! Local transaction coordinator with volatile participants.
//!
//! A [`Transaction`] collects [`TransactionParticipant`]s and drives them to a
//! single outcome. Participants are owned by the coordinator from enlistment
//! until their one terminal notification, which consumes them.
//!
//! # Ambient transactions
//!
//! [`Transaction::scope`] makes a transaction current for the duration of a
//! future (task-local, not thread-local, so it follows the task across
//! awaits). Code inside the scope discovers it with [`Transaction::current`]
//! without the transaction being passed explicitly.
//!
//! ```rust
//! use queue_transport::Transaction;
//!
//! # async fn example() -> Result<(), queue_transport::TransportError> {
//! let tx = Transaction::new();
//! tx.scope(async {
//!     assert!(Transaction::current().is_some());
//! })
//! .await;
//! tx.commit().await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Commit protocol
//!
//! - One participant: single-phase commit.
//! - Several participants: every participant is asked to prepare; any refusal
//!   rolls everyone back. Otherwise each participant is committed in
//!   enlistment order. Commit-time failures are reported to the committer and
//!   never retried.

use crate::error::{TransactionError, TransportError};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

tokio::task_local! {
    static AMBIENT_TRANSACTION: Transaction;
}

/// Boxed future returned by participant notifications
pub type ParticipantFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// A volatile resource manager enlisted in a [`Transaction`].
///
/// Terminal notifications take `self: Box<Self>`: a participant receives
/// exactly one of `commit` or `rollback` and cannot be reused.
pub trait TransactionParticipant: Send + fmt::Debug {
    /// Vote on the outcome before a multi-participant commit
    fn prepare(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    /// Perform the deferred side effect
    fn commit(self: Box<Self>) -> ParticipantFuture<Result<(), TransportError>>;

    /// Compensate; the transaction will not commit
    fn rollback(self: Box<Self>) -> ParticipantFuture<()>;
}

/// Lifecycle of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Accepting enlistments
    Active,
    /// Commit in progress
    Committing,
    /// Every participant committed
    Committed,
    /// Every participant was rolled back
    RolledBack,
    /// Commit started but at least one participant failed
    InDoubt,
}

struct TransactionState {
    status: TransactionStatus,
    participants: Vec<Box<dyn TransactionParticipant>>,
}

struct TransactionInner {
    id: String,
    state: Mutex<TransactionState>,
}

impl TransactionInner {
    fn lock(&self) -> MutexGuard<'_, TransactionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for TransactionInner {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if state.status == TransactionStatus::Active && !state.participants.is_empty() {
            // Participants are discarded unnotified, which is a rollback for volatile ones.
            warn!(
                transaction_id = %self.id,
                participants = state.participants.len(),
                "Transaction dropped while active; discarding enlisted participants"
            );
        }
    }
}

/// Handle to a local transaction. Clones refer to the same transaction.
#[derive(Clone)]
pub struct Transaction {
    inner: Arc<TransactionInner>,
}

impl Transaction {
    /// Begin a new active transaction
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TransactionInner {
                id: uuid::Uuid::new_v4().to_string(),
                state: Mutex::new(TransactionState {
                    status: TransactionStatus::Active,
                    participants: Vec::new(),
                }),
            }),
        }
    }

    /// The transaction made current by an enclosing [`Transaction::scope`]
    pub fn current() -> Option<Transaction> {
        AMBIENT_TRANSACTION.try_with(Transaction::clone).ok()
    }

    /// Run a future with this transaction as the ambient transaction
    pub async fn scope<F>(&self, future: F) -> F::Output
    where
        F: Future,
    {
        AMBIENT_TRANSACTION.scope(self.clone(), future).await
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn status(&self) -> TransactionStatus {
        self.inner.lock().status
    }

    /// Number of participants awaiting an outcome
    pub fn participant_count(&self) -> usize {
        self.inner.lock().participants.len()
    }

    /// Register a volatile participant; fails once the transaction completes
    pub fn enlist_volatile(
        &self,
        participant: Box<dyn TransactionParticipant>,
    ) -> Result<(), TransactionError> {
        let mut state = self.inner.lock();
        if state.status != TransactionStatus::Active {
            return Err(self.not_active(state.status));
        }

        debug!(transaction_id = %self.inner.id, participant = ?participant, "Enlisted participant");
        state.participants.push(participant);
        Ok(())
    }

    /// Commit: run every participant's deferred side effect
    pub async fn commit(&self) -> Result<(), TransportError> {
        let mut participants = {
            let mut state = self.inner.lock();
            if state.status != TransactionStatus::Active {
                return Err(self.not_active(state.status).into());
            }
            state.status = TransactionStatus::Committing;
            std::mem::take(&mut state.participants)
        };

        if participants.len() > 1 {
            if let Some(refusal) = participants.iter_mut().find_map(|p| p.prepare().err()) {
                warn!(transaction_id = %self.inner.id, error = %refusal, "Participant refused to prepare; rolling back");
                for participant in participants {
                    participant.rollback().await;
                }
                self.set_status(TransactionStatus::RolledBack);
                return Err(TransactionError::PrepareFailed {
                    transaction_id: self.inner.id.clone(),
                    source: Box::new(refusal),
                }
                .into());
            }
        }

        let mut failed = 0;
        let mut first_error = None;
        for participant in participants {
            if let Err(e) = participant.commit().await {
                warn!(transaction_id = %self.inner.id, error = %e, "Participant failed to commit");
                failed += 1;
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            None => {
                self.set_status(TransactionStatus::Committed);
                debug!(transaction_id = %self.inner.id, "Transaction committed");
                Ok(())
            }
            Some(source) => {
                self.set_status(TransactionStatus::InDoubt);
                Err(TransactionError::CommitFailed {
                    transaction_id: self.inner.id.clone(),
                    failed,
                    source: Box::new(source),
                }
                .into())
            }
        }
    }

    /// Roll back: notify every participant that the transaction will not commit
    pub async fn rollback(&self) -> Result<(), TransactionError> {
        let participants = {
            let mut state = self.inner.lock();
            if state.status != TransactionStatus::Active {
                return Err(self.not_active(state.status));
            }
            state.status = TransactionStatus::RolledBack;
            std::mem::take(&mut state.participants)
        };

        for participant in participants {
            participant.rollback().await;
        }

        debug!(transaction_id = %self.inner.id, "Transaction rolled back");
        Ok(())
    }

    fn set_status(&self, status: TransactionStatus) {
        self.inner.lock().status = status;
    }

    fn not_active(&self, status: TransactionStatus) -> TransactionError {
        TransactionError::NotActive {
            transaction_id: self.inner.id.clone(),
            status,
        }
    }
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.inner.id)
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(test)]
#[path = "transaction_tests.rs"]
mod tests;
