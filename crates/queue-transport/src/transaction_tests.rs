//! Tests for the transaction coordinator.

use super::*;
use crate::error::{ProviderError, RemoteOperation};

type Log = Arc<Mutex<Vec<String>>>;

#[derive(Debug)]
struct Recorder {
    name: &'static str,
    log: Log,
    refuse_prepare: bool,
    fail_commit: bool,
}

impl Recorder {
    fn new(name: &'static str, log: &Log) -> Box<Self> {
        Box::new(Self {
            name,
            log: Arc::clone(log),
            refuse_prepare: false,
            fail_commit: false,
        })
    }

    fn refusing(name: &'static str, log: &Log) -> Box<Self> {
        let mut recorder = Self::new(name, log);
        recorder.refuse_prepare = true;
        recorder
    }

    fn failing(name: &'static str, log: &Log) -> Box<Self> {
        let mut recorder = Self::new(name, log);
        recorder.fail_commit = true;
        recorder
    }

    fn record(log: &Log, entry: String) {
        log.lock().unwrap().push(entry);
    }
}

impl TransactionParticipant for Recorder {
    fn prepare(&mut self) -> Result<(), TransportError> {
        Self::record(&self.log, format!("prepare:{}", self.name));
        if self.refuse_prepare {
            return Err(TransportError::NotInitialized);
        }
        Ok(())
    }

    fn commit(self: Box<Self>) -> ParticipantFuture<Result<(), TransportError>> {
        Box::pin(async move {
            Self::record(&self.log, format!("commit:{}", self.name));
            if self.fail_commit {
                return Err(TransportError::remote(
                    RemoteOperation::Add,
                    ProviderError::ConnectionFailed {
                        message: "unreachable".to_string(),
                    },
                ));
            }
            Ok(())
        })
    }

    fn rollback(self: Box<Self>) -> ParticipantFuture<()> {
        Box::pin(async move {
            Self::record(&self.log, format!("rollback:{}", self.name));
        })
    }
}

fn new_log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

mod ambient {
    use super::*;

    #[tokio::test]
    async fn test_no_ambient_transaction_outside_scope() {
        assert!(Transaction::current().is_none());
    }

    #[tokio::test]
    async fn test_scope_makes_transaction_current() {
        let tx = Transaction::new();
        let expected = tx.id().to_string();

        let seen = tx
            .scope(async { Transaction::current().map(|t| t.id().to_string()) })
            .await;

        assert_eq!(seen, Some(expected));
        assert!(Transaction::current().is_none());
    }

    #[tokio::test]
    async fn test_current_survives_awaits() {
        let tx = Transaction::new();

        let seen = tx
            .scope(async {
                tokio::task::yield_now().await;
                Transaction::current().is_some()
            })
            .await;

        assert!(seen);
    }

    #[tokio::test]
    async fn test_enlistment_through_ambient_handle() {
        let log = new_log();
        let tx = Transaction::new();

        tx.scope(async {
            let current = Transaction::current().unwrap();
            current.enlist_volatile(Recorder::new("a", &log)).unwrap();
        })
        .await;

        assert_eq!(tx.participant_count(), 1);
    }
}

mod commit {
    use super::*;

    #[tokio::test]
    async fn test_empty_transaction_commits() {
        let tx = Transaction::new();
        tx.commit().await.unwrap();
        assert_eq!(tx.status(), TransactionStatus::Committed);
    }

    #[tokio::test]
    async fn test_single_participant_skips_prepare() {
        let log = new_log();
        let tx = Transaction::new();
        tx.enlist_volatile(Recorder::new("a", &log)).unwrap();

        tx.commit().await.unwrap();

        assert_eq!(entries(&log), vec!["commit:a"]);
        assert_eq!(tx.status(), TransactionStatus::Committed);
        assert_eq!(tx.participant_count(), 0);
    }

    #[tokio::test]
    async fn test_multiple_participants_prepare_then_commit_in_order() {
        let log = new_log();
        let tx = Transaction::new();
        tx.enlist_volatile(Recorder::new("a", &log)).unwrap();
        tx.enlist_volatile(Recorder::new("b", &log)).unwrap();

        tx.commit().await.unwrap();

        assert_eq!(
            entries(&log),
            vec!["prepare:a", "prepare:b", "commit:a", "commit:b"]
        );
    }

    #[tokio::test]
    async fn test_prepare_refusal_rolls_everyone_back() {
        let log = new_log();
        let tx = Transaction::new();
        tx.enlist_volatile(Recorder::new("a", &log)).unwrap();
        tx.enlist_volatile(Recorder::refusing("b", &log)).unwrap();

        let result = tx.commit().await;

        assert!(matches!(
            result,
            Err(TransportError::Transaction(TransactionError::PrepareFailed { .. }))
        ));
        assert_eq!(tx.status(), TransactionStatus::RolledBack);
        let log = entries(&log);
        assert!(!log.iter().any(|e| e.starts_with("commit:")));
        assert!(log.contains(&"rollback:a".to_string()));
        assert!(log.contains(&"rollback:b".to_string()));
    }

    #[tokio::test]
    async fn test_commit_failure_is_reported_and_others_still_commit() {
        let log = new_log();
        let tx = Transaction::new();
        tx.enlist_volatile(Recorder::failing("a", &log)).unwrap();
        tx.enlist_volatile(Recorder::new("b", &log)).unwrap();

        let result = tx.commit().await;

        match result {
            Err(TransportError::Transaction(TransactionError::CommitFailed { failed, .. })) => {
                assert_eq!(failed, 1);
            }
            other => panic!("expected CommitFailed, got {:?}", other),
        }
        assert_eq!(tx.status(), TransactionStatus::InDoubt);
        assert!(entries(&log).contains(&"commit:b".to_string()));
    }

    #[tokio::test]
    async fn test_single_participant_failure_is_reported() {
        let log = new_log();
        let tx = Transaction::new();
        tx.enlist_volatile(Recorder::failing("a", &log)).unwrap();

        let error = tx.commit().await.unwrap_err();

        assert!(error.is_transient());
        assert_eq!(tx.status(), TransactionStatus::InDoubt);
    }

    #[tokio::test]
    async fn test_cannot_commit_twice() {
        let tx = Transaction::new();
        tx.commit().await.unwrap();

        assert!(matches!(
            tx.commit().await,
            Err(TransportError::Transaction(TransactionError::NotActive {
                status: TransactionStatus::Committed,
                ..
            }))
        ));
    }
}

mod rollback {
    use super::*;

    #[tokio::test]
    async fn test_rollback_notifies_every_participant() {
        let log = new_log();
        let tx = Transaction::new();
        tx.enlist_volatile(Recorder::new("a", &log)).unwrap();
        tx.enlist_volatile(Recorder::new("b", &log)).unwrap();

        tx.rollback().await.unwrap();

        assert_eq!(entries(&log), vec!["rollback:a", "rollback:b"]);
        assert_eq!(tx.status(), TransactionStatus::RolledBack);
    }

    #[tokio::test]
    async fn test_no_enlistment_after_completion() {
        let log = new_log();
        let tx = Transaction::new();
        tx.rollback().await.unwrap();

        let result = tx.enlist_volatile(Recorder::new("late", &log));

        assert!(matches!(result, Err(TransactionError::NotActive { .. })));
        assert!(entries(&log).is_empty());
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let tx = Transaction::new();
        let clone = tx.clone();

        clone.rollback().await.unwrap();

        assert_eq!(tx.status(), TransactionStatus::RolledBack);
        assert_eq!(tx.id(), clone.id());
    }
}
