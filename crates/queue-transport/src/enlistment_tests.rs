//! Tests for transactional queue enlistments.

use super::*;
use crate::error::ProviderError;
use crate::providers::memory::InMemoryQueueClient;
use async_trait::async_trait;
use std::time::Duration;

/// Delegates to an in-memory queue but fails every delete with a fixed error
struct RejectingDeletes {
    inner: InMemoryQueueClient,
    error: ProviderError,
}

#[async_trait]
impl RawQueueClient for RejectingDeletes {
    async fn exists(&self, queue: &QueueName) -> Result<bool, ProviderError> {
        self.inner.exists(queue).await
    }

    async fn create_if_absent(&self, queue: &QueueName) -> Result<bool, ProviderError> {
        self.inner.create_if_absent(queue).await
    }

    async fn clear(&self, queue: &QueueName) -> Result<(), ProviderError> {
        self.inner.clear(queue).await
    }

    async fn add(&self, queue: &QueueName, body: Bytes) -> Result<(), ProviderError> {
        self.inner.add(queue, body).await
    }

    async fn peek(&self, queue: &QueueName) -> Result<Option<RawMessage>, ProviderError> {
        self.inner.peek(queue).await
    }

    async fn get_batch(
        &self,
        queue: &QueueName,
        count: u32,
        lease: Duration,
    ) -> Result<Vec<RawMessage>, ProviderError> {
        self.inner.get_batch(queue, count, lease).await
    }

    async fn delete(&self, _queue: &QueueName, _message: &RawMessage) -> Result<(), ProviderError> {
        Err(self.error.clone())
    }

    fn provider_name(&self) -> &'static str {
        "rejecting"
    }

    fn max_batch_size(&self) -> u32 {
        32
    }
}

fn queue() -> QueueName {
    QueueName::new("orders".to_string()).unwrap()
}

async fn client_with_queue() -> InMemoryQueueClient {
    let client = InMemoryQueueClient::new();
    client.create_if_absent(&queue()).await.unwrap();
    client
}

async fn lease_one(client: &InMemoryQueueClient) -> RawMessage {
    client.add(&queue(), Bytes::from_static(b"payload")).await.unwrap();
    client
        .get_batch(&queue(), 1, Duration::from_secs(30))
        .await
        .unwrap()
        .remove(0)
}

mod send {
    use super::*;

    #[tokio::test]
    async fn test_commit_adds_message() {
        let client = client_with_queue().await;
        let enlistment = Box::new(QueueEnlistment::Send {
            client: Arc::new(client.clone()),
            queue: queue(),
            payload: Bytes::from_static(b"payload"),
        });

        enlistment.commit().await.unwrap();

        assert_eq!(client.approximate_message_count(&queue()), 1);
    }

    #[tokio::test]
    async fn test_rollback_discards_message() {
        let client = client_with_queue().await;
        let enlistment = Box::new(QueueEnlistment::Send {
            client: Arc::new(client.clone()),
            queue: queue(),
            payload: Bytes::from_static(b"payload"),
        });

        enlistment.rollback().await;

        assert_eq!(client.approximate_message_count(&queue()), 0);
    }

    #[tokio::test]
    async fn test_commit_failure_is_remote_add_failure() {
        let client = InMemoryQueueClient::new();
        let enlistment = Box::new(QueueEnlistment::Send {
            client: Arc::new(client),
            queue: queue(),
            payload: Bytes::from_static(b"payload"),
        });

        let result = enlistment.commit().await;

        assert!(matches!(
            result,
            Err(TransportError::RemoteOperationFailed {
                operation: RemoteOperation::Add,
                ..
            })
        ));
    }
}

mod delete {
    use super::*;

    #[tokio::test]
    async fn test_commit_deletes_leased_message() {
        let client = client_with_queue().await;
        let message = lease_one(&client).await;
        let enlistment = Box::new(QueueEnlistment::Delete {
            client: Arc::new(client.clone()),
            queue: queue(),
            message,
        });

        enlistment.commit().await.unwrap();

        assert_eq!(client.approximate_message_count(&queue()), 0);
    }

    #[tokio::test]
    async fn test_rollback_leaves_message_leased() {
        let client = client_with_queue().await;
        let message = lease_one(&client).await;
        let enlistment = Box::new(QueueEnlistment::Delete {
            client: Arc::new(client.clone()),
            queue: queue(),
            message,
        });

        enlistment.rollback().await;

        assert_eq!(client.approximate_message_count(&queue()), 1);
        assert_eq!(client.visible_message_count(&queue()), 0);
    }

    #[tokio::test]
    async fn test_already_deleted_message_is_success() {
        let client = client_with_queue().await;
        let message = lease_one(&client).await;
        client.delete(&queue(), &message).await.unwrap();

        let result = delete_leased(&client, &queue(), &message).await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_other_delete_failures_are_reported() {
        let inner = client_with_queue().await;
        let message = lease_one(&inner).await;
        let client = RejectingDeletes {
            inner,
            error: ProviderError::Service {
                status: 503,
                code: "ServerBusy".to_string(),
                message: "busy".to_string(),
            },
        };

        let result = delete_leased(&client, &queue(), &message).await;

        assert!(matches!(
            result,
            Err(TransportError::RemoteOperationFailed {
                operation: RemoteOperation::Delete,
                source: ProviderError::Service { status: 503, .. },
            })
        ));
    }

    #[tokio::test]
    async fn test_not_found_from_provider_is_swallowed() {
        let inner = client_with_queue().await;
        let message = lease_one(&inner).await;
        let client = RejectingDeletes {
            inner,
            error: ProviderError::NotFound {
                resource: "message".to_string(),
            },
        };

        assert!(delete_leased(&client, &queue(), &message).await.is_ok());
    }
}

#[test]
fn test_debug_omits_payload() {
    let enlistment = QueueEnlistment::Send {
        client: Arc::new(InMemoryQueueClient::new()),
        queue: queue(),
        payload: Bytes::from_static(b"secret"),
    };

    let debug = format!("{:?}", enlistment);
    assert!(debug.contains("payload_len"));
    assert!(!debug.contains("secret"));
    assert!(debug.contains("orders"));
}
