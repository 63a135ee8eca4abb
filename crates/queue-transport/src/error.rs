//! Error types for transport and raw queue operations.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::transaction::TransactionStatus;

/// Errors reported by a [`RawQueueClient`](crate::client::RawQueueClient).
///
/// `NotFound` is kept distinct from every other failure because the receive
/// side treats a delete of an already-removed message as success.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("Resource not found: {resource}")]
    NotFound { resource: String },

    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("Message too large: {size} bytes (max: {max_size})")]
    MessageTooLarge { size: usize, max_size: usize },

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Service error ({status}): {code} - {message}")]
    Service {
        status: u16,
        code: String,
        message: String,
    },

    #[error("Invalid response from queue service: {message}")]
    InvalidResponse { message: String },

    #[error("Provider configuration error: {message}")]
    Configuration { message: String },
}

impl ProviderError {
    /// Check if error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        match self {
            Self::NotFound { .. } => false,
            Self::ConnectionFailed { .. } => true,
            Self::AuthenticationFailed { .. } => false,
            Self::Timeout { .. } => true,
            Self::MessageTooLarge { .. } => false,
            Self::InvalidRequest { .. } => false,
            Self::Service { status, .. } => *status >= 500 || *status == 429,
            Self::InvalidResponse { .. } => false,
            Self::Configuration { .. } => false,
        }
    }

    /// True when the target queue or message does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Raw queue primitive that failed, used to label [`TransportError::RemoteOperationFailed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOperation {
    Exists,
    Create,
    Clear,
    Add,
    Peek,
    GetBatch,
    Delete,
}

impl fmt::Display for RemoteOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Exists => "exists",
            Self::Create => "create",
            Self::Clear => "clear",
            Self::Add => "add",
            Self::Peek => "peek",
            Self::GetBatch => "get-batch",
            Self::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// Comprehensive error type for all transport operations
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Queue not found: {queue_name}")]
    QueueNotFound { queue_name: String },

    #[error("Message '{message_id}' could not be deserialized: {source}")]
    DeserializationFailed {
        message_id: String,
        #[source]
        source: SerializationError,
    },

    #[error("Remote {operation} operation failed: {source}")]
    RemoteOperationFailed {
        operation: RemoteOperation,
        #[source]
        source: ProviderError,
    },

    #[error("Transport has not been initialized with a receive queue")]
    NotInitialized,

    #[error("Serialization failed: {0}")]
    SerializationFailed(#[from] SerializationError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl TransportError {
    /// Wrap a provider failure for the given primitive
    pub fn remote(operation: RemoteOperation, source: ProviderError) -> Self {
        Self::RemoteOperationFailed { operation, source }
    }

    /// Check if error is transient and should be retried by a higher layer
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RemoteOperationFailed { source, .. } => source.is_transient(),
            Self::Transaction(TransactionError::CommitFailed { source, .. }) => {
                source.is_transient()
            }
            _ => false,
        }
    }
}

/// Errors raised by the transaction coordinator
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("Transaction {transaction_id} is no longer active (status: {status:?})")]
    NotActive {
        transaction_id: String,
        status: TransactionStatus,
    },

    #[error("Transaction {transaction_id} participant refused to prepare: {source}")]
    PrepareFailed {
        transaction_id: String,
        #[source]
        source: Box<TransportError>,
    },

    #[error("Transaction {transaction_id}: {failed} participant(s) failed during commit; first: {source}")]
    CommitFailed {
        transaction_id: String,
        failed: usize,
        #[source]
        source: Box<TransportError>,
    },
}

/// Errors during envelope serialization/deserialization
#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("JSON serialization failed: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Message body is not valid UTF-8")]
    InvalidUtf8,

    #[error("Envelope is invalid: {message}")]
    InvalidEnvelope { message: String },
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Configuration parsing failed: {message}")]
    Parsing { message: String },
}

/// Validation errors
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    Required { field: String },

    #[error("Invalid format for {field}: {message}")]
    InvalidFormat { field: String, message: String },

    #[error("Value out of range for {field}: {message}")]
    OutOfRange { field: String, message: String },
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
