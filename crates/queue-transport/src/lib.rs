//! # Queue Transport
//!
//! Transactional message transport over lease-based storage queues.
//!
//! This library provides:
//! - Batched receive with a local prefetch buffer
//! - Visibility-timeout leasing of fetched messages
//! - Sends and receive-deletes enlisted in an ambient transaction
//! - Adaptive idle backoff driven by non-destructive existence checks
//! - An in-memory queue client and an Azure Storage Queue REST client
//!
//! ## Module Organization
//!
//! - [transport] - The send/receive façade
//! - [transaction] - Ambient transactions and participant enlistment
//! - [client] - Raw queue client trait and provider message types
//! - [providers] - Raw queue client implementations
//! - [pump] - Receive loop with per-message transactions
//! - [settings] - Tuning configuration
//! - [error] - Error types for all transport operations

pub mod address;
pub mod backoff;
pub mod client;
pub mod codec;
pub mod enlistment;
pub mod envelope;
pub mod error;
pub mod message;
pub mod prefetch;
pub mod providers;
pub mod pump;
pub mod settings;
pub mod transaction;
pub mod transport;

// Re-export commonly used types at crate root for convenience
pub use address::QueueAddress;
pub use client::{PopReceipt, RawMessage, RawQueueClient};
pub use codec::{JsonCodec, MessageCodec};
pub use envelope::WireEnvelope;
pub use error::{
    ConfigurationError, ProviderError, RemoteOperation, SerializationError, TransactionError,
    TransportError, ValidationError,
};
pub use message::{MessageId, MessageIntent, QueueName, Timestamp, TransportMessage};
pub use providers::{InMemoryQueueClient, StorageQueueClient, StorageQueueConfig};
pub use pump::{MessageHandler, MessagePump, ProcessOutcome, PumpStats};
pub use settings::TransportSettings;
pub use transaction::{Transaction, TransactionParticipant, TransactionStatus};
pub use transport::{QueueSender, QueueTransport};
