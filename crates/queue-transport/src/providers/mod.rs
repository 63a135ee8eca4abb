//! Raw queue client implementations.
//!
//! This module contains concrete implementations of the `RawQueueClient`
//! trait for different queue backends.

pub mod memory;
pub mod storage_queue;

pub use memory::InMemoryQueueClient;
pub use storage_queue::{StorageQueueClient, StorageQueueConfig};
