//! Local holding area for leased messages not yet handed to the caller.

use crate::client::RawMessage;
use std::collections::VecDeque;

/// FIFO buffer of raw messages from the last batch fetch.
///
/// Non-empty only between a batch fetch and its full drain. Owned by a single
/// transport; there is no internal synchronization.
#[derive(Debug, Default)]
pub struct PrefetchBuffer {
    messages: VecDeque<RawMessage>,
}

impl PrefetchBuffer {
    /// Create new empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one fetched message, preserving fetch order
    pub fn push(&mut self, message: RawMessage) {
        self.messages.push_back(message);
    }

    /// Take the oldest buffered message
    pub fn pop(&mut self) -> Option<RawMessage> {
        self.messages.pop_front()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Drop every buffered message; their leases lapse on their own
    pub fn clear(&mut self) {
        self.messages.clear();
    }
}
