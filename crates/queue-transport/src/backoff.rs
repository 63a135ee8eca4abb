//! Idle backoff for existence polling.
//!
//! The queue service has no push or long-poll primitive, so a consumer polls.
//! Each idle observation grows the wait by a fixed increment up to a ceiling;
//! observing a message resets it to zero.

use crate::settings::TransportSettings;
use std::time::Duration;
use tracing::trace;

/// Tracks how long to wait before the next existence check
#[derive(Debug, Clone)]
pub struct BackoffController {
    increment: Duration,
    ceiling: Duration,
    current: Duration,
}

impl BackoffController {
    /// Create controller with an idle increment and a ceiling
    pub fn new(increment: Duration, ceiling: Duration) -> Self {
        Self {
            increment,
            ceiling,
            current: Duration::ZERO,
        }
    }

    /// Controller using `peek_interval` and `maximum_wait_time_when_idle`
    pub fn from_settings(settings: &TransportSettings) -> Self {
        Self::new(settings.peek_interval(), settings.maximum_wait_time_when_idle())
    }

    /// Wait that the next idle observation would start from
    pub fn current_wait(&self) -> Duration {
        self.current
    }

    /// Record an observation and return the resulting wait
    pub fn observe(&mut self, saw_message: bool) -> Duration {
        if saw_message {
            self.current = Duration::ZERO;
        } else {
            self.current = (self.current + self.increment).min(self.ceiling);
        }
        self.current
    }

    /// Record an observation and, when idle, sleep for the resulting wait.
    ///
    /// Returns immediately when a message was seen.
    pub async fn observe_and_wait(&mut self, saw_message: bool) {
        let wait = self.observe(saw_message);
        if saw_message || wait.is_zero() {
            return;
        }

        trace!(wait_ms = wait.as_millis() as u64, "No message available, backing off");
        tokio::time::sleep(wait).await;
    }

    /// Forget any accumulated idle time
    pub fn reset(&mut self) {
        self.current = Duration::ZERO;
    }
}

#[cfg(test)]
#[path = "backoff_tests.rs"]
mod tests;
