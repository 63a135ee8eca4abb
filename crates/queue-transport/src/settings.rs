//! Transport configuration.
//!
//! All fields carry serde defaults, so an empty file or an unconfigured
//! environment yields a valid configuration. Values are milliseconds.

use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable prefix used by [`TransportSettings::load`]
pub const ENV_PREFIX: &str = "QT";

/// Tuning options for polling, leasing and startup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSettings {
    /// Backoff increment per idle existence check
    pub peek_interval_ms: u64,

    /// Backoff ceiling
    pub maximum_wait_time_when_idle_ms: u64,

    /// Clear the receive queue during initialization
    pub purge_on_startup: bool,

    /// Base lease duration per message
    pub message_invisible_time_ms: u64,

    /// Maximum messages per fetch; also multiplies the lease duration
    pub batch_size: u32,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            peek_interval_ms: 50,
            maximum_wait_time_when_idle_ms: 1000,
            purge_on_startup: false,
            message_invisible_time_ms: 30_000,
            batch_size: 10,
        }
    }
}

impl TransportSettings {
    /// Load settings from an optional file, overridden by `QT__*` variables.
    ///
    /// e.g. `QT__BATCH_SIZE=32` sets `batch_size`. A missing explicit file or
    /// a value that cannot be coerced is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigurationError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let settings: Self = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| ConfigurationError::Parsing {
                message: e.to_string(),
            })?;

        settings.validate()?;
        Ok(settings)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.batch_size == 0 {
            return Err(ConfigurationError::Invalid {
                message: "batch_size must be at least 1".to_string(),
            });
        }

        if self.message_invisible_time_ms == 0 {
            return Err(ConfigurationError::Invalid {
                message: "message_invisible_time_ms must be greater than 0".to_string(),
            });
        }

        if self.maximum_wait_time_when_idle_ms < self.peek_interval_ms {
            return Err(ConfigurationError::Invalid {
                message: format!(
                    "maximum_wait_time_when_idle_ms ({}) must not be less than peek_interval_ms ({})",
                    self.maximum_wait_time_when_idle_ms, self.peek_interval_ms
                ),
            });
        }

        Ok(())
    }

    pub fn peek_interval(&self) -> Duration {
        Duration::from_millis(self.peek_interval_ms)
    }

    pub fn maximum_wait_time_when_idle(&self) -> Duration {
        Duration::from_millis(self.maximum_wait_time_when_idle_ms)
    }

    pub fn message_invisible_time(&self) -> Duration {
        Duration::from_millis(self.message_invisible_time_ms)
    }

    /// Lease requested for every message of a batch fetch.
    ///
    /// Inherited policy: the per-message lease multiplied by the batch size,
    /// so a batch stays hidden for as long as sequential processing of the
    /// whole batch could take.
    pub fn batch_lease_duration(&self) -> Duration {
        Duration::from_millis(
            self.message_invisible_time_ms
                .saturating_mul(u64::from(self.batch_size)),
        )
    }
}

#[cfg(test)]
#[path = "settings_tests.rs"]
mod tests;
