//! Logical queue addresses.
//!
//! An address is a queue name optionally qualified by a machine (or storage
//! account / namespace) segment, written `queue@machine`. Queue segments are
//! lowercased before validation because storage queues only accept lowercase
//! names.

use crate::error::ValidationError;
use crate::message::QueueName;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Destination or source of transport messages
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QueueAddress {
    queue: QueueName,
    machine: Option<String>,
}

impl QueueAddress {
    /// Create an unqualified address for a queue
    pub fn new(queue: QueueName) -> Self {
        Self {
            queue,
            machine: None,
        }
    }

    /// Create an address qualified with a machine segment
    pub fn with_machine(queue: QueueName, machine: impl Into<String>) -> Self {
        let machine = machine.into();
        Self {
            queue,
            machine: if machine.is_empty() {
                None
            } else {
                Some(machine)
            },
        }
    }

    /// Parse `queue` or `queue@machine`
    pub fn parse(address: &str) -> Result<Self, ValidationError> {
        let address = address.trim();
        if address.is_empty() {
            return Err(ValidationError::Required {
                field: "address".to_string(),
            });
        }

        let (queue, machine) = match address.split_once('@') {
            Some((queue, machine)) => {
                if machine.contains('@') {
                    return Err(ValidationError::InvalidFormat {
                        field: "address".to_string(),
                        message: "at most one '@' separator allowed".to_string(),
                    });
                }
                (queue, Some(machine))
            }
            None => (address, None),
        };

        let queue = QueueName::new(queue.to_ascii_lowercase())?;
        Ok(match machine {
            Some(machine) => Self::with_machine(queue, machine),
            None => Self::new(queue),
        })
    }

    /// Queue segment of the address
    pub fn queue(&self) -> &QueueName {
        &self.queue
    }

    /// Optional machine segment
    pub fn machine(&self) -> Option<&str> {
        self.machine.as_deref()
    }
}

impl std::fmt::Display for QueueAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.machine {
            Some(machine) => write!(f, "{}@{}", self.queue, machine),
            None => write!(f, "{}", self.queue),
        }
    }
}

impl FromStr for QueueAddress {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for QueueAddress {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<QueueAddress> for String {
    fn from(address: QueueAddress) -> Self {
        address.to_string()
    }
}

impl From<QueueName> for QueueAddress {
    fn from(queue: QueueName) -> Self {
        Self::new(queue)
    }
}

#[cfg(test)]
#[path = "address_tests.rs"]
mod tests;
