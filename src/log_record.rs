//! Log record representation shipped to the Scribe collector.
//!
//! A record is the `(category, message)` pair the collector's `LogEntry`
//! struct carries. Records are moved into the producer queue and never
//! handed back to the caller.

use std::fmt;

/// A single `(category, message)` entry awaiting delivery.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LogRecord {
    /// Scribe category used by the collector to route the message.
    pub category: String,
    /// The log message content.
    pub message: String,
}

impl LogRecord {
    /// Construct a new record from `category` and `message`.
    pub fn new(category: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            message: message.into(),
        }
    }

    /// Number of string bytes carried by the record.
    pub fn payload_len(&self) -> usize {
        self.category.len() + self.message.len()
    }
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.category, self.message)
    }
}
