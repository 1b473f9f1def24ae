//! Error types and result handling for apm-queue.
//!
//! This module defines the main error type [`Error`], the aggregate
//! [`ConfigErrors`] returned by config validation, and a convenience
//! [`Result`] type alias used throughout the crate.
//!
//! # Example
//!
//! ```rust
//! use apm_queue::{Error, Result};
//!
//! fn publish() -> Result<()> {
//!     Err(Error::Closed)
//! }
//!
//! match publish() {
//!     Ok(()) => println!("Published"),
//!     Err(Error::Closed) => eprintln!("Producer already closed"),
//!     Err(e) => eprintln!("Other error: {}", e),
//! }
//! ```

use std::fmt;
use thiserror::Error;

/// Boxed error returned by pluggable encoders and record mutators.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The main error type for apm-queue operations.
#[derive(Error, Debug)]
pub enum Error {
    /// One or more producer config preconditions were violated.
    #[error("Invalid producer config: {0}")]
    InvalidConfig(#[from] ConfigErrors),

    /// The underlying Kafka client could not be created.
    #[error("Failed creating producer: {0}")]
    ClientCreation(#[source] rdkafka::error::KafkaError),

    /// A record mutator rejected the event at `index` in the batch.
    ///
    /// Records submitted for earlier events in the same batch are not
    /// rolled back.
    #[error("Failed to apply record mutator to event {index}: {source}")]
    Mutator {
        /// Position of the failing event in the batch
        index: usize,
        source: BoxError,
    },

    /// The encoder failed on the event at `index` in the batch.
    #[error("Failed to encode event {index}: {source}")]
    Encode {
        /// Position of the failing event in the batch
        index: usize,
        source: BoxError,
    },

    /// Kafka client or producer error.
    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    /// The health probe could not reach any broker.
    #[error("Health probe: {0}")]
    HealthProbe(#[source] Box<Error>),

    /// The producer has been closed and no longer owns a client.
    #[error("Producer is closed")]
    Closed,

    /// JSON serialization error when encoding events.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Settings file or environment could not be loaded.
    #[error("Settings error: {0}")]
    Settings(#[from] config::ConfigError),

    /// A blocking client task panicked or was cancelled.
    #[error("Task error: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Every precondition violated by a producer config.
///
/// Validation collects all problems instead of stopping at the first one so
/// that a caller can fix them in one pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConfigErrors {
    errors: Vec<String>,
}

impl ConfigErrors {
    pub(crate) fn push(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }

    pub(crate) fn into_result(self) -> std::result::Result<(), Self> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.errors.iter().map(String::as_str)
    }
}

impl fmt::Display for ConfigErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.errors.join("; "))
    }
}

impl std::error::Error for ConfigErrors {}

/// A convenient Result type alias for apm-queue operations.
///
/// This is equivalent to `std::result::Result<T, apm_queue::Error>`.
pub type Result<T> = std::result::Result<T, Error>;
