//! Consumer and broker-client error types.

use sideline_core::{Offset, PartitionKey};
use sideline_progress::PersistenceError;
use thiserror::Error;

/// Result type for consumer operations.
pub type ConsumerResult<T> = Result<T, ConsumerError>;

/// Result type for broker-client operations.
pub type BrokerResult<T> = Result<T, BrokerError>;

/// Errors surfaced to callers of [`crate::Consumer`] operations.
///
/// Lifecycle misuse and persistence failures propagate; acknowledgement
/// anomalies (unknown offset, unowned partition) are logged and swallowed
/// because the broker log is the source of truth and will re-deliver.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConsumerError {
    /// An operation other than `open` was called before the consumer was
    /// opened, or after it was closed.
    #[error("consumer is not open: {operation}")]
    NotOpen {
        /// The operation that was attempted.
        operation: &'static str,
    },

    /// `open` was called on a consumer that was already opened once.
    #[error("consumer has already been opened")]
    AlreadyOpen,

    /// A configuration value is out of range or missing.
    #[error("invalid configuration '{name}': {reason}")]
    InvalidConfig {
        /// The configuration option.
        name: &'static str,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// The broker client failed. Transient failures leave the consumer
    /// `Open`; the next operation retries.
    #[error(transparent)]
    Broker(#[from] BrokerError),

    /// The persistence adapter failed. State touched by a failed flush is
    /// not considered persisted.
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Errors reported by a [`crate::BrokerClient`] implementation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BrokerError {
    /// The requested offset is outside the broker's retained log range.
    ///
    /// The consumer recovers from this locally by resetting the affected
    /// partition to the earliest available offset; it is never surfaced.
    #[error("offset {offset} out of range for {partition}")]
    OffsetOutOfRange {
        /// The partition whose position is invalid.
        partition: PartitionKey,
        /// The invalid position.
        offset: Offset,
    },

    /// The broker cannot be reached; transient.
    #[error("broker unavailable: {message}")]
    Unavailable {
        /// Failure detail.
        message: String,
    },

    /// An operation referenced a partition the client has not been
    /// assigned.
    #[error("partition not assigned: {partition}")]
    NotAssigned {
        /// The unassigned partition.
        partition: PartitionKey,
    },
}
