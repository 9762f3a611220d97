//! Record types delivered to the consumer's caller.
//!
//! A record is the unit handed out by `next_record`: the payload the broker
//! stored at one offset of one partition. The wire format belongs to the
//! broker client; this type only carries the decoded fields the sideline
//! core needs.

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;

use crate::types::{Offset, PartitionKey};

/// Timestamp type for records, milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp from milliseconds since the Unix epoch.
    #[must_use]
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as milliseconds since the Unix epoch.
    #[must_use]
    pub const fn as_millis(self) -> i64 {
        self.0
    }

    /// Returns the current wall-clock time as a timestamp.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // Millis won't overflow i64 for centuries.
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self(duration.as_millis() as i64)
    }

    /// Creates a timestamp representing "no timestamp".
    #[must_use]
    pub const fn none() -> Self {
        Self(-1)
    }

    /// Returns true if this represents "no timestamp".
    #[must_use]
    pub const fn is_none(self) -> bool {
        self.0 < 0
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::none()
    }
}

/// A single record read from one partition of the source topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Partition the record was read from.
    pub partition: PartitionKey,
    /// Position of the record within that partition's log.
    pub offset: Offset,
    /// Timestamp of the record.
    pub timestamp: Timestamp,
    /// Optional key.
    pub key: Option<Bytes>,
    /// The record payload.
    pub value: Bytes,
}

impl Record {
    /// Creates a new record with just a value.
    #[must_use]
    pub fn new(partition: PartitionKey, offset: Offset, value: impl Into<Bytes>) -> Self {
        Self {
            partition,
            offset,
            timestamp: Timestamp::now(),
            key: None,
            value: value.into(),
        }
    }

    /// Creates a new record with key and value.
    #[must_use]
    pub fn with_key(
        partition: PartitionKey,
        offset: Offset,
        key: impl Into<Bytes>,
        value: impl Into<Bytes>,
    ) -> Self {
        Self {
            partition,
            offset,
            timestamp: Timestamp::now(),
            key: Some(key.into()),
            value: value.into(),
        }
    }

    /// Sets the timestamp.
    #[must_use]
    pub const fn with_timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = timestamp;
        self
    }
}
