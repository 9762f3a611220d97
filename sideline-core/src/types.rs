//! Strongly-typed identifiers for the sideline consumer.
//!
//! Explicit types prevent bugs from mixing up a partition index with an
//! offset or a shard index. Offsets are signed so the "nothing finished"
//! sentinel can live one below the earliest real offset.

use std::fmt;

/// Offset of a record within a partition log.
///
/// Offsets are non-negative 64-bit values assigned by the broker in log
/// order. The sentinel [`Offset::NONE`] (`-1`) means "no offset has ever
/// been finished"; it sits exactly one below the earliest possible real
/// offset (`0`) so that `last_finished.next()` is always the next offset
/// to read.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Offset(i64);

impl Offset {
    /// The "nothing finished yet" sentinel.
    pub const NONE: Self = Self(-1);

    /// Creates an offset from a raw value.
    ///
    /// # Panics
    /// Panics if `value` is below the sentinel (`-1`).
    #[inline]
    #[must_use]
    pub const fn new(value: i64) -> Self {
        assert!(value >= -1, "offset below the NONE sentinel");
        Self(value)
    }

    /// Returns the raw offset value.
    #[inline]
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }

    /// Returns the next offset.
    ///
    /// `Offset::NONE.next()` is the earliest real offset, `0`.
    ///
    /// # Panics
    /// Panics if the offset would overflow.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        assert!(self.0 < i64::MAX, "offset overflow");
        Self(self.0 + 1)
    }

    /// Returns the previous offset.
    ///
    /// `Offset::new(0).prev()` is the sentinel.
    ///
    /// # Panics
    /// Panics if called on the sentinel.
    #[inline]
    #[must_use]
    pub const fn prev(self) -> Self {
        assert!(self.0 >= 0, "no offset below the NONE sentinel");
        Self(self.0 - 1)
    }

    /// Returns true if this is the "nothing finished" sentinel.
    #[inline]
    #[must_use]
    pub const fn is_none(self) -> bool {
        self.0 < 0
    }
}

impl fmt::Debug for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "offset({})", self.0)
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Offset {
    fn from(value: i64) -> Self {
        Self::new(value)
    }
}

impl From<Offset> for i64 {
    fn from(offset: Offset) -> Self {
        offset.get()
    }
}

/// Index of a partition within a topic.
///
/// Partition indexes are non-negative 32-bit values assigned by the broker.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct PartitionId(u32);

impl PartitionId {
    /// Creates a partition id from a raw index.
    #[inline]
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Returns the raw partition index.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "partition({})", self.0)
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for PartitionId {
    fn from(value: u32) -> Self {
        Self::new(value)
    }
}

/// Stable string identity of a logical consumer.
///
/// Persisted offsets are keyed by `(ConsumerId, PartitionId)`, so two
/// consumers sharing an id would clobber each other's state.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConsumerId(String);

impl ConsumerId {
    /// Creates a consumer id from a string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConsumerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Identifies one partition log within the broker: topic name plus
/// partition index.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PartitionKey {
    /// Topic the partition belongs to.
    pub topic: String,
    /// Partition index within the topic.
    pub partition_id: PartitionId,
}

impl PartitionKey {
    /// Creates a new partition key.
    #[must_use]
    pub fn new(topic: impl Into<String>, partition_id: PartitionId) -> Self {
        Self {
            topic: topic.into(),
            partition_id,
        }
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.topic, self.partition_id)
    }
}
