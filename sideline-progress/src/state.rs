//! Immutable per-partition offset snapshots.

use std::collections::BTreeMap;

use sideline_core::{Offset, PartitionKey};

/// An immutable snapshot of `partition -> last finished offset`, produced
/// by flushing every partition's offset manager.
///
/// The latest flushed snapshot is the source of truth for what has been
/// persisted; equality is structural so two snapshots of identical state
/// compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConsumerState {
    offsets: BTreeMap<PartitionKey, Offset>,
}

impl ConsumerState {
    /// Starts building a snapshot.
    #[must_use]
    pub fn builder() -> ConsumerStateBuilder {
        ConsumerStateBuilder::default()
    }

    /// Returns the last finished offset recorded for a partition.
    #[must_use]
    pub fn get(&self, partition: &PartitionKey) -> Option<Offset> {
        self.offsets.get(partition).copied()
    }

    /// Returns true if the snapshot has an entry for the partition.
    #[must_use]
    pub fn contains(&self, partition: &PartitionKey) -> bool {
        self.offsets.contains_key(partition)
    }

    /// Number of partitions in the snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    /// Returns true if the snapshot has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Iterates over `(partition, offset)` entries in partition order.
    pub fn iter(&self) -> impl Iterator<Item = (&PartitionKey, Offset)> {
        self.offsets.iter().map(|(key, &offset)| (key, offset))
    }
}

impl<'a> IntoIterator for &'a ConsumerState {
    type Item = (&'a PartitionKey, &'a Offset);
    type IntoIter = std::collections::btree_map::Iter<'a, PartitionKey, Offset>;

    fn into_iter(self) -> Self::IntoIter {
        self.offsets.iter()
    }
}

/// Builder for [`ConsumerState`].
#[derive(Debug, Clone, Default)]
pub struct ConsumerStateBuilder {
    offsets: BTreeMap<PartitionKey, Offset>,
}

impl ConsumerStateBuilder {
    /// Records the last finished offset for a partition. A later call for
    /// the same partition replaces the earlier value.
    #[must_use]
    pub fn with_offset(mut self, partition: PartitionKey, offset: Offset) -> Self {
        self.offsets.insert(partition, offset);
        self
    }

    /// Finalizes the snapshot.
    #[must_use]
    pub fn build(self) -> ConsumerState {
        ConsumerState {
            offsets: self.offsets,
        }
    }
}
