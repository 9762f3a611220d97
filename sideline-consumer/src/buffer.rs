//! Bounded FIFO staging buffer between broker fetches and `next_record`.

use std::collections::VecDeque;

use sideline_core::Record;

/// Bounded first-in-first-out record buffer.
///
/// Fetched batches are staged here and drained one record at a time by
/// `next_record`. The bound provides back-pressure: when the buffer is
/// full, fetching stops pulling until the caller drains it. Orderings
/// within a partition are preserved because batches arrive in log order.
#[derive(Debug)]
pub struct RecordBuffer {
    queue: VecDeque<Record>,
    capacity: usize,
}

impl RecordBuffer {
    /// Creates a buffer holding at most `capacity` records.
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "buffer capacity must be positive");
        Self {
            queue: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Appends a record, or hands it back when the buffer is full.
    ///
    /// # Errors
    /// Returns the rejected record so the caller can rewind the fetch
    /// position instead of losing it.
    pub fn put(&mut self, record: Record) -> Result<(), Record> {
        if self.queue.len() >= self.capacity {
            return Err(record);
        }
        self.queue.push_back(record);
        Ok(())
    }

    /// Removes and returns the oldest staged record.
    pub fn poll(&mut self) -> Option<Record> {
        self.queue.pop_front()
    }

    /// Keeps only the records matching the predicate, preserving order.
    pub fn retain(&mut self, keep: impl FnMut(&Record) -> bool) {
        self.queue.retain(keep);
    }

    /// Discards every staged record.
    pub fn clear(&mut self) {
        self.queue.clear();
    }

    /// Number of staged records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Returns true if nothing is staged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Returns true if no more records fit.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.queue.len() >= self.capacity
    }

    /// Maximum number of records the buffer holds.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sideline_core::{Offset, PartitionId, PartitionKey};

    fn record(partition: u32, offset: i64) -> Record {
        Record::new(
            PartitionKey::new("events", PartitionId::new(partition)),
            Offset::new(offset),
            format!("partition{partition}-offset{offset}"),
        )
    }

    #[test]
    fn test_fifo_order_is_preserved() {
        let mut buffer = RecordBuffer::new(100);
        for offset in 0..10 {
            buffer.put(record(0, offset)).unwrap();
        }
        assert_eq!(buffer.len(), 10);

        for offset in 0..10 {
            let polled = buffer.poll().unwrap();
            assert_eq!(polled.offset, Offset::new(offset));
        }
        assert!(buffer.poll().is_none());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_put_rejects_when_full() {
        let mut buffer = RecordBuffer::new(2);
        buffer.put(record(0, 0)).unwrap();
        buffer.put(record(0, 1)).unwrap();
        assert!(buffer.is_full());

        let rejected = buffer.put(record(0, 2)).unwrap_err();
        assert_eq!(rejected.offset, Offset::new(2));

        // Draining one makes room again.
        buffer.poll().unwrap();
        buffer.put(rejected).unwrap();
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn test_retain_drops_one_partition() {
        let mut buffer = RecordBuffer::new(100);
        for offset in 0..3 {
            buffer.put(record(0, offset)).unwrap();
            buffer.put(record(1, offset)).unwrap();
        }

        let dropped = PartitionKey::new("events", PartitionId::new(0));
        buffer.retain(|r| r.partition != dropped);

        assert_eq!(buffer.len(), 3);
        while let Some(r) = buffer.poll() {
            assert_eq!(r.partition.partition_id, PartitionId::new(1));
        }
    }

    #[test]
    fn test_clear() {
        let mut buffer = RecordBuffer::new(10);
        buffer.put(record(0, 0)).unwrap();
        buffer.clear();
        assert!(buffer.is_empty());
        assert!(!buffer.is_full());
    }

    #[test]
    #[should_panic(expected = "buffer capacity must be positive")]
    fn test_zero_capacity_panics() {
        let _ = RecordBuffer::new(0);
    }
}
