//! Per-partition offset tracking across out-of-order acknowledgements.

use std::collections::BTreeSet;

use sideline_core::{Offset, PartitionKey};
use tracing::{debug, warn};

/// Number of out-of-order finished offsets after which a warning is
/// emitted. The set is never truncated; unbounded growth points at an
/// upstream record that will never be acknowledged.
const PENDING_FINISHED_WARN_THRESHOLD: usize = 10_000;

/// Tracks which offsets of a single partition have been started and
/// finished, and computes the highest contiguous finished offset.
///
/// # Design
///
/// One instance exists per owned partition. `start_offset` is called when
/// a record is handed to the caller; `finish_offset` when the caller
/// acknowledges it. Acknowledgements arrive in arbitrary order, so
/// finished offsets that cannot yet be collapsed into the contiguous
/// prefix wait in `finished_out_of_order` until the earlier gap closes.
///
/// `last_finished` is the resumption point: every offset at or below it
/// has been acknowledged, and a consumer seeking to `last_finished + 1`
/// re-delivers exactly the unacknowledged suffix.
///
/// # Thread Safety
///
/// Operations on a single manager are not concurrency-safe; the consumer
/// serializes them per partition. Managers for different partitions are
/// independent.
#[derive(Debug)]
pub struct PartitionOffsetManager {
    /// Diagnostic label for the partition this manager represents.
    partition: PartitionKey,
    /// Offsets where processing has been started but not yet finished.
    tracked: BTreeSet<Offset>,
    /// Offsets finished out of order, pending advancement of the
    /// contiguous prefix.
    finished_out_of_order: BTreeSet<Offset>,
    /// Highest contiguous finished offset.
    last_finished: Offset,
    /// Highest offset ever passed to `start_offset`.
    last_started: Offset,
}

impl PartitionOffsetManager {
    /// Creates a manager for one partition.
    ///
    /// `last_finished` is the offset to consider already completed:
    /// typically the last persisted committed offset, or [`Offset::NONE`]
    /// when nothing has ever been finished.
    #[must_use]
    pub fn new(partition: PartitionKey, last_finished: Offset) -> Self {
        Self {
            partition,
            tracked: BTreeSet::new(),
            finished_out_of_order: BTreeSet::new(),
            last_finished,
            last_started: Offset::new(0),
        }
    }

    /// Marks `offset` as handed out for processing but not yet confirmed.
    ///
    /// Duplicate starts are idempotent. Starting below the highest started
    /// offset is tolerated but suspicious, and logged.
    pub fn start_offset(&mut self, offset: Offset) {
        self.tracked.insert(offset);

        if offset >= self.last_started {
            self.last_started = offset;
        } else {
            warn!(
                partition = %self.partition,
                offset = %offset,
                last_started = %self.last_started,
                "starting offsets out of order"
            );
        }
    }

    /// Marks `offset` as having completed processing.
    ///
    /// Acking an offset that was never started (or was already finished)
    /// is logged and ignored; the broker log is the source of truth and
    /// will re-deliver anything genuinely lost.
    pub fn finish_offset(&mut self, offset: Offset) {
        if !self.tracked.remove(&offset) {
            warn!(
                partition = %self.partition,
                offset = %offset,
                "ack for untracked offset ignored"
            );
            return;
        }

        let is_earliest = match self.tracked.first() {
            Some(&earliest) => offset < earliest,
            None => true,
        };

        if is_earliest {
            // Collapse the contiguous prefix: walk the out-of-order set
            // upwards while it continues the run that starts at `offset`.
            let mut high = offset;
            let mut next = offset.next();
            while let Some(&smallest) = self.finished_out_of_order.first() {
                if smallest != next {
                    break;
                }
                self.finished_out_of_order.remove(&smallest);
                high = smallest;
                next = next.next();
            }
            // A stale ack at or below the watermark must not drag it back.
            if high > self.last_finished {
                self.last_finished = high;
            }
            debug!(
                partition = %self.partition,
                offset = %offset,
                last_finished = %self.last_finished,
                "advanced contiguous finished offset"
            );
        } else {
            // An earlier offset is still outstanding; park this one.
            self.finished_out_of_order.insert(offset);
            if self.finished_out_of_order.len() == PENDING_FINISHED_WARN_THRESHOLD {
                warn!(
                    partition = %self.partition,
                    pending = self.finished_out_of_order.len(),
                    last_finished = %self.last_finished,
                    "out-of-order finished set is growing unbounded; an \
                     earlier offset has not been acknowledged"
                );
            }
        }
    }

    /// Returns the highest contiguous finished offset.
    #[must_use]
    pub const fn last_finished_offset(&self) -> Offset {
        self.last_finished
    }

    /// Returns the offset a consumer would seek to: the largest offset
    /// ever started, or one past the last finished offset when nothing
    /// has been started yet.
    #[must_use]
    pub fn last_started_offset(&self) -> Offset {
        self.last_started.max(self.last_finished.next())
    }

    /// Returns the partition this manager represents.
    #[must_use]
    pub const fn partition(&self) -> &PartitionKey {
        &self.partition
    }

    /// Number of offsets finished out of order and waiting for an earlier
    /// gap to close. Growth here means an earlier record is stuck.
    #[must_use]
    pub fn pending_finished(&self) -> usize {
        self.finished_out_of_order.len()
    }

    /// Number of offsets started but not yet finished.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.tracked.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sideline_core::PartitionId;

    fn manager_at(last_finished: i64) -> PartitionOffsetManager {
        PartitionOffsetManager::new(
            PartitionKey::new("events", PartitionId::new(0)),
            Offset::new(last_finished),
        )
    }

    #[test]
    fn test_fresh_manager_reports_starting_offset() {
        let manager = manager_at(-1);
        assert_eq!(manager.last_finished_offset(), Offset::NONE);
        assert_eq!(manager.last_started_offset(), Offset::new(0));
    }

    #[test]
    fn test_manager_resumed_from_committed_offset() {
        let manager = manager_at(41);
        assert_eq!(manager.last_finished_offset(), Offset::new(41));
        // Nothing started yet, so the seek target is one past the commit.
        assert_eq!(manager.last_started_offset(), Offset::new(42));
    }

    #[test]
    fn test_in_order_finish_advances_one_by_one() {
        let mut manager = manager_at(-1);
        for o in 0..5 {
            manager.start_offset(Offset::new(o));
        }
        for o in 0..5 {
            manager.finish_offset(Offset::new(o));
            assert_eq!(manager.last_finished_offset(), Offset::new(o));
        }
        assert_eq!(manager.in_flight(), 0);
        assert_eq!(manager.pending_finished(), 0);
    }

    #[test]
    fn test_out_of_order_finish_waits_for_gap() {
        let mut manager = manager_at(-1);
        for o in 0..9 {
            manager.start_offset(Offset::new(o));
        }

        // Ack order 2, 1, 0, 3, 4, 5, 7, 8, 6 with the expected watermark
        // after each ack.
        let acks = [
            (2, -1),
            (1, -1),
            (0, 2),
            (3, 3),
            (4, 4),
            (5, 5),
            (7, 5),
            (8, 5),
            (6, 8),
        ];
        for (ack, expected) in acks {
            manager.finish_offset(Offset::new(ack));
            assert_eq!(
                manager.last_finished_offset(),
                Offset::new(expected),
                "after acking {ack}"
            );
        }
        assert_eq!(manager.pending_finished(), 0);
    }

    #[test]
    fn test_gap_after_contiguous_run_keeps_highest_reached() {
        let mut manager = manager_at(-1);
        for o in 0..5 {
            manager.start_offset(Offset::new(o));
        }

        // 1 and 3 finish out of order; 2 is still outstanding.
        manager.finish_offset(Offset::new(3));
        manager.finish_offset(Offset::new(1));
        assert_eq!(manager.last_finished_offset(), Offset::NONE);

        // Acking 0 collapses {0, 1} but must stop at the gap before 3.
        manager.finish_offset(Offset::new(0));
        assert_eq!(manager.last_finished_offset(), Offset::new(1));
        assert_eq!(manager.pending_finished(), 1);

        // Closing the gap collapses the rest.
        manager.finish_offset(Offset::new(2));
        assert_eq!(manager.last_finished_offset(), Offset::new(3));
        assert_eq!(manager.pending_finished(), 0);
    }

    #[test]
    fn test_finish_unknown_offset_is_ignored() {
        let mut manager = manager_at(-1);
        manager.start_offset(Offset::new(0));

        manager.finish_offset(Offset::new(5));
        assert_eq!(manager.last_finished_offset(), Offset::NONE);

        // Double finish: second ack sees an untracked offset.
        manager.finish_offset(Offset::new(0));
        assert_eq!(manager.last_finished_offset(), Offset::new(0));
        manager.finish_offset(Offset::new(0));
        assert_eq!(manager.last_finished_offset(), Offset::new(0));
    }

    #[test]
    fn test_duplicate_start_is_idempotent() {
        let mut manager = manager_at(-1);
        manager.start_offset(Offset::new(0));
        manager.start_offset(Offset::new(0));
        assert_eq!(manager.in_flight(), 1);

        manager.finish_offset(Offset::new(0));
        assert_eq!(manager.last_finished_offset(), Offset::new(0));
        assert_eq!(manager.in_flight(), 0);
    }

    #[test]
    fn test_out_of_order_start_is_tolerated() {
        let mut manager = manager_at(-1);
        manager.start_offset(Offset::new(5));
        manager.start_offset(Offset::new(3));
        assert_eq!(manager.last_started_offset(), Offset::new(5));

        manager.finish_offset(Offset::new(3));
        assert_eq!(manager.last_finished_offset(), Offset::new(3));
        manager.finish_offset(Offset::new(5));
        assert_eq!(manager.last_finished_offset(), Offset::new(5));
    }

    #[test]
    fn test_last_started_is_monotonic() {
        let mut manager = manager_at(-1);
        let mut previous = manager.last_started_offset();
        for o in [0, 3, 1, 7, 2] {
            manager.start_offset(Offset::new(o));
            let current = manager.last_started_offset();
            assert!(current >= previous);
            previous = current;
        }
        assert_eq!(manager.last_started_offset(), Offset::new(7));
    }

    #[test]
    fn test_tracked_and_pending_sets_stay_disjoint() {
        let mut manager = manager_at(-1);
        for o in 0..6 {
            manager.start_offset(Offset::new(o));
        }
        for o in [4, 2, 5] {
            manager.finish_offset(Offset::new(o));
        }

        for o in &manager.finished_out_of_order {
            assert!(!manager.tracked.contains(o));
            // Anything parked is beyond the collapse point.
            assert!(*o > manager.last_finished.next());
        }
    }
}
