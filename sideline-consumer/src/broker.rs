//! Broker client contract and an in-memory simulated broker.
//!
//! The real wire protocol lives in the broker client implementation; the
//! consumer core only needs the capability set below. `SimulatedBroker`
//! backs the test suites with per-partition in-memory logs, including
//! adjustable log start offsets to simulate retention truncation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use sideline_core::{Offset, PartitionId, PartitionKey, Record};

use crate::error::{BrokerError, BrokerResult};

// -----------------------------------------------------------------------------
// Broker Client Trait
// -----------------------------------------------------------------------------

/// Capability set the consumer needs from the underlying broker client.
///
/// Assignment is static: the consumer decides ownership and calls
/// [`BrokerClient::assign`] directly, bypassing any broker-side group
/// coordination. The client's "offset out of range" signal must be
/// distinguishable so the consumer can repair a stale persisted offset.
#[async_trait]
pub trait BrokerClient: Send {
    /// Returns the partition indexes of a topic.
    async fn partitions_for(&mut self, topic: &str) -> BrokerResult<Vec<PartitionId>>;

    /// Replaces the set of partitions this client reads from.
    async fn assign(&mut self, partitions: Vec<PartitionKey>) -> BrokerResult<()>;

    /// Moves the fetch position of one assigned partition.
    async fn seek(&mut self, partition: &PartitionKey, offset: Offset) -> BrokerResult<()>;

    /// Moves the fetch position of the given partitions to the earliest
    /// available offset.
    async fn seek_to_beginning(&mut self, partitions: &[PartitionKey]) -> BrokerResult<()>;

    /// Returns the current fetch position of one assigned partition.
    async fn position(&mut self, partition: &PartitionKey) -> BrokerResult<Offset>;

    /// Fetches the next batch of records from the assigned partitions,
    /// waiting at most `timeout`. An empty batch means nothing new.
    async fn poll(&mut self, timeout: Duration) -> BrokerResult<Vec<Record>>;

    /// Releases the client's resources.
    async fn close(&mut self) -> BrokerResult<()>;
}

// -----------------------------------------------------------------------------
// Simulated Broker
// -----------------------------------------------------------------------------

/// Default cap on records returned by one `poll`.
const DEFAULT_MAX_POLL_RECORDS: usize = 500;

/// One partition's in-memory log.
#[derive(Debug, Default)]
struct PartitionLog {
    /// Records indexed by offset; never physically truncated.
    records: Vec<Record>,
    /// Earliest offset still available. Raising it simulates retention
    /// expiry of the log prefix.
    log_start: i64,
}

impl PartitionLog {
    #[allow(clippy::cast_possible_wrap)] // Test logs stay far below i64::MAX.
    fn log_end(&self) -> i64 {
        self.records.len() as i64
    }
}

/// In-memory broker for tests.
///
/// Holds per-partition logs, an explicit assignment set, and per-partition
/// fetch positions. A position outside `[log_start, log_end]` surfaces as
/// [`BrokerError::OffsetOutOfRange`] at the next poll, matching how a real
/// client reports a stale seek.
///
/// Cloning yields a new client handle onto the same logs: topics and the
/// reachability flag are shared, so a test can keep one handle to produce
/// records and flip faults while the consumer drives another. Assignment
/// and fetch positions stay per-handle, like independent clients of one
/// cluster.
#[derive(Debug, Clone, Default)]
pub struct SimulatedBroker {
    /// Shared partition logs, keyed by topic.
    topics: Arc<Mutex<HashMap<String, Vec<PartitionLog>>>>,
    /// Shared reachability flag for simulating a broker outage.
    unavailable: Arc<AtomicBool>,
    /// This handle's assignment.
    assignment: Vec<PartitionKey>,
    /// This handle's fetch positions.
    positions: HashMap<PartitionKey, Offset>,
    /// Cap on records per poll.
    max_poll_records: usize,
    /// Whether this handle was closed.
    closed: bool,
}

impl SimulatedBroker {
    /// Creates an empty broker.
    #[must_use]
    pub fn new() -> Self {
        Self {
            topics: Arc::new(Mutex::new(HashMap::new())),
            unavailable: Arc::new(AtomicBool::new(false)),
            assignment: Vec::new(),
            positions: HashMap::new(),
            max_poll_records: DEFAULT_MAX_POLL_RECORDS,
            closed: false,
        }
    }

    /// Caps how many records one poll returns.
    #[must_use]
    pub fn with_max_poll_records(mut self, max: usize) -> Self {
        assert!(max > 0, "max_poll_records must be positive");
        self.max_poll_records = max;
        self
    }

    /// Creates a topic with `partitions` empty partition logs.
    ///
    /// # Panics
    /// Panics if `partitions` is zero or the mutex is poisoned.
    pub fn create_topic(&self, topic: &str, partitions: u32) {
        assert!(partitions > 0, "a topic needs at least one partition");
        let mut topics = self.topics.lock().expect("topics lock poisoned");
        topics.insert(
            topic.to_string(),
            (0..partitions).map(|_| PartitionLog::default()).collect(),
        );
    }

    /// Appends a record and returns its offset.
    ///
    /// # Panics
    /// Panics if the topic or partition does not exist.
    pub fn produce(
        &self,
        topic: &str,
        partition: PartitionId,
        key: impl Into<Bytes>,
        value: impl Into<Bytes>,
    ) -> Offset {
        let mut topics = self.topics.lock().expect("topics lock poisoned");
        let log = topics
            .get_mut(topic)
            .unwrap_or_else(|| panic!("unknown topic {topic}"))
            .get_mut(partition.get() as usize)
            .unwrap_or_else(|| panic!("unknown partition {partition} of topic {topic}"));

        let offset = Offset::new(log.log_end());
        let record = Record::with_key(
            PartitionKey::new(topic, partition),
            offset,
            key.into(),
            value.into(),
        );
        log.records.push(record);
        offset
    }

    /// Raises the earliest available offset of a partition, simulating
    /// retention expiry of everything before it.
    ///
    /// # Panics
    /// Panics if the topic or partition does not exist, or if the new
    /// start is beyond the log end.
    pub fn expire_log_prefix(&self, topic: &str, partition: PartitionId, new_start: Offset) {
        let mut topics = self.topics.lock().expect("topics lock poisoned");
        let log = topics
            .get_mut(topic)
            .unwrap_or_else(|| panic!("unknown topic {topic}"))
            .get_mut(partition.get() as usize)
            .unwrap_or_else(|| panic!("unknown partition {partition} of topic {topic}"));
        assert!(
            new_start.get() <= log.log_end(),
            "log start cannot pass the log end"
        );
        log.log_start = new_start.get();
    }

    /// Makes every handle's broker operations fail with `Unavailable`
    /// until cleared. Simulates a transient outage.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn log_range(&self, key: &PartitionKey) -> Option<(i64, i64)> {
        let topics = self.topics.lock().expect("topics lock poisoned");
        topics
            .get(&key.topic)
            .and_then(|logs| logs.get(key.partition_id.get() as usize))
            .map(|log| (log.log_start, log.log_end()))
    }

    fn ensure_assigned(&self, partition: &PartitionKey) -> BrokerResult<()> {
        if self.assignment.contains(partition) {
            Ok(())
        } else {
            Err(BrokerError::NotAssigned {
                partition: partition.clone(),
            })
        }
    }

    fn ensure_reachable(&self) -> BrokerResult<()> {
        if self.closed {
            return Err(BrokerError::Unavailable {
                message: "client closed".into(),
            });
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(BrokerError::Unavailable {
                message: "simulated broker outage".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl BrokerClient for SimulatedBroker {
    #[allow(clippy::cast_possible_truncation)] // Partition counts are small.
    async fn partitions_for(&mut self, topic: &str) -> BrokerResult<Vec<PartitionId>> {
        self.ensure_reachable()?;
        let topics = self.topics.lock().expect("topics lock poisoned");
        Ok(topics
            .get(topic)
            .map(|logs| {
                (0..logs.len())
                    .map(|index| PartitionId::new(index as u32))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn assign(&mut self, partitions: Vec<PartitionKey>) -> BrokerResult<()> {
        self.ensure_reachable()?;
        self.positions
            .retain(|position_key, _| partitions.contains(position_key));
        self.assignment = partitions;
        Ok(())
    }

    async fn seek(&mut self, partition: &PartitionKey, offset: Offset) -> BrokerResult<()> {
        self.ensure_reachable()?;
        self.ensure_assigned(partition)?;
        self.positions.insert(partition.clone(), offset);
        Ok(())
    }

    async fn seek_to_beginning(&mut self, partitions: &[PartitionKey]) -> BrokerResult<()> {
        self.ensure_reachable()?;
        for partition in partitions {
            self.ensure_assigned(partition)?;
            let earliest = self.log_range(partition).map_or(0, |(start, _)| start);
            self.positions
                .insert(partition.clone(), Offset::new(earliest));
        }
        Ok(())
    }

    async fn position(&mut self, partition: &PartitionKey) -> BrokerResult<Offset> {
        self.ensure_reachable()?;
        self.ensure_assigned(partition)?;
        if let Some(&position) = self.positions.get(partition) {
            return Ok(position);
        }
        let earliest = self.log_range(partition).map_or(0, |(start, _)| start);
        Ok(Offset::new(earliest))
    }

    async fn poll(&mut self, _timeout: Duration) -> BrokerResult<Vec<Record>> {
        self.ensure_reachable()?;

        // A position outside the retained range fails the whole poll, the
        // way a real fetch surfaces OffsetOutOfRange, before any data is
        // handed out.
        for partition in &self.assignment {
            let Some((log_start, log_end)) = self.log_range(partition) else {
                continue;
            };
            let position = self
                .positions
                .get(partition)
                .copied()
                .unwrap_or(Offset::new(log_start));
            if position.get() < log_start || position.get() > log_end {
                return Err(BrokerError::OffsetOutOfRange {
                    partition: partition.clone(),
                    offset: position,
                });
            }
        }

        let mut batch = Vec::new();
        let assignment = self.assignment.clone();
        let topics = self.topics.lock().expect("topics lock poisoned");
        for partition in &assignment {
            if batch.len() >= self.max_poll_records {
                break;
            }
            let Some(log) = topics
                .get(&partition.topic)
                .and_then(|logs| logs.get(partition.partition_id.get() as usize))
            else {
                continue;
            };
            let position = self
                .positions
                .get(partition)
                .copied()
                .unwrap_or(Offset::new(log.log_start));

            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let available = &log.records[position.get() as usize..];
            let take = available.len().min(self.max_poll_records - batch.len());
            batch.extend_from_slice(&available[..take]);

            if take > 0 {
                #[allow(clippy::cast_possible_wrap)]
                self.positions.insert(
                    partition.clone(),
                    Offset::new(position.get() + take as i64),
                );
            }
        }
        Ok(batch)
    }

    async fn close(&mut self) -> BrokerResult<()> {
        self.closed = true;
        self.assignment.clear();
        self.positions.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(partition: u32) -> PartitionKey {
        PartitionKey::new("events", PartitionId::new(partition))
    }

    fn produce_batch(broker: &SimulatedBroker, partition: u32, count: usize) {
        for i in 0..count {
            broker.produce(
                "events",
                PartitionId::new(partition),
                format!("key{i}"),
                format!("partition{partition}-offset{i}"),
            );
        }
    }

    #[tokio::test]
    async fn test_partitions_for() {
        let mut broker = SimulatedBroker::new();
        broker.create_topic("events", 3);

        let partitions = broker.partitions_for("events").await.unwrap();
        assert_eq!(
            partitions,
            vec![PartitionId::new(0), PartitionId::new(1), PartitionId::new(2)]
        );
        assert!(broker.partitions_for("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_poll_returns_records_from_position() {
        let mut broker = SimulatedBroker::new();
        broker.create_topic("events", 1);
        produce_batch(&broker, 0, 5);

        broker.assign(vec![key(0)]).await.unwrap();
        broker.seek(&key(0), Offset::new(2)).await.unwrap();

        let batch = broker.poll(Duration::from_millis(10)).await.unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(batch[0].offset, Offset::new(2));
        assert_eq!(batch[2].offset, Offset::new(4));

        // Position advanced; nothing left.
        let batch = broker.poll(Duration::from_millis(10)).await.unwrap();
        assert!(batch.is_empty());
    }

    #[tokio::test]
    async fn test_max_poll_records_caps_batches() {
        let mut broker = SimulatedBroker::new().with_max_poll_records(2);
        broker.create_topic("events", 1);
        produce_batch(&broker, 0, 5);

        broker.assign(vec![key(0)]).await.unwrap();
        broker.seek(&key(0), Offset::new(0)).await.unwrap();

        for expected in [2, 2, 1, 0] {
            let batch = broker.poll(Duration::from_millis(10)).await.unwrap();
            assert_eq!(batch.len(), expected);
        }
    }

    #[tokio::test]
    async fn test_seek_beyond_end_fails_at_poll() {
        let mut broker = SimulatedBroker::new();
        broker.create_topic("events", 1);
        produce_batch(&broker, 0, 4);

        broker.assign(vec![key(0)]).await.unwrap();
        broker.seek(&key(0), Offset::new(21)).await.unwrap();

        let err = broker.poll(Duration::from_millis(10)).await.unwrap_err();
        assert_eq!(
            err,
            BrokerError::OffsetOutOfRange {
                partition: key(0),
                offset: Offset::new(21),
            }
        );
    }

    #[tokio::test]
    async fn test_expired_prefix_fails_at_poll_and_resets_to_new_start() {
        let mut broker = SimulatedBroker::new();
        broker.create_topic("events", 1);
        produce_batch(&broker, 0, 10);
        broker.expire_log_prefix("events", PartitionId::new(0), Offset::new(6));

        broker.assign(vec![key(0)]).await.unwrap();
        broker.seek(&key(0), Offset::new(2)).await.unwrap();

        let err = broker.poll(Duration::from_millis(10)).await.unwrap_err();
        assert!(matches!(err, BrokerError::OffsetOutOfRange { .. }));

        broker.seek_to_beginning(&[key(0)]).await.unwrap();
        assert_eq!(broker.position(&key(0)).await.unwrap(), Offset::new(6));

        let batch = broker.poll(Duration::from_millis(10)).await.unwrap();
        assert_eq!(batch.len(), 4);
        assert_eq!(batch[0].offset, Offset::new(6));
    }

    #[tokio::test]
    async fn test_operations_on_unassigned_partition_fail() {
        let mut broker = SimulatedBroker::new();
        broker.create_topic("events", 2);
        broker.assign(vec![key(0)]).await.unwrap();

        let err = broker.seek(&key(1), Offset::new(0)).await.unwrap_err();
        assert!(matches!(err, BrokerError::NotAssigned { .. }));
        let err = broker.position(&key(1)).await.unwrap_err();
        assert!(matches!(err, BrokerError::NotAssigned { .. }));
    }

    #[tokio::test]
    async fn test_clones_share_logs_but_not_positions() {
        let producer = SimulatedBroker::new();
        producer.create_topic("events", 1);

        let mut client = producer.clone();
        client.assign(vec![key(0)]).await.unwrap();
        client.seek(&key(0), Offset::new(0)).await.unwrap();

        // Produced through one handle, visible through the other.
        produce_batch(&producer, 0, 3);
        let batch = client.poll(Duration::from_millis(10)).await.unwrap();
        assert_eq!(batch.len(), 3);

        // The producing handle has no assignment of its own.
        assert!(producer.assignment.is_empty());
    }

    #[tokio::test]
    async fn test_outage_flag_is_shared_and_transient() {
        let control = SimulatedBroker::new();
        control.create_topic("events", 1);

        let mut client = control.clone();
        client.assign(vec![key(0)]).await.unwrap();

        control.set_unavailable(true);
        let err = client.poll(Duration::from_millis(10)).await.unwrap_err();
        assert!(matches!(err, BrokerError::Unavailable { .. }));

        control.set_unavailable(false);
        assert!(client.poll(Duration::from_millis(10)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_closed_handle_is_unavailable() {
        let mut broker = SimulatedBroker::new();
        broker.create_topic("events", 1);
        broker.assign(vec![key(0)]).await.unwrap();
        broker.close().await.unwrap();

        let err = broker.poll(Duration::from_millis(10)).await.unwrap_err();
        assert!(matches!(err, BrokerError::Unavailable { .. }));
    }
}
