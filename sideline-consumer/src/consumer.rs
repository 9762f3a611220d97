//! The sideline consumer state machine.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use sideline_core::{ConsumerId, Offset, PartitionKey, Record};
use sideline_progress::{ConsumerState, PartitionOffsetManager, PersistenceAdapter};
use tracing::{debug, info, warn};

use crate::assignment::assign_partitions;
use crate::broker::BrokerClient;
use crate::buffer::RecordBuffer;
use crate::clock::{Clock, SystemClock};
use crate::config::ConsumerConfig;
use crate::error::{BrokerError, ConsumerError, ConsumerResult};

/// How long one non-blocking fetch waits for the broker.
const POLL_TIMEOUT: Duration = Duration::from_millis(300);

/// Lifecycle of a [`Consumer`]: `New -> Open -> Closed`, `Closed` terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    New,
    Open,
    Closed,
}

/// Stateful consumer over the partitions its shard index owns.
///
/// # Driving model
///
/// One logical driver loop calls [`Consumer::next_record`],
/// [`Consumer::commit_offset`], and
/// [`Consumer::timed_flush_consumer_state`] serially. The consumer owns
/// one [`PartitionOffsetManager`] per partition exclusively; nothing else
/// mutates them.
///
/// # At-least-once
///
/// Records are started in broker order before being handed out and
/// finished whenever the caller acknowledges them, in any order. Flushing
/// persists each partition's highest contiguous acknowledged offset, so a
/// restart re-delivers exactly the unacknowledged suffix. Staged records
/// discarded by [`Consumer::close`] are re-delivered for the same reason.
pub struct Consumer {
    config: ConsumerConfig,
    persistence: Arc<dyn PersistenceAdapter>,
    broker: Box<dyn BrokerClient>,
    clock: Arc<dyn Clock>,
    /// One manager per owned partition; parent-owned, keyed by partition.
    managers: HashMap<PartitionKey, PartitionOffsetManager>,
    buffer: RecordBuffer,
    last_flush_at: Instant,
    lifecycle: Lifecycle,
}

impl Consumer {
    /// Creates a consumer in the `New` state.
    ///
    /// # Errors
    /// Returns [`ConsumerError::InvalidConfig`] if the configuration is
    /// inconsistent.
    pub fn new(
        config: ConsumerConfig,
        persistence: Arc<dyn PersistenceAdapter>,
        broker: Box<dyn BrokerClient>,
    ) -> ConsumerResult<Self> {
        config.validate()?;
        let capacity =
            usize::try_from(config.buffer_max_size).map_err(|_| ConsumerError::InvalidConfig {
                name: "buffer_max_size",
                reason: "exceeds addressable memory",
            })?;

        Ok(Self {
            config,
            persistence,
            broker,
            clock: Arc::new(SystemClock),
            managers: HashMap::new(),
            buffer: RecordBuffer::new(capacity),
            last_flush_at: Instant::now(),
            lifecycle: Lifecycle::New,
        })
    }

    /// Replaces the time source. Tests inject a simulated clock to drive
    /// the flush timer deterministically.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    /// Returns the consumer's stable identity.
    #[must_use]
    pub const fn consumer_id(&self) -> &ConsumerId {
        &self.config.consumer_id
    }

    fn ensure_open(&self, operation: &'static str) -> ConsumerResult<()> {
        if self.lifecycle == Lifecycle::Open {
            Ok(())
        } else {
            Err(ConsumerError::NotOpen { operation })
        }
    }

    /// Connects to the broker and initializes every owned partition.
    ///
    /// Startup protocol: query the topic's partition list, shard it by
    /// consumer index, statically assign the owned subset, then seek each
    /// partition to its persisted offset plus one (or to the earliest
    /// available offset when no state exists) and build its offset
    /// manager.
    ///
    /// # Errors
    /// Fails with [`ConsumerError::AlreadyOpen`] when called twice, or
    /// with broker/persistence errors from the startup protocol.
    pub async fn open(&mut self) -> ConsumerResult<()> {
        if self.lifecycle != Lifecycle::New {
            return Err(ConsumerError::AlreadyOpen);
        }

        self.persistence.open().await?;

        let mut partitions = self.broker.partitions_for(&self.config.topic).await?;
        partitions.sort_unstable();

        let owned = assign_partitions(
            &partitions,
            self.config.number_of_consumers,
            self.config.index_of_consumer,
        );
        let owned_keys: Vec<PartitionKey> = owned
            .into_iter()
            .map(|partition| PartitionKey::new(self.config.topic.clone(), partition))
            .collect();

        self.broker.assign(owned_keys.clone()).await?;

        for key in owned_keys {
            let committed = self
                .persistence
                .retrieve_consumer_offset(&self.config.consumer_id, key.partition_id)
                .await?;

            let last_finished = match committed {
                Some(committed) => {
                    // Resume one past the persisted commit.
                    self.broker.seek(&key, committed.next()).await?;
                    committed
                }
                None => {
                    // No state: start from the earliest available offset.
                    // "No state" and "nothing ever finished" are the same
                    // thing at rest, so the manager starts one below it.
                    self.broker
                        .seek_to_beginning(std::slice::from_ref(&key))
                        .await?;
                    let earliest = self.broker.position(&key).await?;
                    earliest.prev()
                }
            };

            debug!(
                partition = %key,
                last_finished = %last_finished,
                "initialized partition offset manager"
            );
            self.managers
                .insert(key.clone(), PartitionOffsetManager::new(key, last_finished));
        }

        self.last_flush_at = self.clock.now();
        self.lifecycle = Lifecycle::Open;
        info!(
            consumer_id = %self.config.consumer_id,
            topic = %self.config.topic,
            partitions = self.managers.len(),
            "consumer open"
        );
        Ok(())
    }

    /// Returns the next staged record, fetching a batch when the stage is
    /// empty. Returns `None` when a non-blocking fetch yields nothing.
    ///
    /// The record's offset is marked started on its partition's manager
    /// before it is handed to the caller.
    ///
    /// # Errors
    /// Propagates broker failures other than out-of-range positions,
    /// which are repaired internally by resetting the affected partition
    /// to its earliest available offset.
    pub async fn next_record(&mut self) -> ConsumerResult<Option<Record>> {
        self.ensure_open("next_record")?;

        if self.buffer.is_empty() {
            self.fill_buffer().await?;
        }

        while let Some(record) = self.buffer.poll() {
            if let Some(manager) = self.managers.get_mut(&record.partition) {
                manager.start_offset(record.offset);
                return Ok(Some(record));
            }
            // Unsubscribe purges the stage, so this should not happen.
            warn!(
                partition = %record.partition,
                offset = %record.offset,
                "dropping staged record for unowned partition"
            );
        }
        Ok(None)
    }

    /// Fetches one batch into the staging buffer, repairing any partition
    /// whose position the broker reports as out of range.
    async fn fill_buffer(&mut self) -> ConsumerResult<()> {
        // Each out-of-range error repairs exactly one partition, so the
        // retry loop is bounded by the number of owned partitions.
        let max_attempts = self.managers.len() + 1;
        for _ in 0..max_attempts {
            match self.broker.poll(POLL_TIMEOUT).await {
                Ok(records) => {
                    self.stage_records(records).await?;
                    return Ok(());
                }
                Err(BrokerError::OffsetOutOfRange { partition, offset }) => {
                    warn!(
                        partition = %partition,
                        offset = %offset,
                        "position out of range; resetting partition to earliest"
                    );
                    self.reset_partition_to_earliest(&partition).await?;
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }

    /// Stages a fetched batch. Records that do not fit are not lost: the
    /// broker position of each overflowing partition is rewound to its
    /// first unstaged offset, so the next fetch re-delivers them.
    async fn stage_records(&mut self, records: Vec<Record>) -> ConsumerResult<()> {
        let mut overflow: Vec<Record> = Vec::new();
        for record in records {
            if !overflow.is_empty() {
                overflow.push(record);
                continue;
            }
            if let Err(rejected) = self.buffer.put(record) {
                overflow.push(rejected);
            }
        }

        if !overflow.is_empty() {
            let mut rewind: BTreeMap<PartitionKey, Offset> = BTreeMap::new();
            for record in &overflow {
                // Batches are in log order per partition, so the first
                // overflowing record is the partition's resume point.
                rewind
                    .entry(record.partition.clone())
                    .or_insert(record.offset);
            }
            for (partition, offset) in rewind {
                self.broker.seek(&partition, offset).await?;
            }
        }
        Ok(())
    }

    /// Resets a single partition to the earliest available offset and
    /// rebuilds its manager with `last_finished = earliest - 1`. Other
    /// partitions are unaffected.
    async fn reset_partition_to_earliest(&mut self, partition: &PartitionKey) -> ConsumerResult<()> {
        if !self.managers.contains_key(partition) {
            warn!(partition = %partition, "out-of-range report for unowned partition ignored");
            return Ok(());
        }

        self.broker
            .seek_to_beginning(std::slice::from_ref(partition))
            .await?;
        let earliest = self.broker.position(partition).await?;

        self.managers.insert(
            partition.clone(),
            PartitionOffsetManager::new(partition.clone(), earliest.prev()),
        );
        info!(
            partition = %partition,
            earliest = %earliest,
            "partition reset to earliest available offset"
        );
        Ok(())
    }

    /// Acknowledges one offset of one partition. No persistence I/O
    /// happens here; the offset is folded into the partition's contiguous
    /// watermark and persisted by the next flush.
    ///
    /// Commits for unowned partitions are logged and ignored.
    ///
    /// # Errors
    /// Fails only on lifecycle misuse.
    pub fn commit_offset(&mut self, partition: &PartitionKey, offset: Offset) -> ConsumerResult<()> {
        self.ensure_open("commit_offset")?;

        if let Some(manager) = self.managers.get_mut(partition) {
            manager.finish_offset(offset);
        } else {
            warn!(
                partition = %partition,
                offset = %offset,
                "commit for unowned partition ignored"
            );
        }
        Ok(())
    }

    /// Acknowledges a record returned by [`Consumer::next_record`].
    ///
    /// # Errors
    /// Fails only on lifecycle misuse.
    pub fn commit_record(&mut self, record: &Record) -> ConsumerResult<()> {
        self.commit_offset(&record.partition, record.offset)
    }

    fn snapshot(&self) -> ConsumerState {
        let mut builder = ConsumerState::builder();
        for (partition, manager) in &self.managers {
            builder = builder.with_offset(partition.clone(), manager.last_finished_offset());
        }
        builder.build()
    }

    /// Persists every partition's last finished offset and returns the
    /// snapshot that was written.
    ///
    /// # Errors
    /// Propagates persistence failures; a partially written snapshot is
    /// not considered flushed.
    pub async fn flush_consumer_state(&mut self) -> ConsumerResult<ConsumerState> {
        self.ensure_open("flush_consumer_state")?;

        let state = self.snapshot();
        for (partition, offset) in state.iter() {
            self.persistence
                .persist_consumer_offset(&self.config.consumer_id, partition.partition_id, offset)
                .await?;
        }
        debug!(
            consumer_id = %self.config.consumer_id,
            partitions = state.len(),
            "flushed consumer state"
        );
        Ok(state)
    }

    /// Flushes if auto-commit is enabled and the configured interval has
    /// elapsed since the last flush (or since open). Returns the snapshot
    /// when a flush happened.
    ///
    /// # Errors
    /// Propagates persistence failures. The flush timer is only advanced
    /// after a successful flush, so the next call retries.
    pub async fn timed_flush_consumer_state(&mut self) -> ConsumerResult<Option<ConsumerState>> {
        self.ensure_open("timed_flush_consumer_state")?;

        if !self.config.consumer_state_auto_commit {
            return Ok(None);
        }

        let now = self.clock.now();
        if now.duration_since(self.last_flush_at) < self.config.consumer_state_auto_commit_interval
        {
            return Ok(None);
        }

        let state = self.flush_consumer_state().await?;
        self.last_flush_at = self.clock.now();
        Ok(Some(state))
    }

    /// Returns a live snapshot without persisting anything.
    ///
    /// # Errors
    /// Fails only on lifecycle misuse.
    pub fn current_state(&self) -> ConsumerResult<ConsumerState> {
        self.ensure_open("current_state")?;
        Ok(self.snapshot())
    }

    /// Returns the currently owned partitions.
    ///
    /// # Errors
    /// Fails only on lifecycle misuse.
    pub fn get_assigned_partitions(&self) -> ConsumerResult<BTreeSet<PartitionKey>> {
        self.ensure_open("get_assigned_partitions")?;
        Ok(self.managers.keys().cloned().collect())
    }

    /// Stops consuming one partition: drops its offset manager, removes
    /// it from the broker assignment, and discards its staged records.
    /// Returns `false` when the partition was not owned. The partition's
    /// persisted offset is left in place.
    ///
    /// # Errors
    /// Propagates broker failures from shrinking the assignment.
    pub async fn unsubscribe_topic_partition(
        &mut self,
        partition: &PartitionKey,
    ) -> ConsumerResult<bool> {
        self.ensure_open("unsubscribe_topic_partition")?;

        if self.managers.remove(partition).is_none() {
            return Ok(false);
        }

        self.buffer.retain(|record| record.partition != *partition);

        let mut remaining: Vec<PartitionKey> = self.managers.keys().cloned().collect();
        remaining.sort_unstable();
        self.broker.assign(remaining).await?;

        info!(partition = %partition, "unsubscribed from partition");
        Ok(true)
    }

    /// Permanently decommissions this consumer identity: flushes once to
    /// leave durable state consistent, then clears every persisted offset
    /// for this `ConsumerId`, including partitions no longer assigned.
    ///
    /// # Errors
    /// Propagates persistence failures.
    pub async fn remove_consumer_state(&mut self) -> ConsumerResult<()> {
        self.ensure_open("remove_consumer_state")?;

        self.flush_consumer_state().await?;
        self.persistence
            .clear_consumer_state(&self.config.consumer_id)
            .await?;
        info!(
            consumer_id = %self.config.consumer_id,
            "removed all persisted consumer state"
        );
        Ok(())
    }

    /// Releases broker and adapter resources. Idempotent.
    ///
    /// Staged records that were never handed out are discarded without
    /// acknowledgement; the next open re-delivers from `last_finished + 1`.
    ///
    /// # Errors
    /// Propagates broker or adapter close failures.
    pub async fn close(&mut self) -> ConsumerResult<()> {
        if self.lifecycle == Lifecycle::Closed {
            return Ok(());
        }

        let was_open = self.lifecycle == Lifecycle::Open;
        self.buffer.clear();
        self.managers.clear();
        self.lifecycle = Lifecycle::Closed;

        if was_open {
            self.broker.close().await?;
            self.persistence.close().await?;
        }
        info!(consumer_id = %self.config.consumer_id, "consumer closed");
        Ok(())
    }
}
