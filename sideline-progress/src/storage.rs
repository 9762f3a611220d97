//! Persistence adapter contract and the in-memory reference adapter.
//!
//! The consumer core depends only on this capability set, not on any
//! concrete backing store. Implementations range from the in-memory
//! adapter here (testing only) to external key/value stores.

#![allow(clippy::significant_drop_tightening)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sideline_core::{ConsumerId, Offset, PartitionId};

use crate::error::{PersistenceError, PersistenceResult};
use crate::types::{SidelinePayload, SidelineRequestId};

// -----------------------------------------------------------------------------
// Persistence Adapter Trait
// -----------------------------------------------------------------------------

/// Storage capability set consumed by the sideline consumer.
///
/// The logical keyspace is `offsets/<consumer_id>/<partition>` for
/// committed offsets plus `sideline/<request_id>` for opaque request
/// payloads; the physical layout is adapter-specific.
///
/// An adapter is exclusively owned by the consumer that opened it.
/// Concurrent access from multiple consumers for the same `ConsumerId`
/// is a configuration bug, not a supported mode.
#[async_trait]
pub trait PersistenceAdapter: Send + Sync {
    /// Prepares the backing store. Re-opening is non-destructive.
    async fn open(&self) -> PersistenceResult<()>;

    /// Releases backing-store resources.
    async fn close(&self) -> PersistenceResult<()>;

    /// Stores the committed offset for one `(consumer, partition)` pair.
    async fn persist_consumer_offset(
        &self,
        consumer_id: &ConsumerId,
        partition_id: PartitionId,
        offset: Offset,
    ) -> PersistenceResult<()>;

    /// Retrieves the committed offset for one `(consumer, partition)`
    /// pair, or `None` if nothing was ever persisted.
    async fn retrieve_consumer_offset(
        &self,
        consumer_id: &ConsumerId,
        partition_id: PartitionId,
    ) -> PersistenceResult<Option<Offset>>;

    /// Removes the committed offset for one `(consumer, partition)` pair.
    async fn clear_consumer_offset(
        &self,
        consumer_id: &ConsumerId,
        partition_id: PartitionId,
    ) -> PersistenceResult<()>;

    /// Removes every committed offset stored for `consumer_id`, including
    /// partitions the consumer no longer owns.
    async fn clear_consumer_state(&self, consumer_id: &ConsumerId) -> PersistenceResult<()>;

    /// Stores a sideline request payload, keyed by its request id.
    async fn persist_sideline_request(&self, payload: SidelinePayload) -> PersistenceResult<()>;

    /// Retrieves a sideline request payload by request id.
    async fn retrieve_sideline_request(
        &self,
        id: &SidelineRequestId,
    ) -> PersistenceResult<Option<SidelinePayload>>;

    /// Removes a sideline request payload.
    async fn clear_sideline_request(&self, id: &SidelineRequestId) -> PersistenceResult<()>;

    /// Lists the ids of every stored sideline request.
    async fn list_sideline_requests(&self) -> PersistenceResult<Vec<SidelineRequestId>>;
}

// -----------------------------------------------------------------------------
// Fault Configuration
// -----------------------------------------------------------------------------

/// Fault configuration for the in-memory adapter.
///
/// Write-side operations (persist/clear) and read-side operations
/// (retrieve/list) fail independently; forced failures are one-shot.
#[derive(Debug, Clone, Default)]
pub struct PersistenceFaultConfig {
    /// Probability of write-side operations failing (0.0 - 1.0).
    pub persist_fail_rate: f64,
    /// Probability of read-side operations failing (0.0 - 1.0).
    pub retrieve_fail_rate: f64,
    /// Force the next write-side operation to fail (one-shot).
    pub force_persist_fail: bool,
    /// Force the next read-side operation to fail (one-shot).
    pub force_retrieve_fail: bool,
}

impl PersistenceFaultConfig {
    /// No faults (all operations succeed).
    #[must_use]
    pub const fn none() -> Self {
        Self {
            persist_fail_rate: 0.0,
            retrieve_fail_rate: 0.0,
            force_persist_fail: false,
            force_retrieve_fail: false,
        }
    }

    /// Flaky configuration for stress testing.
    #[must_use]
    pub const fn flaky() -> Self {
        Self {
            persist_fail_rate: 0.05,
            retrieve_fail_rate: 0.05,
            force_persist_fail: false,
            force_retrieve_fail: false,
        }
    }

    /// Builder: set the write-side fail rate.
    #[must_use]
    pub const fn with_persist_fail_rate(mut self, rate: f64) -> Self {
        self.persist_fail_rate = rate;
        self
    }

    /// Builder: set the read-side fail rate.
    #[must_use]
    pub const fn with_retrieve_fail_rate(mut self, rate: f64) -> Self {
        self.retrieve_fail_rate = rate;
        self
    }
}

// -----------------------------------------------------------------------------
// In-Memory Persistence Adapter
// -----------------------------------------------------------------------------

/// In-memory persistence adapter.
///
/// Useful for tests; NOT for production use, as all state is lost between
/// process restarts. Clones share state via `Arc`, so a test can hand one
/// handle to the consumer and inspect the store through another.
/// Supports deterministic fault injection for exercising error paths.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPersistenceAdapter {
    /// "Persisted" consumer offsets, keyed by consumer and partition.
    offsets: Arc<Mutex<HashMap<(ConsumerId, PartitionId), Offset>>>,
    /// "Persisted" sideline request payloads, keyed by request id.
    sideline_requests: Arc<Mutex<HashMap<SidelineRequestId, SidelinePayload>>>,
    /// Fault configuration.
    fault_config: Arc<Mutex<PersistenceFaultConfig>>,
    /// RNG seed for deterministic faults.
    seed: u64,
    /// Operation counter for deterministic RNG.
    counter: Arc<AtomicU64>,
    /// Successful offset writes, for asserting flush cadence in tests.
    offset_persist_count: Arc<AtomicU64>,
}

impl InMemoryPersistenceAdapter {
    /// Creates a new adapter with no faults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an adapter with fault injection.
    #[must_use]
    pub fn with_faults(seed: u64, config: PersistenceFaultConfig) -> Self {
        Self {
            offsets: Arc::new(Mutex::new(HashMap::new())),
            sideline_requests: Arc::new(Mutex::new(HashMap::new())),
            fault_config: Arc::new(Mutex::new(config)),
            seed,
            counter: Arc::new(AtomicU64::new(0)),
            offset_persist_count: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Returns the fault config for modification.
    ///
    /// # Panics
    /// Panics if the mutex is poisoned.
    pub fn fault_config(&self) -> std::sync::MutexGuard<'_, PersistenceFaultConfig> {
        self.fault_config.lock().expect("fault config lock poisoned")
    }

    /// Number of offsets currently stored (bypasses faults, for tests).
    ///
    /// # Panics
    /// Panics if the mutex is poisoned.
    #[must_use]
    pub fn stored_offset_count(&self) -> usize {
        self.offsets.lock().expect("offsets lock poisoned").len()
    }

    /// Number of successful `persist_consumer_offset` calls so far.
    #[must_use]
    pub fn offset_persist_count(&self) -> u64 {
        self.offset_persist_count.load(Ordering::Relaxed)
    }

    /// Deterministic RNG using the `(seed + counter) * M` formula, so the
    /// same seed replays the same fault pattern.
    fn should_inject_fault(&self, rate: f64) -> bool {
        if rate <= 0.0 {
            return false;
        }
        if rate >= 1.0 {
            return true;
        }
        let counter = self.counter.fetch_add(1, Ordering::Relaxed);
        let hash = self
            .seed
            .wrapping_add(counter)
            .wrapping_mul(0x9e37_79b9_7f4a_7c15);
        #[allow(clippy::cast_precision_loss)]
        let normalized = (hash as f64) / (u64::MAX as f64);
        normalized < rate
    }

    fn check_persist_fault(&self, operation: &'static str) -> PersistenceResult<()> {
        {
            let mut config = self.fault_config.lock().expect("lock poisoned");
            if config.force_persist_fail {
                config.force_persist_fail = false;
                return Err(PersistenceError::Io {
                    operation,
                    message: "simulated failure (forced)".into(),
                });
            }
        }
        let rate = self.fault_config.lock().expect("lock poisoned").persist_fail_rate;
        if self.should_inject_fault(rate) {
            return Err(PersistenceError::Io {
                operation,
                message: "simulated failure (random)".into(),
            });
        }
        Ok(())
    }

    fn check_retrieve_fault(&self, operation: &'static str) -> PersistenceResult<()> {
        {
            let mut config = self.fault_config.lock().expect("lock poisoned");
            if config.force_retrieve_fail {
                config.force_retrieve_fail = false;
                return Err(PersistenceError::Io {
                    operation,
                    message: "simulated failure (forced)".into(),
                });
            }
        }
        let rate = self.fault_config.lock().expect("lock poisoned").retrieve_fail_rate;
        if self.should_inject_fault(rate) {
            return Err(PersistenceError::Io {
                operation,
                message: "simulated failure (random)".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl PersistenceAdapter for InMemoryPersistenceAdapter {
    async fn open(&self) -> PersistenceResult<()> {
        // Re-opening is non-destructive; the maps already exist.
        Ok(())
    }

    async fn close(&self) -> PersistenceResult<()> {
        self.offsets.lock().expect("offsets lock poisoned").clear();
        self.sideline_requests
            .lock()
            .expect("sideline lock poisoned")
            .clear();
        Ok(())
    }

    async fn persist_consumer_offset(
        &self,
        consumer_id: &ConsumerId,
        partition_id: PartitionId,
        offset: Offset,
    ) -> PersistenceResult<()> {
        self.check_persist_fault("persist_consumer_offset")?;

        let mut offsets = self.offsets.lock().expect("offsets lock poisoned");
        offsets.insert((consumer_id.clone(), partition_id), offset);
        self.offset_persist_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn retrieve_consumer_offset(
        &self,
        consumer_id: &ConsumerId,
        partition_id: PartitionId,
    ) -> PersistenceResult<Option<Offset>> {
        self.check_retrieve_fault("retrieve_consumer_offset")?;

        let offsets = self.offsets.lock().expect("offsets lock poisoned");
        Ok(offsets.get(&(consumer_id.clone(), partition_id)).copied())
    }

    async fn clear_consumer_offset(
        &self,
        consumer_id: &ConsumerId,
        partition_id: PartitionId,
    ) -> PersistenceResult<()> {
        self.check_persist_fault("clear_consumer_offset")?;

        let mut offsets = self.offsets.lock().expect("offsets lock poisoned");
        offsets.remove(&(consumer_id.clone(), partition_id));
        Ok(())
    }

    async fn clear_consumer_state(&self, consumer_id: &ConsumerId) -> PersistenceResult<()> {
        self.check_persist_fault("clear_consumer_state")?;

        let mut offsets = self.offsets.lock().expect("offsets lock poisoned");
        offsets.retain(|(stored_id, _), _| stored_id != consumer_id);
        Ok(())
    }

    async fn persist_sideline_request(&self, payload: SidelinePayload) -> PersistenceResult<()> {
        self.check_persist_fault("persist_sideline_request")?;

        let mut requests = self
            .sideline_requests
            .lock()
            .expect("sideline lock poisoned");
        requests.insert(payload.id.clone(), payload);
        Ok(())
    }

    async fn retrieve_sideline_request(
        &self,
        id: &SidelineRequestId,
    ) -> PersistenceResult<Option<SidelinePayload>> {
        self.check_retrieve_fault("retrieve_sideline_request")?;

        let requests = self
            .sideline_requests
            .lock()
            .expect("sideline lock poisoned");
        Ok(requests.get(id).cloned())
    }

    async fn clear_sideline_request(&self, id: &SidelineRequestId) -> PersistenceResult<()> {
        self.check_persist_fault("clear_sideline_request")?;

        let mut requests = self
            .sideline_requests
            .lock()
            .expect("sideline lock poisoned");
        requests.remove(id);
        Ok(())
    }

    async fn list_sideline_requests(&self) -> PersistenceResult<Vec<SidelineRequestId>> {
        self.check_retrieve_fault("list_sideline_requests")?;

        let requests = self
            .sideline_requests
            .lock()
            .expect("sideline lock poisoned");
        Ok(requests.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ConsumerState;
    use crate::types::{SidelineRequest, SidelineType};
    use sideline_core::PartitionKey;

    fn consumer() -> ConsumerId {
        ConsumerId::new("test-consumer")
    }

    #[tokio::test]
    async fn test_offset_roundtrip() {
        let adapter = InMemoryPersistenceAdapter::new();
        adapter.open().await.unwrap();

        let id = consumer();
        let partition = PartitionId::new(0);

        // Nothing stored initially.
        let stored = adapter.retrieve_consumer_offset(&id, partition).await.unwrap();
        assert!(stored.is_none());

        adapter
            .persist_consumer_offset(&id, partition, Offset::new(42))
            .await
            .unwrap();
        let stored = adapter.retrieve_consumer_offset(&id, partition).await.unwrap();
        assert_eq!(stored, Some(Offset::new(42)));

        // Overwrite.
        adapter
            .persist_consumer_offset(&id, partition, Offset::new(43))
            .await
            .unwrap();
        let stored = adapter.retrieve_consumer_offset(&id, partition).await.unwrap();
        assert_eq!(stored, Some(Offset::new(43)));

        // Clear.
        adapter.clear_consumer_offset(&id, partition).await.unwrap();
        let stored = adapter.retrieve_consumer_offset(&id, partition).await.unwrap();
        assert!(stored.is_none());
    }

    #[tokio::test]
    async fn test_clear_consumer_state_removes_all_partitions() {
        let adapter = InMemoryPersistenceAdapter::new();
        let id = consumer();
        let other = ConsumerId::new("other-consumer");

        for p in 0..4 {
            adapter
                .persist_consumer_offset(&id, PartitionId::new(p), Offset::new(i64::from(p)))
                .await
                .unwrap();
        }
        adapter
            .persist_consumer_offset(&other, PartitionId::new(0), Offset::new(99))
            .await
            .unwrap();

        adapter.clear_consumer_state(&id).await.unwrap();

        for p in 0..4 {
            let stored = adapter
                .retrieve_consumer_offset(&id, PartitionId::new(p))
                .await
                .unwrap();
            assert!(stored.is_none(), "partition {p} should be cleared");
        }
        // Other consumer untouched.
        let stored = adapter
            .retrieve_consumer_offset(&other, PartitionId::new(0))
            .await
            .unwrap();
        assert_eq!(stored, Some(Offset::new(99)));
    }

    #[tokio::test]
    async fn test_close_clears_everything() {
        let adapter = InMemoryPersistenceAdapter::new();
        let id = consumer();

        adapter
            .persist_consumer_offset(&id, PartitionId::new(0), Offset::new(1))
            .await
            .unwrap();
        adapter
            .persist_sideline_request(SidelinePayload {
                sideline_type: SidelineType::Start,
                id: SidelineRequestId::new("req-1"),
                request: SidelineRequest::new("body"),
                starting_state: ConsumerState::default(),
                ending_state: None,
            })
            .await
            .unwrap();

        adapter.close().await.unwrap();

        let stored = adapter
            .retrieve_consumer_offset(&id, PartitionId::new(0))
            .await
            .unwrap();
        assert!(stored.is_none());
        assert!(adapter.list_sideline_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sideline_request_crud() {
        let adapter = InMemoryPersistenceAdapter::new();

        let starting_state = ConsumerState::builder()
            .with_offset(
                PartitionKey::new("events", PartitionId::new(0)),
                Offset::new(7),
            )
            .build();
        let payload = SidelinePayload {
            sideline_type: SidelineType::Start,
            id: SidelineRequestId::new("req-1"),
            request: SidelineRequest::new("tenant = 42"),
            starting_state,
            ending_state: None,
        };

        adapter.persist_sideline_request(payload.clone()).await.unwrap();

        let stored = adapter
            .retrieve_sideline_request(&SidelineRequestId::new("req-1"))
            .await
            .unwrap();
        assert_eq!(stored, Some(payload));

        let ids = adapter.list_sideline_requests().await.unwrap();
        assert_eq!(ids, vec![SidelineRequestId::new("req-1")]);

        adapter
            .clear_sideline_request(&SidelineRequestId::new("req-1"))
            .await
            .unwrap();
        assert!(adapter.list_sideline_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let adapter1 = InMemoryPersistenceAdapter::new();
        let adapter2 = adapter1.clone();
        let id = consumer();

        adapter1
            .persist_consumer_offset(&id, PartitionId::new(0), Offset::new(5))
            .await
            .unwrap();

        let stored = adapter2
            .retrieve_consumer_offset(&id, PartitionId::new(0))
            .await
            .unwrap();
        assert_eq!(stored, Some(Offset::new(5)));
    }

    #[tokio::test]
    async fn test_forced_failures_are_one_shot() {
        let adapter = InMemoryPersistenceAdapter::new();
        let id = consumer();

        adapter.fault_config().force_persist_fail = true;
        let result = adapter
            .persist_consumer_offset(&id, PartitionId::new(0), Offset::new(1))
            .await;
        assert!(matches!(result, Err(PersistenceError::Io { .. })));

        // Next write succeeds.
        adapter
            .persist_consumer_offset(&id, PartitionId::new(0), Offset::new(1))
            .await
            .unwrap();

        adapter.fault_config().force_retrieve_fail = true;
        let result = adapter.retrieve_consumer_offset(&id, PartitionId::new(0)).await;
        assert!(result.is_err());

        let stored = adapter
            .retrieve_consumer_offset(&id, PartitionId::new(0))
            .await
            .unwrap();
        assert_eq!(stored, Some(Offset::new(1)));
    }

    #[tokio::test]
    async fn test_probabilistic_failure() {
        // 100% fail rate always fails.
        let adapter = InMemoryPersistenceAdapter::with_faults(
            42,
            PersistenceFaultConfig::none().with_retrieve_fail_rate(1.0),
        );
        let id = consumer();

        for _ in 0..10 {
            let result = adapter.retrieve_consumer_offset(&id, PartitionId::new(0)).await;
            assert!(result.is_err());
        }
    }
}
