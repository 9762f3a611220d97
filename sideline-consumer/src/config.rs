//! Consumer configuration.

use std::time::Duration;

use sideline_core::ConsumerId;

use crate::error::{ConsumerError, ConsumerResult};

/// Default flush interval when auto-commit is enabled.
const DEFAULT_AUTO_COMMIT_INTERVAL_MS: u64 = 15_000;

/// Default capacity of the staging buffer, in records.
const DEFAULT_BUFFER_MAX_SIZE: u64 = 10_000;

/// Configuration for a sideline [`crate::Consumer`].
///
/// Broker hosts, consumer identity, and the source topic are required;
/// everything else has a default. Setters follow the builder pattern so a
/// config reads as one expression.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Broker `host:port` entries, in connection-preference order.
    pub broker_hosts: Vec<String>,
    /// Stable identity keying persisted state.
    pub consumer_id: ConsumerId,
    /// The single source topic.
    pub topic: String,
    /// How many consumer peers share the topic.
    pub number_of_consumers: u32,
    /// This peer's shard index, `0 <= index < number_of_consumers`.
    pub index_of_consumer: u32,
    /// Whether the timed flush persists state.
    pub consumer_state_auto_commit: bool,
    /// Minimum time between timed flushes.
    pub consumer_state_auto_commit_interval: Duration,
    /// Capacity of the staging buffer, in records.
    pub buffer_max_size: u64,
}

impl ConsumerConfig {
    /// Creates a config with the required options and defaults for the
    /// rest: one consumer at index 0, auto-commit off with a 15s interval,
    /// a 10,000-record staging buffer.
    #[must_use]
    pub fn new(
        broker_hosts: Vec<String>,
        consumer_id: impl Into<String>,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            broker_hosts,
            consumer_id: ConsumerId::new(consumer_id),
            topic: topic.into(),
            number_of_consumers: 1,
            index_of_consumer: 0,
            consumer_state_auto_commit: false,
            consumer_state_auto_commit_interval: Duration::from_millis(
                DEFAULT_AUTO_COMMIT_INTERVAL_MS,
            ),
            buffer_max_size: DEFAULT_BUFFER_MAX_SIZE,
        }
    }

    /// Sets how many consumer peers share the topic.
    #[must_use]
    pub const fn with_number_of_consumers(mut self, count: u32) -> Self {
        self.number_of_consumers = count;
        self
    }

    /// Sets this peer's shard index.
    #[must_use]
    pub const fn with_index_of_consumer(mut self, index: u32) -> Self {
        self.index_of_consumer = index;
        self
    }

    /// Enables or disables the timed flush.
    #[must_use]
    pub const fn with_auto_commit(mut self, enabled: bool) -> Self {
        self.consumer_state_auto_commit = enabled;
        self
    }

    /// Sets the minimum time between timed flushes, in milliseconds.
    #[must_use]
    pub const fn with_auto_commit_interval_ms(mut self, millis: u64) -> Self {
        self.consumer_state_auto_commit_interval = Duration::from_millis(millis);
        self
    }

    /// Sets the staging buffer capacity. Accepts any unsigned integer
    /// width, so both 32- and 64-bit inputs work.
    #[must_use]
    pub fn with_buffer_max_size(mut self, size: impl Into<u64>) -> Self {
        self.buffer_max_size = size.into();
        self
    }

    /// Checks the configuration for internal consistency.
    ///
    /// # Errors
    /// Returns [`ConsumerError::InvalidConfig`] naming the offending
    /// option.
    pub fn validate(&self) -> ConsumerResult<()> {
        if self.broker_hosts.is_empty() {
            return Err(ConsumerError::InvalidConfig {
                name: "broker_hosts",
                reason: "at least one broker host is required",
            });
        }
        if self.consumer_id.as_str().is_empty() {
            return Err(ConsumerError::InvalidConfig {
                name: "consumer_id",
                reason: "must not be empty",
            });
        }
        if self.topic.is_empty() {
            return Err(ConsumerError::InvalidConfig {
                name: "topic",
                reason: "must not be empty",
            });
        }
        if self.number_of_consumers == 0 {
            return Err(ConsumerError::InvalidConfig {
                name: "number_of_consumers",
                reason: "must be at least 1",
            });
        }
        if self.index_of_consumer >= self.number_of_consumers {
            return Err(ConsumerError::InvalidConfig {
                name: "index_of_consumer",
                reason: "must be less than number_of_consumers",
            });
        }
        if self.buffer_max_size == 0 {
            return Err(ConsumerError::InvalidConfig {
                name: "buffer_max_size",
                reason: "must be positive",
            });
        }
        Ok(())
    }
}
