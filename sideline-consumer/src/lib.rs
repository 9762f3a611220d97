//! Stateful sideline consumer over a subset of a topic's partitions.
//!
//! A sideline consumer pulls records from the partitions its shard index
//! owns, hands them to the caller one at a time, and accepts
//! acknowledgements that arrive out of order. For every owned partition it
//! maintains a `PartitionOffsetManager`, and on a time-triggered cadence it
//! persists each partition's highest contiguous acknowledged offset so a
//! restart resumes exactly at the unacknowledged suffix.
//!
//! # Assignment
//!
//! Partition ownership is static: [`assign_partitions`] shards the sorted
//! partition list across `number_of_consumers` peers by `index_of_consumer`.
//! There is no broker-side group coordination; two peers with the same
//! index would double-consume.
//!
//! # Lifecycle
//!
//! `New -> Open -> Closed`. [`Consumer::open`] queries the partition list,
//! assigns the owned subset, and seeks each partition to its persisted
//! offset (or the earliest available offset when none exists). A persisted
//! offset the broker no longer holds is detected at the first fetch and
//! repaired by resetting only that partition to earliest. [`Consumer::close`]
//! is idempotent and discards staged, unacknowledged records; the broker
//! log re-delivers them on the next open.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use sideline_consumer::{Consumer, ConsumerConfig, SimulatedBroker};
//! use sideline_progress::InMemoryPersistenceAdapter;
//!
//! let config = ConsumerConfig::new(
//!     vec!["localhost:9092".into()],
//!     "my-consumer",
//!     "events",
//! );
//! let adapter = Arc::new(InMemoryPersistenceAdapter::new());
//! let mut broker = SimulatedBroker::new();
//! broker.create_topic("events", 2);
//!
//! let mut consumer = Consumer::new(config, adapter, Box::new(broker))?;
//! consumer.open().await?;
//! while let Some(record) = consumer.next_record().await? {
//!     // ... emit downstream, later:
//!     consumer.commit_record(&record)?;
//!     consumer.timed_flush_consumer_state().await?;
//! }
//! consumer.close().await?;
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod assignment;
mod broker;
mod buffer;
mod clock;
mod config;
mod consumer;
mod error;

pub use assignment::assign_partitions;
pub use broker::{BrokerClient, SimulatedBroker};
pub use buffer::RecordBuffer;
pub use clock::{Clock, SimulatedClock, SystemClock};
pub use config::ConsumerConfig;
pub use consumer::Consumer;
pub use error::{BrokerError, BrokerResult, ConsumerError, ConsumerResult};
