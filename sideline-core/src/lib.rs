//! Sideline Core - Strongly-typed identifiers and record types.
//!
//! This crate provides the vocabulary shared by the sideline consumer
//! stack: offsets with an explicit "nothing finished" sentinel, partition
//! keys, consumer identities, and the record type handed to callers.
//!
//! # Design Principles
//!
//! - **Strongly-typed values**: an `Offset` cannot be confused with a
//!   partition index or a count.
//! - **Explicit sentinel**: `Offset::NONE` (-1) is one below the earliest
//!   real offset, so `last_finished.next()` is always the seek target.
//! - **No unsafe code**.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod record;
mod types;

pub use record::{Record, Timestamp};
pub use types::{ConsumerId, Offset, PartitionId, PartitionKey};
