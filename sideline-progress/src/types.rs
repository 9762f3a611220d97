//! Sideline request metadata stored alongside consumer offsets.
//!
//! A sideline request marks a span of the source topic that a virtual
//! consumer replays separately from the main pipeline. The core treats
//! the request body as opaque; it only stores and retrieves payloads.

use std::fmt;

use bytes::Bytes;

use crate::state::ConsumerState;

/// Whether a sideline request starts or stops a sidelined span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SidelineType {
    /// Begin sidelining: record where filtering started.
    Start,
    /// Stop sidelining: record where filtering ended.
    Stop,
}

/// Unique identifier of a sideline request.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SidelineRequestId(String);

impl SidelineRequestId {
    /// Creates a request id from a string.
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

impl fmt::Display for SidelineRequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An opaque sideline request body.
///
/// The triggering layer defines what this means (typically serialized
/// filter criteria); the core never inspects it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SidelineRequest {
    /// Serialized request body.
    pub payload: Bytes,
}

impl SidelineRequest {
    /// Creates a request from a serialized body.
    #[must_use]
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
        }
    }
}

/// Everything persisted for one sideline request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SidelinePayload {
    /// Start or stop.
    pub sideline_type: SidelineType,
    /// Request identity; the persistence key.
    pub id: SidelineRequestId,
    /// The opaque request body.
    pub request: SidelineRequest,
    /// Consumer state when the request began.
    pub starting_state: ConsumerState,
    /// Consumer state when the request ended, once known.
    pub ending_state: Option<ConsumerState>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use sideline_core::{Offset, PartitionId, PartitionKey};

    #[test]
    fn test_request_id() {
        let id = SidelineRequestId::new("req-7");
        assert_eq!(id.as_str(), "req-7");
        assert_eq!(format!("{id}"), "req-7");
    }

    #[test]
    fn test_payload_equality() {
        let state = ConsumerState::builder()
            .with_offset(
                PartitionKey::new("events", PartitionId::new(0)),
                Offset::new(3),
            )
            .build();

        let payload = SidelinePayload {
            sideline_type: SidelineType::Start,
            id: SidelineRequestId::new("req-1"),
            request: SidelineRequest::new("filter: tenant = 42"),
            starting_state: state.clone(),
            ending_state: None,
        };

        assert_eq!(payload.clone(), payload);
        assert_eq!(payload.starting_state, state);
        assert!(payload.ending_state.is_none());
    }
}
