//! Persistence error types.

use thiserror::Error;

/// Result type for persistence operations.
pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Errors that can occur while talking to a persistence backend.
///
/// Any adapter operation may fail; failures propagate to the caller of the
/// consumer operation that invoked them. State touched by a failed flush
/// is not considered persisted.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PersistenceError {
    /// I/O error during a storage operation.
    #[error("persistence I/O error: {operation}: {message}")]
    Io {
        /// The operation that failed.
        operation: &'static str,
        /// Error message from the backend.
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PersistenceError::Io {
            operation: "persist_consumer_offset",
            message: "connection refused".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("persist_consumer_offset"));
        assert!(msg.contains("connection refused"));
    }

    #[test]
    fn test_error_equality() {
        let err1 = PersistenceError::Io {
            operation: "open",
            message: "boom".into(),
        };
        let err2 = PersistenceError::Io {
            operation: "open",
            message: "boom".into(),
        };
        assert_eq!(err1, err2);
    }
}
