//! Error types for datastore operations.

use crate::key::Key;
use crate::types::TransactionId;
use thiserror::Error;

/// Result type for datastore operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during datastore operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An entity group changed after the transaction first observed it.
    ///
    /// Only ever raised at commit time.
    #[error("concurrent modification of entity group {group}")]
    ConcurrentModification {
        /// Root key of the conflicting entity group.
        group: Key,
    },

    /// The transaction handle is unknown, committed, or rolled back.
    #[error("transaction {0} is not active")]
    TransactionNotActive(TransactionId),

    /// A key was malformed or incomplete where a complete key is required.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// The query cannot be executed as written.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// The service could not be reached or failed transiently.
    #[error("datastore unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Creates an invalid key error.
    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey(message.into())
    }

    /// Creates an invalid query error.
    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self::InvalidQuery(message.into())
    }

    /// Returns true for optimistic-concurrency failures.
    #[must_use]
    pub fn is_concurrent_modification(&self) -> bool {
        matches!(self, Self::ConcurrentModification { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_is_detected() {
        let err = StoreError::ConcurrentModification {
            group: Key::new("Thing", 1),
        };
        assert!(err.is_concurrent_modification());
        assert!(!StoreError::invalid_key("empty kind").is_concurrent_modification());
    }

    #[test]
    fn display_names_group() {
        let err = StoreError::ConcurrentModification {
            group: Key::new("Thing", 7),
        };
        assert_eq!(err.to_string(), "concurrent modification of entity group Thing(7)");
    }
}
