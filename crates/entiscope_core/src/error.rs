//! Error types for entiscope core.

use entiscope_store::{Key, StoreError};
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in entiscope core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Datastore error other than a concurrency conflict.
    #[error("datastore error: {0}")]
    Store(StoreError),

    /// An entity group changed between first read and commit.
    ///
    /// The transactor retries units of work that fail with this error.
    #[error("concurrent modification of entity group {group}")]
    ConcurrentModification {
        /// Root key of the conflicting group.
        group: Key,
    },

    /// A `Mandatory` unit of work ran without an active transaction.
    #[error("mandatory transaction but no transaction present")]
    NoTransaction,

    /// A `Never` unit of work ran inside an active transaction.
    #[error("transaction present but propagation forbids one")]
    TransactionPresent,

    /// The API was used incorrectly.
    #[error("programming error: {message}")]
    Programming {
        /// Description of the misuse.
        message: String,
    },

    /// Identity metadata for a kind is invalid.
    #[error("invalid metadata for kind {kind}: {message}")]
    InvalidMetadata {
        /// Kind being registered.
        kind: String,
        /// Description of the problem.
        message: String,
    },

    /// The entity type was never registered.
    #[error("entity type {type_name} is not registered")]
    NotRegistered {
        /// Rust type name.
        type_name: &'static str,
    },

    /// Converting between an entity and its properties failed.
    #[error("translation error: {message}")]
    Translation {
        /// Description of the failure.
        message: String,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },

    /// Error raised by application code inside a unit of work.
    #[error("unit of work failed: {0}")]
    Work(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ConcurrentModification { group } => Self::ConcurrentModification { group },
            other => Self::Store(other),
        }
    }
}

impl CoreError {
    /// Creates a programming error.
    pub fn programming(message: impl Into<String>) -> Self {
        Self::Programming {
            message: message.into(),
        }
    }

    /// Creates an invalid metadata error.
    pub fn invalid_metadata(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidMetadata {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Creates a translation error.
    pub fn translation(message: impl Into<String>) -> Self {
        Self::Translation {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Wraps an application error raised inside a unit of work.
    pub fn work(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Work(err.into())
    }

    /// Returns true for optimistic-concurrency conflicts.
    #[must_use]
    pub fn is_concurrent_modification(&self) -> bool {
        matches!(self, Self::ConcurrentModification { .. })
    }

    /// Returns true for errors caused by API misuse, which are never retried.
    #[must_use]
    pub fn is_programming_error(&self) -> bool {
        matches!(
            self,
            Self::Programming { .. }
                | Self::NoTransaction
                | Self::TransactionPresent
                | Self::InvalidMetadata { .. }
                | Self::NotRegistered { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_conflict_maps_to_concurrent_modification() {
        let err: CoreError = StoreError::ConcurrentModification {
            group: Key::new("Thing", 1),
        }
        .into();
        assert!(err.is_concurrent_modification());
        assert!(!err.is_programming_error());
    }

    #[test]
    fn other_store_errors_stay_wrapped() {
        let err: CoreError = StoreError::invalid_key("bad").into();
        assert!(matches!(err, CoreError::Store(StoreError::InvalidKey(_))));
    }

    #[test]
    fn programming_errors_are_classified() {
        assert!(CoreError::NoTransaction.is_programming_error());
        assert!(CoreError::programming("x").is_programming_error());
        assert!(!CoreError::translation("x").is_programming_error());
    }

    #[test]
    fn work_error_keeps_message() {
        let err = CoreError::work("boom");
        assert_eq!(err.to_string(), "unit of work failed: boom");
    }
}
