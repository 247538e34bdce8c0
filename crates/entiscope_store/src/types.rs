//! Core type definitions for the datastore interface.

use std::fmt;

/// Unique identifier for a datastore transaction.
///
/// Transaction IDs are monotonically increasing and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Creates a new transaction ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn:{}", self.0)
    }
}

/// Native transaction handle issued by [`crate::Datastore::begin_transaction`].
///
/// The handle is a plain token; all transaction state lives in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxnHandle(TransactionId);

impl TxnHandle {
    /// Wraps a transaction ID.
    #[must_use]
    pub const fn new(id: TransactionId) -> Self {
        Self(id)
    }

    /// Returns the transaction ID.
    #[must_use]
    pub const fn id(self) -> TransactionId {
        self.0
    }
}

impl fmt::Display for TxnHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_id_ordering() {
        let t1 = TransactionId::new(1);
        let t2 = TransactionId::new(2);
        assert!(t1 < t2);
    }

    #[test]
    fn handle_display() {
        let handle = TxnHandle::new(TransactionId::new(42));
        assert_eq!(format!("{handle}"), "txn:42");
        assert_eq!(handle.id().as_u64(), 42);
    }
}
