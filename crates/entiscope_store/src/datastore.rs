//! Datastore trait definition.

use crate::error::StoreResult;
use crate::key::Key;
use crate::query::{FetchOptions, Query, ReadOptions};
use crate::types::TxnHandle;
use crate::value::RawEntity;
use std::collections::HashMap;

/// Lazily produced query results.
///
/// Each item is either an entity (keys-only queries yield entities with no
/// properties) or the error that stopped the scan.
pub type QueryResults = Box<dyn Iterator<Item = StoreResult<RawEntity>>>;

/// A key-value datastore with entity-group transactions.
///
/// Every operation takes an optional [`TxnHandle`]. Without one, writes
/// apply immediately. With one, reads observe committed state and enlist
/// the entity groups they touch; writes stay buffered until
/// [`Datastore::commit`].
///
/// # Invariants
///
/// - `get` omits keys with no stored entity
/// - `put` returns complete keys in input order
/// - `commit` fails with a concurrent-modification error if any enlisted
///   group changed after it was first observed
/// - `rollback` on a transaction whose commit failed succeeds
///
/// # Implementors
///
/// - [`crate::InMemoryDatastore`] - For testing and local use
pub trait Datastore: Send + Sync {
    /// Loads entities by key.
    ///
    /// # Errors
    ///
    /// Returns an error if a key is incomplete, the transaction is not
    /// active, or the store fails.
    fn get(
        &self,
        txn: Option<TxnHandle>,
        keys: &[Key],
        options: &ReadOptions,
    ) -> StoreResult<HashMap<Key, RawEntity>>;

    /// Stores entities, allocating ids for incomplete keys.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction is not active or the store fails.
    fn put(&self, txn: Option<TxnHandle>, entities: Vec<RawEntity>) -> StoreResult<Vec<Key>>;

    /// Deletes entities by key. Missing keys are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if a key is incomplete, the transaction is not
    /// active, or the store fails.
    fn delete(&self, txn: Option<TxnHandle>, keys: &[Key]) -> StoreResult<()>;

    /// Reserves `count` ids for keys shaped like `incomplete`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    fn allocate_ids(&self, incomplete: &Key, count: usize) -> StoreResult<Vec<Key>>;

    /// Starts a native transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    fn begin_transaction(&self) -> StoreResult<TxnHandle>;

    /// Commits a native transaction.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::ConcurrentModification`] on an
    /// optimistic-concurrency conflict.
    fn commit(&self, txn: TxnHandle) -> StoreResult<()>;

    /// Rolls back a native transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction is unknown or already committed.
    fn rollback(&self, txn: TxnHandle) -> StoreResult<()>;

    /// Runs a query.
    ///
    /// # Errors
    ///
    /// Returns an error if the query is invalid or the store fails before
    /// producing any results. Later failures surface through the iterator.
    fn run_query(
        &self,
        txn: Option<TxnHandle>,
        query: &Query,
        fetch: &FetchOptions,
        options: &ReadOptions,
    ) -> StoreResult<QueryResults>;

    /// Counts the results of a query, honoring limit and offset.
    ///
    /// # Errors
    ///
    /// Returns an error if the query is invalid or the store fails.
    fn count(&self, query: &Query, fetch: &FetchOptions, options: &ReadOptions)
        -> StoreResult<usize>;
}
