//! A datastore wrapper that counts calls and injects failures.

use entiscope_store::{
    Datastore, FetchOptions, InMemoryDatastore, Key, Query, QueryResults, RawEntity, ReadOptions,
    StoreError, StoreResult, TxnHandle,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

/// Call counts of a [`CountingDatastore`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    /// `get` calls.
    pub gets: usize,
    /// Keys requested across all `get` calls.
    pub keys_fetched: usize,
    /// `put` calls.
    pub puts: usize,
    /// `delete` calls.
    pub deletes: usize,
    /// `allocate_ids` calls.
    pub allocations: usize,
    /// `begin_transaction` calls.
    pub begins: usize,
    /// `commit` calls, including failed ones.
    pub commits: usize,
    /// `rollback` calls.
    pub rollbacks: usize,
    /// `run_query` calls.
    pub queries: usize,
    /// `count` calls.
    pub counts: usize,
}

impl CallCounts {
    /// Total number of calls of any kind.
    #[must_use]
    pub fn total(&self) -> usize {
        self.gets
            + self.puts
            + self.deletes
            + self.allocations
            + self.begins
            + self.commits
            + self.rollbacks
            + self.queries
            + self.counts
    }
}

/// Wraps an [`InMemoryDatastore`], counting every call.
///
/// Commits can be made to fail with a concurrent-modification error on
/// demand, which drives the transaction retry loop without racing threads.
#[derive(Debug, Default)]
pub struct CountingDatastore {
    inner: InMemoryDatastore,
    counts: Mutex<CallCounts>,
    failing_commits: AtomicUsize,
}

impl CountingDatastore {
    /// Creates an empty datastore.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the wrapped datastore.
    #[must_use]
    pub fn inner(&self) -> &InMemoryDatastore {
        &self.inner
    }

    /// Returns a snapshot of the call counts.
    #[must_use]
    pub fn counts(&self) -> CallCounts {
        *self.counts.lock()
    }

    /// Resets the call counts.
    pub fn reset_counts(&self) {
        *self.counts.lock() = CallCounts::default();
    }

    /// Makes the next `n` commits fail with a concurrent-modification error.
    pub fn fail_next_commits(&self, n: usize) {
        self.failing_commits.store(n, Ordering::SeqCst);
    }

    fn record(&self, update: impl FnOnce(&mut CallCounts)) {
        update(&mut self.counts.lock());
    }

    fn take_injected_failure(&self) -> bool {
        self.failing_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl Datastore for CountingDatastore {
    fn get(
        &self,
        txn: Option<TxnHandle>,
        keys: &[Key],
        options: &ReadOptions,
    ) -> StoreResult<HashMap<Key, RawEntity>> {
        self.record(|c| {
            c.gets += 1;
            c.keys_fetched += keys.len();
        });
        self.inner.get(txn, keys, options)
    }

    fn put(&self, txn: Option<TxnHandle>, entities: Vec<RawEntity>) -> StoreResult<Vec<Key>> {
        self.record(|c| c.puts += 1);
        self.inner.put(txn, entities)
    }

    fn delete(&self, txn: Option<TxnHandle>, keys: &[Key]) -> StoreResult<()> {
        self.record(|c| c.deletes += 1);
        self.inner.delete(txn, keys)
    }

    fn allocate_ids(&self, incomplete: &Key, count: usize) -> StoreResult<Vec<Key>> {
        self.record(|c| c.allocations += 1);
        self.inner.allocate_ids(incomplete, count)
    }

    fn begin_transaction(&self) -> StoreResult<TxnHandle> {
        self.record(|c| c.begins += 1);
        self.inner.begin_transaction()
    }

    fn commit(&self, txn: TxnHandle) -> StoreResult<()> {
        self.record(|c| c.commits += 1);
        if self.take_injected_failure() {
            debug!(%txn, "injecting commit conflict");
            return Err(StoreError::ConcurrentModification {
                group: Key::new("Injected", 1),
            });
        }
        self.inner.commit(txn)
    }

    fn rollback(&self, txn: TxnHandle) -> StoreResult<()> {
        self.record(|c| c.rollbacks += 1);
        self.inner.rollback(txn)
    }

    fn run_query(
        &self,
        txn: Option<TxnHandle>,
        query: &Query,
        fetch: &FetchOptions,
        options: &ReadOptions,
    ) -> StoreResult<QueryResults> {
        self.record(|c| c.queries += 1);
        self.inner.run_query(txn, query, fetch, options)
    }

    fn count(&self, query: &Query, fetch: &FetchOptions, options: &ReadOptions) -> StoreResult<usize> {
        self.record(|c| c.counts += 1);
        self.inner.count(query, fetch, options)
    }
}
