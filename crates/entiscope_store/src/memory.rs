//! In-memory datastore for testing.

use crate::datastore::{Datastore, QueryResults};
use crate::error::{StoreError, StoreResult};
use crate::key::Key;
use crate::query::{FetchOptions, Query, ReadOptions};
use crate::types::{TransactionId, TxnHandle};
use crate::value::{Properties, RawEntity};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// A buffered transactional write.
#[derive(Debug, Clone)]
enum PendingWrite {
    Put(Properties),
    Delete,
}

#[derive(Debug, Default)]
struct TxnState {
    /// Entity-group roots with the version first observed.
    enlisted: HashMap<Key, u64>,
    writes: BTreeMap<Key, PendingWrite>,
    /// Set once a commit has failed; only rollback is allowed afterwards.
    failed: bool,
}

#[derive(Debug, Default)]
struct State {
    entities: BTreeMap<Key, Properties>,
    group_versions: HashMap<Key, u64>,
    txns: HashMap<TransactionId, TxnState>,
}

impl State {
    fn version(&self, group: &Key) -> u64 {
        self.group_versions.get(group).copied().unwrap_or(0)
    }

    fn bump(&mut self, group: Key) {
        *self.group_versions.entry(group).or_insert(0) += 1;
    }

    fn active_txn(&mut self, txn: TxnHandle) -> StoreResult<&mut TxnState> {
        match self.txns.get_mut(&txn.id()) {
            Some(state) if !state.failed => Ok(state),
            _ => Err(StoreError::TransactionNotActive(txn.id())),
        }
    }

    fn enlist(&mut self, txn: TxnHandle, group: &Key) -> StoreResult<()> {
        let version = self.version(group);
        self.active_txn(txn)?
            .enlisted
            .entry(group.clone())
            .or_insert(version);
        Ok(())
    }
}

/// An in-memory datastore with entity-group optimistic concurrency.
///
/// Each entity group (the root of a key's parent chain) carries a version
/// that every committed write bumps. Transactions remember the version of
/// each group they touch and fail at commit if any of them moved.
///
/// Read consistency and deadlines are accepted but have no effect.
///
/// # Thread Safety
///
/// This datastore is thread-safe and can be shared across threads.
///
/// # Example
///
/// ```rust
/// use entiscope_store::{Datastore, InMemoryDatastore, Key, RawEntity, ReadOptions};
///
/// let store = InMemoryDatastore::new();
/// let keys = store.put(None, vec![RawEntity::new(Key::incomplete("Thing", None))]).unwrap();
/// let found = store.get(None, &keys, &ReadOptions::default()).unwrap();
/// assert_eq!(found.len(), 1);
/// ```
#[derive(Debug)]
pub struct InMemoryDatastore {
    state: RwLock<State>,
    next_id: AtomicI64,
    next_txn: AtomicU64,
}

impl Default for InMemoryDatastore {
    fn default() -> Self {
        Self {
            state: RwLock::new(State::default()),
            next_id: AtomicI64::new(1),
            next_txn: AtomicU64::new(1),
        }
    }
}

impl InMemoryDatastore {
    /// Creates an empty datastore.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.state.read().entities.len()
    }

    /// Checks whether an entity is stored under `key`.
    #[must_use]
    pub fn contains(&self, key: &Key) -> bool {
        self.state.read().entities.contains_key(key)
    }

    /// Returns the number of open transactions.
    ///
    /// Useful for asserting that every transaction was committed or rolled back.
    #[must_use]
    pub fn open_transactions(&self) -> usize {
        self.state.read().txns.len()
    }

    fn allocate_one(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn complete(&self, key: Key) -> StoreResult<Key> {
        if key.kind().is_empty() {
            return Err(StoreError::invalid_key("empty kind"));
        }
        if key.is_complete() {
            return Ok(key);
        }
        if key.parent().is_some_and(|p| !p.is_complete()) {
            return Err(StoreError::invalid_key(format!(
                "parent of {key} is incomplete"
            )));
        }
        Ok(key.with_id(self.allocate_one()))
    }
}

fn require_complete(keys: &[Key]) -> StoreResult<()> {
    match keys.iter().find(|k| !k.is_complete()) {
        Some(key) => Err(StoreError::invalid_key(format!("{key} is incomplete"))),
        None => Ok(()),
    }
}

impl Datastore for InMemoryDatastore {
    fn get(
        &self,
        txn: Option<TxnHandle>,
        keys: &[Key],
        _options: &ReadOptions,
    ) -> StoreResult<HashMap<Key, RawEntity>> {
        require_complete(keys)?;

        let mut state = self.state.write();
        if let Some(txn) = txn {
            for key in keys {
                state.enlist(txn, key.root())?;
            }
        }

        Ok(keys
            .iter()
            .filter_map(|key| {
                state
                    .entities
                    .get(key)
                    .map(|props| (key.clone(), RawEntity::with_properties(key.clone(), props.clone())))
            })
            .collect())
    }

    fn put(&self, txn: Option<TxnHandle>, entities: Vec<RawEntity>) -> StoreResult<Vec<Key>> {
        let mut completed = Vec::with_capacity(entities.len());
        for entity in entities {
            let (key, properties) = entity.into_parts();
            completed.push((self.complete(key)?, properties));
        }

        let mut state = self.state.write();
        let keys = completed.iter().map(|(k, _)| k.clone()).collect();
        match txn {
            Some(txn) => {
                for (key, _) in &completed {
                    state.enlist(txn, key.root())?;
                }
                let txn_state = state.active_txn(txn)?;
                for (key, properties) in completed {
                    txn_state.writes.insert(key, PendingWrite::Put(properties));
                }
            }
            None => {
                for (key, properties) in completed {
                    state.bump(key.root().clone());
                    state.entities.insert(key, properties);
                }
            }
        }
        Ok(keys)
    }

    fn delete(&self, txn: Option<TxnHandle>, keys: &[Key]) -> StoreResult<()> {
        require_complete(keys)?;

        let mut state = self.state.write();
        match txn {
            Some(txn) => {
                for key in keys {
                    state.enlist(txn, key.root())?;
                }
                let txn_state = state.active_txn(txn)?;
                for key in keys {
                    txn_state.writes.insert(key.clone(), PendingWrite::Delete);
                }
            }
            None => {
                for key in keys {
                    if state.entities.remove(key).is_some() {
                        state.bump(key.root().clone());
                    }
                }
            }
        }
        Ok(())
    }

    fn allocate_ids(&self, incomplete: &Key, count: usize) -> StoreResult<Vec<Key>> {
        if incomplete.kind().is_empty() {
            return Err(StoreError::invalid_key("empty kind"));
        }
        Ok((0..count)
            .map(|_| incomplete.with_id(self.allocate_one()))
            .collect())
    }

    fn begin_transaction(&self) -> StoreResult<TxnHandle> {
        let id = TransactionId::new(self.next_txn.fetch_add(1, Ordering::SeqCst));
        self.state.write().txns.insert(id, TxnState::default());
        Ok(TxnHandle::new(id))
    }

    fn commit(&self, txn: TxnHandle) -> StoreResult<()> {
        let mut state = self.state.write();
        let txn_state = state.active_txn(txn)?;
        let enlisted = std::mem::take(&mut txn_state.enlisted);
        let writes = std::mem::take(&mut txn_state.writes);

        for (group, seen) in &enlisted {
            if state.version(group) != *seen {
                if let Some(txn_state) = state.txns.get_mut(&txn.id()) {
                    txn_state.failed = true;
                }
                return Err(StoreError::ConcurrentModification {
                    group: group.clone(),
                });
            }
        }

        for (key, write) in writes {
            let group = key.root().clone();
            match write {
                PendingWrite::Put(properties) => {
                    state.entities.insert(key, properties);
                }
                PendingWrite::Delete => {
                    state.entities.remove(&key);
                }
            }
            state.bump(group);
        }
        state.txns.remove(&txn.id());
        Ok(())
    }

    fn rollback(&self, txn: TxnHandle) -> StoreResult<()> {
        match self.state.write().txns.remove(&txn.id()) {
            Some(_) => Ok(()),
            None => Err(StoreError::TransactionNotActive(txn.id())),
        }
    }

    fn run_query(
        &self,
        txn: Option<TxnHandle>,
        query: &Query,
        fetch: &FetchOptions,
        _options: &ReadOptions,
    ) -> StoreResult<QueryResults> {
        let results = self.evaluate(txn, query, fetch)?;
        Ok(Box::new(results.into_iter().map(Ok)))
    }

    fn count(
        &self,
        query: &Query,
        fetch: &FetchOptions,
        _options: &ReadOptions,
    ) -> StoreResult<usize> {
        Ok(self.evaluate(None, query, fetch)?.len())
    }
}

impl InMemoryDatastore {
    fn evaluate(
        &self,
        txn: Option<TxnHandle>,
        query: &Query,
        fetch: &FetchOptions,
    ) -> StoreResult<Vec<RawEntity>> {
        if query.is_keys_only() && !query.projections().is_empty() {
            return Err(StoreError::invalid_query(
                "a query cannot be both keys-only and a projection",
            ));
        }

        let mut state = self.state.write();
        if let Some(txn) = txn {
            let ancestor = query.ancestor_key().ok_or_else(|| {
                StoreError::invalid_query("queries inside a transaction require an ancestor")
            })?;
            state.enlist(txn, ancestor.root())?;
        }

        let mut matched: Vec<RawEntity> = state
            .entities
            .iter()
            .map(|(key, props)| RawEntity::with_properties(key.clone(), props.clone()))
            .filter(|entity| query.matches(entity))
            .collect();
        matched.sort_by(|a, b| query.compare(a, b));

        let limit = fetch.limit.unwrap_or(usize::MAX);
        Ok(matched
            .into_iter()
            .skip(fetch.offset)
            .take(limit)
            .map(|entity| {
                if query.is_keys_only() {
                    RawEntity::new(entity.key().clone())
                } else if !query.projections().is_empty() {
                    entity.project(query.projections())
                } else {
                    entity
                }
            })
            .collect())
    }
}
