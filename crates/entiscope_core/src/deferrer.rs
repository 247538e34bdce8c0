//! Write-behind buffer for deferred saves and deletes.

use crate::error::CoreResult;
use crate::session::Session;
use crate::write::WriteEngine;
use entiscope_store::{Key, RawEntity};
use std::collections::BTreeMap;
use tracing::debug;

/// A buffered operation.
#[derive(Debug, Clone, PartialEq)]
pub enum DeferredOp {
    /// Store the entity.
    Save(RawEntity),
    /// Remove the entity.
    Delete,
}

/// The two batches a flush issues.
#[derive(Debug, Default, PartialEq)]
pub struct DeferredBatch {
    /// Entities to store, in key order.
    pub saves: Vec<RawEntity>,
    /// Keys to delete, in key order.
    pub deletes: Vec<Key>,
}

impl DeferredBatch {
    /// Checks whether both batches are empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.saves.is_empty() && self.deletes.is_empty()
    }
}

/// Accumulates deferred operations keyed by entity identity.
///
/// The last operation recorded for a key wins. Every defer call updates
/// the session immediately, so reads in the same scope observe the deferred
/// state without a store round trip.
#[derive(Debug, Default)]
pub struct Deferrer {
    operations: BTreeMap<Key, DeferredOp>,
}

impl Deferrer {
    /// Creates an empty deferrer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a save. The entity key must be complete.
    pub fn defer_save(&mut self, session: &mut Session, raw: RawEntity) {
        let key = raw.key().clone();
        session.put_entity(raw.clone());
        self.operations.insert(key, DeferredOp::Save(raw));
    }

    /// Records a delete.
    pub fn defer_delete(&mut self, session: &mut Session, key: Key) {
        session.mark_absent(key.clone());
        self.operations.insert(key, DeferredOp::Delete);
    }

    /// Returns the buffered operation for `key`.
    #[must_use]
    pub fn get(&self, key: &Key) -> Option<&DeferredOp> {
        self.operations.get(key)
    }

    /// Returns the number of buffered operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Checks whether nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Empties the buffer into one save batch and one delete batch.
    pub fn take(&mut self) -> DeferredBatch {
        let mut batch = DeferredBatch::default();
        for (key, op) in std::mem::take(&mut self.operations) {
            match op {
                DeferredOp::Save(raw) => batch.saves.push(raw),
                DeferredOp::Delete => batch.deletes.push(key),
            }
        }
        batch
    }

    /// Drops everything without writing. Returns how many operations were
    /// dropped.
    pub fn discard(&mut self) -> usize {
        let count = self.operations.len();
        self.operations.clear();
        count
    }

    /// Writes the buffer through `engine`. An empty buffer makes no store
    /// call.
    pub(crate) fn flush(&mut self, engine: &WriteEngine<'_>) -> CoreResult<()> {
        let batch = self.take();
        if batch.is_empty() {
            return Ok(());
        }
        debug!(
            saves = batch.saves.len(),
            deletes = batch.deletes.len(),
            "flushing deferred operations"
        );
        if !batch.saves.is_empty() {
            engine.save(batch.saves)?;
        }
        if !batch.deletes.is_empty() {
            engine.delete(batch.deletes)?;
        }
        Ok(())
    }
}
