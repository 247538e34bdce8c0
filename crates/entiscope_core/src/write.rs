//! Batched writes with session update and cache invalidation.

use crate::error::{CoreError, CoreResult};
use crate::scope::Scope;
use entiscope_store::{Key, RawEntity};
use tracing::trace;

/// Issues store writes on behalf of a scope.
///
/// After a write the session reflects it immediately. Cached kinds are
/// invalidated in the second-level cache right away outside a transaction,
/// and after commit inside one.
pub(crate) struct WriteEngine<'a> {
    scope: &'a Scope,
}

impl<'a> WriteEngine<'a> {
    /// Creates an engine, refusing if transactions are mandatory and none
    /// is active.
    pub(crate) fn new(scope: &'a Scope) -> CoreResult<Self> {
        if scope.options().mandatory_transactions() && scope.transaction().is_none() {
            return Err(CoreError::programming(
                "transactions are mandatory but no transaction is active",
            ));
        }
        Ok(Self { scope })
    }

    /// Stores `entities` in one batch and returns their complete keys in
    /// input order.
    pub(crate) fn save(&self, entities: Vec<RawEntity>) -> CoreResult<Vec<Key>> {
        if entities.is_empty() {
            return Ok(Vec::new());
        }
        trace!(count = entities.len(), "saving entities");
        let handle = self.scope.transactor().handle();
        let keys = self.scope.factory().store().put(handle, entities.clone())?;

        {
            let mut session = self.scope.session().borrow_mut();
            for (mut raw, key) in entities.into_iter().zip(&keys) {
                raw.set_key(key.clone());
                session.put_entity(raw);
            }
        }
        self.invalidate(&keys);
        Ok(keys)
    }

    /// Deletes `keys` in one batch.
    pub(crate) fn delete(&self, keys: Vec<Key>) -> CoreResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        trace!(count = keys.len(), "deleting entities");
        let handle = self.scope.transactor().handle();
        self.scope.factory().store().delete(handle, &keys)?;

        {
            let mut session = self.scope.session().borrow_mut();
            for key in &keys {
                session.mark_absent(key.clone());
            }
        }
        self.invalidate(&keys);
        Ok(())
    }

    fn invalidate(&self, keys: &[Key]) {
        let factory = self.scope.factory();
        let Some(cache) = factory.cache() else {
            return;
        };
        let cached: Vec<Key> = keys
            .iter()
            .filter(|k| factory.registry().is_cached(k.kind()))
            .cloned()
            .collect();
        if cached.is_empty() {
            return;
        }
        match self.scope.transaction() {
            Some(transaction) => {
                let cache = cache.clone();
                transaction.listen_for_commit(move || cache.invalidate(&cached));
            }
            None => cache.invalidate(&cached),
        }
    }
}
