//! The load pipeline: deferred operations, session, then second-level
//! cache, then one batched store get.

use crate::deferrer::DeferredOp;
use crate::error::{CoreError, CoreResult};
use crate::scope::Scope;
use crate::session::SessionValue;
use entiscope_store::{Key, RawEntity};
use std::collections::{HashMap, HashSet};
use tracing::trace;

/// What `scope` already knows about `key` without any I/O.
///
/// A buffered deferred operation wins over the session entry, which may
/// have been cleared or replaced by a committed transaction since.
pub(crate) fn known(scope: &Scope, key: &Key) -> Option<SessionValue> {
    if let Some(op) = scope.transactor().deferrer().borrow().get(key) {
        return Some(match op {
            DeferredOp::Save(raw) => SessionValue::Present(raw.clone()),
            DeferredOp::Delete => SessionValue::Absent,
        });
    }
    scope.session().borrow().get(key).cloned()
}

/// Resolves keys for a scope.
///
/// Every key resolved here ends up in the session, present or absent, so
/// a later load of the same key in the same scope costs nothing. The cache
/// is consulted only outside transactions, when the scope allows it and
/// the kind opted in.
pub(crate) struct LoadEngine<'a> {
    scope: &'a Scope,
}

impl<'a> LoadEngine<'a> {
    pub(crate) fn new(scope: &'a Scope) -> Self {
        Self { scope }
    }

    /// Loads `keys`, returning only the entities that exist.
    pub(crate) fn load(&self, keys: &[Key]) -> CoreResult<HashMap<Key, RawEntity>> {
        if let Some(key) = keys.iter().find(|k| !k.is_complete()) {
            return Err(CoreError::programming(format!(
                "cannot load incomplete key {key}"
            )));
        }

        let mut found = HashMap::new();
        let mut misses = Vec::new();
        let mut seen = HashSet::new();
        for key in keys {
            match known(self.scope, key) {
                Some(SessionValue::Present(raw)) => {
                    found.insert(key.clone(), raw);
                }
                Some(SessionValue::Absent) => {}
                None => {
                    if seen.insert(key) {
                        misses.push(key.clone());
                    }
                }
            }
        }
        if misses.is_empty() {
            return Ok(found);
        }

        let resolved = self.fetch(misses)?;
        let mut session = self.scope.session().borrow_mut();
        for (key, value) in resolved {
            if let Some(raw) = value.entity() {
                found.insert(key.clone(), raw.clone());
            }
            session.put(key, value);
        }
        Ok(found)
    }

    /// Resolves session misses through the cache and the store.
    fn fetch(&self, misses: Vec<Key>) -> CoreResult<Vec<(Key, SessionValue)>> {
        let factory = self.scope.factory();
        let cache = factory
            .cache()
            .filter(|_| self.scope.options().cache() && self.scope.transaction().is_none());

        let (cacheable, uncached): (Vec<Key>, Vec<Key>) = match cache {
            Some(_) => misses
                .into_iter()
                .partition(|k| factory.registry().is_cached(k.kind())),
            None => (Vec::new(), misses),
        };

        let mut resolved = Vec::new();
        let mut to_fetch = uncached;
        let lookup = match cache {
            Some(cache) if !cacheable.is_empty() => {
                let lookup = cache.get_all(&cacheable);
                for (key, hit) in &lookup.hits {
                    let value = match hit {
                        Some(raw) => SessionValue::Present(raw.clone()),
                        None => SessionValue::Absent,
                    };
                    resolved.push((key.clone(), value));
                }
                to_fetch.extend(lookup.misses.iter().cloned());
                Some(lookup)
            }
            _ => None,
        };

        if to_fetch.is_empty() {
            return Ok(resolved);
        }
        trace!(count = to_fetch.len(), "loading from store");
        let fetched = factory.store().get(
            self.scope.transactor().handle(),
            &to_fetch,
            &self.scope.options().read_options(),
        )?;

        if let (Some(cache), Some(lookup)) = (cache, &lookup) {
            cache.populate(lookup, &fetched);
        }

        for key in to_fetch {
            let value = match fetched.get(&key) {
                Some(raw) => SessionValue::Present(raw.clone()),
                None => SessionValue::Absent,
            };
            resolved.push((key, value));
        }
        Ok(resolved)
    }
}
