//! Query execution strategies.

use super::iter::{ChunkingIter, StuffingIter};
use crate::error::{CoreError, CoreResult};
use crate::scope::Scope;
use entiscope_store::{FetchOptions, Key, Query, QueryResults, RawEntity};
use tracing::trace;

/// Lazily produced entities.
pub(crate) type RawResults<'a> = Box<dyn Iterator<Item = CoreResult<RawEntity>> + 'a>;

/// Lazily produced keys.
pub(crate) type KeyResults<'a> = Box<dyn Iterator<Item = CoreResult<Key>> + 'a>;

/// Runs queries for a scope.
///
/// - keys-only: the store's index scan, untouched
/// - hybrid: a keys-only scan whose keys are loaded in chunks through the
///   load pipeline, so session and cache hits cost nothing
/// - normal: a full scan whose entities are stuffed into the session, with
///   session values taking precedence
/// - projection: a full scan that bypasses session and cache
pub(crate) struct QueryEngine<'a> {
    scope: &'a Scope,
}

impl<'a> QueryEngine<'a> {
    pub(crate) fn new(scope: &'a Scope) -> Self {
        Self { scope }
    }

    fn chunk_size(&self, fetch: &FetchOptions) -> usize {
        fetch
            .chunk_size
            .unwrap_or(self.scope.factory().config().default_chunk_size)
            .max(1)
    }

    fn run(&self, query: &Query, fetch: &FetchOptions) -> CoreResult<QueryResults> {
        Ok(self.scope.factory().store().run_query(
            self.scope.transactor().handle(),
            query,
            fetch,
            &self.scope.options().read_options(),
        )?)
    }

    fn require_values(query: &Query, strategy: &str) -> CoreResult<()> {
        if query.is_keys_only() {
            return Err(CoreError::programming(format!(
                "{strategy} execution cannot run a keys-only query"
            )));
        }
        Ok(())
    }

    pub(crate) fn query_keys_only(
        &self,
        query: &Query,
        fetch: &FetchOptions,
    ) -> CoreResult<KeyResults<'a>> {
        if !query.is_keys_only() {
            return Err(CoreError::programming(
                "keys-only execution requires a keys-only query",
            ));
        }
        trace!(kind = ?query.kind_name(), "starting keys-only query");
        let results = self.run(query, fetch)?;
        Ok(Box::new(results.map(|r| {
            r.map(|raw| raw.key().clone()).map_err(CoreError::from)
        })))
    }

    pub(crate) fn query_hybrid(
        &self,
        query: &Query,
        fetch: &FetchOptions,
    ) -> CoreResult<RawResults<'a>> {
        Self::require_values(query, "hybrid")?;
        if !query.projections().is_empty() {
            return Err(CoreError::programming(
                "hybrid execution cannot run a projection query",
            ));
        }
        trace!(kind = ?query.kind_name(), "starting hybrid query");
        let keys = self.query_keys_only(&query.clone().keys_only(), fetch)?;
        Ok(Box::new(ChunkingIter::new(
            self.scope,
            keys,
            self.chunk_size(fetch),
        )))
    }

    pub(crate) fn query_normal(
        &self,
        query: &Query,
        fetch: &FetchOptions,
    ) -> CoreResult<RawResults<'a>> {
        Self::require_values(query, "normal")?;
        if !query.projections().is_empty() {
            return Err(CoreError::programming(
                "normal execution cannot run a projection query",
            ));
        }
        trace!(kind = ?query.kind_name(), "starting normal query");
        let results = self.run(query, fetch)?;
        Ok(Box::new(StuffingIter::new(
            self.scope,
            results,
            self.chunk_size(fetch),
        )))
    }

    pub(crate) fn query_projection(
        &self,
        query: &Query,
        fetch: &FetchOptions,
    ) -> CoreResult<RawResults<'a>> {
        Self::require_values(query, "projection")?;
        if query.projections().is_empty() {
            return Err(CoreError::programming(
                "projection execution requires projected properties",
            ));
        }
        trace!(kind = ?query.kind_name(), "starting projection query");
        let results = self.run(query, fetch)?;
        Ok(Box::new(results.map(|r| r.map_err(CoreError::from))))
    }

    pub(crate) fn query_count(&self, query: &Query, fetch: &FetchOptions) -> CoreResult<usize> {
        trace!(kind = ?query.kind_name(), "starting count query");
        Ok(self.scope.factory().store().count(
            query,
            fetch,
            &self.scope.options().read_options(),
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::metadata::Registry;
    use crate::scope::Factory;
    use entiscope_store::{Datastore, InMemoryDatastore};
    use std::sync::Arc;

    fn scope_with(entities: usize) -> Scope {
        let store = Arc::new(InMemoryDatastore::new());
        for i in 1..=entities {
            let mut raw = RawEntity::new(Key::new("Thing", i as i64));
            raw.set_property("n", i as i64);
            store.put(None, vec![raw]).unwrap();
        }
        Factory::new(store, Registry::new(), Config::default()).begin()
    }

    #[test]
    fn keys_only_rejects_value_query() {
        let scope = scope_with(0);
        let engine = QueryEngine::new(&scope);
        let err = engine
            .query_keys_only(&Query::kind("Thing"), &FetchOptions::new())
            .err()
            .unwrap();
        assert!(err.is_programming_error());
    }

    #[test]
    fn value_strategies_reject_keys_only_query() {
        let scope = scope_with(0);
        let engine = QueryEngine::new(&scope);
        let query = Query::kind("Thing").keys_only();
        let fetch = FetchOptions::new();
        assert!(engine.query_hybrid(&query, &fetch).is_err());
        assert!(engine.query_normal(&query, &fetch).is_err());
        assert!(engine.query_projection(&query, &fetch).is_err());
    }

    #[test]
    fn projection_requires_properties() {
        let scope = scope_with(0);
        let engine = QueryEngine::new(&scope);
        let err = engine
            .query_projection(&Query::kind("Thing"), &FetchOptions::new())
            .err()
            .unwrap();
        assert!(err.is_programming_error());
    }

    #[test]
    fn hybrid_and_normal_agree() {
        let scope = scope_with(7);
        let engine = QueryEngine::new(&scope);
        let fetch = FetchOptions::new().chunk_size(3);
        let query = Query::kind("Thing");

        let hybrid: Vec<Key> = engine
            .query_hybrid(&query, &fetch)
            .unwrap()
            .map(|r| r.unwrap().key().clone())
            .collect();
        let normal: Vec<Key> = engine
            .query_normal(&query, &fetch)
            .unwrap()
            .map(|r| r.unwrap().key().clone())
            .collect();

        assert_eq!(hybrid.len(), 7);
        assert_eq!(hybrid, normal);
    }

    #[test]
    fn projection_bypasses_session() {
        let scope = scope_with(2);
        let engine = QueryEngine::new(&scope);
        let query = Query::kind("Thing").project("n");
        let results: Vec<RawEntity> = engine
            .query_projection(&query, &FetchOptions::new())
            .unwrap()
            .map(|r| r.unwrap())
            .collect();

        assert_eq!(results.len(), 2);
        assert!(!scope.is_loaded(&Key::new("Thing", 1)));
    }

    #[test]
    fn count_delegates_to_store() {
        let scope = scope_with(4);
        let engine = QueryEngine::new(&scope);
        let count = engine
            .query_count(&Query::kind("Thing"), &FetchOptions::new().offset(1))
            .unwrap();
        assert_eq!(count, 3);
    }
}
