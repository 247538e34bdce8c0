//! Typed query builder.

use super::engine::{QueryEngine, RawResults};
use crate::error::{CoreError, CoreResult};
use crate::metadata::KeyMetadata;
use crate::scope::Scope;
use crate::translate::Translate;
use entiscope_store::{FetchOptions, Filter, FilterOp, Key, Order, Query as StoreQuery, Value};
use std::fmt;
use std::marker::PhantomData;

/// A query over entities of type `T`, bound to a scope.
///
/// Builder mistakes (a malformed filter condition, an unregistered type)
/// are reported when the query runs.
///
/// # Example
///
/// ```rust,ignore
/// let adults: Vec<Person> = scope
///     .load()
///     .kind::<Person>()
///     .filter("age >=", 18)
///     .order("-age")
///     .limit(10)
///     .list()?;
/// ```
pub struct Query<'a, T> {
    scope: &'a Scope,
    query: StoreQuery,
    fetch: FetchOptions,
    hybrid: Option<bool>,
    error: Option<CoreError>,
    _entity: PhantomData<fn() -> T>,
}

impl<'a, T: Translate> Query<'a, T> {
    pub(crate) fn new(scope: &'a Scope) -> Self {
        let (query, error) = match scope.factory().registry().metadata::<T>() {
            Ok(metadata) => (StoreQuery::kind(metadata.kind()), None),
            Err(err) => (StoreQuery::kindless(), Some(err)),
        };
        Self {
            scope,
            query,
            fetch: FetchOptions::new(),
            hybrid: None,
            error,
            _entity: PhantomData,
        }
    }

    fn fail(mut self, err: CoreError) -> Self {
        if self.error.is_none() {
            self.error = Some(err);
        }
        self
    }

    fn map_query(mut self, f: impl FnOnce(StoreQuery) -> StoreQuery) -> Self {
        self.query = f(std::mem::take(&mut self.query));
        self
    }

    /// Adds a filter. `condition` is a property name optionally followed
    /// by an operator: `"age"`, `"age >="`, `"tags in"`. A bare name
    /// means equality.
    #[must_use]
    pub fn filter(self, condition: &str, value: impl Into<Value>) -> Self {
        let mut parts = condition.split_whitespace();
        let (Some(property), op, None) = (parts.next(), parts.next(), parts.next()) else {
            return self.fail(CoreError::programming(format!(
                "malformed filter condition {condition:?}"
            )));
        };
        let op = match op {
            None => FilterOp::Equal,
            Some(token) => match FilterOp::parse(token) {
                Some(op) => op,
                None => {
                    return self.fail(CoreError::programming(format!(
                        "unknown operator {token:?} in filter condition {condition:?}"
                    )))
                }
            },
        };
        let filter = Filter::new(property, op, value);
        self.map_query(|q| q.filter(filter))
    }

    /// Adds a sort order: `"age"` ascending, `"-age"` descending.
    #[must_use]
    pub fn order(self, order: &str) -> Self {
        let order = Order::parse(order);
        if order.property.is_empty() {
            return self.fail(CoreError::programming("empty sort order"));
        }
        self.map_query(|q| q.order(order))
    }

    /// Restricts results to descendants of `ancestor`.
    #[must_use]
    pub fn ancestor(self, ancestor: Key) -> Self {
        self.map_query(|q| q.ancestor(ancestor))
    }

    /// Limits the number of results.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.fetch = self.fetch.limit(limit);
        self
    }

    /// Skips the first `offset` results.
    #[must_use]
    pub fn offset(mut self, offset: usize) -> Self {
        self.fetch = self.fetch.offset(offset);
        self
    }

    /// Sets how many entities are loaded per batch.
    #[must_use]
    pub fn chunk(mut self, size: usize) -> Self {
        if size == 0 {
            return self.fail(CoreError::programming("chunk size must be at least one"));
        }
        self.fetch = self.fetch.chunk_size(size);
        self
    }

    /// Forces hybrid execution on or off for this query.
    #[must_use]
    pub fn hybrid(mut self, enabled: bool) -> Self {
        self.hybrid = Some(enabled);
        self
    }

    /// Projects `property`. Projection results bypass the session and the
    /// cache and carry only the projected properties.
    #[must_use]
    pub fn project(self, property: &str) -> Self {
        let property = property.to_string();
        self.map_query(|q| q.project(property))
    }

    fn checked(self) -> CoreResult<(&'a Scope, StoreQuery, FetchOptions, Option<bool>)> {
        match self.error {
            Some(err) => Err(err),
            None => Ok((self.scope, self.query, self.fetch, self.hybrid)),
        }
    }

    /// Runs the query and returns a lazy iterator over the results.
    ///
    /// # Errors
    ///
    /// Returns builder errors, or store errors raised before the first result.
    pub fn iter(self) -> CoreResult<QueryIter<'a, T>> {
        let (scope, query, fetch, hybrid) = self.checked()?;
        let metadata = scope.factory().registry().metadata::<T>()?;
        let engine = QueryEngine::new(scope);

        let inner = if !query.projections().is_empty() {
            engine.query_projection(&query, &fetch)?
        } else if hybrid.unwrap_or(scope.factory().config().hybrid_queries) {
            engine.query_hybrid(&query, &fetch)?
        } else {
            engine.query_normal(&query, &fetch)?
        };
        Ok(QueryIter { inner, metadata })
    }

    /// Runs the query and collects every result.
    ///
    /// # Errors
    ///
    /// Returns the first error encountered.
    pub fn list(self) -> CoreResult<Vec<T>> {
        self.iter()?.collect()
    }

    /// Runs the query with a limit of one.
    ///
    /// # Errors
    ///
    /// Returns the first error encountered.
    pub fn first(self) -> CoreResult<Option<T>> {
        self.limit(1).iter()?.next().transpose()
    }

    /// Runs the query keys-only.
    ///
    /// # Errors
    ///
    /// Returns the first error encountered.
    pub fn keys(self) -> CoreResult<Vec<Key>> {
        let (scope, query, fetch, _) = self.checked()?;
        QueryEngine::new(scope)
            .query_keys_only(&query.keys_only(), &fetch)?
            .collect()
    }

    /// Counts the results, honoring limit and offset.
    ///
    /// # Errors
    ///
    /// Returns builder or store errors.
    pub fn count(self) -> CoreResult<usize> {
        let (scope, query, fetch, _) = self.checked()?;
        QueryEngine::new(scope).query_count(&query, &fetch)
    }
}

impl<T> fmt::Debug for Query<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("query", &self.query)
            .field("fetch", &self.fetch)
            .field("hybrid", &self.hybrid)
            .finish_non_exhaustive()
    }
}

/// Lazy typed query results.
pub struct QueryIter<'a, T> {
    inner: RawResults<'a>,
    metadata: &'a KeyMetadata<T>,
}

impl<T: Translate> Iterator for QueryIter<'_, T> {
    type Item = CoreResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        let metadata = self.metadata;
        self.inner
            .next()
            .map(|result| result.and_then(|raw| metadata.from_storage(&raw)))
    }
}

impl<T> fmt::Debug for QueryIter<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryIter").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::{factory, Note};
    use crate::CoreError;
    use entiscope_store::Key;

    fn seeded() -> crate::Factory {
        let (_, factory) = factory();
        let scope = factory.begin();
        let mut notes: Vec<Note> = ["c", "a", "b"].iter().map(|t| Note::new(t)).collect();
        scope.save().entities(&mut notes).unwrap().now().unwrap();
        factory
    }

    #[test]
    fn filter_and_order() {
        let factory = seeded();
        let scope = factory.begin();

        let texts: Vec<String> = scope
            .load()
            .kind::<Note>()
            .filter("text >", "a")
            .order("-text")
            .list()
            .unwrap()
            .into_iter()
            .map(|n| n.text)
            .collect();

        assert_eq!(texts, vec!["c", "b"]);
    }

    #[test]
    fn bare_property_means_equality() {
        let factory = seeded();
        let scope = factory.begin();
        let found = scope.load().kind::<Note>().filter("text", "b").first().unwrap();
        assert_eq!(found.unwrap().text, "b");
    }

    #[test]
    fn malformed_condition_is_reported_when_run() {
        let factory = seeded();
        let scope = factory.begin();
        let err = scope
            .load()
            .kind::<Note>()
            .filter("text ~~", "b")
            .list()
            .unwrap_err();
        assert!(matches!(err, CoreError::Programming { .. }));

        let err = scope.load().kind::<Note>().chunk(0).count().unwrap_err();
        assert!(err.is_programming_error());
    }

    #[test]
    fn keys_and_count() {
        let factory = seeded();
        let scope = factory.begin();

        let keys = scope.load().kind::<Note>().order("text").keys().unwrap();
        assert_eq!(keys, vec![Key::new("Note", 2), Key::new("Note", 3), Key::new("Note", 1)]);
        assert_eq!(scope.load().kind::<Note>().offset(1).count().unwrap(), 2);
        assert!(!scope.is_loaded(&keys[0]));
    }

    #[test]
    fn normal_and_hybrid_fill_the_session() {
        let factory = seeded();
        for hybrid in [true, false] {
            let scope = factory.begin();
            let all = scope.load().kind::<Note>().hybrid(hybrid).chunk(2).list().unwrap();
            assert_eq!(all.len(), 3);
            assert!(scope.is_loaded(&Key::new("Note", 1)));
        }
    }

    #[test]
    fn projection_carries_only_projected_properties() {
        let factory = seeded();
        let scope = factory.begin();
        let notes = scope.load().kind::<Note>().project("text").list().unwrap();
        assert_eq!(notes.len(), 3);
        assert!(!scope.is_loaded(&Key::new("Note", 1)));
    }
}
