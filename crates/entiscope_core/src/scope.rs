//! Factory and scope handles.

use crate::cache::{CacheRetryProxy, CacheService, EntityCache};
use crate::cmd::{Deferred, Deleter, Loader, Saver};
use crate::config::{Config, Options};
use crate::error::CoreResult;
use crate::metadata::Registry;
use crate::session::Session;
use crate::transaction::{Propagation, Transaction, Transactor};
use crate::write::WriteEngine;
use entiscope_store::{Consistency, Datastore, Key};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

struct FactoryInner {
    store: Arc<dyn Datastore>,
    cache: Option<EntityCache>,
    registry: Registry,
    config: Config,
}

/// Shared entry point that opens scopes.
///
/// A factory is cheap to clone and can be shared across threads; the
/// scopes it opens cannot.
#[derive(Clone)]
pub struct Factory {
    inner: Arc<FactoryInner>,
}

impl Factory {
    /// Creates a factory without a second-level cache.
    pub fn new(store: Arc<dyn Datastore>, registry: Registry, config: Config) -> Self {
        Self::builder(store).registry(registry).config(config).build()
    }

    /// Starts building a factory.
    pub fn builder(store: Arc<dyn Datastore>) -> FactoryBuilder {
        FactoryBuilder {
            store,
            registry: Registry::new(),
            config: Config::default(),
            cache: None,
        }
    }

    /// Opens a top-level scope without a transaction.
    #[must_use]
    pub fn begin(&self) -> Scope {
        Scope {
            factory: self.clone(),
            options: Options::from_config(&self.inner.config),
            transactor: Rc::new(Transactor::root()),
        }
    }

    /// Runs `work` in a fresh scope and closes it afterwards, even on error.
    ///
    /// # Errors
    ///
    /// Returns the error of `work`, or else the error raised while closing.
    pub fn run<R>(&self, work: impl FnOnce(&Scope) -> CoreResult<R>) -> CoreResult<R> {
        let scope = self.begin();
        let result = work(&scope);
        let closed = scope.close();
        match (result, closed) {
            (Ok(value), closed) => closed.map(|()| value),
            (Err(err), Err(close_err)) => {
                error!(error = %close_err, "closing scope failed after unit of work failed");
                Err(err)
            }
            (Err(err), Ok(())) => Err(err),
        }
    }

    /// Returns the datastore.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn Datastore> {
        &self.inner.store
    }

    /// Returns the entity cache, if one is configured.
    #[must_use]
    pub fn cache(&self) -> Option<&EntityCache> {
        self.inner.cache.as_ref()
    }

    /// Returns the type registry.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }
}

impl fmt::Debug for Factory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Factory")
            .field("registry", &self.inner.registry)
            .field("config", &self.inner.config)
            .field("cache", &self.inner.cache.is_some())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Factory`].
pub struct FactoryBuilder {
    store: Arc<dyn Datastore>,
    registry: Registry,
    config: Config,
    cache: Option<Arc<dyn CacheService>>,
}

impl FactoryBuilder {
    /// Sets the type registry.
    #[must_use]
    pub fn registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }

    /// Sets the configuration.
    #[must_use]
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Enables the second-level cache. The service is wrapped in a
    /// [`CacheRetryProxy`] when the factory is built.
    #[must_use]
    pub fn cache(mut self, service: impl CacheService + 'static) -> Self {
        self.cache = Some(Arc::new(service));
        self
    }

    /// Builds the factory.
    #[must_use]
    pub fn build(self) -> Factory {
        let attempts = self.config.cache_max_attempts;
        let cache = self.cache.map(|service| {
            EntityCache::new(Arc::new(CacheRetryProxy::with_attempts(service, attempts)))
        });
        Factory {
            inner: Arc::new(FactoryInner {
                store: self.store,
                cache,
                registry: self.registry,
                config: self.config,
            }),
        }
    }
}

/// A unit of work: session, deferred writes, and an optional transaction.
///
/// Cloning a scope, or deriving one with different options, yields another
/// handle to the same session and deferrer.
#[derive(Clone)]
pub struct Scope {
    factory: Factory,
    options: Options,
    transactor: Rc<Transactor>,
}

impl Scope {
    pub(crate) fn with_transactor(&self, transactor: Rc<Transactor>) -> Self {
        Self {
            factory: self.factory.clone(),
            options: self.options,
            transactor,
        }
    }

    pub(crate) fn transactor(&self) -> &Rc<Transactor> {
        &self.transactor
    }

    pub(crate) fn session(&self) -> &Rc<RefCell<Session>> {
        self.transactor.session()
    }

    /// Returns the factory that opened this scope.
    #[must_use]
    pub fn factory(&self) -> &Factory {
        &self.factory
    }

    /// Returns the options of this handle.
    #[must_use]
    pub fn options(&self) -> Options {
        self.options
    }

    /// Returns a handle with the second-level cache switched on or off.
    #[must_use]
    pub fn cache(&self, enabled: bool) -> Self {
        let mut scope = self.clone();
        scope.options.cache = enabled;
        scope
    }

    /// Returns a handle with a different read consistency.
    #[must_use]
    pub fn consistency(&self, consistency: Consistency) -> Self {
        let mut scope = self.clone();
        scope.options.consistency = consistency;
        scope
    }

    /// Returns a handle with a store deadline.
    #[must_use]
    pub fn deadline(&self, deadline: Duration) -> Self {
        let mut scope = self.clone();
        scope.options.deadline = Some(deadline);
        scope
    }

    /// Returns a handle that does or does not require transactions for writes.
    #[must_use]
    pub fn mandatory_transactions(&self, value: bool) -> Self {
        let mut scope = self.clone();
        scope.options.mandatory_transactions = value;
        scope
    }

    /// Starts a load command.
    #[must_use]
    pub fn load(&self) -> Loader<'_> {
        Loader::new(self)
    }

    /// Starts a save command.
    #[must_use]
    pub fn save(&self) -> Saver<'_> {
        Saver::new(self)
    }

    /// Starts a delete command.
    #[must_use]
    pub fn delete(&self) -> Deleter<'_> {
        Deleter::new(self)
    }

    /// Starts a deferred command.
    #[must_use]
    pub fn defer(&self) -> Deferred<'_> {
        Deferred::new(self)
    }

    /// Returns the active transaction, if any.
    #[must_use]
    pub fn transaction(&self) -> Option<&Transaction> {
        self.transactor.transaction()
    }

    /// Runs `work` in the current transaction, or in a new one with
    /// unbounded retries if there is none.
    ///
    /// # Errors
    ///
    /// Returns the error of `work` or of the commit.
    pub fn transact<R>(&self, work: impl FnMut(&Scope) -> CoreResult<R>) -> CoreResult<R> {
        self.execute(Propagation::Required, work)
    }

    /// Runs `work` in a new transaction, retrying on optimistic-concurrency
    /// conflicts for at most `max_attempts` attempts in total.
    ///
    /// # Errors
    ///
    /// Returns a programming error if `max_attempts` is zero, the conflict
    /// after the last attempt, or any other error of `work` or the commit.
    pub fn transact_new<R>(
        &self,
        max_attempts: u32,
        work: impl FnMut(&Scope) -> CoreResult<R>,
    ) -> CoreResult<R> {
        self.transactor.transact_new(self, max_attempts, work)
    }

    /// Runs `work` under a propagation policy.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::NoTransaction`] or
    /// [`crate::CoreError::TransactionPresent`] for policy violations, and
    /// otherwise the error of `work` or the commit.
    pub fn execute<R>(
        &self,
        propagation: Propagation,
        work: impl FnMut(&Scope) -> CoreResult<R>,
    ) -> CoreResult<R> {
        self.transactor.execute(self, propagation, work)
    }

    /// Runs `work` outside any transaction.
    ///
    /// # Errors
    ///
    /// Returns the error of `work`.
    pub fn transactionless<R>(&self, work: impl FnOnce(&Scope) -> CoreResult<R>) -> CoreResult<R> {
        self.transactor.transactionless(self, work)
    }

    /// Forgets everything the session knows. Deferred operations stay
    /// buffered.
    pub fn clear(&self) {
        self.session().borrow_mut().clear();
    }

    /// Writes all deferred operations now.
    ///
    /// # Errors
    ///
    /// Returns an error if a write fails or transactions are mandatory and
    /// none is active.
    pub fn flush(&self) -> CoreResult<()> {
        if self.transactor.deferrer().borrow().is_empty() {
            return Ok(());
        }
        let engine = WriteEngine::new(self)?;
        self.transactor.deferrer().borrow_mut().flush(&engine)
    }

    /// Checks whether the session has resolved `key`, present or absent.
    #[must_use]
    pub fn is_loaded(&self, key: &Key) -> bool {
        self.session().borrow().contains(key)
    }

    /// Flushes deferred operations and surfaces unjoined write failures.
    ///
    /// # Errors
    ///
    /// Returns the flush error, or else the first unjoined write failure.
    pub fn close(self) -> CoreResult<()> {
        let flushed = self.flush();
        let drained = self.transactor.drain_pending();
        match (flushed, drained) {
            (Err(err), Err(pending_err)) => {
                error!(error = %pending_err, "unjoined write failed while flush also failed");
                Err(err)
            }
            (flushed, drained) => flushed.and(drained),
        }
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("options", &self.options)
            .field("transaction", &self.transaction().map(Transaction::handle))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::testing::{factory, factory_with, Note};
    use crate::transaction::TransactionState;
    use std::cell::Cell;

    #[test]
    fn transact_commits_and_merges_session() {
        let (store, factory) = factory();
        let scope = factory.begin();

        let key = scope
            .transact(|txn| {
                let mut note = Note::new("a");
                txn.save().entity(&mut note)?.now()
            })
            .unwrap();

        assert!(store.contains(&key));
        assert!(scope.is_loaded(&key));
        assert_eq!(store.open_transactions(), 0);
    }

    #[test]
    fn failed_work_rolls_back() {
        let (store, factory) = factory();
        let scope = factory.begin();

        let result: CoreResult<()> = scope.transact(|txn| {
            let mut note = Note::new("a");
            txn.save().entity(&mut note)?.now()?;
            Err(CoreError::work("boom"))
        });

        assert!(result.is_err());
        assert_eq!(store.entity_count(), 0);
        assert_eq!(store.open_transactions(), 0);
    }

    #[test]
    fn conflicts_are_retried() {
        let (store, factory) = factory();
        let key = Key::new("Note", 1);
        let runs = Cell::new(0);

        let scope = factory.begin();
        scope
            .transact_new(5, |txn| {
                runs.set(runs.get() + 1);
                let _: Option<Note> = txn.load().key(&key)?;
                if runs.get() == 1 {
                    let mut raw = entiscope_store::RawEntity::new(key.clone());
                    raw.set_property("text", "outside");
                    store.put(None, vec![raw]).map_err(CoreError::from)?;
                }
                let mut note = Note {
                    id: Some(1),
                    text: "inside".into(),
                };
                txn.save().entity(&mut note)?.now()?;
                Ok(())
            })
            .unwrap();

        assert_eq!(runs.get(), 2);
        let note: Note = factory.begin().load().key(&key).unwrap().unwrap();
        assert_eq!(note.text, "inside");
    }

    #[test]
    fn transact_new_with_zero_attempts_is_rejected() {
        let (_, factory) = factory();
        let err = factory.begin().transact_new(0, |_| Ok(())).unwrap_err();
        assert!(err.is_programming_error());
    }

    #[test]
    fn propagation_policies() {
        let (_, factory) = factory();
        let scope = factory.begin();

        assert!(matches!(
            scope.execute(Propagation::Mandatory, |_| Ok(())),
            Err(CoreError::NoTransaction)
        ));
        scope
            .transact(|txn| {
                assert!(matches!(
                    txn.execute(Propagation::Never, |_| Ok(())),
                    Err(CoreError::TransactionPresent)
                ));
                let outer = txn.transaction().map(Transaction::handle);
                txn.execute(Propagation::Required, |inner| {
                    assert_eq!(inner.transaction().map(Transaction::handle), outer);
                    Ok(())
                })?;
                txn.execute(Propagation::RequiresNew, |inner| {
                    assert_ne!(inner.transaction().map(Transaction::handle), outer);
                    Ok(())
                })?;
                txn.execute(Propagation::Supports, |inner| {
                    assert!(inner.transaction().is_none());
                    Ok(())
                })
            })
            .unwrap();
    }

    #[test]
    fn transactionless_escapes_the_transaction() {
        let (store, factory) = factory();
        let scope = factory.begin();

        let result: CoreResult<()> = scope.transact_new(1, |txn| {
            txn.transactionless(|outside| {
                let mut note = Note::new("kept");
                outside.save().entity(&mut note)?.now()?;
                Ok(())
            })?;
            Err(CoreError::work("abort"))
        });

        assert!(result.is_err());
        assert_eq!(store.entity_count(), 1);
    }

    #[test]
    fn commit_listener_runs_after_commit() {
        let (_, factory) = factory();
        let fired = Rc::new(Cell::new(false));
        let seen = Rc::clone(&fired);
        factory
            .begin()
            .transact(move |txn| {
                let seen = Rc::clone(&seen);
                let transaction = txn.transaction().unwrap();
                transaction.listen_for_commit(move || seen.set(true));
                assert_eq!(transaction.state(), TransactionState::Active);
                Ok(())
            })
            .unwrap();
        assert!(fired.get());
    }

    #[test]
    fn deferred_saves_flush_on_close() {
        let (store, factory) = factory();
        let scope = factory.begin();
        let mut note = Note::new("later");
        scope.defer().save().entity(&mut note).unwrap();

        let key = Key::new("Note", note.id.unwrap());
        assert!(!store.contains(&key));
        let loaded: Note = scope.load().key(&key).unwrap().unwrap();
        assert_eq!(loaded.text, "later");

        scope.close().unwrap();
        assert!(store.contains(&key));
    }

    #[test]
    fn mandatory_transactions_reject_plain_writes() {
        let (store, factory) = factory_with(Config::default().mandatory_transactions(true));
        let scope = factory.begin();
        let mut note = Note::new("x");

        let err = scope.save().entity(&mut note).unwrap_err();
        assert!(err.is_programming_error());
        assert_eq!(store.entity_count(), 0);

        scope
            .transact(|txn| txn.save().entity(&mut Note::new("y"))?.now().map(|_| ()))
            .unwrap();
        assert_eq!(store.entity_count(), 1);
    }

    #[test]
    fn close_surfaces_unjoined_failure() {
        let (_, factory) = factory();
        let scope = factory.begin();
        let raw = entiscope_store::RawEntity::new(Key::incomplete("", None));
        let pending = scope.save().raw(vec![raw]).unwrap();
        assert!(pending.is_failed());
        drop(pending);

        assert!(scope.close().is_err());
    }

    #[test]
    fn joined_writes_do_not_accumulate() {
        let (store, factory) = factory();
        let scope = factory.begin();

        for i in 0..1000 {
            scope
                .save()
                .entity(&mut Note::new(&format!("n{i}")))
                .unwrap()
                .now()
                .unwrap();
        }

        assert_eq!(scope.transactor().pending().borrow().len(), 0);
        assert_eq!(store.entity_count(), 1000);
        scope.close().unwrap();
    }

    #[test]
    fn run_closes_scope() {
        let (store, factory) = factory();
        factory
            .run(|scope| scope.defer().save().entity(&mut Note::new("run")))
            .unwrap();
        assert_eq!(store.entity_count(), 1);
    }
}
