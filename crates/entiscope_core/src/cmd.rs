//! Command builders returned by [`Scope::load`], [`Scope::save`],
//! [`Scope::delete`] and [`Scope::defer`].
//!
//! Mistakes in how a command is used (an unregistered type, a key of the
//! wrong kind, a missing name id, a write without a mandatory transaction)
//! are returned immediately. Store failures of writes are carried by the
//! returned [`Pending`].

use crate::error::{CoreError, CoreResult};
use crate::load::LoadEngine;
use crate::metadata::KeyMetadata;
use crate::pending::Pending;
use crate::query::Query;
use crate::scope::Scope;
use crate::translate::Translate;
use crate::write::WriteEngine;
use entiscope_store::{Key, RawEntity};
use std::collections::HashMap;

fn metadata<T: Translate>(scope: &Scope) -> CoreResult<&KeyMetadata<T>> {
    scope.factory().registry().metadata::<T>()
}

fn check_kind<T: Translate>(metadata: &KeyMetadata<T>, key: &Key) -> CoreResult<()> {
    if key.kind() != metadata.kind() {
        return Err(CoreError::programming(format!(
            "key {key} is not of kind {}",
            metadata.kind()
        )));
    }
    Ok(())
}

fn check_complete(key: &Key) -> CoreResult<()> {
    if !key.is_complete() {
        return Err(CoreError::programming(format!(
            "key {key} is incomplete"
        )));
    }
    Ok(())
}

fn pending<T: 'static>(scope: &Scope, result: CoreResult<T>) -> Pending<T> {
    Pending::new(result, &mut scope.transactor().pending().borrow_mut())
}

/// Loads entities through the session, the second-level cache and the store.
#[derive(Debug, Clone, Copy)]
pub struct Loader<'a> {
    scope: &'a Scope,
}

impl<'a> Loader<'a> {
    pub(crate) fn new(scope: &'a Scope) -> Self {
        Self { scope }
    }

    /// Loads the entity stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns a programming error if `key` is incomplete or of another
    /// kind than `T`, or the error of the store.
    pub fn key<T: Translate>(&self, key: &Key) -> CoreResult<Option<T>> {
        let metadata = metadata::<T>(self.scope)?;
        check_kind(metadata, key)?;
        let mut found = LoadEngine::new(self.scope).load(std::slice::from_ref(key))?;
        found
            .remove(key)
            .map(|raw| metadata.from_storage(&raw))
            .transpose()
    }

    /// Loads several entities in one batch. Missing entities are left out.
    ///
    /// # Errors
    ///
    /// See [`Loader::key`].
    pub fn keys<T: Translate>(&self, keys: &[Key]) -> CoreResult<HashMap<Key, T>> {
        let metadata = metadata::<T>(self.scope)?;
        for key in keys {
            check_kind(metadata, key)?;
        }
        LoadEngine::new(self.scope)
            .load(keys)?
            .into_iter()
            .map(|(key, raw)| Ok((key, metadata.from_storage(&raw)?)))
            .collect()
    }

    /// Loads a root entity by numeric id.
    ///
    /// # Errors
    ///
    /// See [`Loader::key`].
    pub fn id<T: Translate>(&self, id: i64) -> CoreResult<Option<T>> {
        let key = Key::new(metadata::<T>(self.scope)?.kind(), id);
        self.key(&key)
    }

    /// Loads a root entity by string name.
    ///
    /// # Errors
    ///
    /// See [`Loader::key`].
    pub fn name<T: Translate>(&self, name: &str) -> CoreResult<Option<T>> {
        let key = Key::new(metadata::<T>(self.scope)?.kind(), name);
        self.key(&key)
    }

    /// Reloads `entity` by its key.
    ///
    /// # Errors
    ///
    /// Returns a programming error if `entity` has no id yet, and otherwise
    /// see [`Loader::key`].
    pub fn entity<T: Translate>(&self, entity: &T) -> CoreResult<Option<T>> {
        let key = metadata::<T>(self.scope)?.key_of(entity)?;
        self.key(&key)
    }

    /// Starts a query over entities of type `T`.
    #[must_use]
    pub fn kind<T: Translate>(&self) -> Query<'a, T> {
        Query::new(self.scope)
    }

    /// Loads untyped entities of any kind.
    ///
    /// # Errors
    ///
    /// Returns a programming error if a key is incomplete, or the error of
    /// the store.
    pub fn raw(&self, keys: &[Key]) -> CoreResult<HashMap<Key, RawEntity>> {
        LoadEngine::new(self.scope).load(keys)
    }
}

/// Saves entities immediately.
#[derive(Debug, Clone, Copy)]
pub struct Saver<'a> {
    scope: &'a Scope,
}

impl<'a> Saver<'a> {
    pub(crate) fn new(scope: &'a Scope) -> Self {
        Self { scope }
    }

    /// Saves `entity`. A generated id is written back into it.
    ///
    /// # Errors
    ///
    /// Returns usage errors immediately; store errors surface through the
    /// returned [`Pending`].
    pub fn entity<T: Translate>(&self, entity: &mut T) -> CoreResult<Pending<Key>> {
        let result = self.save_all(std::slice::from_mut(entity))?.and_then(|keys| {
            keys.into_iter()
                .next()
                .ok_or_else(|| CoreError::invalid_operation("store returned no key"))
        });
        Ok(pending(self.scope, result))
    }

    /// Saves `entities` in one batch. Generated ids are written back.
    ///
    /// # Errors
    ///
    /// See [`Saver::entity`].
    pub fn entities<T: Translate>(&self, entities: &mut [T]) -> CoreResult<Pending<Vec<Key>>> {
        let result = self.save_all(entities)?;
        Ok(pending(self.scope, result))
    }

    /// The outer result carries usage errors, the inner one the store's.
    fn save_all<T: Translate>(&self, entities: &mut [T]) -> CoreResult<CoreResult<Vec<Key>>> {
        let metadata = metadata::<T>(self.scope)?;
        let engine = WriteEngine::new(self.scope)?;
        let raws = entities
            .iter()
            .map(|entity| metadata.to_storage(entity))
            .collect::<CoreResult<Vec<_>>>()?;

        let result = engine.save(raws);
        if let Ok(keys) = &result {
            for (entity, key) in entities.iter_mut().zip(keys) {
                if metadata.is_identity_generated(entity) {
                    metadata.assign_key(entity, key)?;
                }
            }
        }
        Ok(result)
    }

    /// Saves untyped entities of any kind.
    ///
    /// # Errors
    ///
    /// See [`Saver::entity`].
    pub fn raw(&self, entities: Vec<RawEntity>) -> CoreResult<Pending<Vec<Key>>> {
        let engine = WriteEngine::new(self.scope)?;
        Ok(pending(self.scope, engine.save(entities)))
    }
}

/// Deletes entities immediately.
#[derive(Debug, Clone, Copy)]
pub struct Deleter<'a> {
    scope: &'a Scope,
}

impl<'a> Deleter<'a> {
    pub(crate) fn new(scope: &'a Scope) -> Self {
        Self { scope }
    }

    /// Deletes the entity stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns usage errors immediately; store errors surface through the
    /// returned [`Pending`].
    pub fn key(&self, key: &Key) -> CoreResult<Pending<()>> {
        self.keys(std::slice::from_ref(key))
    }

    /// Deletes `keys` in one batch.
    ///
    /// # Errors
    ///
    /// See [`Deleter::key`].
    pub fn keys(&self, keys: &[Key]) -> CoreResult<Pending<()>> {
        for key in keys {
            check_complete(key)?;
        }
        let engine = WriteEngine::new(self.scope)?;
        Ok(pending(self.scope, engine.delete(keys.to_vec())))
    }

    /// Deletes `entity` by its key.
    ///
    /// # Errors
    ///
    /// Returns a programming error if `entity` has no id, and otherwise see
    /// [`Deleter::key`].
    pub fn entity<T: Translate>(&self, entity: &T) -> CoreResult<Pending<()>> {
        self.entities(std::slice::from_ref(entity))
    }

    /// Deletes `entities` in one batch.
    ///
    /// # Errors
    ///
    /// See [`Deleter::entity`].
    pub fn entities<T: Translate>(&self, entities: &[T]) -> CoreResult<Pending<()>> {
        let metadata = metadata::<T>(self.scope)?;
        let keys = entities
            .iter()
            .map(|entity| metadata.key_of(entity))
            .collect::<CoreResult<Vec<_>>>()?;
        self.keys(&keys)
    }
}

/// Buffers writes until the scope flushes.
#[derive(Debug, Clone, Copy)]
pub struct Deferred<'a> {
    scope: &'a Scope,
}

impl<'a> Deferred<'a> {
    pub(crate) fn new(scope: &'a Scope) -> Self {
        Self { scope }
    }

    /// Starts a deferred save.
    #[must_use]
    pub fn save(&self) -> DeferredSaver<'a> {
        DeferredSaver { scope: self.scope }
    }

    /// Starts a deferred delete.
    #[must_use]
    pub fn delete(&self) -> DeferredDeleter<'a> {
        DeferredDeleter { scope: self.scope }
    }
}

/// Deferred saves.
#[derive(Debug, Clone, Copy)]
pub struct DeferredSaver<'a> {
    scope: &'a Scope,
}

impl DeferredSaver<'_> {
    /// Buffers a save of `entity`. A missing numeric id is allocated right
    /// away and written back, so the entity has its final key before the
    /// flush.
    ///
    /// # Errors
    ///
    /// Returns an error if the type is unregistered, translation fails or
    /// id allocation fails.
    pub fn entity<T: Translate>(&self, entity: &mut T) -> CoreResult<()> {
        self.entities(std::slice::from_mut(entity))
    }

    /// Buffers saves of `entities`.
    ///
    /// # Errors
    ///
    /// See [`DeferredSaver::entity`].
    pub fn entities<T: Translate>(&self, entities: &mut [T]) -> CoreResult<()> {
        let metadata = metadata::<T>(self.scope)?;
        let mut raws = Vec::with_capacity(entities.len());
        for entity in entities.iter_mut() {
            if metadata.is_identity_generated(entity) {
                let incomplete = metadata.extract_identity(entity)?;
                let allocated = self.scope.factory().store().allocate_ids(&incomplete, 1)?;
                let key = allocated
                    .first()
                    .ok_or_else(|| CoreError::invalid_operation("store allocated no id"))?;
                metadata.assign_key(entity, key)?;
            }
            raws.push(metadata.to_storage(entity)?);
        }

        let mut session = self.scope.session().borrow_mut();
        let mut deferrer = self.scope.transactor().deferrer().borrow_mut();
        for raw in raws {
            deferrer.defer_save(&mut session, raw);
        }
        Ok(())
    }
}

/// Deferred deletes.
#[derive(Debug, Clone, Copy)]
pub struct DeferredDeleter<'a> {
    scope: &'a Scope,
}

impl DeferredDeleter<'_> {
    /// Buffers a delete of `key`.
    ///
    /// # Errors
    ///
    /// Returns a programming error if `key` is incomplete.
    pub fn key(&self, key: &Key) -> CoreResult<()> {
        self.keys(std::slice::from_ref(key))
    }

    /// Buffers deletes of `keys`.
    ///
    /// # Errors
    ///
    /// See [`DeferredDeleter::key`].
    pub fn keys(&self, keys: &[Key]) -> CoreResult<()> {
        for key in keys {
            check_complete(key)?;
        }
        let mut session = self.scope.session().borrow_mut();
        let mut deferrer = self.scope.transactor().deferrer().borrow_mut();
        for key in keys {
            deferrer.defer_delete(&mut session, key.clone());
        }
        Ok(())
    }

    /// Buffers a delete of `entity`.
    ///
    /// # Errors
    ///
    /// Returns a programming error if `entity` has no id.
    pub fn entity<T: Translate>(&self, entity: &T) -> CoreResult<()> {
        let key = metadata::<T>(self.scope)?.key_of(entity)?;
        self.key(&key)
    }
}
