//! Identity metadata and the entity type registry.
//!
//! Every entity type declares, once at registration, which of its fields
//! holds the id and which (if any) holds the parent key. The metadata is
//! validated when registered and then drives key extraction, generated-id
//! write-back, and conversion to and from [`RawEntity`].

use crate::error::{CoreError, CoreResult};
use crate::translate::Translate;
use entiscope_store::{Key, KeyId, RawEntity};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;

enum IdField<T> {
    /// Numeric id; `None` means the store allocates one on save.
    Long {
        name: String,
        get: fn(&T) -> Option<i64>,
        set: fn(&mut T, i64),
    },
    /// String name; must be set before save.
    Name {
        name: String,
        get: fn(&T) -> Option<String>,
        set: fn(&mut T, String),
    },
}

impl<T> IdField<T> {
    fn name(&self) -> &str {
        match self {
            Self::Long { name, .. } | Self::Name { name, .. } => name,
        }
    }
}

struct ParentField<T> {
    name: String,
    get: fn(&T) -> Option<Key>,
    set: fn(&mut T, Key),
}

/// Registration-time identity descriptor for entity type `T`.
///
/// # Example
///
/// ```rust,ignore
/// let meta = KeyMetadata::<Person>::new("Person")
///     .long_id("id", |p| p.id, |p, id| p.id = Some(id))
///     .cached();
/// registry.register(meta)?;
/// ```
pub struct KeyMetadata<T> {
    kind: String,
    id: Option<IdField<T>>,
    parent: Option<ParentField<T>>,
    cached: bool,
    problems: Vec<String>,
}

impl<T: Translate> KeyMetadata<T> {
    /// Starts a descriptor for `kind`.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: None,
            parent: None,
            cached: false,
            problems: Vec::new(),
        }
    }

    /// Declares a numeric id field. An unset id is allocated on save.
    #[must_use]
    pub fn long_id(
        mut self,
        name: impl Into<String>,
        get: fn(&T) -> Option<i64>,
        set: fn(&mut T, i64),
    ) -> Self {
        let field = IdField::Long {
            name: name.into(),
            get,
            set,
        };
        self.set_id(field);
        self
    }

    /// Declares a string name field. The name must be set before save.
    #[must_use]
    pub fn name_id(
        mut self,
        name: impl Into<String>,
        get: fn(&T) -> Option<String>,
        set: fn(&mut T, String),
    ) -> Self {
        let field = IdField::Name {
            name: name.into(),
            get,
            set,
        };
        self.set_id(field);
        self
    }

    /// Declares the parent key field.
    #[must_use]
    pub fn parent(
        mut self,
        name: impl Into<String>,
        get: fn(&T) -> Option<Key>,
        set: fn(&mut T, Key),
    ) -> Self {
        if let Some(existing) = &self.parent {
            self.problems
                .push(format!("multiple parent fields ({} and another)", existing.name));
        }
        self.parent = Some(ParentField {
            name: name.into(),
            get,
            set,
        });
        self
    }

    /// Opts the kind into the second-level cache.
    #[must_use]
    pub fn cached(mut self) -> Self {
        self.cached = true;
        self
    }

    fn set_id(&mut self, field: IdField<T>) {
        if let Some(existing) = &self.id {
            self.problems
                .push(format!("multiple id fields ({} and {})", existing.name(), field.name()));
        }
        self.id = Some(field);
    }

    /// Checks that the descriptor is usable.
    pub(crate) fn validate(&self) -> CoreResult<()> {
        if self.kind.is_empty() {
            return Err(CoreError::invalid_metadata("", "kind must not be empty"));
        }
        if let Some(problem) = self.problems.first() {
            return Err(CoreError::invalid_metadata(&self.kind, problem.clone()));
        }
        let Some(id) = &self.id else {
            return Err(CoreError::invalid_metadata(&self.kind, "no id field declared"));
        };
        if id.name().is_empty() {
            return Err(CoreError::invalid_metadata(&self.kind, "id field name is empty"));
        }
        if let Some(parent) = &self.parent {
            if parent.name == id.name() {
                return Err(CoreError::invalid_metadata(
                    &self.kind,
                    format!("field {} cannot be both id and parent", parent.name),
                ));
            }
        }
        Ok(())
    }

    /// Returns the kind.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Returns whether the kind is second-level cached.
    #[must_use]
    pub fn is_cached(&self) -> bool {
        self.cached
    }

    fn id_field(&self) -> CoreResult<&IdField<T>> {
        self.id
            .as_ref()
            .ok_or_else(|| CoreError::invalid_metadata(&self.kind, "no id field declared"))
    }

    /// Builds the key of `entity`. The key is incomplete when the numeric
    /// id is unset.
    ///
    /// # Errors
    ///
    /// Returns a programming error if a string name is unset.
    pub fn extract_identity(&self, entity: &T) -> CoreResult<Key> {
        let parent = self.parent.as_ref().and_then(|p| (p.get)(entity));
        let id = match self.id_field()? {
            IdField::Long { get, .. } => match get(entity) {
                Some(id) => KeyId::Id(id),
                None => KeyId::Incomplete,
            },
            IdField::Name { name, get, .. } => match get(entity) {
                Some(value) => KeyId::Name(value),
                None => {
                    return Err(CoreError::programming(format!(
                        "{} has a null name id in field {name}",
                        self.kind
                    )))
                }
            },
        };
        Ok(match parent {
            Some(parent) => Key::with_parent(parent, self.kind.clone(), id),
            None => Key::new(self.kind.clone(), id),
        })
    }

    /// Builds the complete key of `entity`.
    ///
    /// # Errors
    ///
    /// Returns a programming error if the entity has no id yet.
    pub fn key_of(&self, entity: &T) -> CoreResult<Key> {
        let key = self.extract_identity(entity)?;
        if !key.is_complete() {
            return Err(CoreError::programming(format!(
                "{key} has no id; save it or assign one first"
            )));
        }
        Ok(key)
    }

    /// Checks whether saving `entity` will allocate its id.
    #[must_use]
    pub fn is_identity_generated(&self, entity: &T) -> bool {
        matches!(&self.id, Some(IdField::Long { get, .. }) if get(entity).is_none())
    }

    /// Writes the id (and parent, when declared) of `key` into `entity`.
    ///
    /// # Errors
    ///
    /// Returns a programming error if the key does not fit the declared
    /// identity fields.
    pub fn assign_key(&self, entity: &mut T, key: &Key) -> CoreResult<()> {
        match (self.id_field()?, key.id()) {
            (IdField::Long { set, .. }, KeyId::Id(id)) => set(entity, *id),
            (IdField::Name { set, .. }, KeyId::Name(name)) => set(entity, name.clone()),
            (field, id) => {
                return Err(CoreError::programming(format!(
                    "key {key} has id {id:?} which does not fit field {} of {}",
                    field.name(),
                    self.kind
                )))
            }
        }
        match (&self.parent, key.parent()) {
            (Some(field), Some(parent)) => (field.set)(entity, parent.clone()),
            (None, Some(_)) => {
                return Err(CoreError::programming(format!(
                    "loaded {key} has a parent but {} declares no parent field",
                    self.kind
                )))
            }
            _ => {}
        }
        Ok(())
    }

    fn check_collisions(&self, raw: &RawEntity) -> CoreResult<()> {
        let id_name = self.id_field()?.name();
        if raw.has_property(id_name) {
            return Err(CoreError::programming(format!(
                "{} has a property named {id_name} which collides with the id field",
                raw.key()
            )));
        }
        if let Some(parent) = &self.parent {
            if raw.has_property(&parent.name) {
                return Err(CoreError::programming(format!(
                    "{} has a property named {} which collides with the parent field",
                    raw.key(),
                    parent.name
                )));
            }
        }
        Ok(())
    }

    /// Converts `entity` to its storage form.
    ///
    /// # Errors
    ///
    /// Returns an error if translation fails or a property collides with
    /// an identity field.
    pub fn to_storage(&self, entity: &T) -> CoreResult<RawEntity> {
        let raw = RawEntity::with_properties(self.extract_identity(entity)?, entity.to_properties()?);
        self.check_collisions(&raw)?;
        Ok(raw)
    }

    /// Rebuilds an entity from its storage form.
    ///
    /// # Errors
    ///
    /// Returns an error if the kind does not match, a property collides
    /// with an identity field, or translation fails.
    pub fn from_storage(&self, raw: &RawEntity) -> CoreResult<T> {
        if raw.key().kind() != self.kind {
            return Err(CoreError::programming(format!(
                "cannot load {} as kind {}",
                raw.key(),
                self.kind
            )));
        }
        self.check_collisions(raw)?;
        let mut entity = T::from_properties(raw.properties())?;
        self.assign_key(&mut entity, raw.key())?;
        Ok(entity)
    }
}

impl<T> fmt::Debug for KeyMetadata<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMetadata")
            .field("kind", &self.kind)
            .field("id", &self.id.as_ref().map(IdField::name))
            .field("parent", &self.parent.as_ref().map(|p| p.name.as_str()))
            .field("cached", &self.cached)
            .finish()
    }
}

#[derive(Debug)]
struct KindInfo {
    type_name: &'static str,
    cached: bool,
}

/// Registry of entity types and their identity metadata.
#[derive(Default)]
pub struct Registry {
    by_type: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
    kinds: HashMap<String, KindInfo>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates and registers `metadata` for `T`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidMetadata`] if the metadata is invalid or
    /// the kind is already registered to another type.
    pub fn register<T: Translate>(&mut self, metadata: KeyMetadata<T>) -> CoreResult<()> {
        metadata.validate()?;
        let type_name = std::any::type_name::<T>();
        if let Some(existing) = self.kinds.get(metadata.kind()) {
            if existing.type_name != type_name {
                return Err(CoreError::invalid_metadata(
                    metadata.kind(),
                    format!("kind already registered to {}", existing.type_name),
                ));
            }
        }
        self.kinds.insert(
            metadata.kind().to_string(),
            KindInfo {
                type_name,
                cached: metadata.is_cached(),
            },
        );
        self.by_type.insert(TypeId::of::<T>(), Box::new(metadata));
        Ok(())
    }

    /// Returns the metadata of `T`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotRegistered`] if `T` was never registered.
    pub fn metadata<T: Translate>(&self) -> CoreResult<&KeyMetadata<T>> {
        self.by_type
            .get(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast_ref::<KeyMetadata<T>>())
            .ok_or(CoreError::NotRegistered {
                type_name: std::any::type_name::<T>(),
            })
    }

    /// Checks whether entities of `kind` go through the second-level cache.
    #[must_use]
    pub fn is_cached(&self, kind: &str) -> bool {
        self.kinds.get(kind).is_some_and(|info| info.cached)
    }

    /// Checks whether `kind` is registered.
    #[must_use]
    pub fn is_registered(&self, kind: &str) -> bool {
        self.kinds.contains_key(kind)
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("kinds", &self.kinds)
            .finish_non_exhaustive()
    }
}
