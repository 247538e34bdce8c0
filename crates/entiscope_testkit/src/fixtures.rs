//! Sample entity types and a ready-made test environment.
//!
//! [`TestEnv`] wires a [`CountingDatastore`], optionally a [`FlakyCache`],
//! and a registry with every fixture type into a [`Factory`].

use crate::cache::FlakyCache;
use crate::datastore::CountingDatastore;
use crate::logging::init_test_logging;
use entiscope_core::{translate, Config, CoreResult, Factory, KeyMetadata, Registry, Translate};
use entiscope_store::{Key, Properties};
use std::sync::Arc;

/// A plain cached entity with a generated numeric id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Trivial {
    /// Numeric id; `None` until saved.
    pub id: Option<i64>,
    /// A text property.
    pub some_string: String,
    /// A numeric property.
    pub some_number: i64,
}

impl Trivial {
    /// Creates an unsaved entity.
    pub fn new(some_string: impl Into<String>, some_number: i64) -> Self {
        Self {
            id: None,
            some_string: some_string.into(),
            some_number,
        }
    }

    /// Creates an entity with a fixed id.
    pub fn with_id(id: i64, some_string: impl Into<String>, some_number: i64) -> Self {
        Self {
            id: Some(id),
            ..Self::new(some_string, some_number)
        }
    }

    /// Returns the key of an entity with `id`.
    #[must_use]
    pub fn key(id: i64) -> Key {
        Key::new(Self::KIND, id)
    }

    /// The kind name.
    pub const KIND: &'static str = "Trivial";
}

impl Translate for Trivial {
    fn to_properties(&self) -> CoreResult<Properties> {
        let mut props = Properties::new();
        props.insert("someString".into(), self.some_string.clone().into());
        props.insert("someNumber".into(), self.some_number.into());
        Ok(props)
    }

    fn from_properties(props: &Properties) -> CoreResult<Self> {
        Ok(Self {
            id: None,
            some_string: translate::text(props, "someString")?.unwrap_or_default(),
            some_number: translate::integer(props, "someNumber")?.unwrap_or_default(),
        })
    }
}

/// An uncached entity that lives in its parent's entity group.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Child {
    /// Numeric id; `None` until saved.
    pub id: Option<i64>,
    /// Parent key.
    pub parent: Option<Key>,
    /// A text property.
    pub label: String,
}

impl Child {
    /// Creates an unsaved child of `parent`.
    pub fn new(parent: Key, label: impl Into<String>) -> Self {
        Self {
            id: None,
            parent: Some(parent),
            label: label.into(),
        }
    }

    /// The kind name.
    pub const KIND: &'static str = "Child";
}

impl Translate for Child {
    fn to_properties(&self) -> CoreResult<Properties> {
        let mut props = Properties::new();
        props.insert("label".into(), self.label.clone().into());
        Ok(props)
    }

    fn from_properties(props: &Properties) -> CoreResult<Self> {
        Ok(Self {
            label: translate::text(props, "label")?.unwrap_or_default(),
            ..Self::default()
        })
    }
}

/// A cached entity identified by a string name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Named {
    /// String id; must be set before save.
    pub name: Option<String>,
    /// Whether the entity is enabled.
    pub enabled: bool,
}

impl Named {
    /// Creates an entity named `name`.
    pub fn new(name: impl Into<String>, enabled: bool) -> Self {
        Self {
            name: Some(name.into()),
            enabled,
        }
    }

    /// The kind name.
    pub const KIND: &'static str = "Named";
}

impl Translate for Named {
    fn to_properties(&self) -> CoreResult<Properties> {
        let mut props = Properties::new();
        props.insert("enabled".into(), self.enabled.into());
        Ok(props)
    }

    fn from_properties(props: &Properties) -> CoreResult<Self> {
        Ok(Self {
            name: None,
            enabled: translate::boolean(props, "enabled")?.unwrap_or_default(),
        })
    }
}

/// Returns a registry with every fixture type.
///
/// # Panics
///
/// Panics if a fixture's metadata is invalid.
#[must_use]
pub fn fixture_registry() -> Registry {
    let mut registry = Registry::new();
    registry
        .register(
            KeyMetadata::<Trivial>::new(Trivial::KIND)
                .long_id("id", |t| t.id, |t, id| t.id = Some(id))
                .cached(),
        )
        .expect("Trivial metadata is valid");
    registry
        .register(
            KeyMetadata::<Child>::new(Child::KIND)
                .long_id("id", |c| c.id, |c, id| c.id = Some(id))
                .parent("parent", |c| c.parent.clone(), |c, k| c.parent = Some(k)),
        )
        .expect("Child metadata is valid");
    registry
        .register(
            KeyMetadata::<Named>::new(Named::KIND)
                .name_id("name", |n| n.name.clone(), |n, name| n.name = Some(name))
                .cached(),
        )
        .expect("Named metadata is valid");
    registry
}

/// A factory over instrumented collaborators.
pub struct TestEnv {
    /// The counting datastore behind the factory.
    pub store: Arc<CountingDatastore>,
    /// The cache behind the factory, if any.
    pub cache: Option<Arc<FlakyCache>>,
    /// The factory.
    pub factory: Factory,
}

impl TestEnv {
    /// An environment without a cache and with default config.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// An environment with a working cache.
    #[must_use]
    pub fn cached() -> Self {
        Self::builder().cache(FlakyCache::new()).build()
    }

    /// Starts building an environment.
    #[must_use]
    pub fn builder() -> TestEnvBuilder {
        TestEnvBuilder {
            config: Config::default(),
            cache: None,
        }
    }

    /// Returns the cache.
    ///
    /// # Panics
    ///
    /// Panics if the environment has no cache.
    #[must_use]
    pub fn cache(&self) -> &FlakyCache {
        self.cache.as_deref().expect("environment has no cache")
    }

    /// Stores `entities` directly, bypassing sessions and the cache.
    ///
    /// # Panics
    ///
    /// Panics if translation or the store fails.
    pub fn seed(&self, entities: &[Trivial]) -> Vec<Key> {
        use entiscope_store::Datastore;

        let metadata = self
            .factory
            .registry()
            .metadata::<Trivial>()
            .expect("Trivial is registered");
        let raws = entities
            .iter()
            .map(|t| metadata.to_storage(t).expect("Trivial translates"))
            .collect();
        let keys = self.store.put(None, raws).expect("seeding succeeds");
        self.store.reset_counts();
        keys
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for [`TestEnv`].
pub struct TestEnvBuilder {
    config: Config,
    cache: Option<FlakyCache>,
}

impl TestEnvBuilder {
    /// Sets the configuration.
    #[must_use]
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Adds a cache.
    #[must_use]
    pub fn cache(mut self, cache: FlakyCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Builds the environment and installs test logging.
    #[must_use]
    pub fn build(self) -> TestEnv {
        init_test_logging();
        let store = Arc::new(CountingDatastore::new());
        let cache = self.cache.map(Arc::new);
        let mut builder = Factory::builder(store.clone())
            .registry(fixture_registry())
            .config(self.config);
        if let Some(cache) = &cache {
            builder = builder.cache(Arc::clone(cache));
        }
        TestEnv {
            store,
            cache,
            factory: builder.build(),
        }
    }
}
