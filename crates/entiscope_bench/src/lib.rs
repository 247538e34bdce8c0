//! Benchmark utilities.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use entiscope_core::{translate, Config, CoreResult, Factory, KeyMetadata, Registry, Translate};
use entiscope_store::{Datastore, InMemoryDatastore, Key, Properties};
use rand::Rng;
use std::sync::Arc;

/// Entity used by the benchmarks.
#[derive(Debug, Clone, Default)]
pub struct Sample {
    /// Numeric id.
    pub id: Option<i64>,
    /// Random text.
    pub label: String,
    /// Random number used for ordering.
    pub rank: i64,
}

impl Translate for Sample {
    fn to_properties(&self) -> CoreResult<Properties> {
        let mut props = Properties::new();
        props.insert("label".into(), self.label.clone().into());
        props.insert("rank".into(), self.rank.into());
        Ok(props)
    }

    fn from_properties(props: &Properties) -> CoreResult<Self> {
        Ok(Self {
            id: None,
            label: translate::text(props, "label")?.unwrap_or_default(),
            rank: translate::integer(props, "rank")?.unwrap_or_default(),
        })
    }
}

/// Generates `count` random unsaved samples.
pub fn random_samples(count: usize) -> Vec<Sample> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|_| Sample {
            id: None,
            label: (0..12).map(|_| char::from(rng.gen_range(b'a'..=b'z'))).collect(),
            rank: rng.gen_range(0..1_000_000),
        })
        .collect()
}

/// Builds a factory over an in-memory store holding `count` random samples.
///
/// # Panics
///
/// Panics if seeding the store fails.
pub fn seeded_factory(count: usize, config: Config) -> (Factory, Vec<Key>) {
    let mut registry = Registry::new();
    registry
        .register(KeyMetadata::<Sample>::new("Sample").long_id("id", |s| s.id, |s, id| s.id = Some(id)))
        .expect("Sample metadata is valid");
    let metadata = registry.metadata::<Sample>().expect("Sample is registered");
    let raws = random_samples(count)
        .iter()
        .map(|s| metadata.to_storage(s).expect("Sample translates"))
        .collect();

    let store = Arc::new(InMemoryDatastore::new());
    let keys = store.put(None, raws).expect("seeding succeeds");
    (Factory::new(store, registry, config), keys)
}
