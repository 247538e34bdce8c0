//! Fixtures shared by unit tests.

use crate::config::Config;
use crate::error::CoreResult;
use crate::metadata::{KeyMetadata, Registry};
use crate::scope::Factory;
use crate::translate::{self, Translate};
use entiscope_store::{InMemoryDatastore, Properties};
use std::sync::Arc;

#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct Note {
    pub(crate) id: Option<i64>,
    pub(crate) text: String,
}

impl Note {
    pub(crate) fn new(text: &str) -> Self {
        Self {
            id: None,
            text: text.to_string(),
        }
    }
}

impl Translate for Note {
    fn to_properties(&self) -> CoreResult<Properties> {
        let mut props = Properties::new();
        props.insert("text".into(), self.text.clone().into());
        Ok(props)
    }

    fn from_properties(props: &Properties) -> CoreResult<Self> {
        Ok(Self {
            id: None,
            text: translate::text(props, "text")?.unwrap_or_default(),
        })
    }
}

pub(crate) fn factory_with(config: Config) -> (Arc<InMemoryDatastore>, Factory) {
    let store = Arc::new(InMemoryDatastore::new());
    let mut registry = Registry::new();
    registry
        .register(KeyMetadata::<Note>::new("Note").long_id("id", |n| n.id, |n, id| n.id = Some(id)))
        .unwrap();
    let factory = Factory::new(store.clone(), registry, config);
    (store, factory)
}

pub(crate) fn factory() -> (Arc<InMemoryDatastore>, Factory) {
    factory_with(Config::default())
}
