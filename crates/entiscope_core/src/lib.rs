//! # Entiscope Core
//!
//! Unit-of-work data access over a key-value datastore: typed entities,
//! a per-scope session, write-behind deferral, propagated transactions
//! with optimistic-concurrency retry, a fail-open second-level cache, and
//! session-aware queries.
//!
//! ## Design Principles
//!
//! - A [`Scope`] is a single-threaded unit of work; a [`Factory`] is shared
//! - Every key a scope resolves is remembered in its [`Session`]
//! - Transactions retry on conflict with a fresh session per attempt
//! - Commit listeners run only after a confirmed commit
//! - The second-level cache never fails a read; writes only invalidate it
//! - Queries run hybrid by default: keys from the index, entities through
//!   the load pipeline
//!
//! ## Example
//!
//! ```rust
//! use entiscope_core::{translate, Config, CoreResult, Factory, KeyMetadata, Registry, Translate};
//! use entiscope_store::{InMemoryDatastore, Properties};
//! use std::sync::Arc;
//!
//! #[derive(Debug, Default)]
//! struct Note {
//!     id: Option<i64>,
//!     text: String,
//! }
//!
//! impl Translate for Note {
//!     fn to_properties(&self) -> CoreResult<Properties> {
//!         let mut properties = Properties::new();
//!         properties.insert("text".into(), self.text.clone().into());
//!         Ok(properties)
//!     }
//!
//!     fn from_properties(properties: &Properties) -> CoreResult<Self> {
//!         Ok(Self {
//!             id: None,
//!             text: translate::text(properties, "text")?.unwrap_or_default(),
//!         })
//!     }
//! }
//!
//! let mut registry = Registry::new();
//! registry
//!     .register(KeyMetadata::<Note>::new("Note").long_id("id", |n| n.id, |n, id| n.id = Some(id)))
//!     .unwrap();
//! let factory = Factory::new(Arc::new(InMemoryDatastore::new()), registry, Config::default());
//!
//! let id = factory
//!     .run(|scope| {
//!         scope.transact(|scope| {
//!             let mut note = Note { id: None, text: "hello".into() };
//!             scope.save().entity(&mut note)?.now()?;
//!             Ok(note.id.unwrap_or_default())
//!         })
//!     })
//!     .unwrap();
//!
//! let scope = factory.begin();
//! let note: Option<Note> = scope.load().id(id).unwrap();
//! assert_eq!(note.unwrap().text, "hello");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod cache;
mod cmd;
mod config;
mod deferrer;
mod error;
mod load;
mod metadata;
mod pending;
mod query;
mod scope;
mod session;
#[cfg(test)]
mod testing;
mod transaction;
pub mod translate;
mod write;

pub use cmd::{Deferred, DeferredDeleter, DeferredSaver, Deleter, Loader, Saver};
pub use config::{Config, Options};
pub use deferrer::{DeferredBatch, DeferredOp, Deferrer};
pub use error::{CoreError, CoreResult};
pub use metadata::{KeyMetadata, Registry};
pub use pending::Pending;
pub use query::{Query, QueryIter};
pub use scope::{Factory, FactoryBuilder, Scope};
pub use session::{Session, SessionValue};
pub use transaction::{Propagation, Transaction, TransactionState};
pub use translate::Translate;
