//! # Entiscope Store
//!
//! The datastore collaborator interface for entiscope, plus an in-memory
//! implementation.
//!
//! The store is a key-value service with structured keys, flat property
//! bags, and entity-group transactions checked with optimistic concurrency.
//! It knows nothing about typed entities, sessions, or caches; those live in
//! `entiscope_core`.
//!
//! ## Design Principles
//!
//! - Keys are structured: kind, numeric id or string name, optional parent
//! - Entities are flat property maps ([`RawEntity`])
//! - Conflicts surface only at commit time
//! - Implementations must be `Send + Sync`
//!
//! ## Example
//!
//! ```rust
//! use entiscope_store::{Datastore, FetchOptions, InMemoryDatastore, Key, Query, RawEntity, ReadOptions};
//!
//! let store = InMemoryDatastore::new();
//! let mut entity = RawEntity::new(Key::new("Person", 1));
//! entity.set_property("name", "Ada");
//! store.put(None, vec![entity]).unwrap();
//!
//! let results = store
//!     .run_query(None, &Query::kind("Person"), &FetchOptions::new(), &ReadOptions::default())
//!     .unwrap();
//! assert_eq!(results.count(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod datastore;
mod error;
mod key;
mod memory;
mod query;
mod types;
mod value;

pub use datastore::{Datastore, QueryResults};
pub use error::{StoreError, StoreResult};
pub use key::{Key, KeyId};
pub use memory::InMemoryDatastore;
pub use query::{Consistency, Direction, FetchOptions, Filter, FilterOp, Order, Query, ReadOptions};
pub use types::{TransactionId, TxnHandle};
pub use value::{Properties, RawEntity, Value, KEY_PROPERTY};
