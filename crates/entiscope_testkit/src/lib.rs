//! # Entiscope Testkit
//!
//! Test utilities for entiscope.
//!
//! This crate provides:
//! - Sample entity types and a ready-made test environment
//! - A datastore wrapper that counts calls and injects commit conflicts
//! - A cache service that fails on demand
//! - Property-based test generators using proptest
//! - Logging setup for tests
//!
//! ## Usage
//!
//! ```rust,ignore
//! use entiscope_testkit::prelude::*;
//!
//! #[test]
//! fn saves_are_visible() {
//!     let env = TestEnv::new();
//!     let scope = env.factory.begin();
//!     let key = scope.save().entity(&mut Trivial::new("a", 1)).unwrap().now().unwrap();
//!     assert!(env.store.inner().contains(&key));
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod cache;
pub mod datastore;
pub mod fixtures;
pub mod generators;
pub mod logging;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cache::*;
    pub use crate::datastore::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::logging::*;
}

pub use cache::*;
pub use datastore::*;
pub use fixtures::*;
pub use generators::*;
pub use logging::*;
