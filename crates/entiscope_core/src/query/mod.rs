//! Queries: the typed builder and the execution strategies behind it.

mod builder;
mod engine;
mod iter;

pub use builder::{Query, QueryIter};
