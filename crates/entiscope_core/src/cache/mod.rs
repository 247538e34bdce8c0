//! Second-level cache: the service interface, a retrying decorator, and
//! entity snapshot handling.

mod entity;
mod memory;
mod retry;
mod service;

pub use entity::{CacheLookup, EntityCache};
pub use memory::InMemoryCache;
pub use retry::{CacheRetryProxy, DEFAULT_MAX_ATTEMPTS};
pub use service::{CacheError, CacheItem, CachePut, CacheResult, CacheService, ErrorHandling};
