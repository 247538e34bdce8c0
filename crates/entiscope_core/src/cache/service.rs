//! Distributed cache collaborator interface.

use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors reported by a cache service in strict mode.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The service could not be reached or timed out.
    #[error("cache unavailable: {0}")]
    Unavailable(String),

    /// The service returned something that could not be understood.
    #[error("malformed cache response: {0}")]
    Malformed(String),
}

/// How a cache client treats failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorHandling {
    /// Failures are swallowed and reported as misses or no-ops.
    #[default]
    Lenient,
    /// Failures are returned as errors.
    Strict,
}

/// A cached value with the version token used for compare-and-set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheItem {
    /// Stored bytes.
    pub value: Bytes,
    /// Version assigned when the value was stored.
    pub version: u64,
}

/// A conditional write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePut {
    /// Cache key.
    pub key: String,
    /// Bytes to store.
    pub value: Bytes,
    /// `None` stores only if the key is absent. `Some(v)` stores only if
    /// the current version is still `v`.
    pub expected: Option<u64>,
}

impl CachePut {
    /// Creates an add-if-absent write.
    pub fn add(key: impl Into<String>, value: Bytes) -> Self {
        Self {
            key: key.into(),
            value,
            expected: None,
        }
    }

    /// Creates a compare-and-set write.
    pub fn replace(key: impl Into<String>, value: Bytes, expected: u64) -> Self {
        Self {
            key: key.into(),
            value,
            expected: Some(expected),
        }
    }
}

/// A memcache-style distributed cache.
///
/// # Invariants
///
/// - `get_multi` omits keys that are not cached
/// - `put_multi` returns the new version of every write that was applied
/// - in [`ErrorHandling::Strict`] mode failures surface as [`CacheError`]
pub trait CacheService: Send + Sync {
    /// Fetches the cached items for `keys`.
    ///
    /// # Errors
    ///
    /// Returns an error in strict mode if the service fails.
    fn get_multi(&self, keys: &[String]) -> CacheResult<HashMap<String, CacheItem>>;

    /// Applies conditional writes.
    ///
    /// # Errors
    ///
    /// Returns an error in strict mode if the service fails.
    fn put_multi(&self, puts: Vec<CachePut>) -> CacheResult<HashMap<String, u64>>;

    /// Removes `keys`.
    ///
    /// # Errors
    ///
    /// Returns an error in strict mode if the service fails.
    fn delete_multi(&self, keys: &[String]) -> CacheResult<()>;

    /// Installs the failure policy.
    fn set_error_handling(&self, handling: ErrorHandling);
}

impl<C: CacheService + ?Sized> CacheService for Arc<C> {
    fn get_multi(&self, keys: &[String]) -> CacheResult<HashMap<String, CacheItem>> {
        (**self).get_multi(keys)
    }

    fn put_multi(&self, puts: Vec<CachePut>) -> CacheResult<HashMap<String, u64>> {
        (**self).put_multi(puts)
    }

    fn delete_multi(&self, keys: &[String]) -> CacheResult<()> {
        (**self).delete_multi(keys)
    }

    fn set_error_handling(&self, handling: ErrorHandling) {
        (**self).set_error_handling(handling);
    }
}
