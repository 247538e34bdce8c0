//! In-memory cache service for testing.

use super::service::{CacheItem, CachePut, CacheResult, CacheService, ErrorHandling};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;

/// An in-memory [`CacheService`].
///
/// Every applied write gets a fresh version from a single counter, so a
/// compare-and-set succeeds only if nothing touched the key in between.
///
/// # Thread Safety
///
/// This cache is thread-safe and can be shared across threads.
#[derive(Debug, Default)]
pub struct InMemoryCache {
    items: Mutex<HashMap<String, CacheItem>>,
    next_version: Mutex<u64>,
    handling: RwLock<ErrorHandling>,
}

impl InMemoryCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of cached keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Checks whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Checks whether `key` is cached.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.items.lock().contains_key(key)
    }

    /// Returns the installed failure policy.
    #[must_use]
    pub fn error_handling(&self) -> ErrorHandling {
        *self.handling.read()
    }

    /// Removes every key.
    pub fn clear(&self) {
        self.items.lock().clear();
    }

    fn bump(&self) -> u64 {
        let mut next = self.next_version.lock();
        *next += 1;
        *next
    }
}

impl CacheService for InMemoryCache {
    fn get_multi(&self, keys: &[String]) -> CacheResult<HashMap<String, CacheItem>> {
        let items = self.items.lock();
        Ok(keys
            .iter()
            .filter_map(|k| items.get(k).map(|item| (k.clone(), item.clone())))
            .collect())
    }

    fn put_multi(&self, puts: Vec<CachePut>) -> CacheResult<HashMap<String, u64>> {
        let mut items = self.items.lock();
        let mut stored = HashMap::new();
        for put in puts {
            let current = items.get(&put.key).map(|item| item.version);
            let applies = match put.expected {
                None => current.is_none(),
                Some(expected) => current == Some(expected),
            };
            if applies {
                let version = self.bump();
                items.insert(
                    put.key.clone(),
                    CacheItem {
                        value: put.value,
                        version,
                    },
                );
                stored.insert(put.key, version);
            }
        }
        Ok(stored)
    }

    fn delete_multi(&self, keys: &[String]) -> CacheResult<()> {
        let mut items = self.items.lock();
        for key in keys {
            items.remove(key);
        }
        Ok(())
    }

    fn set_error_handling(&self, handling: ErrorHandling) {
        *self.handling.write() = handling;
    }
}
