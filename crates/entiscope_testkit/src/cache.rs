//! A cache service that fails on demand.

use entiscope_core::cache::{
    CacheError, CacheItem, CachePut, CacheResult, CacheService, ErrorHandling, InMemoryCache,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Wraps an [`InMemoryCache`] and fails calls when told to.
///
/// Failures honour the installed [`ErrorHandling`]: in strict mode they are
/// returned as [`CacheError::Unavailable`], in lenient mode they look like
/// misses and no-ops.
#[derive(Debug, Default)]
pub struct FlakyCache {
    inner: InMemoryCache,
    fail_next: AtomicUsize,
    fail_always: AtomicBool,
    calls: AtomicUsize,
    failures: AtomicUsize,
    handling_changes: Mutex<Vec<ErrorHandling>>,
}

impl FlakyCache {
    /// Creates a cache that works until told otherwise.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a cache whose every call fails.
    #[must_use]
    pub fn broken() -> Self {
        let cache = Self::new();
        cache.fail_always(true);
        cache
    }

    /// Makes the next `n` calls fail.
    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Makes every call fail, or stops doing so.
    pub fn fail_always(&self, enabled: bool) {
        self.fail_always.store(enabled, Ordering::SeqCst);
    }

    /// Returns the wrapped cache.
    #[must_use]
    pub fn inner(&self) -> &InMemoryCache {
        &self.inner
    }

    /// Returns how many calls were made.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Returns how many calls failed.
    #[must_use]
    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }

    /// Returns every error handling mode installed, in order.
    #[must_use]
    pub fn handling_changes(&self) -> Vec<ErrorHandling> {
        self.handling_changes.lock().clone()
    }

    fn should_fail(&self) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let fail = self.fail_always.load(Ordering::SeqCst)
            || self
                .fail_next
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
        if fail {
            self.failures.fetch_add(1, Ordering::SeqCst);
        }
        fail
    }

    fn call<R: Default>(&self, operation: &str, run: impl FnOnce() -> CacheResult<R>) -> CacheResult<R> {
        if !self.should_fail() {
            return run();
        }
        match self.inner.error_handling() {
            ErrorHandling::Strict => Err(CacheError::Unavailable(format!("{operation} failed"))),
            ErrorHandling::Lenient => Ok(R::default()),
        }
    }
}

impl CacheService for FlakyCache {
    fn get_multi(&self, keys: &[String]) -> CacheResult<HashMap<String, CacheItem>> {
        self.call("get_multi", || self.inner.get_multi(keys))
    }

    fn put_multi(&self, puts: Vec<CachePut>) -> CacheResult<HashMap<String, u64>> {
        self.call("put_multi", || self.inner.put_multi(puts))
    }

    fn delete_multi(&self, keys: &[String]) -> CacheResult<()> {
        self.call("delete_multi", || self.inner.delete_multi(keys))
    }

    fn set_error_handling(&self, handling: ErrorHandling) {
        self.handling_changes.lock().push(handling);
        self.inner.set_error_handling(handling);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn lenient_failures_look_like_misses() {
        let cache = FlakyCache::new();
        cache
            .put_multi(vec![CachePut::add("k", Bytes::from_static(b"v"))])
            .unwrap();
        cache.fail_next(1);

        assert!(cache.get_multi(&["k".to_string()]).unwrap().is_empty());
        assert_eq!(cache.get_multi(&["k".to_string()]).unwrap().len(), 1);
        assert_eq!(cache.failures(), 1);
    }

    #[test]
    fn strict_failures_are_errors() {
        let cache = FlakyCache::broken();
        cache.set_error_handling(ErrorHandling::Strict);

        assert!(cache.delete_multi(&["k".to_string()]).is_err());
        assert_eq!(cache.handling_changes(), vec![ErrorHandling::Strict]);
    }
}
