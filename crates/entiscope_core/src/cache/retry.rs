//! Bounded-retry decorator for cache services.

use super::service::{CacheItem, CachePut, CacheResult, CacheService, ErrorHandling};
use std::collections::HashMap;
use tracing::{error, warn};

/// Attempts per call when none is configured.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 4;

/// Wraps a [`CacheService`] so that failures are retried and then masked.
///
/// Each call is attempted up to `max_attempts` times with no backoff. Every
/// failed attempt but the last is logged at warn level; the last is logged
/// at error level and the call returns a neutral result (no hits, nothing
/// stored). Callers therefore never see a cache error and fall through to
/// the datastore.
///
/// Construction switches the wrapped client to [`ErrorHandling::Strict`] so
/// that failures are visible to the proxy instead of silently swallowed.
#[derive(Debug)]
pub struct CacheRetryProxy<C> {
    inner: C,
    max_attempts: u32,
}

impl<C: CacheService> CacheRetryProxy<C> {
    /// Wraps `inner` with [`DEFAULT_MAX_ATTEMPTS`].
    pub fn new(inner: C) -> Self {
        Self::with_attempts(inner, DEFAULT_MAX_ATTEMPTS)
    }

    /// Wraps `inner` with a custom attempt count. Zero is treated as one.
    pub fn with_attempts(inner: C, max_attempts: u32) -> Self {
        inner.set_error_handling(ErrorHandling::Strict);
        Self {
            inner,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Returns the attempt count.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the wrapped service.
    #[must_use]
    pub fn inner(&self) -> &C {
        &self.inner
    }

    fn attempt<R: Default>(&self, operation: &str, call: impl Fn(&C) -> CacheResult<R>) -> R {
        for attempt in 1..=self.max_attempts {
            match call(&self.inner) {
                Ok(result) => return result,
                Err(err) if attempt < self.max_attempts => {
                    warn!(operation, attempt, error = %err, "cache call failed, retrying");
                }
                Err(err) => {
                    error!(
                        operation,
                        attempts = self.max_attempts,
                        error = %err,
                        "cache call failed, giving up"
                    );
                }
            }
        }
        R::default()
    }
}

impl<C: CacheService> CacheService for CacheRetryProxy<C> {
    fn get_multi(&self, keys: &[String]) -> CacheResult<HashMap<String, CacheItem>> {
        Ok(self.attempt("get_multi", |c| c.get_multi(keys)))
    }

    fn put_multi(&self, puts: Vec<CachePut>) -> CacheResult<HashMap<String, u64>> {
        Ok(self.attempt("put_multi", |c| c.put_multi(puts.clone())))
    }

    fn delete_multi(&self, keys: &[String]) -> CacheResult<()> {
        self.attempt("delete_multi", |c| c.delete_multi(keys));
        Ok(())
    }

    fn set_error_handling(&self, handling: ErrorHandling) {
        self.inner.set_error_handling(handling);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::service::CacheError;
    use crate::cache::InMemoryCache;
    use bytes::Bytes;
    use parking_lot::Mutex;

    /// Fails the first `failures` calls of every operation.
    #[derive(Default)]
    struct Flaky {
        failures: Mutex<u32>,
        calls: Mutex<u32>,
        handling: Mutex<ErrorHandling>,
        backing: InMemoryCache,
    }

    impl Flaky {
        fn failing(failures: u32) -> Self {
            Self {
                failures: Mutex::new(failures),
                ..Self::default()
            }
        }

        fn check(&self) -> CacheResult<()> {
            *self.calls.lock() += 1;
            let mut failures = self.failures.lock();
            if *failures > 0 {
                *failures -= 1;
                return Err(CacheError::Unavailable("down".into()));
            }
            Ok(())
        }

        fn calls(&self) -> u32 {
            *self.calls.lock()
        }
    }

    impl CacheService for Flaky {
        fn get_multi(&self, keys: &[String]) -> CacheResult<HashMap<String, CacheItem>> {
            self.check()?;
            self.backing.get_multi(keys)
        }

        fn put_multi(&self, puts: Vec<CachePut>) -> CacheResult<HashMap<String, u64>> {
            self.check()?;
            self.backing.put_multi(puts)
        }

        fn delete_multi(&self, keys: &[String]) -> CacheResult<()> {
            self.check()?;
            self.backing.delete_multi(keys)
        }

        fn set_error_handling(&self, handling: ErrorHandling) {
            *self.handling.lock() = handling;
        }
    }

    #[test]
    fn construction_installs_strict_handling() {
        let proxy = CacheRetryProxy::new(Flaky::default());
        assert_eq!(*proxy.inner().handling.lock(), ErrorHandling::Strict);
        assert_eq!(proxy.max_attempts(), DEFAULT_MAX_ATTEMPTS);
    }

    #[test]
    fn recovers_within_attempt_budget() {
        let proxy = CacheRetryProxy::new(Flaky::failing(3));
        let stored = proxy
            .put_multi(vec![CachePut::add("k", Bytes::from_static(b"v"))])
            .unwrap();

        assert_eq!(stored.len(), 1);
        assert_eq!(proxy.inner().calls(), 4);
    }

    #[test]
    fn gives_up_with_neutral_result() {
        let proxy = CacheRetryProxy::new(Flaky::failing(10));
        let items = proxy.get_multi(&["k".to_string()]).unwrap();

        assert!(items.is_empty());
        assert_eq!(proxy.inner().calls(), 4);
        assert!(proxy.delete_multi(&["k".to_string()]).is_ok());
    }

    #[test]
    fn zero_attempts_means_one() {
        let proxy = CacheRetryProxy::with_attempts(Flaky::failing(1), 0);
        assert_eq!(proxy.max_attempts(), 1);
        assert!(proxy.get_multi(&[]).unwrap().is_empty());
        assert_eq!(proxy.inner().calls(), 1);
    }
}
