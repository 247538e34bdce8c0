//! Entity snapshots in the second-level cache.

use super::service::{CachePut, CacheService};
use bytes::Bytes;
use entiscope_store::{Key, Properties, RawEntity};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

const KEY_PREFIX: &str = "entiscope:";

/// Serialized form of a cache entry. `None` records that the entity does
/// not exist.
#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    entity: Option<Properties>,
}

/// Outcome of a cache lookup.
#[derive(Debug, Default)]
pub struct CacheLookup {
    /// Keys answered by the cache. `None` means cached as absent.
    pub hits: HashMap<Key, Option<RawEntity>>,
    /// Keys the caller must fetch from the store, in request order.
    pub misses: Vec<Key>,
    /// Versions of the placeholders reserved for misses.
    tokens: HashMap<Key, u64>,
}

/// Reads and writes entity snapshots through a [`CacheService`].
///
/// Misses are reserved with an empty placeholder; the snapshot fetched
/// from the store is then written with compare-and-set against that
/// placeholder, so an invalidation that lands in between wins. Writes to the
/// store invalidate entries and never update them.
///
/// Cache failures are never fatal: they degrade to misses.
#[derive(Clone)]
pub struct EntityCache {
    service: Arc<dyn CacheService>,
}

impl EntityCache {
    /// Creates an entity cache over `service`.
    pub fn new(service: Arc<dyn CacheService>) -> Self {
        Self { service }
    }

    /// Returns the cache key used for `key`.
    #[must_use]
    pub fn cache_key(key: &Key) -> String {
        format!("{KEY_PREFIX}{key}")
    }

    /// Looks up `keys` and reserves placeholders for the misses.
    pub fn get_all(&self, keys: &[Key]) -> CacheLookup {
        let mut lookup = CacheLookup::default();
        if keys.is_empty() {
            return lookup;
        }

        let names: Vec<String> = keys.iter().map(Self::cache_key).collect();
        let items = self.service.get_multi(&names).unwrap_or_else(|err| {
            warn!(error = %err, "cache lookup failed");
            HashMap::new()
        });

        let mut unreserved = Vec::new();
        for (key, name) in keys.iter().zip(names) {
            match items.get(&name) {
                Some(item) if item.value.is_empty() => {
                    lookup.tokens.insert(key.clone(), item.version);
                    lookup.misses.push(key.clone());
                }
                Some(item) => match decode(&item.value) {
                    Ok(snapshot) => {
                        let entity = snapshot
                            .entity
                            .map(|props| RawEntity::with_properties(key.clone(), props));
                        lookup.hits.insert(key.clone(), entity);
                    }
                    Err(message) => {
                        warn!(%key, %message, "replacing undecodable cache entry");
                        lookup.tokens.insert(key.clone(), item.version);
                        lookup.misses.push(key.clone());
                    }
                },
                None => {
                    unreserved.push((key.clone(), name));
                    lookup.misses.push(key.clone());
                }
            }
        }

        if !unreserved.is_empty() {
            let puts = unreserved
                .iter()
                .map(|(_, name)| CachePut::add(name.clone(), Bytes::new()))
                .collect();
            let stored = self.service.put_multi(puts).unwrap_or_else(|err| {
                warn!(error = %err, "cache reservation failed");
                HashMap::new()
            });
            for (key, name) in unreserved {
                if let Some(version) = stored.get(&name) {
                    lookup.tokens.insert(key, *version);
                }
            }
        }

        debug!(
            hits = lookup.hits.len(),
            misses = lookup.misses.len(),
            "cache lookup"
        );
        lookup
    }

    /// Populates the reserved misses of `lookup` with what the store
    /// returned. Keys missing from `found` are cached as absent.
    pub fn populate(&self, lookup: &CacheLookup, found: &HashMap<Key, RawEntity>) {
        let mut puts = Vec::with_capacity(lookup.tokens.len());
        for (key, version) in &lookup.tokens {
            let snapshot = Snapshot {
                entity: found.get(key).map(|raw| raw.properties().clone()),
            };
            match encode(&snapshot) {
                Ok(bytes) => puts.push(CachePut::replace(Self::cache_key(key), bytes, *version)),
                Err(message) => warn!(%key, %message, "cannot encode cache snapshot"),
            }
        }
        if puts.is_empty() {
            return;
        }
        if let Err(err) = self.service.put_multi(puts) {
            warn!(error = %err, "cache population failed");
        }
    }

    /// Removes the entries of `keys`.
    pub fn invalidate(&self, keys: &[Key]) {
        if keys.is_empty() {
            return;
        }
        let names: Vec<String> = keys.iter().map(Self::cache_key).collect();
        if let Err(err) = self.service.delete_multi(&names) {
            warn!(error = %err, "cache invalidation failed");
        }
    }
}

impl std::fmt::Debug for EntityCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityCache").finish_non_exhaustive()
    }
}

fn encode(snapshot: &Snapshot) -> Result<Bytes, String> {
    let mut buf = Vec::new();
    ciborium::into_writer(snapshot, &mut buf).map_err(|e| e.to_string())?;
    Ok(Bytes::from(buf))
}

fn decode(bytes: &[u8]) -> Result<Snapshot, String> {
    ciborium::from_reader(bytes).map_err(|e| e.to_string())
}
