//! Per-scope identity cache.

use entiscope_store::{Key, RawEntity};
use std::collections::HashMap;

/// What a session knows about a key.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionValue {
    /// The entity as last loaded or written in this scope.
    Present(RawEntity),
    /// The entity is known not to exist (deleted or never stored).
    Absent,
}

impl SessionValue {
    /// Returns the entity, if present.
    #[must_use]
    pub fn entity(&self) -> Option<&RawEntity> {
        match self {
            Self::Present(raw) => Some(raw),
            Self::Absent => None,
        }
    }
}

/// Maps keys to the scope's current view of each entity.
///
/// Once a key is resolved (present or absent) later loads in the same scope
/// are answered from here without touching the cache or the store.
#[derive(Debug, Default, Clone)]
pub struct Session {
    entries: HashMap<Key, SessionValue>,
}

impl Session {
    /// Creates an empty session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up `key`. `None` means the key is unknown to this session.
    #[must_use]
    pub fn get(&self, key: &Key) -> Option<&SessionValue> {
        self.entries.get(key)
    }

    /// Records `value` for `key`.
    pub fn put(&mut self, key: Key, value: SessionValue) {
        self.entries.insert(key, value);
    }

    /// Records the entity under its own key.
    pub fn put_entity(&mut self, raw: RawEntity) {
        self.entries
            .insert(raw.key().clone(), SessionValue::Present(raw));
    }

    /// Records that `key` does not exist.
    pub fn mark_absent(&mut self, key: Key) {
        self.entries.insert(key, SessionValue::Absent);
    }

    /// Checks whether `key` has been resolved in this session.
    #[must_use]
    pub fn contains(&self, key: &Key) -> bool {
        self.entries.contains_key(key)
    }

    /// Forgets everything.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Copies every entry of `other` into this session, overwriting.
    pub fn add_all(&mut self, other: &Session) {
        self.entries
            .extend(other.entries.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    /// Returns the number of resolved keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Checks whether the session is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
