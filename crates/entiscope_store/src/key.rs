//! Structured entity keys.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// The identifying part of a key: numeric id, string name, or not yet assigned.
///
/// Numeric ids sort before names, matching index order in the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum KeyId {
    /// Id not yet allocated. Only valid on keys passed to `put` or `allocate_ids`.
    Incomplete,
    /// Numeric id.
    Id(i64),
    /// String name.
    Name(String),
}

impl From<i64> for KeyId {
    fn from(id: i64) -> Self {
        Self::Id(id)
    }
}

impl From<&str> for KeyId {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for KeyId {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

/// Identity of an entity: kind, id or name, and an optional parent chain.
///
/// The root of the parent chain names the entity group, which is the unit
/// of optimistic-concurrency checking.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Key {
    parent: Option<Box<Key>>,
    kind: String,
    id: KeyId,
}

impl Key {
    /// Creates a root key.
    pub fn new(kind: impl Into<String>, id: impl Into<KeyId>) -> Self {
        Self {
            parent: None,
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// Creates a key under `parent`.
    pub fn with_parent(parent: Key, kind: impl Into<String>, id: impl Into<KeyId>) -> Self {
        Self {
            parent: Some(Box::new(parent)),
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// Creates a key whose id will be allocated by the store.
    pub fn incomplete(kind: impl Into<String>, parent: Option<Key>) -> Self {
        Self {
            parent: parent.map(Box::new),
            kind: kind.into(),
            id: KeyId::Incomplete,
        }
    }

    /// Returns the kind.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Returns the id part.
    #[must_use]
    pub fn id(&self) -> &KeyId {
        &self.id
    }

    /// Returns the parent key, if any.
    #[must_use]
    pub fn parent(&self) -> Option<&Key> {
        self.parent.as_deref()
    }

    /// Returns the root of the parent chain (the entity group).
    #[must_use]
    pub fn root(&self) -> &Key {
        let mut current = self;
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current
    }

    /// Checks whether every element of the key, parents included, has an id.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.id != KeyId::Incomplete && self.parent().map_or(true, Key::is_complete)
    }

    /// Returns a copy of this key with a numeric id assigned.
    #[must_use]
    pub fn with_id(&self, id: i64) -> Self {
        Self {
            parent: self.parent.clone(),
            kind: self.kind.clone(),
            id: KeyId::Id(id),
        }
    }

    /// Checks whether `ancestor` is this key or one of its parents.
    #[must_use]
    pub fn has_ancestor(&self, ancestor: &Key) -> bool {
        let mut current = Some(self);
        while let Some(key) = current {
            if key == ancestor {
                return true;
            }
            current = key.parent();
        }
        false
    }

    /// Returns the path from the root down to this key.
    fn path(&self) -> Vec<&Key> {
        let mut path = Vec::new();
        let mut current = Some(self);
        while let Some(key) = current {
            path.push(key);
            current = key.parent();
        }
        path.reverse();
        path
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        let left = self.path();
        let right = other.path();
        for (a, b) in left.iter().zip(right.iter()) {
            let ord = a.kind.cmp(&b.kind).then_with(|| a.id.cmp(&b.id));
            if ord != Ordering::Equal {
                return ord;
            }
        }
        left.len().cmp(&right.len())
    }
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(parent) = self.parent() {
            write!(f, "{parent}/")?;
        }
        match &self.id {
            KeyId::Incomplete => write!(f, "{}(?)", self.kind),
            KeyId::Id(id) => write!(f, "{}({id})", self.kind),
            KeyId::Name(name) => write!(f, "{}({name:?})", self.kind),
        }
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn display_includes_parent_chain() {
        let parent = Key::new("Owner", "alice");
        let child = Key::with_parent(parent, "Item", 12);
        assert_eq!(child.to_string(), "Owner(\"alice\")/Item(12)");
    }

    #[test]
    fn root_and_ancestor() {
        let root = Key::new("Owner", 1);
        let mid = Key::with_parent(root.clone(), "Folder", 2);
        let leaf = Key::with_parent(mid.clone(), "File", "a");

        assert_eq!(leaf.root(), &root);
        assert!(leaf.has_ancestor(&mid));
        assert!(leaf.has_ancestor(&leaf));
        assert!(!mid.has_ancestor(&leaf));
    }

    #[test]
    fn completeness() {
        let incomplete = Key::incomplete("Thing", None);
        assert!(!incomplete.is_complete());
        assert!(incomplete.with_id(5).is_complete());

        let under_incomplete = Key::with_parent(Key::incomplete("Owner", None), "Thing", 1);
        assert!(!under_incomplete.is_complete());
    }

    #[test]
    fn ids_sort_before_names() {
        let by_id = Key::new("Thing", 99);
        let by_name = Key::new("Thing", "a");
        assert!(by_id < by_name);
    }

    #[test]
    fn children_sort_after_parent() {
        let parent = Key::new("Owner", 1);
        let child = Key::with_parent(parent.clone(), "Item", 1);
        let sibling = Key::new("Owner", 2);
        assert!(parent < child);
        assert!(child < sibling);
    }

    proptest! {
        #[test]
        fn numeric_order_matches_key_order(a in 1i64..10_000, b in 1i64..10_000) {
            let ka = Key::new("Thing", a);
            let kb = Key::new("Thing", b);
            prop_assert_eq!(ka.cmp(&kb), a.cmp(&b));
        }
    }
}
