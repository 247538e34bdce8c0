//! Property values and flat entity containers.

use crate::key::Key;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Pseudo-property naming the entity key in filters and sort orders.
pub const KEY_PROPERTY: &str = "__key__";

/// Flat property bag of an entity.
pub type Properties = BTreeMap<String, Value>;

/// A single property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Explicit null.
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Integer(i64),
    /// Floating point number.
    Double(f64),
    /// UTF-8 text.
    Text(String),
    /// Opaque bytes.
    Bytes(Vec<u8>),
    /// Reference to another entity.
    Key(Key),
    /// Multi-valued property. Filters match if any element matches.
    List(Vec<Value>),
}

impl Value {
    /// Returns the integer, if this is one.
    #[must_use]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the text, if this is text.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the boolean, if this is one.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the number as `f64` for integers and doubles.
    #[must_use]
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Self::Double(v) => Some(*v),
            Self::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Returns the referenced key, if this is a key.
    #[must_use]
    pub fn as_key(&self) -> Option<&Key> {
        match self {
            Self::Key(k) => Some(k),
            _ => None,
        }
    }

    /// Rank of the value type in index order.
    fn type_rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Integer(_) | Self::Double(_) => 1,
            Self::Bool(_) => 2,
            Self::Text(_) => 3,
            Self::Bytes(_) => 4,
            Self::Key(_) => 5,
            Self::List(_) => 6,
        }
    }

    /// Total order used by indexes: type rank first, then the value.
    ///
    /// Integers and doubles compare numerically with each other.
    #[must_use]
    pub fn index_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Self::Integer(a), Self::Integer(b)) => a.cmp(b),
            (Self::Integer(_) | Self::Double(_), Self::Integer(_) | Self::Double(_)) => {
                let a = self.as_double().unwrap_or_default();
                let b = other.as_double().unwrap_or_default();
                a.total_cmp(&b)
            }
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (Self::Bytes(a), Self::Bytes(b)) => a.cmp(b),
            (Self::Key(a), Self::Key(b)) => a.cmp(b),
            (Self::List(a), Self::List(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    let ord = x.index_cmp(y);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Key> for Value {
    fn from(v: Key) -> Self {
        Self::Key(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Self::List(v)
    }
}

/// Flat storage representation of an entity: a key plus properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEntity {
    key: Key,
    properties: Properties,
}

impl RawEntity {
    /// Creates an entity with no properties.
    #[must_use]
    pub fn new(key: Key) -> Self {
        Self {
            key,
            properties: Properties::new(),
        }
    }

    /// Creates an entity with the given properties.
    #[must_use]
    pub fn with_properties(key: Key, properties: Properties) -> Self {
        Self { key, properties }
    }

    /// Returns the key.
    #[must_use]
    pub fn key(&self) -> &Key {
        &self.key
    }

    /// Replaces the key, typically after id allocation.
    pub fn set_key(&mut self, key: Key) {
        self.key = key;
    }

    /// Returns all properties.
    #[must_use]
    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// Returns one property. [`KEY_PROPERTY`] resolves to the entity key.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<Value> {
        if name == KEY_PROPERTY {
            return Some(Value::Key(self.key.clone()));
        }
        self.properties.get(name).cloned()
    }

    /// Sets a property.
    pub fn set_property(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.properties.insert(name.into(), value.into());
    }

    /// Checks whether a property is present.
    #[must_use]
    pub fn has_property(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    /// Returns a copy restricted to the named properties.
    #[must_use]
    pub fn project(&self, names: &[String]) -> Self {
        let properties = names
            .iter()
            .filter_map(|name| {
                self.properties
                    .get(name)
                    .map(|value| (name.clone(), value.clone()))
            })
            .collect();
        Self {
            key: self.key.clone(),
            properties,
        }
    }

    /// Splits into key and properties.
    #[must_use]
    pub fn into_parts(self) -> (Key, Properties) {
        (self.key, self.properties)
    }
}
