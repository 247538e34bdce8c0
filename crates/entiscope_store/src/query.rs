//! Query description passed to the datastore.

use crate::key::Key;
use crate::value::{RawEntity, Value};
use std::cmp::Ordering;
use std::time::Duration;

/// Comparison operator of a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    /// `=`
    Equal,
    /// `!=`
    NotEqual,
    /// `<`
    LessThan,
    /// `<=`
    LessThanOrEqual,
    /// `>`
    GreaterThan,
    /// `>=`
    GreaterThanOrEqual,
    /// Membership in a list value.
    In,
}

impl FilterOp {
    /// Parses an operator token such as `">="` or `"in"`.
    #[must_use]
    pub fn parse(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "=" | "==" => Some(Self::Equal),
            "!=" | "<>" => Some(Self::NotEqual),
            "<" => Some(Self::LessThan),
            "<=" => Some(Self::LessThanOrEqual),
            ">" => Some(Self::GreaterThan),
            ">=" => Some(Self::GreaterThanOrEqual),
            "in" => Some(Self::In),
            _ => None,
        }
    }

    fn accepts(self, actual: &Value, operand: &Value) -> bool {
        match self {
            Self::Equal => actual.index_cmp(operand) == Ordering::Equal,
            Self::NotEqual => actual.index_cmp(operand) != Ordering::Equal,
            Self::LessThan => actual.index_cmp(operand) == Ordering::Less,
            Self::LessThanOrEqual => actual.index_cmp(operand) != Ordering::Greater,
            Self::GreaterThan => actual.index_cmp(operand) == Ordering::Greater,
            Self::GreaterThanOrEqual => actual.index_cmp(operand) != Ordering::Less,
            Self::In => match operand {
                Value::List(candidates) => candidates
                    .iter()
                    .any(|c| actual.index_cmp(c) == Ordering::Equal),
                other => actual.index_cmp(other) == Ordering::Equal,
            },
        }
    }
}

/// A property filter.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    /// Property name.
    pub property: String,
    /// Operator.
    pub op: FilterOp,
    /// Operand.
    pub value: Value,
}

impl Filter {
    /// Creates a filter.
    pub fn new(property: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        Self {
            property: property.into(),
            op,
            value: value.into(),
        }
    }

    /// Checks the filter against an entity.
    ///
    /// Entities lacking the property never match. List properties match
    /// when any element matches.
    #[must_use]
    pub fn matches(&self, entity: &RawEntity) -> bool {
        match entity.property(&self.property) {
            None => false,
            Some(Value::List(items)) => items.iter().any(|item| self.op.accepts(item, &self.value)),
            Some(actual) => self.op.accepts(&actual, &self.value),
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Smallest first.
    Ascending,
    /// Largest first.
    Descending,
}

/// A sort order on one property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    /// Property name.
    pub property: String,
    /// Direction.
    pub direction: Direction,
}

impl Order {
    /// Parses `"name"` as ascending and `"-name"` as descending.
    #[must_use]
    pub fn parse(spec: &str) -> Self {
        let spec = spec.trim();
        match spec.strip_prefix('-') {
            Some(property) => Self {
                property: property.trim().to_string(),
                direction: Direction::Descending,
            },
            None => Self {
                property: spec.to_string(),
                direction: Direction::Ascending,
            },
        }
    }
}

/// A datastore query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    kind: Option<String>,
    ancestor: Option<Key>,
    filters: Vec<Filter>,
    orders: Vec<Order>,
    keys_only: bool,
    projections: Vec<String>,
}

impl Query {
    /// Creates a query over one kind.
    pub fn kind(kind: impl Into<String>) -> Self {
        Self {
            kind: Some(kind.into()),
            ..Self::default()
        }
    }

    /// Creates a query across all kinds.
    #[must_use]
    pub fn kindless() -> Self {
        Self::default()
    }

    /// Restricts results to descendants of `ancestor`.
    #[must_use]
    pub fn ancestor(mut self, ancestor: Key) -> Self {
        self.ancestor = Some(ancestor);
        self
    }

    /// Adds a filter.
    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Adds a sort order.
    #[must_use]
    pub fn order(mut self, order: Order) -> Self {
        self.orders.push(order);
        self
    }

    /// Marks the query as keys-only.
    #[must_use]
    pub fn keys_only(mut self) -> Self {
        self.keys_only = true;
        self
    }

    /// Adds a projected property.
    #[must_use]
    pub fn project(mut self, property: impl Into<String>) -> Self {
        self.projections.push(property.into());
        self
    }

    /// Returns the kind, if any.
    #[must_use]
    pub fn kind_name(&self) -> Option<&str> {
        self.kind.as_deref()
    }

    /// Returns the ancestor, if any.
    #[must_use]
    pub fn ancestor_key(&self) -> Option<&Key> {
        self.ancestor.as_ref()
    }

    /// Returns the filters.
    #[must_use]
    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    /// Returns the sort orders.
    #[must_use]
    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    /// Checks whether the query is keys-only.
    #[must_use]
    pub fn is_keys_only(&self) -> bool {
        self.keys_only
    }

    /// Returns the projected properties.
    #[must_use]
    pub fn projections(&self) -> &[String] {
        &self.projections
    }

    /// Checks kind, ancestor, and filters against an entity.
    #[must_use]
    pub fn matches(&self, entity: &RawEntity) -> bool {
        if let Some(kind) = &self.kind {
            if entity.key().kind() != kind {
                return false;
            }
        }
        if let Some(ancestor) = &self.ancestor {
            if !entity.key().has_ancestor(ancestor) {
                return false;
            }
        }
        if !self.orders.iter().all(|o| entity.property(&o.property).is_some()) {
            return false;
        }
        if !self.projections.iter().all(|p| entity.has_property(p)) {
            return false;
        }
        self.filters.iter().all(|f| f.matches(entity))
    }

    /// Compares two entities by the sort orders, falling back to key order.
    #[must_use]
    pub fn compare(&self, a: &RawEntity, b: &RawEntity) -> Ordering {
        for order in &self.orders {
            let left = a.property(&order.property).unwrap_or(Value::Null);
            let right = b.property(&order.property).unwrap_or(Value::Null);
            let ord = sort_value(&left).index_cmp(&sort_value(&right));
            let ord = match order.direction {
                Direction::Ascending => ord,
                Direction::Descending => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        a.key().cmp(b.key())
    }
}

/// Lists sort by their first element.
fn sort_value(value: &Value) -> Value {
    match value {
        Value::List(items) => items.first().cloned().unwrap_or(Value::Null),
        other => other.clone(),
    }
}

/// Paging and batching options for a query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// Maximum number of results.
    pub limit: Option<usize>,
    /// Number of results to skip.
    pub offset: usize,
    /// Preferred batch size when streaming results.
    pub chunk_size: Option<usize>,
}

impl FetchOptions {
    /// Creates default options: no limit, no offset.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the limit.
    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the offset.
    #[must_use]
    pub const fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Sets the chunk size.
    #[must_use]
    pub const fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = Some(size);
        self
    }
}

/// Read consistency requested from the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Consistency {
    /// Reads observe all committed writes.
    #[default]
    Strong,
    /// Reads may lag behind recent commits.
    Eventual,
}

/// Per-call read settings passed through to the store client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReadOptions {
    /// Consistency.
    pub consistency: Consistency,
    /// Deadline enforced by the store client, if any.
    pub deadline: Option<Duration>,
}
