//! Fetch requests: entity, predicate, sort order and limit
//!
//! Requests are evaluated in memory over the objects a context can see.

use crate::error::FetchError;
use crate::object::ManagedObject;
use crate::schema::Schema;
use crate::types::{ObjectId, Value};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
}

impl Comparison {
    fn holds(self, ordering: Option<Ordering>) -> bool {
        match (self, ordering) {
            (Comparison::Equal, Some(o)) => o == Ordering::Equal,
            (Comparison::NotEqual, Some(o)) => o != Ordering::Equal,
            (Comparison::NotEqual, None) => true,
            (Comparison::Less, Some(o)) => o == Ordering::Less,
            (Comparison::LessOrEqual, Some(o)) => o != Ordering::Greater,
            (Comparison::Greater, Some(o)) => o == Ordering::Greater,
            (Comparison::GreaterOrEqual, Some(o)) => o != Ordering::Less,
            (_, None) => false,
        }
    }
}

type CustomPredicate = Arc<dyn Fn(&ManagedObject) -> bool + Send + Sync>;

/// Filter over managed objects
#[derive(Clone)]
pub enum Predicate {
    Compare {
        key: String,
        op: Comparison,
        value: Value,
    },
    BeginsWith { key: String, prefix: String },
    Contains { key: String, needle: String },
    IsNull(String),
    IdIn(Vec<ObjectId>),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
    /// Arbitrary closure; its keys are not validated against the schema
    Custom(CustomPredicate),
}

impl Predicate {
    pub fn compare(key: impl Into<String>, op: Comparison, value: impl Into<Value>) -> Self {
        Predicate::Compare {
            key: key.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(key, Comparison::Equal, value)
    }

    pub fn ne(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(key, Comparison::NotEqual, value)
    }

    pub fn lt(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(key, Comparison::Less, value)
    }

    pub fn gt(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(key, Comparison::Greater, value)
    }

    pub fn begins_with(key: impl Into<String>, prefix: impl Into<String>) -> Self {
        Predicate::BeginsWith {
            key: key.into(),
            prefix: prefix.into(),
        }
    }

    pub fn contains(key: impl Into<String>, needle: impl Into<String>) -> Self {
        Predicate::Contains {
            key: key.into(),
            needle: needle.into(),
        }
    }

    pub fn is_null(key: impl Into<String>) -> Self {
        Predicate::IsNull(key.into())
    }

    pub fn negate(predicate: Predicate) -> Self {
        Predicate::Not(Box::new(predicate))
    }

    pub fn and(self, other: Predicate) -> Self {
        match self {
            Predicate::And(mut parts) => {
                parts.push(other);
                Predicate::And(parts)
            }
            first => Predicate::And(vec![first, other]),
        }
    }

    pub fn or(self, other: Predicate) -> Self {
        match self {
            Predicate::Or(mut parts) => {
                parts.push(other);
                Predicate::Or(parts)
            }
            first => Predicate::Or(vec![first, other]),
        }
    }

    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&ManagedObject) -> bool + Send + Sync + 'static,
    {
        Predicate::Custom(Arc::new(f))
    }

    pub fn evaluate(&self, object: &ManagedObject) -> bool {
        match self {
            Predicate::Compare { key, op, value } => op.holds(object.value(key).compare(value)),
            Predicate::BeginsWith { key, prefix } => object
                .string(key)
                .map_or(false, |s| s.starts_with(prefix.as_str())),
            Predicate::Contains { key, needle } => object
                .string(key)
                .map_or(false, |s| s.contains(needle.as_str())),
            Predicate::IsNull(key) => object.value(key).is_null(),
            Predicate::IdIn(ids) => ids.contains(&object.id),
            Predicate::And(parts) => parts.iter().all(|p| p.evaluate(object)),
            Predicate::Or(parts) => parts.iter().any(|p| p.evaluate(object)),
            Predicate::Not(inner) => !inner.evaluate(object),
            Predicate::Custom(f) => f(object),
        }
    }

    /// Attribute keys referenced by this predicate.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys = Vec::new();
        self.collect_keys(&mut keys);
        keys
    }

    fn collect_keys<'a>(&'a self, keys: &mut Vec<&'a str>) {
        match self {
            Predicate::Compare { key, .. }
            | Predicate::BeginsWith { key, .. }
            | Predicate::Contains { key, .. }
            | Predicate::IsNull(key) => keys.push(key),
            Predicate::And(parts) | Predicate::Or(parts) => {
                parts.iter().for_each(|p| p.collect_keys(keys))
            }
            Predicate::Not(inner) => inner.collect_keys(keys),
            Predicate::IdIn(_) | Predicate::Custom(_) => {}
        }
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Compare { key, op, value } => write!(f, "{} {:?} {:?}", key, op, value),
            Predicate::BeginsWith { key, prefix } => write!(f, "{} BEGINSWITH {:?}", key, prefix),
            Predicate::Contains { key, needle } => write!(f, "{} CONTAINS {:?}", key, needle),
            Predicate::IsNull(key) => write!(f, "{} == nil", key),
            Predicate::IdIn(ids) => write!(f, "id IN ({} ids)", ids.len()),
            Predicate::And(parts) => f.debug_tuple("And").field(parts).finish(),
            Predicate::Or(parts) => f.debug_tuple("Or").field(parts).finish(),
            Predicate::Not(inner) => f.debug_tuple("Not").field(inner).finish(),
            Predicate::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortDescriptor {
    pub key: String,
    pub ascending: bool,
}

impl SortDescriptor {
    pub fn ascending(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ascending: true,
        }
    }

    pub fn descending(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ascending: false,
        }
    }

    pub fn compare(&self, a: &ManagedObject, b: &ManagedObject) -> Ordering {
        let ordering = a.value(&self.key).sort_cmp(b.value(&self.key));
        if self.ascending {
            ordering
        } else {
            ordering.reverse()
        }
    }
}

/// Query over one entity
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub entity: String,
    pub predicate: Option<Predicate>,
    pub sort: Vec<SortDescriptor>,
    pub limit: Option<usize>,
}

impl FetchRequest {
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            predicate: None,
            sort: Vec::new(),
            limit: None,
        }
    }

    pub fn filtered(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    pub fn sorted_by(mut self, sort: Vec<SortDescriptor>) -> Self {
        self.sort = sort;
        self
    }

    pub fn sorted_ascending(mut self, key: impl Into<String>) -> Self {
        self.sort.push(SortDescriptor::ascending(key));
        self
    }

    pub fn limited(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Check the request against a schema.
    ///
    /// # Panics
    ///
    /// Panics when the entity is not part of the schema.
    pub fn validate(&self, schema: &Schema) -> Result<(), FetchError> {
        let entity = schema.expect_entity(&self.entity);
        let predicate_keys = self.predicate.iter().flat_map(|p| p.keys());
        let sort_keys = self.sort.iter().map(|s| s.key.as_str());

        for key in predicate_keys.chain(sort_keys) {
            if !entity.has_attribute(key) {
                return Err(FetchError::UnknownAttribute {
                    entity: self.entity.clone(),
                    key: key.to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn matches(&self, object: &ManagedObject) -> bool {
        object.entity == self.entity
            && self.predicate.as_ref().map_or(true, |p| p.evaluate(object))
    }

    /// Ordering by the sort descriptors, ties broken by object id.
    pub fn compare(&self, a: &ManagedObject, b: &ManagedObject) -> Ordering {
        self.sort
            .iter()
            .map(|descriptor| descriptor.compare(a, b))
            .find(|ordering| *ordering != Ordering::Equal)
            .unwrap_or_else(|| a.id.cmp(&b.id))
    }

    /// Filter, sort and limit a candidate set.
    pub fn apply(&self, objects: impl IntoIterator<Item = ManagedObject>) -> Vec<ManagedObject> {
        let mut matched: Vec<ManagedObject> =
            objects.into_iter().filter(|o| self.matches(o)).collect();
        matched.sort_by(|a, b| self.compare(a, b));
        if let Some(limit) = self.limit {
            matched.truncate(limit);
        }
        matched
    }
}
