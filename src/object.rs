//! Managed objects and typed entity models
//!
//! A `ManagedObject` is one context's copy of an entity row. Typed models
//! implement [`EntityModel`] to convert from that copy and get the common
//! insert/fetch/count/remove helpers for free.

use crate::context::ContextScope;
use crate::error::FetchError;
use crate::fetch::{FetchRequest, Predicate, SortDescriptor};
use crate::store::Record;
use crate::types::{ObjectId, Value};
use std::collections::BTreeMap;

/// Per-context snapshot of an entity row
#[derive(Debug, Clone, PartialEq)]
pub struct ManagedObject {
    pub id: ObjectId,
    pub entity: String,
    pub values: BTreeMap<String, Value>,
}

impl ManagedObject {
    pub fn new(id: ObjectId, entity: impl Into<String>, values: BTreeMap<String, Value>) -> Self {
        Self {
            id,
            entity: entity.into(),
            values,
        }
    }

    /// Value of `key`, `Value::Null` when unset.
    pub fn value(&self, key: &str) -> &Value {
        static NULL: Value = Value::Null;
        self.values.get(key).unwrap_or(&NULL)
    }

    pub fn string(&self, key: &str) -> Option<&str> {
        self.value(key).as_str()
    }

    pub fn integer(&self, key: &str) -> Option<i64> {
        self.value(key).as_i64()
    }

    pub fn double(&self, key: &str) -> Option<f64> {
        self.value(key).as_f64()
    }

    pub fn bool(&self, key: &str) -> Option<bool> {
        self.value(key).as_bool()
    }

    pub fn reference(&self, key: &str) -> Option<ObjectId> {
        self.value(key).as_reference()
    }

    pub fn is_entity(&self, entity: &str) -> bool {
        self.entity == entity
    }
}

impl From<Record> for ManagedObject {
    fn from(record: Record) -> Self {
        ManagedObject::new(record.id, record.entity, record.values)
    }
}

impl From<&ManagedObject> for Record {
    fn from(object: &ManagedObject) -> Self {
        Record {
            id: object.id,
            entity: object.entity.clone(),
            values: object.values.clone(),
        }
    }
}

/// A domain type backed by one schema entity
pub trait EntityModel: Clone + Send + Sync + 'static {
    /// Name of the schema entity this type maps to
    const ENTITY_NAME: &'static str;

    fn from_object(object: &ManagedObject) -> Self;

    fn fetch_request() -> FetchRequest {
        FetchRequest::new(Self::ENTITY_NAME)
    }

    /// Insert a new object of this entity with the given values.
    fn insert_into<I, K, V>(scope: &mut ContextScope<'_>, values: I) -> ObjectId
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        scope.insert_with(Self::ENTITY_NAME, values)
    }

    fn all_in(
        scope: &mut ContextScope<'_>,
        sort: Vec<SortDescriptor>,
    ) -> Result<Vec<Self>, FetchError> {
        let request = Self::fetch_request().sorted_by(sort);
        Ok(scope
            .fetch(&request)?
            .iter()
            .map(Self::from_object)
            .collect())
    }

    fn find_first_in(
        scope: &mut ContextScope<'_>,
        predicate: Predicate,
    ) -> Result<Option<Self>, FetchError> {
        let request = Self::fetch_request().filtered(predicate).limited(1);
        Ok(scope.fetch(&request)?.first().map(Self::from_object))
    }

    fn count_in(
        scope: &mut ContextScope<'_>,
        predicate: Option<Predicate>,
    ) -> Result<usize, FetchError> {
        let mut request = Self::fetch_request();
        request.predicate = predicate;
        scope.count(&request)
    }

    /// Delete every object of this entity; returns how many were removed.
    fn remove_all_in(scope: &mut ContextScope<'_>) -> Result<usize, FetchError> {
        Self::remove_all_in_except(scope, &[])
    }

    fn remove_all_in_except(
        scope: &mut ContextScope<'_>,
        keep: &[ObjectId],
    ) -> Result<usize, FetchError> {
        let mut request = Self::fetch_request();
        if !keep.is_empty() {
            request = request.filtered(Predicate::negate(Predicate::IdIn(keep.to_vec())));
        }

        let doomed = scope.fetch(&request)?;
        for object in &doomed {
            // Fetched in this turn, so the object is resolvable.
            let _ = scope.delete(object.id);
        }
        Ok(doomed.len())
    }
}
