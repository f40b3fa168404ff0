//! Context state and the scoped handle that mutates it

use super::Context;
use crate::error::{FetchError, ObjectError};
use crate::fetch::FetchRequest;
use crate::notify::{ContextNotification, NotificationKind};
use crate::object::ManagedObject;
use crate::schema::Schema;
use crate::types::{ObjectId, Value};
use std::collections::{BTreeMap, BTreeSet};

/// One registered object
#[derive(Debug, Clone)]
pub(super) struct Entry {
    pub entity: String,
    pub values: BTreeMap<String, Value>,
    /// Values as of the last sync with the parent
    pub base: BTreeMap<String, Value>,
}

impl Entry {
    fn snapshot(&self, id: ObjectId) -> ManagedObject {
        ManagedObject::new(id, self.entity.clone(), self.values.clone())
    }
}

/// Changes not yet announced through `ObjectsDidChange`
#[derive(Debug, Default)]
pub(super) struct Unprocessed {
    pub inserted: BTreeSet<ObjectId>,
    pub updated: BTreeSet<ObjectId>,
    pub deleted: BTreeMap<ObjectId, ManagedObject>,
}

impl Unprocessed {
    fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }
}

#[derive(Debug, Default)]
pub(crate) struct ContextState {
    pub(super) objects: BTreeMap<ObjectId, Entry>,
    pub(super) inserted: BTreeSet<ObjectId>,
    /// Changed keys per updated object
    pub(super) updated: BTreeMap<ObjectId, BTreeSet<String>>,
    pub(super) deleted: BTreeMap<ObjectId, ManagedObject>,
    pub(super) unprocessed: Unprocessed,
    pub(super) outbox: Vec<(NotificationKind, ContextNotification)>,
}

impl ContextState {
    fn is_pending(&self, id: &ObjectId) -> bool {
        self.inserted.contains(id) || self.updated.contains_key(id)
    }
}

/// Execution handle for one queue turn of a context
pub struct ContextScope<'a> {
    pub(super) context: &'a Context,
    pub(super) state: &'a mut ContextState,
}

impl<'a> ContextScope<'a> {
    pub(super) fn new(context: &'a Context, state: &'a mut ContextState) -> Self {
        Self { context, state }
    }

    pub fn context(&self) -> &Context {
        self.context
    }

    pub fn schema(&self) -> &Schema {
        self.context.schema()
    }

    /// Insert a new object of `entity` populated with its defaults.
    ///
    /// # Panics
    ///
    /// Panics when `entity` is not part of the schema.
    pub fn insert(&mut self, entity: &str) -> ObjectId {
        self.insert_with(entity, std::iter::empty::<(String, Value)>())
    }

    /// Insert a new object of `entity` with the given values over its defaults.
    pub fn insert_with<I, K, V>(&mut self, entity: &str, values: I) -> ObjectId
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let mut all = self.schema().expect_entity(entity).default_values();
        for (key, value) in values {
            let value = value.into();
            let key = key.into();
            if value.is_null() {
                all.remove(&key);
            } else {
                all.insert(key, value);
            }
        }

        let id = ObjectId::generate(entity);
        self.state.objects.insert(
            id,
            Entry {
                entity: entity.to_string(),
                values: all,
                base: BTreeMap::new(),
            },
        );
        self.state.inserted.insert(id);
        self.state.unprocessed.inserted.insert(id);
        id
    }

    /// This context's copy of `id`, faulting it in from the parent if needed.
    pub fn object(&mut self, id: ObjectId) -> Result<ManagedObject, ObjectError> {
        self.ensure_registered(id)?;
        self.state
            .objects
            .get(&id)
            .map(|entry| entry.snapshot(id))
            .ok_or(ObjectError::NotFound(id))
    }

    pub fn get(&mut self, id: ObjectId, key: &str) -> Result<Value, ObjectError> {
        Ok(self.object(id)?.value(key).clone())
    }

    /// Stage a property change. Setting `Value::Null` clears the property.
    pub fn set(
        &mut self,
        id: ObjectId,
        key: &str,
        value: impl Into<Value>,
    ) -> Result<(), ObjectError> {
        self.ensure_registered(id)?;
        let value = value.into();
        let entry = self
            .state
            .objects
            .get_mut(&id)
            .ok_or(ObjectError::NotFound(id))?;

        let current = entry.values.get(key).cloned().unwrap_or_default();
        if current == value {
            return Ok(());
        }
        if value.is_null() {
            entry.values.remove(key);
        } else {
            entry.values.insert(key.to_string(), value);
        }

        if !self.state.inserted.contains(&id) {
            self.state
                .updated
                .entry(id)
                .or_default()
                .insert(key.to_string());
        }
        if !self.state.unprocessed.inserted.contains(&id) {
            self.state.unprocessed.updated.insert(id);
        }
        Ok(())
    }

    /// Stage the deletion of `id`.
    pub fn delete(&mut self, id: ObjectId) -> Result<(), ObjectError> {
        self.ensure_registered(id)?;
        let entry = self
            .state
            .objects
            .remove(&id)
            .ok_or(ObjectError::NotFound(id))?;
        let snapshot = entry.snapshot(id);

        self.state.updated.remove(&id);
        self.state.unprocessed.updated.remove(&id);

        if self.state.inserted.remove(&id) {
            // Never reached the parent; only announce it if the insert was announced.
            if !self.state.unprocessed.inserted.remove(&id) {
                self.state.unprocessed.deleted.insert(id, snapshot);
            }
        } else {
            self.state.deleted.insert(id, snapshot.clone());
            self.state.unprocessed.deleted.insert(id, snapshot);
        }
        Ok(())
    }

    /// Run `request` over everything this context can see.
    ///
    /// Clean registered objects are refreshed from the parent; staged
    /// inserts, updates and deletes are overlaid on top.
    ///
    /// # Panics
    ///
    /// Panics when the request's entity is not part of the schema.
    pub fn fetch(&mut self, request: &FetchRequest) -> Result<Vec<ManagedObject>, FetchError> {
        request.validate(self.schema())?;
        let candidates = self.refreshed_objects(&request.entity);
        Ok(request.apply(candidates))
    }

    /// Number of objects `request` matches, ignoring its limit.
    pub fn count(&mut self, request: &FetchRequest) -> Result<usize, FetchError> {
        let mut unlimited = request.clone();
        unlimited.limit = None;
        Ok(self.fetch(&unlimited)?.len())
    }

    pub fn has_changes(&self) -> bool {
        !self.state.inserted.is_empty()
            || !self.state.updated.is_empty()
            || !self.state.deleted.is_empty()
    }

    pub fn inserted_ids(&self) -> Vec<ObjectId> {
        self.state.inserted.iter().copied().collect()
    }

    pub fn updated_ids(&self) -> Vec<ObjectId> {
        self.state.updated.keys().copied().collect()
    }

    pub fn deleted_ids(&self) -> Vec<ObjectId> {
        self.state.deleted.keys().copied().collect()
    }

    pub fn registered_count(&self) -> usize {
        self.state.objects.len()
    }

    /// Announce staged changes made since the last call as `ObjectsDidChange`.
    ///
    /// Runs automatically at the end of every block; the notification is
    /// delivered once the block's state lock is released.
    pub fn process_pending_changes(&mut self) {
        if self.state.unprocessed.is_empty() {
            return;
        }
        let unprocessed = std::mem::take(&mut self.state.unprocessed);

        let snapshot = |id: &ObjectId| self.state.objects.get(id).map(|e| e.snapshot(*id));
        let inserted: Vec<_> = unprocessed.inserted.iter().filter_map(snapshot).collect();
        let updated: Vec<_> = unprocessed
            .updated
            .iter()
            .filter(|id| !unprocessed.inserted.contains(*id))
            .filter_map(snapshot)
            .collect();

        let notification = ContextNotification {
            context: Some(self.context.id()),
            inserted,
            updated,
            deleted: unprocessed.deleted.into_values().collect(),
        };
        if !notification.is_empty() {
            self.state
                .outbox
                .push((NotificationKind::ObjectsDidChange, notification));
        }
    }

    /// Discard every staged change.
    pub fn rollback(&mut self) {
        let state = &mut *self.state;
        for id in std::mem::take(&mut state.inserted) {
            state.objects.remove(&id);
        }
        for id in std::mem::take(&mut state.updated).into_keys() {
            if let Some(entry) = state.objects.get_mut(&id) {
                entry.values = entry.base.clone();
            }
        }
        for (id, snapshot) in std::mem::take(&mut state.deleted) {
            state.objects.insert(
                id,
                Entry {
                    entity: snapshot.entity,
                    values: snapshot.values.clone(),
                    base: snapshot.values,
                },
            );
        }
        state.unprocessed = Unprocessed::default();
    }

    /// Drop the cached copy of `id` so the next access reads the parent.
    ///
    /// Objects with staged changes are kept; returns whether the copy was dropped.
    pub fn refresh(&mut self, id: ObjectId) -> bool {
        if self.state.is_pending(&id) {
            return false;
        }
        self.state.objects.remove(&id).is_some()
    }

    pub fn refresh_all(&mut self) {
        let state = &mut *self.state;
        let pending: BTreeSet<ObjectId> = state
            .inserted
            .iter()
            .chain(state.updated.keys())
            .copied()
            .collect();
        state.objects.retain(|id, _| pending.contains(id));
    }

    /// Apply another context's `DidSave` to the registered objects.
    ///
    /// Staged properties are kept; everything else takes the saved values.
    pub fn merge_changes(&mut self, notification: &ContextNotification) {
        for object in notification.inserted.iter().chain(&notification.updated) {
            let changed = self.state.updated.get(&object.id).cloned().unwrap_or_default();
            let Some(entry) = self.state.objects.get_mut(&object.id) else {
                continue;
            };

            let keys: BTreeSet<String> = entry
                .values
                .keys()
                .chain(object.values.keys())
                .cloned()
                .collect();
            for key in keys.into_iter().filter(|k| !changed.contains(k)) {
                match object.values.get(&key) {
                    Some(value) => {
                        entry.values.insert(key.clone(), value.clone());
                        entry.base.insert(key, value.clone());
                    }
                    None => {
                        entry.values.remove(&key);
                        entry.base.remove(&key);
                    }
                }
            }
            if !self.state.unprocessed.inserted.contains(&object.id) {
                self.state.unprocessed.updated.insert(object.id);
            }
        }

        for object in &notification.deleted {
            if self.state.objects.remove(&object.id).is_some() {
                self.state.updated.remove(&object.id);
                self.state.unprocessed.updated.remove(&object.id);
                self.state.unprocessed.deleted.insert(object.id, object.clone());
            }
        }
    }

    /// Register `id` locally if this context has not seen it yet.
    pub(super) fn ensure_registered(&mut self, id: ObjectId) -> Result<(), ObjectError> {
        if self.state.deleted.contains_key(&id) {
            return Err(ObjectError::NotFound(id));
        }
        if self.state.objects.contains_key(&id) {
            return Ok(());
        }

        let object = self
            .context
            .parent_object(id)
            .ok_or(ObjectError::NotFound(id))?;
        self.state.objects.insert(
            id,
            Entry {
                entity: object.entity,
                values: object.values.clone(),
                base: object.values,
            },
        );
        Ok(())
    }

    /// What a child sees of `entity` through this context, without registering anything.
    pub(crate) fn visible_objects(&mut self, entity: &str) -> Vec<ManagedObject> {
        let mut merged: BTreeMap<ObjectId, ManagedObject> = self
            .context
            .parent_objects(entity)
            .into_iter()
            .map(|o| (o.id, o))
            .collect();
        self.overlay(entity, &mut merged);
        merged.into_values().collect()
    }

    pub(crate) fn visible_object(&mut self, id: ObjectId) -> Option<ManagedObject> {
        if self.state.deleted.contains_key(&id) {
            return None;
        }
        match self.state.objects.get(&id) {
            Some(entry) if self.state.is_pending(&id) => Some(entry.snapshot(id)),
            _ => self.context.parent_object(id),
        }
    }

    fn overlay(&self, entity: &str, merged: &mut BTreeMap<ObjectId, ManagedObject>) {
        for id in self.state.deleted.keys() {
            merged.remove(id);
        }
        for (id, entry) in &self.state.objects {
            if entry.entity == entity && self.state.is_pending(id) {
                merged.insert(*id, entry.snapshot(*id));
            }
        }
    }

    /// Visible objects of `entity`, refreshing and registering the clean ones.
    fn refreshed_objects(&mut self, entity: &str) -> Vec<ManagedObject> {
        let parent: BTreeMap<ObjectId, ManagedObject> = self
            .context
            .parent_objects(entity)
            .into_iter()
            .map(|o| (o.id, o))
            .collect();

        let state = &mut *self.state;
        let pending: BTreeSet<ObjectId> = state
            .inserted
            .iter()
            .chain(state.updated.keys())
            .copied()
            .collect();
        state
            .objects
            .retain(|id, entry| entry.entity != entity || pending.contains(id) || parent.contains_key(id));

        for (id, object) in &parent {
            if pending.contains(id) || state.deleted.contains_key(id) {
                continue;
            }
            state.objects.insert(
                *id,
                Entry {
                    entity: object.entity.clone(),
                    values: object.values.clone(),
                    base: object.values.clone(),
                },
            );
        }

        let mut merged = parent;
        self.overlay(entity, &mut merged);
        merged.into_values().collect()
    }
}
