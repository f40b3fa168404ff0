//! Local commits and the save cascade
//!
//! A local commit validates the staged objects and moves them into the
//! parent, or through the coordinator for root contexts. The cascade repeats
//! that for every ancestor. A failure stops the cascade at the failing level;
//! levels that already committed keep their changes.

use super::scope::{ContextScope, Entry};
use super::{Context, Parent};
use crate::error::SaveError;
use crate::merge::{merge_properties, MergePolicy, PendingCommit, RecordUpdate};
use crate::notify::{ContextNotification, NotificationKind};
use crate::object::ManagedObject;
use crate::store::Record;
use crate::types::ObjectId;
use std::collections::BTreeMap;
use tracing::debug;

impl ContextScope<'_> {
    /// Commit staged changes into the parent; returns whether anything was committed.
    pub fn save(&mut self) -> Result<bool, SaveError> {
        self.process_pending_changes();
        if !self.has_changes() {
            return Ok(false);
        }

        self.validate_pending()?;
        let pending = self.pending_commit();
        self.context.commit_to_parent(&pending)?;

        let notification = self.did_save_notification(&pending);
        self.reset_after_commit();
        self.state
            .outbox
            .push((NotificationKind::DidSave, notification));

        debug!(
            context = %self.context.name(),
            objects = pending.len(),
            "Local commit finished"
        );
        Ok(true)
    }

    fn validate_pending(&self) -> Result<(), SaveError> {
        let schema = self.schema();
        let issues: Vec<_> = self
            .state
            .inserted
            .iter()
            .chain(self.state.updated.keys())
            .filter_map(|id| self.state.objects.get(id).map(|entry| (id, entry)))
            .flat_map(|(id, entry)| schema.expect_entity(&entry.entity).validate(*id, &entry.values))
            .collect();

        if issues.is_empty() {
            Ok(())
        } else {
            Err(SaveError::Validation {
                context: self.context.name().to_string(),
                issues,
            })
        }
    }

    fn pending_commit(&self) -> PendingCommit {
        let state = &*self.state;
        let inserted = state
            .inserted
            .iter()
            .filter_map(|id| {
                state.objects.get(id).map(|entry| Record {
                    id: *id,
                    entity: entry.entity.clone(),
                    values: entry.values.clone(),
                })
            })
            .collect();

        let updated = state
            .updated
            .iter()
            .filter_map(|(id, keys)| {
                let entry = state.objects.get(id)?;
                let pick = |values: &BTreeMap<_, _>| {
                    keys.iter()
                        .map(|k| (k.clone(), values.get(k).cloned().unwrap_or_default()))
                        .collect()
                };
                Some(RecordUpdate {
                    id: *id,
                    entity: entry.entity.clone(),
                    changes: pick(&entry.values),
                    base: pick(&entry.base),
                })
            })
            .collect();

        PendingCommit {
            inserted,
            updated,
            deleted: state.deleted.values().cloned().collect(),
        }
    }

    fn did_save_notification(&self, pending: &PendingCommit) -> ContextNotification {
        let snapshot = |id: ObjectId| {
            self.state
                .objects
                .get(&id)
                .map(|e| ManagedObject::new(id, e.entity.clone(), e.values.clone()))
        };
        ContextNotification {
            context: Some(self.context.id()),
            inserted: pending.inserted.iter().filter_map(|r| snapshot(r.id)).collect(),
            updated: pending.updated.iter().filter_map(|u| snapshot(u.id)).collect(),
            deleted: pending.deleted.clone(),
        }
    }

    fn reset_after_commit(&mut self) {
        let state = &mut *self.state;
        let committed: Vec<_> = std::mem::take(&mut state.inserted)
            .into_iter()
            .chain(std::mem::take(&mut state.updated).into_keys())
            .collect();
        for id in committed {
            if let Some(entry) = state.objects.get_mut(&id) {
                entry.base = entry.values.clone();
            }
        }
        state.deleted.clear();
    }

    /// Take a child's commit into this context's staged changes.
    pub(super) fn absorb(
        &mut self,
        pending: &PendingCommit,
        policy: MergePolicy,
        committer: &str,
    ) -> Result<(), SaveError> {
        // Resolve every updated object before touching any state.
        for update in &pending.updated {
            self.ensure_registered(update.id)
                .map_err(|_| SaveError::MissingObject {
                    context: committer.to_string(),
                    id: update.id,
                })?;
        }

        let state = &mut *self.state;
        for record in &pending.inserted {
            state.objects.insert(
                record.id,
                Entry {
                    entity: record.entity.clone(),
                    values: record.values.clone(),
                    base: BTreeMap::new(),
                },
            );
            state.inserted.insert(record.id);
            state.unprocessed.inserted.insert(record.id);
        }

        for update in &pending.updated {
            let Some(entry) = state.objects.get_mut(&update.id) else {
                continue;
            };
            let written = merge_properties(&mut entry.values, update, policy);
            if written.is_empty() {
                continue;
            }
            if !state.inserted.contains(&update.id) {
                state.updated.entry(update.id).or_default().extend(written);
            }
            if !state.unprocessed.inserted.contains(&update.id) {
                state.unprocessed.updated.insert(update.id);
            }
        }

        for object in &pending.deleted {
            state.objects.remove(&object.id);
            state.updated.remove(&object.id);
            state.unprocessed.updated.remove(&object.id);
            if state.inserted.remove(&object.id) {
                if !state.unprocessed.inserted.remove(&object.id) {
                    state.unprocessed.deleted.insert(object.id, object.clone());
                }
            } else {
                state.deleted.insert(object.id, object.clone());
                state.unprocessed.deleted.insert(object.id, object.clone());
            }
        }
        Ok(())
    }
}

impl Context {
    fn commit_to_parent(&self, pending: &PendingCommit) -> Result<(), SaveError> {
        match self.parent() {
            Parent::Coordinator(coordinator) => {
                coordinator.commit(self.name(), pending, self.merge_policy())
            }
            Parent::Context(parent) => parent.perform_and_wait(|scope| {
                scope.absorb(pending, self.merge_policy(), self.name())
            }),
        }
    }

    /// Save this context and every ancestor, blocking until the last commit finished.
    ///
    /// A context without staged changes commits nothing and stops there;
    /// ancestors are only saved after a successful local commit.
    pub fn save_context_and_wait(&self) -> Result<(), SaveError> {
        if !self.perform_and_wait(|scope| scope.save())? {
            return Ok(());
        }
        match self.parent_context() {
            Some(parent) => parent.save_context_and_wait(),
            None => Ok(()),
        }
    }

    /// Run the save cascade on this context's queue without blocking the caller.
    ///
    /// `completion` runs exactly once, on this context's queue.
    pub fn save_context<F>(&self, completion: F)
    where
        F: FnOnce(Result<(), SaveError>) + Send + 'static,
    {
        let context = self.clone();
        self.queue()
            .perform(move || completion(context.save_context_and_wait()));
    }

    /// Future resolving when the save cascade started from this context finished.
    pub async fn save_async(&self) -> Result<(), SaveError> {
        let (sender, receiver) = tokio::sync::oneshot::channel();
        self.save_context(move |result| {
            let _ = sender.send(result);
        });
        receiver.await.unwrap_or(Err(SaveError::Interrupted))
    }
}
