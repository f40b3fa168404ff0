//! Store coordinator
//!
//! Owns the single backing store of a stack and the committed row cache.
//! Only root contexts talk to it; every access is serialised by its locks.

pub mod provision;

pub use provision::{Provisioner, StoreOptions};

use crate::error::{SaveError, StorageError};
use crate::merge::{merge_properties, MergePolicy, PendingCommit};
use crate::schema::Schema;
use crate::store::{CommitBatch, JournalMode, PersistentStore, Record, StoreLocation};
use crate::types::ObjectId;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

pub struct StoreCoordinator {
    schema: Arc<Schema>,
    location: StoreLocation,
    store: Mutex<Option<Box<dyn PersistentStore>>>,
    rows: RwLock<BTreeMap<ObjectId, Record>>,
    writes: AtomicU64,
}

impl StoreCoordinator {
    /// Wrap an opened store, loading its committed rows.
    pub fn new(
        schema: Arc<Schema>,
        location: StoreLocation,
        store: Box<dyn PersistentStore>,
    ) -> Result<Self, StorageError> {
        let rows = store
            .load_records()?
            .into_iter()
            .map(|record| (record.id, record))
            .collect::<BTreeMap<_, _>>();
        debug!(location = %location, rows = rows.len(), "Coordinator attached to store");

        Ok(Self {
            schema,
            location,
            store: Mutex::new(Some(store)),
            rows: RwLock::new(rows),
            writes: AtomicU64::new(0),
        })
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn location(&self) -> &StoreLocation {
        &self.location
    }

    pub fn journal_mode(&self) -> Option<JournalMode> {
        self.store.lock().as_ref().and_then(|s| s.journal_mode())
    }

    pub fn has_store(&self) -> bool {
        self.store.lock().is_some()
    }

    /// Flush and release the backing store; later commits fail with `StoreMissing`.
    pub fn detach_store(&self) -> Option<Box<dyn PersistentStore>> {
        let mut guard = self.store.lock();
        if let Some(store) = guard.as_ref() {
            if let Err(e) = store.flush() {
                tracing::warn!(error = %e, "Failed to flush store before detaching");
            }
        }
        self.rows.write().clear();
        guard.take()
    }

    /// Committed rows of one entity.
    pub fn records_of(&self, entity: &str) -> Vec<Record> {
        self.rows
            .read()
            .values()
            .filter(|r| r.entity == entity)
            .cloned()
            .collect()
    }

    pub fn record(&self, id: ObjectId) -> Option<Record> {
        self.rows.read().get(&id).cloned()
    }

    pub fn record_count(&self) -> usize {
        self.rows.read().len()
    }

    /// Number of committed rows per entity, for every entity in the schema.
    pub fn entity_counts(&self) -> BTreeMap<String, usize> {
        let mut counts: BTreeMap<String, usize> = self
            .schema
            .entities
            .iter()
            .map(|e| (e.name.clone(), 0))
            .collect();
        for record in self.rows.read().values() {
            *counts.entry(record.entity.clone()).or_default() += 1;
        }
        counts
    }

    /// Number of commits that reached the backing store.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Write one root-context commit through to the backing store.
    ///
    /// The merged rows are computed first; the row cache only changes once
    /// the store accepted the batch.
    pub fn commit(
        &self,
        context: &str,
        pending: &PendingCommit,
        policy: MergePolicy,
    ) -> Result<(), SaveError> {
        let store_guard = self.store.lock();
        let store = store_guard.as_ref().ok_or_else(|| SaveError::StoreMissing {
            context: context.to_string(),
        })?;

        let mut rows = self.rows.write();
        let mut batch = CommitBatch::default();

        for record in &pending.inserted {
            batch.upserts.push(record.clone());
        }

        for update in &pending.updated {
            let mut merged = rows
                .get(&update.id)
                .cloned()
                .ok_or_else(|| SaveError::MissingObject {
                    context: context.to_string(),
                    id: update.id,
                })?;
            merge_properties(&mut merged.values, update, policy);
            batch.upserts.push(merged);
        }

        for object in &pending.deleted {
            if rows.contains_key(&object.id) {
                batch.deletes.push(object.id);
            }
        }

        if batch.is_empty() {
            return Ok(());
        }

        store.write(&batch)?;
        for record in batch.upserts {
            rows.insert(record.id, record);
        }
        for id in &batch.deletes {
            rows.remove(id);
        }
        self.writes.fetch_add(1, Ordering::SeqCst);

        debug!(
            context,
            inserted = pending.inserted.len(),
            updated = pending.updated.len(),
            deleted = pending.deleted.len(),
            "Commit written to store"
        );
        Ok(())
    }
}

impl std::fmt::Debug for StoreCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreCoordinator")
            .field("schema", &self.schema.name)
            .field("location", &self.location)
            .field("rows", &self.record_count())
            .finish()
    }
}
