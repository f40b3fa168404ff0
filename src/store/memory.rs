//! Ephemeral store used by in-memory stacks

use crate::error::StorageError;
use crate::store::{CommitBatch, JournalMode, PersistentStore, Record};
use crate::types::ObjectId;
use parking_lot::Mutex;
use std::collections::BTreeMap;

/// Rows held in process memory; discarded with the coordinator
#[derive(Default)]
pub struct InMemoryStore {
    rows: Mutex<BTreeMap<ObjectId, Record>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PersistentStore for InMemoryStore {
    fn load_records(&self) -> Result<Vec<Record>, StorageError> {
        Ok(self.rows.lock().values().cloned().collect())
    }

    fn write(&self, batch: &CommitBatch) -> Result<(), StorageError> {
        let mut rows = self.rows.lock();
        for record in &batch.upserts {
            rows.insert(record.id, record.clone());
        }
        for id in &batch.deletes {
            rows.remove(id);
        }
        Ok(())
    }

    fn replace_all(&self, records: &[Record]) -> Result<(), StorageError> {
        let mut rows = self.rows.lock();
        rows.clear();
        rows.extend(records.iter().map(|r| (r.id, r.clone())));
        Ok(())
    }

    fn flush(&self) -> Result<(), StorageError> {
        Ok(())
    }

    fn journal_mode(&self) -> Option<JournalMode> {
        None
    }
}
