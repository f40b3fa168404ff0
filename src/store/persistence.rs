//! Sled-backed persistent store

use crate::error::StorageError;
use crate::store::{CommitBatch, JournalMode, PersistentStore, Record};
use std::path::Path;

const OBJECTS_TREE: &str = "objects";

fn sled_error(action: &str, e: sled::Error) -> StorageError {
    StorageError::IoError(std::io::Error::new(
        std::io::ErrorKind::Other,
        format!("Failed to {}: {}", action, e),
    ))
}

/// Sled-based implementation of PersistentStore
///
/// Rows live in the `objects` tree keyed by object id, encoded with bincode.
pub struct SledRecordStore {
    db: sled::Db,
    objects: sled::Tree,
    journal_mode: JournalMode,
}

impl SledRecordStore {
    /// Open (or create) the database directory at `path`.
    pub fn open<P: AsRef<Path>>(path: P, journal_mode: JournalMode) -> Result<Self, StorageError> {
        let config = match journal_mode {
            JournalMode::WriteAhead => sled::Config::new()
                .path(path.as_ref())
                .mode(sled::Mode::HighThroughput)
                .flush_every_ms(Some(500)),
            JournalMode::Delete => sled::Config::new()
                .path(path.as_ref())
                .mode(sled::Mode::LowSpace)
                .flush_every_ms(None),
        };

        let db = config
            .open()
            .map_err(|e| sled_error("open sled database", e))?;
        let objects = db
            .open_tree(OBJECTS_TREE)
            .map_err(|e| sled_error("open objects tree", e))?;

        Ok(Self {
            db,
            objects,
            journal_mode,
        })
    }

    /// Get the underlying sled database (for advanced operations)
    pub fn db(&self) -> &sled::Db {
        &self.db
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    fn encode(record: &Record) -> Result<Vec<u8>, StorageError> {
        bincode::serialize(record).map_err(|e| {
            StorageError::IoError(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Failed to serialize record: {}", e),
            ))
        })
    }

    fn sync_if_required(&self) -> Result<(), StorageError> {
        if self.journal_mode == JournalMode::Delete {
            self.flush()?;
        }
        Ok(())
    }
}

impl PersistentStore for SledRecordStore {
    fn load_records(&self) -> Result<Vec<Record>, StorageError> {
        let mut records = Vec::new();
        for item in self.objects.iter() {
            let (_, value) = item.map_err(|e| sled_error("iterate store", e))?;
            let record: Record = bincode::deserialize(&value)
                .map_err(|e| StorageError::CorruptRecord(e.to_string()))?;
            records.push(record);
        }
        Ok(records)
    }

    fn write(&self, batch: &CommitBatch) -> Result<(), StorageError> {
        let mut sled_batch = sled::Batch::default();
        for record in &batch.upserts {
            sled_batch.insert(record.id.as_bytes().as_slice(), Self::encode(record)?);
        }
        for id in &batch.deletes {
            sled_batch.remove(id.as_bytes().as_slice());
        }

        self.objects
            .apply_batch(sled_batch)
            .map_err(|e| sled_error("apply batch", e))?;
        self.sync_if_required()
    }

    fn replace_all(&self, records: &[Record]) -> Result<(), StorageError> {
        let mut sled_batch = sled::Batch::default();
        for key in self.objects.iter().keys() {
            let key = key.map_err(|e| sled_error("iterate store", e))?;
            sled_batch.remove(key);
        }
        for record in records {
            sled_batch.insert(record.id.as_bytes().as_slice(), Self::encode(record)?);
        }

        self.objects
            .apply_batch(sled_batch)
            .map_err(|e| sled_error("replace contents", e))?;
        self.sync_if_required()
    }

    /// Flush all pending writes to disk
    fn flush(&self) -> Result<(), StorageError> {
        self.db
            .flush()
            .map_err(|e| sled_error("flush database", e))?;
        Ok(())
    }

    fn journal_mode(&self) -> Option<JournalMode> {
        Some(self.journal_mode)
    }
}

impl Drop for SledRecordStore {
    fn drop(&mut self) {
        if let Err(e) = self.db.flush() {
            tracing::warn!(error = %e, "Failed to flush store on close");
        }
    }
}
