//! Backing stores
//!
//! The persistent layer underneath the coordinator. A store only holds
//! committed rows; change tracking and merging happen above it.

pub mod memory;
pub mod metadata;
pub mod persistence;

pub use memory::InMemoryStore;
pub use metadata::StoreMetadata;
pub use persistence::SledRecordStore;

use crate::error::StorageError;
use crate::types::{ObjectId, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Committed row of one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: ObjectId,
    pub entity: String,
    pub values: BTreeMap<String, Value>,
}

/// Rows to write and identifiers to remove in one atomic step
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommitBatch {
    pub upserts: Vec<Record>,
    pub deletes: Vec<ObjectId>,
}

impl CommitBatch {
    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.deletes.is_empty()
    }
}

/// Where a stack keeps its rows
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    InMemory,
    Disk(PathBuf),
}

impl StoreLocation {
    pub fn disk(path: impl Into<PathBuf>) -> Self {
        StoreLocation::Disk(path.into())
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            StoreLocation::InMemory => None,
            StoreLocation::Disk(path) => Some(path),
        }
    }
}

impl fmt::Display for StoreLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreLocation::InMemory => f.write_str("in-memory"),
            StoreLocation::Disk(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Durability mode of a disk store
///
/// `WriteAhead` batches flushes in the background for throughput.
/// `Delete` flushes after every write and is used while a migration is
/// pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalMode {
    WriteAhead,
    Delete,
}

impl fmt::Display for JournalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JournalMode::WriteAhead => f.write_str("WAL"),
            JournalMode::Delete => f.write_str("DELETE"),
        }
    }
}

/// Backing store interface
pub trait PersistentStore: Send {
    /// Every committed row.
    fn load_records(&self) -> Result<Vec<Record>, StorageError>;

    /// Apply one commit atomically.
    fn write(&self, batch: &CommitBatch) -> Result<(), StorageError>;

    /// Replace the full contents of the store.
    fn replace_all(&self, records: &[Record]) -> Result<(), StorageError>;

    fn flush(&self) -> Result<(), StorageError>;

    /// Journal mode for disk stores, `None` for in-memory ones.
    fn journal_mode(&self) -> Option<JournalMode>;
}
