//! Commit payloads and property-level merge
//!
//! A commit carries only the properties a context changed, together with the
//! values it started from, so the receiving level can merge per property.

use crate::object::ManagedObject;
use crate::store::Record;
use crate::types::{ObjectId, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How a committing context resolves properties changed underneath it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// Committed properties overwrite the receiving level's values
    #[default]
    LastWriteWins,
    /// A property changed at the receiving level since the committer read it keeps its value
    PersistedWins,
}

/// Changed properties of one existing object
#[derive(Debug, Clone, PartialEq)]
pub struct RecordUpdate {
    pub id: ObjectId,
    pub entity: String,
    pub changes: BTreeMap<String, Value>,
    /// Values of the changed keys when the committer last synced
    pub base: BTreeMap<String, Value>,
}

/// Everything one local commit hands to its parent
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingCommit {
    pub inserted: Vec<Record>,
    pub updated: Vec<RecordUpdate>,
    pub deleted: Vec<ManagedObject>,
}

impl PendingCommit {
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inserted.len() + self.updated.len() + self.deleted.len()
    }
}

/// Merge `update` into `current`; returns the keys that were written.
pub fn merge_properties(
    current: &mut BTreeMap<String, Value>,
    update: &RecordUpdate,
    policy: MergePolicy,
) -> Vec<String> {
    let mut written = Vec::new();
    for (key, value) in &update.changes {
        if policy == MergePolicy::PersistedWins {
            let existing = current.get(key).cloned().unwrap_or_default();
            let started_from = update.base.get(key).cloned().unwrap_or_default();
            if existing != started_from {
                continue;
            }
        }

        if value.is_null() {
            current.remove(key);
        } else {
            current.insert(key.clone(), value.clone());
        }
        written.push(key.clone());
    }
    written
}
