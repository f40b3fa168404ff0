//! Store metadata sidecar
//!
//! `store-metadata.json` inside the store directory records which schema the
//! rows were written with, so an open can tell whether a migration is due
//! without decoding any row.

use crate::error::StorageError;
use crate::schema::Schema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const METADATA_FILE: &str = "store-metadata.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreMetadata {
    pub schema: Schema,
    /// Hex blake3 fingerprint of `schema`
    pub fingerprint: String,
}

impl StoreMetadata {
    pub fn for_schema(schema: &Schema) -> Self {
        Self {
            schema: schema.clone(),
            fingerprint: schema.fingerprint_hex(),
        }
    }

    pub fn path_in(store_dir: &Path) -> PathBuf {
        store_dir.join(METADATA_FILE)
    }

    /// Read the sidecar; `Ok(None)` for a store that has never been written.
    pub fn read(store_dir: &Path) -> Result<Option<Self>, StorageError> {
        let path = Self::path_in(store_dir);
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&path)?;
        let metadata: StoreMetadata = serde_json::from_str(&content)
            .map_err(|e| StorageError::CorruptMetadata(format!("{}: {}", path.display(), e)))?;

        if metadata.fingerprint != metadata.schema.fingerprint_hex() {
            return Err(StorageError::CorruptMetadata(format!(
                "{}: fingerprint does not match recorded schema",
                path.display()
            )));
        }
        Ok(Some(metadata))
    }

    /// Write the sidecar through a temp file and rename.
    pub fn write(&self, store_dir: &Path) -> Result<(), StorageError> {
        let path = Self::path_in(store_dir);
        let temp = path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| StorageError::CorruptMetadata(e.to_string()))?;
        std::fs::write(&temp, content)?;
        std::fs::rename(&temp, &path)?;
        Ok(())
    }

    pub fn matches(&self, schema: &Schema) -> bool {
        self.fingerprint == schema.fingerprint_hex()
    }
}
