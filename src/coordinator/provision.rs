//! Store coordinator provisioning
//!
//! Opens disk or in-memory stores for a schema, detecting and running
//! migrations for disk stores before the coordinator is handed out.

use super::StoreCoordinator;
use crate::error::{MigrationError, SetupError};
use crate::schema::{MigrationPlan, Schema};
use crate::store::{
    InMemoryStore, JournalMode, PersistentStore, SledRecordStore, StoreLocation, StoreMetadata,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Store file extension used for default locations
pub const STORE_EXTENSION: &str = "store";

/// Options applied when opening a disk store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreOptions {
    /// Migrate an out-of-date store instead of failing the open
    #[serde(default = "default_true")]
    pub migrate_automatically: bool,
    /// Derive the mapping model from the two schemas
    #[serde(default = "default_true")]
    pub infer_mapping: bool,
}

fn default_true() -> bool {
    true
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            migrate_automatically: true,
            infer_mapping: true,
        }
    }
}

pub struct Provisioner;

impl Provisioner {
    /// `<documents>/<model>.store`, falling back to the platform data directory.
    pub fn default_store_path(model_name: &str) -> Option<PathBuf> {
        let file_name = format!("{}.{}", model_name, STORE_EXTENSION);
        if let Some(user_dirs) = directories::UserDirs::new() {
            if let Some(documents) = user_dirs.document_dir() {
                return Some(documents.join(file_name));
            }
        }
        directories::ProjectDirs::from("", "", "strata")
            .map(|dirs| dirs.data_dir().join(file_name))
    }

    pub fn open(
        schema: Arc<Schema>,
        location: &StoreLocation,
        options: StoreOptions,
    ) -> Result<StoreCoordinator, SetupError> {
        match location {
            StoreLocation::InMemory => Self::open_in_memory(schema),
            StoreLocation::Disk(path) => Self::open_disk(schema, path, options),
        }
    }

    pub fn open_in_memory(schema: Arc<Schema>) -> Result<StoreCoordinator, SetupError> {
        let coordinator =
            StoreCoordinator::new(schema, StoreLocation::InMemory, Box::new(InMemoryStore::new()))?;
        Ok(coordinator)
    }

    /// Open on a blocking-pool thread so the caller is never blocked.
    pub async fn open_disk_async(
        schema: Arc<Schema>,
        path: PathBuf,
        options: StoreOptions,
    ) -> Result<StoreCoordinator, SetupError> {
        let task_path = path.clone();
        tokio::task::spawn_blocking(move || Self::open_disk(schema, &task_path, options))
            .await
            .map_err(|e| SetupError::StoreUnavailable {
                path,
                reason: format!("provisioning task failed: {}", e),
            })?
    }

    pub fn open_disk(
        schema: Arc<Schema>,
        path: &Path,
        options: StoreOptions,
    ) -> Result<StoreCoordinator, SetupError> {
        std::fs::create_dir_all(path).map_err(|source| SetupError::UnableToCreateStore {
            path: path.to_path_buf(),
            source,
        })?;

        let stored = StoreMetadata::read(path)?;
        let plan = match &stored {
            Some(metadata) if !metadata.matches(&schema) => {
                Some(Self::plan_migration(&metadata.schema, &schema, path, options)?)
            }
            _ => None,
        };

        let journal_mode = if plan.is_some() {
            JournalMode::Delete
        } else {
            JournalMode::WriteAhead
        };
        debug!(path = %path.display(), journal_mode = %journal_mode, "Opening disk store");

        let store = SledRecordStore::open(path, journal_mode).map_err(|e| {
            SetupError::StoreUnavailable {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
        })?;

        if let Some(plan) = &plan {
            let migrated = plan
                .apply(store.load_records()?)
                .map_err(|source| SetupError::Migration {
                    path: path.to_path_buf(),
                    source,
                })?;
            store.replace_all(&migrated)?;
            store.flush()?;
            info!(
                path = %path.display(),
                from = plan.from_version(),
                to = plan.to_version(),
                rows = migrated.len(),
                "Migrated store"
            );
        }

        if stored.is_none() || plan.is_some() {
            StoreMetadata::for_schema(&schema).write(path)?;
        }

        let coordinator =
            StoreCoordinator::new(schema, StoreLocation::Disk(path.to_path_buf()), Box::new(store))?;
        Ok(coordinator)
    }

    fn plan_migration(
        stored: &Schema,
        requested: &Schema,
        path: &Path,
        options: StoreOptions,
    ) -> Result<MigrationPlan, SetupError> {
        if !options.migrate_automatically {
            return Err(SetupError::MigrationRequired {
                path: path.to_path_buf(),
            });
        }

        let migration_error = |source| SetupError::Migration {
            path: path.to_path_buf(),
            source,
        };
        if !options.infer_mapping {
            return Err(migration_error(MigrationError::NoMapping {
                from: stored.version,
                to: requested.version,
            }));
        }
        MigrationPlan::infer(stored, requested).map_err(migration_error)
    }
}
