//! Configuration System
//!
//! Layered configuration for the store and logging. Sources are merged in
//! order: built-in defaults, the global config file, workspace config files,
//! then `STRATA__`-prefixed environment variables.

use crate::coordinator::{Provisioner, StoreOptions};
use crate::error::ConfigurationError;
use crate::logging::LoggingConfig;
use crate::schema::SchemaBundle;
use crate::store::StoreLocation;
use config::{Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod merge {
    pub mod merge_policy;
}

mod sources {
    pub mod global_file;
    pub mod workspace_file;
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrataConfig {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where the store lives and how it is opened
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Model name; selects the schema file and the default store path
    #[serde(default = "default_model")]
    pub model: String,

    /// Directory holding `<model>.schema.toml`, relative to the workspace root
    #[serde(default = "default_schema_dir")]
    pub schema_dir: PathBuf,

    /// Store directory; defaults to `<documents>/<model>.store`
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default)]
    pub in_memory: bool,

    #[serde(default = "default_true")]
    pub migrate_automatically: bool,

    #[serde(default = "default_true")]
    pub infer_mapping: bool,
}

fn default_model() -> String {
    "Model".to_string()
}

fn default_schema_dir() -> PathBuf {
    PathBuf::from("schemas")
}

fn default_true() -> bool {
    true
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            schema_dir: default_schema_dir(),
            path: None,
            in_memory: false,
            migrate_automatically: true,
            infer_mapping: true,
        }
    }
}

impl StoreConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.model.trim().is_empty() {
            return Err("Model name cannot be empty".to_string());
        }
        if self.schema_dir.as_os_str().is_empty() {
            return Err("Schema directory cannot be empty".to_string());
        }
        if let Some(path) = &self.path {
            if path.as_os_str().is_empty() {
                return Err("Store path cannot be empty".to_string());
            }
        }
        Ok(())
    }

    pub fn options(&self) -> StoreOptions {
        StoreOptions {
            migrate_automatically: self.migrate_automatically,
            infer_mapping: self.infer_mapping,
        }
    }

    pub fn location(&self) -> Result<StoreLocation, ConfigurationError> {
        if self.in_memory {
            return Ok(StoreLocation::InMemory);
        }
        self.path
            .clone()
            .or_else(|| Provisioner::default_store_path(&self.model))
            .map(StoreLocation::Disk)
            .ok_or_else(|| {
                ConfigurationError::Invalid(
                    "No store path configured and no documents directory available".to_string(),
                )
            })
    }

    pub fn schema_bundle(&self, workspace_root: &Path) -> SchemaBundle {
        SchemaBundle::new(workspace_root.join(&self.schema_dir))
    }
}

impl StrataConfig {
    /// Validate the entire configuration, reporting every problem at once
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let errors: Vec<String> = [
            self.store.validate().map_err(|e| format!("store: {}", e)),
            self.logging.validate().map_err(|e| format!("logging: {}", e)),
        ]
        .into_iter()
        .filter_map(Result::err)
        .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigurationError::Invalid(errors.join("; ")))
        }
    }
}

/// Loads [`StrataConfig`] from the layered sources
pub struct ConfigLoader;

impl ConfigLoader {
    pub fn load(workspace_root: &Path) -> Result<StrataConfig, ConfigurationError> {
        let builder = merge::merge_policy::builder_with_defaults()?;
        let builder = sources::global_file::add_to_builder(builder)?;
        let builder = sources::workspace_file::add_to_builder(builder, workspace_root)?;
        let mut config: StrataConfig = builder
            .add_source(
                Environment::with_prefix("STRATA")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        config.store.path = config
            .store
            .path
            .map(|path| sources::workspace_file::resolve_store_path(workspace_root, &path));
        Ok(config)
    }

    /// Load a single file on top of the defaults, ignoring every other source
    pub fn load_from_file(path: &Path) -> Result<StrataConfig, ConfigurationError> {
        let config: StrataConfig = merge::merge_policy::builder_with_defaults()?
            .add_source(File::from(path))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn global_config_path() -> Option<PathBuf> {
        sources::global_file::global_config_path()
    }
}
