//! Schema bundles: directories of `<name>.schema.toml` resources

use super::Schema;
use crate::error::SchemaError;
use std::path::{Path, PathBuf};

const SCHEMA_EXTENSION: &str = "schema.toml";

/// A directory that schemas are resolved from by name
#[derive(Debug, Clone)]
pub struct SchemaBundle {
    root: PathBuf,
}

impl SchemaBundle {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.{}", name, SCHEMA_EXTENSION))
    }

    /// Resolve and parse the named schema.
    pub fn load(&self, name: &str) -> Result<Schema, SchemaError> {
        let path = self.path_for(name);
        if !path.exists() {
            return Err(SchemaError::NotFound {
                name: name.to_string(),
                bundle: self.root.clone(),
            });
        }

        let content = std::fs::read_to_string(&path).map_err(|e| SchemaError::Corrupt {
            name: name.to_string(),
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;

        let schema: Schema = toml::from_str(&content).map_err(|e| SchemaError::Corrupt {
            name: name.to_string(),
            reason: e.to_string(),
        })?;

        if schema.name != name {
            return Err(SchemaError::Corrupt {
                name: name.to_string(),
                reason: format!("file declares schema '{}'", schema.name),
            });
        }

        tracing::debug!(schema = %schema.name, version = schema.version, "Loaded schema from bundle");
        Ok(schema)
    }

    /// Resolve the named schema, treating a missing or corrupt resource as fatal.
    ///
    /// # Panics
    ///
    /// Panics when the schema cannot be loaded. A missing schema is a
    /// packaging error the application cannot recover from.
    pub fn schema(&self, name: &str) -> Schema {
        match self.load(name) {
            Ok(schema) => schema,
            Err(err) => panic!("Unable to load schema '{}': {}", name, err),
        }
    }

    /// Names of every schema resource in the bundle, sorted.
    pub fn names(&self) -> Result<Vec<String>, std::io::Error> {
        let suffix = format!(".{}", SCHEMA_EXTENSION);
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if let Some(file_name) = entry.file_name().to_str() {
                if let Some(name) = file_name.strip_suffix(&suffix) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}
