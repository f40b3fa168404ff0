//! Error types for the strata persistence stack.
//!
//! Every error carries its kind plus enough context (path, context name,
//! object identifier) to act on it without inspecting a message string.

use crate::schema::ValidationIssue;
use crate::types::ObjectId;
use std::path::PathBuf;
use thiserror::Error;

/// Storage-related errors raised by a backing store
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Store metadata is corrupt: {0}")]
    CorruptMetadata(String),

    #[error("Record is corrupt: {0}")]
    CorruptRecord(String),

    #[error("Storage I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Errors produced while resolving a schema from a bundle
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Schema '{name}' not found in bundle {bundle:?}")]
    NotFound { name: String, bundle: PathBuf },

    #[error("Schema '{name}' is corrupt: {reason}")]
    Corrupt { name: String, reason: String },
}

/// Errors produced while migrating a store to a newer schema
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Cannot infer mapping for {entity}.{attribute}: {from} cannot become {to}")]
    IncompatibleAttribute {
        entity: String,
        attribute: String,
        from: String,
        to: String,
    },

    #[error("Object {id} of {entity} has no value for required attribute '{attribute}'")]
    MissingValue {
        entity: String,
        attribute: String,
        id: ObjectId,
    },

    #[error("Stored schema '{stored}' does not match requested schema '{requested}'")]
    SchemaMismatch { stored: String, requested: String },

    #[error("No mapping from schema v{from} to v{to} and mapping inference is disabled")]
    NoMapping { from: u32, to: u32 },
}

/// Errors surfaced while opening a store and building a stack
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("Unable to create store at {path:?}: {source}")]
    UnableToCreateStore {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Store at {path:?} is unavailable: {reason}")]
    StoreUnavailable { path: PathBuf, reason: String },

    #[error("Store at {path:?} requires migration but automatic migration is disabled")]
    MigrationRequired { path: PathBuf },

    #[error("Migration of store at {path:?} failed: {source}")]
    Migration {
        path: PathBuf,
        #[source]
        source: MigrationError,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Errors surfaced by a commit at one level of the save cascade
#[derive(Debug, Error)]
pub enum SaveError {
    #[error("Validation failed in context '{context}' ({} issue(s))", issues.len())]
    Validation {
        context: String,
        issues: Vec<ValidationIssue>,
    },

    #[error("Object {id} committed by context '{context}' no longer exists in its parent")]
    MissingObject { context: String, id: ObjectId },

    #[error("Context '{context}' is attached to a coordinator without a store")]
    StoreMissing { context: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Save cascade was interrupted before completing")]
    Interrupted,
}

/// Errors surfaced by a store reset
#[derive(Debug, Error)]
pub enum ResetError {
    #[error("No persistent store found at {0:?}")]
    StoreNotFound(PathBuf),

    #[error("In-memory store is missing from the coordinator")]
    InMemoryStoreMissing,

    #[error("Failed to remove store at {path:?}: {source}")]
    Removal {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to recreate store: {0}")]
    Setup(#[from] SetupError),

    #[error("Reset was interrupted before completing")]
    Interrupted,
}

/// Recoverable fetch errors; entity mismatches are programmer errors and panic instead
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("Entity '{entity}' has no attribute '{key}'")]
    UnknownAttribute { entity: String, key: String },
}

/// Errors raised when addressing an object a context cannot resolve
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ObjectError {
    #[error("Object {0} not found")]
    NotFound(ObjectId),
}

/// Configuration and logging setup errors
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Configuration error: {0}")]
    Invalid(String),

    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

/// Errors surfaced by command-line commands
#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Config(#[from] ConfigurationError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Setup(#[from] SetupError),

    #[error(transparent)]
    Reset(#[from] ResetError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Entity '{0}' is not part of the schema")]
    UnknownEntity(String),

    #[error("Failed to get user input: {0}")]
    Prompt(String),
}
