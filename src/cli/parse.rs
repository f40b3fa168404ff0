//! CLI parse: clap types for strata. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Strata CLI - inspect and maintain a managed-object store
#[derive(Parser, Debug)]
#[command(name = "strata")]
#[command(about = "Inspect and maintain a strata managed-object store")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory (holds config/ and the schema directory)
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Show the schema, store location, journal mode and row counts
    Info,
    /// List the objects of one entity
    List {
        entity: String,
        /// Attribute to sort by
        #[arg(long)]
        sort: Option<String>,
        /// Sort descending
        #[arg(long)]
        desc: bool,
        /// Maximum number of rows
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Destroy and recreate the store
    Reset {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}
