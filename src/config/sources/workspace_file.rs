//! Workspace config sources
//!
//! A workspace configures its store through `strata.toml` at the workspace
//! root. Profile overrides live under `config/`: `config/config.toml`, then
//! `config/<profile>.toml` where the profile comes from `STRATA_ENV`.

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::ConfigError;
use config::File;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const WORKSPACE_CONFIG_FILE: &str = "strata.toml";
pub const PROFILE_DIR: &str = "config";
const PROFILE_ENV: &str = "STRATA_ENV";
const DEFAULT_PROFILE: &str = "development";

/// Profile selected by `STRATA_ENV`, `development` when unset or blank.
pub fn active_profile() -> String {
    std::env::var(PROFILE_ENV)
        .ok()
        .filter(|profile| !profile.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_PROFILE.to_string())
}

/// Existing config files of `workspace_root`, lowest precedence first.
pub fn workspace_config_files(workspace_root: &Path, profile: &str) -> Vec<PathBuf> {
    let profile_dir = workspace_root.join(PROFILE_DIR);
    [
        workspace_root.join(WORKSPACE_CONFIG_FILE),
        profile_dir.join("config.toml"),
        profile_dir.join(format!("{}.toml", profile)),
    ]
    .into_iter()
    .filter(|path| path.is_file())
    .collect()
}

/// Store paths in workspace files are relative to the workspace root.
pub fn resolve_store_path(workspace_root: &Path, path: &Path) -> PathBuf {
    if path.is_relative() {
        workspace_root.join(path)
    } else {
        path.to_path_buf()
    }
}

pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
    workspace_root: &Path,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let files = workspace_config_files(workspace_root, &active_profile());
    if files.is_empty() {
        debug!(workspace = %workspace_root.display(), "No workspace configuration files");
    }

    Ok(files.into_iter().fold(builder, |builder, path| {
        debug!(config_path = %path.display(), "Adding workspace configuration");
        builder.add_source(File::from(path))
    }))
}
