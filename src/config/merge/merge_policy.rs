//! Merge rules: defaults, override order, conflict handling.

use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default("store.model", "Model")?
        .set_default("store.schema_dir", "schemas")?
        .set_default("store.in_memory", false)?
        .set_default("store.migrate_automatically", true)?
        .set_default("store.infer_mapping", true)
}
