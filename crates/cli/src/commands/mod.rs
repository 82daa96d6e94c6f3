//! Command implementations

pub mod bootstrap;
pub mod create;
pub mod lint;
pub mod run;
pub mod status;

use std::path::PathBuf;

use anyhow::Context;
use keel_core::{ConfigTrait, KeelConfig, MigrationsConfig};

/// Configuration for commands that connect to the database
pub fn database_config(dir: Option<PathBuf>) -> anyhow::Result<KeelConfig> {
    let mut config = KeelConfig::from_env().context("Invalid database configuration")?;
    config.migrations = config.migrations.override_dir(dir);

    for (setting, source) in config
        .connection
        .config_sources()
        .into_iter()
        .chain(config.migrations.config_sources())
    {
        tracing::debug!(setting = %setting, source = %source, "Configuration source");
    }
    Ok(config)
}

/// Configuration for commands that only read or write files
pub fn migrations_config(dir: Option<PathBuf>) -> anyhow::Result<MigrationsConfig> {
    let config = MigrationsConfig::from_env().context("Invalid migrations configuration")?;
    Ok(config.override_dir(dir))
}
