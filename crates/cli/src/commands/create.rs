use std::path::PathBuf;

use chrono::Utc;

use super::migrations_config;

/// Scaffold a new migration file
pub fn create(description: &str, dir: Option<PathBuf>) -> anyhow::Result<()> {
    let config = migrations_config(dir)?;
    let path = keel_migrate::create_migration(&config.dir, description, Utc::now())?;
    println!("✅ Created migration: {}", path.display());
    Ok(())
}

/// Scaffold a revert template for an existing migration
pub fn create_revert(version: &str, dir: Option<PathBuf>) -> anyhow::Result<()> {
    let config = migrations_config(dir)?;
    let path = keel_migrate::create_revert(&config.dir, version, Utc::now())?;
    println!("✅ Created revert template: {}", path.display());
    println!("   Review the checklist and write the reversing SQL before running it.");
    Ok(())
}
