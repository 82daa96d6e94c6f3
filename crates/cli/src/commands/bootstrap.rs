use std::path::PathBuf;

use keel_migrate::{BootstrapOptions, MigrationFilename};

use super::database_config;

/// Record existing migrations as applied without running them
pub async fn run(dir: Option<PathBuf>, until: Option<String>) -> anyhow::Result<()> {
    if let Some(version) = &until {
        // Reuse the file-name parser so the bound is a real timestamp
        if MigrationFilename::parse(&format!("V{}__bound.sql", version)).is_none() {
            anyhow::bail!("--until expects a 14-digit version (YYYYMMDDHHMMSS), got '{}'", version);
        }
    }

    let config = database_config(dir)?;
    tracing::warn!(
        database = %config.connection.display_target(),
        "Bootstrapping: files will be recorded as applied without being executed"
    );

    let report = keel_migrate::bootstrap(&config, &BootstrapOptions { until }).await?;

    println!(
        "✅ Recorded {} migration(s) as applied ({} already recorded)",
        report.recorded.len(),
        report.skipped_count
    );
    for filename in &report.recorded {
        println!("  ✔ {}", filename);
    }
    for filename in &report.mismatched {
        println!("⚠️ {} is recorded with a different checksum; ledger left unchanged", filename);
    }
    Ok(())
}
