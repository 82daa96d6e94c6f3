//! Bootstrap Importer - record out-of-band migrations without running them
//!
//! This is a trust operation: the operator asserts that the live schema
//! already reflects each file. Records get `execution_time_ms = 0` and the
//! file's current checksum.

use keel_core::{ConfigTrait, KeelConfig};

use crate::definitions::{BootstrapReport, MigrationDefinition};
use crate::error::MigrateResult;
use crate::loader::MigrationLoader;
use crate::store::{PgVersionStore, VersionStore};

/// Options for the importer
#[derive(Debug, Clone, Default)]
pub struct BootstrapOptions {
    /// Only import files with a version at or below this one
    pub until: Option<String>,
}

/// Record every unrecorded definition as applied, in one transaction
pub async fn import<S: VersionStore>(
    store: &mut S,
    migrations: &[MigrationDefinition],
    options: &BootstrapOptions,
) -> MigrateResult<BootstrapReport> {
    store.ensure_ledger().await?;
    let applied = store.fetch_all().await?;

    let mut report = BootstrapReport::default();
    let mut to_record = Vec::new();

    for migration in migrations {
        if let Some(until) = &options.until {
            if migration.version.as_str() > until.as_str() {
                continue;
            }
        }

        match applied.get(&migration.version) {
            Some(recorded) => {
                if recorded != &migration.checksum {
                    tracing::warn!(
                        file = %migration.filename,
                        "Already recorded with a different checksum; leaving ledger row untouched"
                    );
                    report.mismatched.push(migration.filename.clone());
                }
                report.skipped_count += 1;
            }
            None => to_record.push(migration.clone()),
        }
    }

    store.record_all(&to_record).await?;

    for migration in &to_record {
        tracing::info!(file = %migration.filename, "Recorded as applied without execution");
    }
    report.recorded = to_record.into_iter().map(|m| m.filename).collect();
    Ok(report)
}

/// Load the corpus and bootstrap the configured database's ledger
pub async fn bootstrap(
    config: &KeelConfig,
    options: &BootstrapOptions,
) -> MigrateResult<BootstrapReport> {
    config.validate()?;
    let migrations = MigrationLoader::new(&config.migrations.dir).load()?;

    let mut store = PgVersionStore::connect(&config.connection, &config.migrations).await?;
    let report = import(&mut store, &migrations, options).await;

    if let Err(e) = store.close().await {
        tracing::debug!(error = %e, "Connection did not close cleanly");
    }
    report
}
