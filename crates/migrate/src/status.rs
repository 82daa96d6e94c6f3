//! Read-only status of every migration file relative to the ledger
//!
//! Unlike a run, drift is reported here instead of raised.

use std::collections::{BTreeMap, HashSet};

use keel_core::{ConfigTrait, KeelConfig};

use crate::definitions::{MigrationDefinition, MigrationStatus, StatusEntry, StatusReport};
use crate::error::MigrateResult;
use crate::loader::MigrationLoader;
use crate::store::{PgVersionStore, VersionStore};

/// Classify each definition against the store without writing anything
pub async fn collect<S: VersionStore>(
    store: &mut S,
    migrations: &[MigrationDefinition],
) -> MigrateResult<StatusReport> {
    if !store.ledger_exists().await? {
        return Ok(StatusReport {
            ledger_exists: false,
            entries: migrations
                .iter()
                .map(|m| StatusEntry {
                    migration: m.clone(),
                    status: MigrationStatus::Pending,
                })
                .collect(),
            orphaned: Vec::new(),
        });
    }

    let records: BTreeMap<String, _> = store
        .fetch_records()
        .await?
        .into_iter()
        .map(|r| (r.version.clone(), r))
        .collect();

    let entries = migrations
        .iter()
        .map(|m| {
            let status = match records.get(&m.version) {
                None => MigrationStatus::Pending,
                Some(record) if record.checksum != m.checksum => MigrationStatus::Drifted {
                    recorded: record.checksum.clone(),
                },
                Some(record) => MigrationStatus::Applied {
                    executed_at: record.executed_at,
                    execution_time_ms: record.execution_time_ms,
                },
            };
            StatusEntry {
                migration: m.clone(),
                status,
            }
        })
        .collect();

    let known: HashSet<&str> = migrations.iter().map(|m| m.version.as_str()).collect();
    let orphaned = records
        .into_values()
        .filter(|r| !known.contains(r.version.as_str()))
        .collect();

    Ok(StatusReport {
        ledger_exists: true,
        entries,
        orphaned,
    })
}

/// Load the corpus and report its status against the configured database
pub async fn status(config: &KeelConfig) -> MigrateResult<StatusReport> {
    config.validate()?;
    let migrations = MigrationLoader::new(&config.migrations.dir).load()?;

    let mut store = PgVersionStore::connect(&config.connection, &config.migrations).await?;
    let report = collect(&mut store, &migrations).await;

    if let Err(e) = store.close().await {
        tracing::debug!(error = %e, "Connection did not close cleanly");
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{migration, MemoryStore};

    #[tokio::test]
    async fn test_status_without_ledger_is_all_pending() {
        let migrations = vec![migration("20240101000000", "create_table", "SELECT 1;")];
        let mut store = MemoryStore::new();

        let report = collect(&mut store, &migrations).await.unwrap();
        assert!(!report.ledger_exists);
        assert_eq!(report.pending_count(), 1);
        assert!(!store.ledger_created);
    }

    #[tokio::test]
    async fn test_status_classifies_entries() {
        let applied = migration("20240101000000", "create_table", "SELECT 1;");
        let drifted = migration("20240102000000", "insert_seed", "SELECT 2;");
        let pending = migration("20240103000000", "add_index", "SELECT 3;");
        let gone = migration("20231231000000", "removed_file", "SELECT 0;");

        let mut store = MemoryStore::new()
            .with_record(&applied, &applied.checksum)
            .with_record(&drifted, "old-checksum")
            .with_record(&gone, &gone.checksum);

        let report = collect(&mut store, &[applied, drifted, pending])
            .await
            .unwrap();

        assert!(matches!(report.entries[0].status, MigrationStatus::Applied { .. }));
        assert_eq!(
            report.entries[1].status,
            MigrationStatus::Drifted {
                recorded: "old-checksum".to_string()
            }
        );
        assert_eq!(report.entries[2].status, MigrationStatus::Pending);
        assert_eq!(report.drifted_count(), 1);
        assert_eq!(report.orphaned.len(), 1);
        assert_eq!(report.orphaned[0].filename, "V20231231000000__removed_file.sql");
    }
}
