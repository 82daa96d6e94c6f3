//! Migration Runner - applies pending migrations in version order
//!
//! Each migration moves `Pending -> Applying -> Applied`, or `Failed` when its
//! transaction rolls back, which aborts the rest of the batch. Checksums of
//! already-recorded migrations are compared for the whole corpus before the
//! first transaction opens, so drift never leaves a run half-applied.
//!
//! There is no cross-process lock. Two runners racing on the same database can
//! both see a migration as pending; callers must serialize invocations.

use std::collections::{BTreeMap, HashSet};
use std::time::Instant;

use keel_core::{ConfigTrait, KeelConfig};

use crate::definitions::{MigrationDefinition, MigrationOutcome, MigrationState, RunReport};
use crate::error::{MigrateError, MigrateResult};
use crate::loader::MigrationLoader;
use crate::store::{PgVersionStore, VersionStore};

/// Options for a run
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Compare checksums and report pending migrations without writing anything
    pub dry_run: bool,
}

impl RunOptions {
    pub fn check() -> Self {
        Self { dry_run: true }
    }
}

/// Comparison of the corpus against the ledger
#[derive(Debug)]
pub struct MigrationPlan<'a> {
    /// Definitions without a ledger record, in version order
    pub pending: Vec<&'a MigrationDefinition>,
    /// Definitions recorded with a matching checksum
    pub skipped_count: usize,
    /// Recorded versions with no file
    pub orphaned: Vec<String>,
}

/// Compare definitions with the recorded checksums.
///
/// Fails with [`MigrateError::ChecksumDrift`] on the first (lowest version)
/// recorded migration whose file content changed.
pub fn plan<'a>(
    migrations: &'a [MigrationDefinition],
    applied: &BTreeMap<String, String>,
) -> MigrateResult<MigrationPlan<'a>> {
    let mut pending = Vec::new();
    let mut skipped_count = 0;

    for migration in migrations {
        match applied.get(&migration.version) {
            Some(recorded) if recorded != &migration.checksum => {
                return Err(MigrateError::ChecksumDrift {
                    version: migration.version.clone(),
                    filename: migration.filename.clone(),
                    recorded: recorded.clone(),
                    current: migration.checksum.clone(),
                });
            }
            Some(_) => skipped_count += 1,
            None => pending.push(migration),
        }
    }

    let known: HashSet<&str> = migrations.iter().map(|m| m.version.as_str()).collect();
    let orphaned = applied
        .keys()
        .filter(|version| !known.contains(version.as_str()))
        .cloned()
        .collect();

    Ok(MigrationPlan {
        pending,
        skipped_count,
        orphaned,
    })
}

/// Migration runner that applies definitions through a [`VersionStore`]
pub struct MigrationRunner<S: VersionStore> {
    store: S,
}

impl<S: VersionStore> MigrationRunner<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Run (or, with `dry_run`, check) the given definitions.
    ///
    /// `migrations` must be sorted by version, as returned by the loader.
    pub async fn run(
        &mut self,
        migrations: &[MigrationDefinition],
        options: RunOptions,
    ) -> MigrateResult<RunReport> {
        let start_time = Instant::now();

        let applied = if options.dry_run {
            // Check mode must not create the ledger
            if self.store.ledger_exists().await? {
                self.store.fetch_all().await?
            } else {
                BTreeMap::new()
            }
        } else {
            self.store.ensure_ledger().await?;
            self.store.fetch_all().await?
        };

        let plan = plan(migrations, &applied)?;
        for version in &plan.orphaned {
            tracing::warn!(version = %version, "Ledger records a migration with no file on disk");
        }

        let mut report = RunReport {
            dry_run: options.dry_run,
            skipped_count: plan.skipped_count,
            orphaned: plan.orphaned.clone(),
            ..RunReport::default()
        };

        if options.dry_run {
            for migration in &plan.pending {
                tracing::info!(file = %migration.filename, state = %MigrationState::Pending, "Would apply");
            }
            report.pending = plan.pending.into_iter().cloned().collect();
            report.execution_time_ms = start_time.elapsed().as_millis();
            return Ok(report);
        }

        if plan.pending.is_empty() {
            tracing::info!(skipped = plan.skipped_count, "Database is up to date");
        }

        for migration in plan.pending {
            tracing::info!(
                file = %migration.filename,
                state = %MigrationState::Applying,
                "Applying migration"
            );

            match self.store.apply(migration).await {
                Ok(execution_time_ms) => {
                    tracing::info!(
                        file = %migration.filename,
                        state = %MigrationState::Applied,
                        execution_time_ms,
                        "Migration applied"
                    );
                    report.applied.push(MigrationOutcome {
                        filename: migration.filename.clone(),
                        version: migration.version.clone(),
                        state: MigrationState::Applied,
                        execution_time_ms,
                    });
                }
                Err(e) => {
                    tracing::error!(
                        file = %migration.filename,
                        state = %MigrationState::Failed,
                        applied_before_failure = report.applied.len(),
                        error = %e,
                        "Migration failed, aborting batch"
                    );
                    return Err(e);
                }
            }
        }

        report.execution_time_ms = start_time.elapsed().as_millis();
        Ok(report)
    }
}

/// Load the corpus, connect, and run it against the configured database.
///
/// The corpus is loaded and validated before any connection is opened.
pub async fn run(config: &KeelConfig, options: RunOptions) -> MigrateResult<RunReport> {
    config.validate()?;
    let migrations = MigrationLoader::new(&config.migrations.dir).load()?;

    let store = PgVersionStore::connect(&config.connection, &config.migrations).await?;
    let mut runner = MigrationRunner::new(store);
    let result = runner.run(&migrations, options).await;

    if let Err(e) = runner.into_store().close().await {
        tracing::debug!(error = %e, "Connection did not close cleanly");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{migration, MemoryStore};

    fn corpus() -> Vec<MigrationDefinition> {
        vec![
            migration("20240101000000", "create_table", "CREATE TABLE t (id int);"),
            migration("20240102000000", "insert_seed", "INSERT INTO t VALUES (1);"),
        ]
    }

    #[tokio::test]
    async fn test_first_run_applies_all_second_run_none() {
        let migrations = corpus();
        let mut runner = MigrationRunner::new(MemoryStore::new());

        let first = runner.run(&migrations, RunOptions::default()).await.unwrap();
        assert_eq!(first.applied_count(), 2);
        assert_eq!(first.applied[0].filename, "V20240101000000__create_table.sql");
        assert_eq!(first.applied[1].filename, "V20240102000000__insert_seed.sql");
        assert!(first.applied.iter().all(|o| o.state == MigrationState::Applied));

        let second = runner.run(&migrations, RunOptions::default()).await.unwrap();
        assert_eq!(second.applied_count(), 0);
        assert_eq!(second.skipped_count, 2);
        assert!(second.is_noop());

        let store = runner.into_store();
        let versions: Vec<_> = store.records.keys().cloned().collect();
        assert_eq!(versions, vec!["20240101000000", "20240102000000"]);
        assert_eq!(store.transactions_opened, 2);
    }

    #[tokio::test]
    async fn test_empty_corpus_is_noop() {
        let mut runner = MigrationRunner::new(MemoryStore::new());
        let report = runner.run(&[], RunOptions::default()).await.unwrap();
        assert!(report.is_noop());
        assert!(runner.store().records.is_empty());
    }

    #[tokio::test]
    async fn test_drift_aborts_before_any_transaction() {
        let mut migrations = corpus();
        let store = MemoryStore::new().with_record(&migrations[0], "0000deadbeef");
        migrations.push(migration("20240103000000", "add_index", "CREATE INDEX i ON t (id);"));

        let mut runner = MigrationRunner::new(store);
        let err = runner.run(&migrations, RunOptions::default()).await.unwrap_err();

        match err {
            MigrateError::ChecksumDrift {
                filename, recorded, ..
            } => {
                assert_eq!(filename, "V20240101000000__create_table.sql");
                assert_eq!(recorded, "0000deadbeef");
            }
            other => panic!("expected drift, got {:?}", other),
        }

        let store = runner.into_store();
        assert_eq!(store.transactions_opened, 0);
        assert_eq!(store.records.len(), 1);
        assert!(store.executed.is_empty());
    }

    #[tokio::test]
    async fn test_drift_detected_even_when_earlier_file_is_pending() {
        let migrations = corpus();
        let store = MemoryStore::new().with_record(&migrations[1], "edited");

        let mut runner = MigrationRunner::new(store);
        let err = runner.run(&migrations, RunOptions::default()).await.unwrap_err();
        assert!(matches!(err, MigrateError::ChecksumDrift { .. }));
        assert!(runner.store().executed.is_empty());
    }

    #[tokio::test]
    async fn test_failure_stops_batch_and_keeps_earlier_commits() {
        let mut migrations = corpus();
        migrations.push(migration(
            "20240103000000",
            "broken_alter",
            "CREATE TABLE u (id int); ALTR TABLE u ADD COLUMN id int;",
        ));
        migrations.push(migration("20240104000000", "never_runs", "SELECT 1;"));

        let store = MemoryStore::new().failing_on("V20240103000000__broken_alter.sql");
        let mut runner = MigrationRunner::new(store);
        let err = runner.run(&migrations, RunOptions::default()).await.unwrap_err();

        match &err {
            MigrateError::Execution { filename, .. } => {
                assert_eq!(filename, "V20240103000000__broken_alter.sql")
            }
            other => panic!("expected execution error, got {:?}", other),
        }
        assert!(err.to_string().contains("ALTR"));

        let store = runner.into_store();
        assert_eq!(store.records.len(), 2);
        assert!(!store.records.contains_key("20240103000000"));
        assert!(!store.records.contains_key("20240104000000"));
        assert_eq!(store.transactions_opened, 3);
    }

    #[tokio::test]
    async fn test_check_mode_writes_nothing() {
        let migrations = corpus();
        let mut runner = MigrationRunner::new(MemoryStore::new());

        let report = runner.run(&migrations, RunOptions::check()).await.unwrap();
        assert!(report.dry_run);
        assert_eq!(report.pending.len(), 2);
        assert_eq!(report.applied_count(), 0);
        assert!(!report.is_noop());

        let store = runner.into_store();
        assert!(!store.ledger_created, "check mode must not create the ledger");
        assert_eq!(store.transactions_opened, 0);
    }

    #[tokio::test]
    async fn test_check_mode_reports_drift() {
        let migrations = corpus();
        let store = MemoryStore::new().with_record(&migrations[0], "stale");

        let mut runner = MigrationRunner::new(store);
        let err = runner.run(&migrations, RunOptions::check()).await.unwrap_err();
        assert!(matches!(err, MigrateError::ChecksumDrift { .. }));
    }

    #[test]
    fn test_plan_reports_orphans() {
        let migrations = corpus();
        let mut applied = BTreeMap::new();
        applied.insert(migrations[0].version.clone(), migrations[0].checksum.clone());
        applied.insert("20230101000000".to_string(), "gone".to_string());

        let plan = plan(&migrations, &applied).unwrap();
        assert_eq!(plan.skipped_count, 1);
        assert_eq!(plan.pending.len(), 1);
        assert_eq!(plan.pending[0].version, "20240102000000");
        assert_eq!(plan.orphaned, vec!["20230101000000".to_string()]);
    }
}
