//! In-memory ledger for unit tests
//!
//! Mirrors the transactional contract of the PostgreSQL store: a failing
//! migration leaves neither its effects nor a ledger row behind.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;

use crate::definitions::{MigrationDefinition, SchemaVersionRecord};
use crate::error::{MigrateError, MigrateResult};
use crate::store::VersionStore;

#[derive(Debug, Default)]
pub(crate) struct MemoryStore {
    pub ledger_created: bool,
    pub records: BTreeMap<String, SchemaVersionRecord>,
    /// Bodies that committed, in order
    pub executed: Vec<String>,
    /// Filenames whose body fails to execute
    pub failing: HashSet<String>,
    pub transactions_opened: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(mut self, filename: &str) -> Self {
        self.failing.insert(filename.to_string());
        self
    }

    /// Pre-populate the ledger as if `migration` had been applied earlier
    pub fn with_record(mut self, migration: &MigrationDefinition, checksum: &str) -> Self {
        self.ledger_created = true;
        self.records.insert(
            migration.version.clone(),
            SchemaVersionRecord {
                version: migration.version.clone(),
                description: migration.description.clone(),
                checksum: checksum.to_string(),
                executed_at: Utc::now(),
                execution_time_ms: 3,
                filename: migration.filename.clone(),
            },
        );
        self
    }

    fn record(&mut self, migration: &MigrationDefinition, execution_time_ms: i64) {
        self.records.insert(
            migration.version.clone(),
            SchemaVersionRecord {
                version: migration.version.clone(),
                description: migration.description.clone(),
                checksum: migration.checksum.clone(),
                executed_at: Utc::now(),
                execution_time_ms,
                filename: migration.filename.clone(),
            },
        );
    }
}

#[async_trait]
impl VersionStore for MemoryStore {
    async fn ensure_ledger(&mut self) -> MigrateResult<()> {
        self.ledger_created = true;
        Ok(())
    }

    async fn ledger_exists(&mut self) -> MigrateResult<bool> {
        Ok(self.ledger_created)
    }

    async fn fetch_all(&mut self) -> MigrateResult<BTreeMap<String, String>> {
        Ok(self
            .records
            .iter()
            .map(|(version, record)| (version.clone(), record.checksum.clone()))
            .collect())
    }

    async fn fetch_records(&mut self) -> MigrateResult<Vec<SchemaVersionRecord>> {
        Ok(self.records.values().cloned().collect())
    }

    async fn apply(&mut self, migration: &MigrationDefinition) -> MigrateResult<i64> {
        assert!(self.ledger_created, "apply called before ensure_ledger");
        self.transactions_opened += 1;

        if self.failing.contains(&migration.filename) {
            return Err(MigrateError::execution(
                &migration.filename,
                sqlx::Error::Protocol("syntax error at or near \"ALTR\"".to_string()),
            ));
        }
        if self.records.contains_key(&migration.version) {
            return Err(MigrateError::execution(
                &migration.filename,
                sqlx::Error::Protocol("duplicate key value violates unique constraint".to_string()),
            ));
        }

        self.executed.push(migration.sql.clone());
        self.record(migration, 1);
        Ok(1)
    }

    async fn record_all(&mut self, migrations: &[MigrationDefinition]) -> MigrateResult<()> {
        assert!(self.ledger_created, "record_all called before ensure_ledger");
        self.transactions_opened += 1;
        for migration in migrations {
            self.record(migration, 0);
        }
        Ok(())
    }
}

/// Build a definition with a checksum computed from `sql`
pub(crate) fn migration(version: &str, slug: &str, sql: &str) -> MigrationDefinition {
    MigrationDefinition {
        filename: format!("V{}__{}.sql", version, slug),
        version: version.to_string(),
        description: slug.replace('_', " "),
        checksum: crate::loader::checksum(sql.as_bytes()),
        sql: sql.to_string(),
    }
}
