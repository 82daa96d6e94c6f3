//! Schema Version Store - the ledger of applied migrations
//!
//! The ledger is one table, created on first use. Rows are only ever
//! inserted: by [`VersionStore::apply`] inside the migration's own
//! transaction, or by [`VersionStore::record_all`] for the bootstrap importer.

use std::collections::BTreeMap;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keel_core::{ConnectionConfig, MigrationsConfig};
use sqlx::{Connection, Executor, PgConnection, Row};

use crate::connection;
use crate::definitions::{MigrationDefinition, SchemaVersionRecord};
use crate::error::{MigrateError, MigrateResult};

/// Storage seam used by the runner, status query and bootstrap importer
#[async_trait]
pub trait VersionStore: Send {
    /// Create the ledger table if it does not exist
    async fn ensure_ledger(&mut self) -> MigrateResult<()>;

    /// Read-only check for the ledger table
    async fn ledger_exists(&mut self) -> MigrateResult<bool>;

    /// Map of recorded version to checksum
    async fn fetch_all(&mut self) -> MigrateResult<BTreeMap<String, String>>;

    /// Full ledger rows ordered by version
    async fn fetch_records(&mut self) -> MigrateResult<Vec<SchemaVersionRecord>>;

    /// Execute the migration body and append its ledger row in one transaction.
    ///
    /// Returns the elapsed milliseconds recorded in the ledger. On any failure
    /// the transaction is rolled back and [`MigrateError::Execution`] is returned.
    async fn apply(&mut self, migration: &MigrationDefinition) -> MigrateResult<i64>;

    /// Record migrations as applied without executing them, in one transaction
    async fn record_all(&mut self, migrations: &[MigrationDefinition]) -> MigrateResult<()>;
}

/// Qualified name of the ledger table and the SQL that touches it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerTable {
    schema: String,
    table: String,
}

impl LedgerTable {
    /// Names must already be validated identifiers (see `MigrationsConfig::validate`)
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
        }
    }

    pub fn from_config(config: &MigrationsConfig) -> Self {
        Self::new(&config.ledger_schema, &config.ledger_table)
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn qualified(&self) -> String {
        format!("\"{}\".\"{}\"", self.schema, self.table)
    }

    /// SQL to create the ledger table
    pub fn create_table_sql(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    \
                version VARCHAR(14) PRIMARY KEY,\n    \
                description TEXT NOT NULL,\n    \
                checksum VARCHAR(64) NOT NULL,\n    \
                executed_at TIMESTAMPTZ NOT NULL DEFAULT now(),\n    \
                execution_time_ms BIGINT NOT NULL,\n    \
                filename TEXT NOT NULL\n\
            )",
            self.qualified()
        )
    }

    /// SQL probing for the table; binds schema and table name
    pub fn exists_sql(&self) -> &'static str {
        "SELECT EXISTS (SELECT 1 FROM information_schema.tables WHERE table_schema = $1 AND table_name = $2)"
    }

    /// SQL to read version and checksum pairs
    pub fn select_checksums_sql(&self) -> String {
        format!("SELECT version, checksum FROM {} ORDER BY version", self.qualified())
    }

    /// SQL to read full ledger rows
    pub fn select_records_sql(&self) -> String {
        format!(
            "SELECT version, description, checksum, executed_at, execution_time_ms, filename \
             FROM {} ORDER BY version",
            self.qualified()
        )
    }

    /// SQL to append one ledger row
    pub fn insert_sql(&self) -> String {
        format!(
            "INSERT INTO {} (version, description, checksum, execution_time_ms, filename) \
             VALUES ($1, $2, $3, $4, $5)",
            self.qualified()
        )
    }
}

/// PostgreSQL ledger over a single connection
pub struct PgVersionStore {
    conn: PgConnection,
    ledger: LedgerTable,
}

impl PgVersionStore {
    pub fn new(conn: PgConnection, ledger: LedgerTable) -> Self {
        Self { conn, ledger }
    }

    /// Open a connection for `connection` and use the ledger named in `migrations`
    pub async fn connect(
        connection: &ConnectionConfig,
        migrations: &MigrationsConfig,
    ) -> MigrateResult<Self> {
        let conn = connection::connect(connection).await?;
        Ok(Self::new(conn, LedgerTable::from_config(migrations)))
    }

    /// Close the connection gracefully
    pub async fn close(self) -> MigrateResult<()> {
        self.conn
            .close()
            .await
            .map_err(|e| MigrateError::database("close the connection", e))
    }

    async fn insert_record(
        conn: &mut PgConnection,
        ledger: &LedgerTable,
        migration: &MigrationDefinition,
        execution_time_ms: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(&ledger.insert_sql())
            .bind(&migration.version)
            .bind(&migration.description)
            .bind(&migration.checksum)
            .bind(execution_time_ms)
            .bind(&migration.filename)
            .execute(conn)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl VersionStore for PgVersionStore {
    async fn ensure_ledger(&mut self) -> MigrateResult<()> {
        let sql = self.ledger.create_table_sql();
        self.conn.execute(sql.as_str()).await.map_err(|e| {
            MigrateError::database(format!("create ledger table {}", self.ledger.qualified()), e)
        })?;
        Ok(())
    }

    async fn ledger_exists(&mut self) -> MigrateResult<bool> {
        let row = sqlx::query(self.ledger.exists_sql())
            .bind(self.ledger.schema())
            .bind(self.ledger.table())
            .fetch_one(&mut self.conn)
            .await
            .map_err(|e| MigrateError::database("look up the ledger table", e))?;

        row.try_get::<bool, _>(0)
            .map_err(|e| MigrateError::database("look up the ledger table", e))
    }

    async fn fetch_all(&mut self) -> MigrateResult<BTreeMap<String, String>> {
        let rows = sqlx::query(&self.ledger.select_checksums_sql())
            .fetch_all(&mut self.conn)
            .await
            .map_err(|e| MigrateError::database("read the ledger", e))?;

        let mut applied = BTreeMap::new();
        for row in rows {
            let version: String = row
                .try_get("version")
                .map_err(|e| MigrateError::database("read ledger version", e))?;
            let checksum: String = row
                .try_get("checksum")
                .map_err(|e| MigrateError::database("read ledger checksum", e))?;
            applied.insert(version, checksum);
        }
        Ok(applied)
    }

    async fn fetch_records(&mut self) -> MigrateResult<Vec<SchemaVersionRecord>> {
        let rows = sqlx::query(&self.ledger.select_records_sql())
            .fetch_all(&mut self.conn)
            .await
            .map_err(|e| MigrateError::database("read the ledger", e))?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let read = |e| MigrateError::database("decode a ledger row", e);
            let executed_at: DateTime<Utc> = row.try_get("executed_at").map_err(read)?;
            records.push(SchemaVersionRecord {
                version: row.try_get("version").map_err(read)?,
                description: row.try_get("description").map_err(read)?,
                checksum: row.try_get("checksum").map_err(read)?,
                executed_at,
                execution_time_ms: row.try_get("execution_time_ms").map_err(read)?,
                filename: row.try_get("filename").map_err(read)?,
            });
        }
        Ok(records)
    }

    async fn apply(&mut self, migration: &MigrationDefinition) -> MigrateResult<i64> {
        let filename = migration.filename.as_str();
        let start = Instant::now();

        let mut tx = self
            .conn
            .begin()
            .await
            .map_err(|e| MigrateError::execution(filename, e))?;

        // Unprepared execution so multi-statement bodies run exactly as written
        if let Err(e) = (&mut *tx).execute(migration.sql.as_str()).await {
            rollback(tx, filename).await;
            return Err(MigrateError::execution(filename, e));
        }

        let elapsed = i64::try_from(start.elapsed().as_millis()).unwrap_or(i64::MAX);

        if let Err(e) = Self::insert_record(&mut tx, &self.ledger, migration, elapsed).await {
            rollback(tx, filename).await;
            return Err(MigrateError::execution(filename, e));
        }

        tx.commit()
            .await
            .map_err(|e| MigrateError::execution(filename, e))?;

        Ok(elapsed)
    }

    async fn record_all(&mut self, migrations: &[MigrationDefinition]) -> MigrateResult<()> {
        if migrations.is_empty() {
            return Ok(());
        }

        let mut tx = self
            .conn
            .begin()
            .await
            .map_err(|e| MigrateError::database("open the bootstrap transaction", e))?;

        for migration in migrations {
            if let Err(e) = Self::insert_record(&mut tx, &self.ledger, migration, 0).await {
                rollback(tx, &migration.filename).await;
                return Err(MigrateError::database(
                    format!("record {} in the ledger", migration.filename),
                    e,
                ));
            }
        }

        tx.commit()
            .await
            .map_err(|e| MigrateError::database("commit the bootstrap transaction", e))
    }
}

async fn rollback(tx: sqlx::Transaction<'_, sqlx::Postgres>, filename: &str) {
    if let Err(e) = tx.rollback().await {
        // Dropping the connection still aborts the transaction server-side
        tracing::warn!(file = %filename, error = %e, "Explicit rollback failed");
    }
}
