//! Migration Definitions - Core types for the migration engine
//!
//! Defines the file-derived [`MigrationDefinition`], the ledger row
//! [`SchemaVersionRecord`], and the result types returned by the runner,
//! the status query and the bootstrap importer.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A migration file parsed from disk. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationDefinition {
    /// File name, e.g. `V20240101120000__create_users.sql`
    pub filename: String,
    /// 14-digit UTC timestamp taken from the file name
    pub version: String,
    /// Human-readable description derived from the file name
    pub description: String,
    /// Lowercase hex SHA-256 of the file bytes
    pub checksum: String,
    /// Raw SQL body, executed verbatim
    #[serde(skip)]
    pub sql: String,
}

impl MigrationDefinition {
    /// Render the SQL body with right-aligned line numbers for review
    pub fn numbered_sql(&self) -> String {
        let lines: Vec<&str> = self.sql.lines().collect();
        let width = lines.len().max(1).to_string().len();
        lines
            .iter()
            .enumerate()
            .map(|(i, line)| format!("{:>width$} | {}", i + 1, line, width = width))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// One row of the ledger table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaVersionRecord {
    pub version: String,
    pub description: String,
    pub checksum: String,
    pub executed_at: DateTime<Utc>,
    /// Zero for rows written by the bootstrap importer
    pub execution_time_ms: i64,
    pub filename: String,
}

/// Lifecycle of a single migration during a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationState {
    /// No ledger record yet
    Pending,
    /// Transaction open, body executing
    Applying,
    /// Committed and recorded
    Applied,
    /// Rolled back; the batch stops here
    Failed,
}

impl std::fmt::Display for MigrationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            MigrationState::Pending => "pending",
            MigrationState::Applying => "applying",
            MigrationState::Applied => "applied",
            MigrationState::Failed => "failed",
        };
        write!(f, "{}", label)
    }
}

/// Outcome for one migration touched by a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationOutcome {
    pub filename: String,
    pub version: String,
    pub state: MigrationState,
    pub execution_time_ms: i64,
}

/// Result of running (or checking) migrations
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    /// True when nothing was written
    pub dry_run: bool,
    /// Migrations applied in this run, in version order
    pub applied: Vec<MigrationOutcome>,
    /// Migrations still pending; populated by check mode
    #[serde(skip)]
    pub pending: Vec<MigrationDefinition>,
    /// Migrations already recorded with a matching checksum
    pub skipped_count: usize,
    /// Ledger rows with no file on disk
    pub orphaned: Vec<String>,
    /// Total wall-clock time in milliseconds
    pub execution_time_ms: u128,
}

impl RunReport {
    pub fn applied_count(&self) -> usize {
        self.applied.len()
    }

    /// Nothing applied and nothing left to apply
    pub fn is_noop(&self) -> bool {
        self.applied.is_empty() && self.pending.is_empty()
    }
}

/// Status of a file relative to the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MigrationStatus {
    Pending,
    Applied {
        executed_at: DateTime<Utc>,
        execution_time_ms: i64,
    },
    Drifted {
        recorded: String,
    },
}

/// One line of `status` output
#[derive(Debug, Clone, Serialize)]
pub struct StatusEntry {
    #[serde(flatten)]
    pub migration: MigrationDefinition,
    #[serde(flatten)]
    pub status: MigrationStatus,
}

/// Result of the status query
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusReport {
    /// False when the ledger table has not been created yet
    pub ledger_exists: bool,
    pub entries: Vec<StatusEntry>,
    pub orphaned: Vec<SchemaVersionRecord>,
}

impl StatusReport {
    pub fn pending_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.status == MigrationStatus::Pending)
            .count()
    }

    pub fn drifted_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.status, MigrationStatus::Drifted { .. }))
            .count()
    }
}

/// Result of the bootstrap importer
#[derive(Debug, Clone, Default, Serialize)]
pub struct BootstrapReport {
    /// Files newly recorded as applied
    pub recorded: Vec<String>,
    /// Files already present in the ledger
    pub skipped_count: usize,
    /// Present records whose checksum no longer matches the file
    pub mismatched: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numbered_sql_alignment() {
        let migration = MigrationDefinition {
            filename: "V20240101120000__seed.sql".to_string(),
            version: "20240101120000".to_string(),
            description: "seed".to_string(),
            checksum: String::new(),
            sql: (1..=10)
                .map(|i| format!("SELECT {};", i))
                .collect::<Vec<_>>()
                .join("\n"),
        };

        let rendered = migration.numbered_sql();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 10);
        assert_eq!(lines[0], " 1 | SELECT 1;");
        assert_eq!(lines[9], "10 | SELECT 10;");
    }

    #[test]
    fn test_state_display() {
        assert_eq!(MigrationState::Applying.to_string(), "applying");
        assert_eq!(MigrationState::Failed.to_string(), "failed");
    }
}
