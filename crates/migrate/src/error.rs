//! Error types for the migration engine
//!
//! Every variant is fatal for the invocation that raised it. Lint findings are
//! not errors and live in `keel-lint`.

use std::path::PathBuf;

use keel_core::ConfigError;
use thiserror::Error;

/// Migrate result type alias
pub type MigrateResult<T> = Result<T, MigrateError>;

#[derive(Debug, Error)]
pub enum MigrateError {
    /// Missing or conflicting connection/migrations settings
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// Migration directory or file could not be read
    #[error("Failed to load migrations from {path}: {message}")]
    Load { path: PathBuf, message: String },

    /// Two files encode the same version
    #[error("Duplicate migration version {version}: {first} and {second}")]
    DuplicateVersion {
        version: String,
        first: String,
        second: String,
    },

    /// The recorded checksum no longer matches the file on disk
    #[error(
        "Checksum drift detected for {filename} (version {version}): recorded {recorded}, current {current}. \
         Applied migrations must not be edited; restore the file or add a new migration"
    )]
    ChecksumDrift {
        version: String,
        filename: String,
        recorded: String,
        current: String,
    },

    /// The migration body, its ledger insert, or the commit failed; the transaction was rolled back
    #[error("Migration {filename} failed and was rolled back: {source}")]
    Execution {
        filename: String,
        #[source]
        source: sqlx::Error,
    },

    /// Connection or ledger bookkeeping failed outside a migration body
    #[error("Database error while trying to {context}: {source}")]
    Database {
        context: String,
        #[source]
        source: sqlx::Error,
    },

    /// Scaffolding could not produce a file
    #[error("Scaffold error: {0}")]
    Scaffold(String),
}

impl MigrateError {
    pub(crate) fn load(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Load {
            path: path.into(),
            message: message.into(),
        }
    }

    pub(crate) fn database(context: impl Into<String>, source: sqlx::Error) -> Self {
        Self::Database {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn execution(filename: impl Into<String>, source: sqlx::Error) -> Self {
        Self::Execution {
            filename: filename.into(),
            source,
        }
    }

    /// True for errors raised before any database connection is opened
    pub fn is_pre_connection(&self) -> bool {
        matches!(
            self,
            MigrateError::Configuration(_)
                | MigrateError::Load { .. }
                | MigrateError::DuplicateVersion { .. }
        )
    }
}
