//! # keel-migrate: versioned SQL migrations for PostgreSQL
//!
//! Loads `V<YYYYMMDDHHMMSS>__<slug>.sql` files from a directory, compares them
//! with the schema version ledger and applies pending files in version order,
//! one transaction per file. Already-applied files are protected by a SHA-256
//! checksum; editing one is reported as drift and nothing runs.
//!
//! Also provides the bootstrap importer for databases that were migrated
//! before the ledger existed, a status query, and file scaffolding.

pub mod bootstrap;
pub mod connection;
pub mod definitions;
pub mod error;
pub mod loader;
pub mod runner;
pub mod scaffold;
pub mod status;
pub mod store;

#[cfg(test)]
mod testing;

pub use bootstrap::{bootstrap, import, BootstrapOptions};
pub use definitions::{
    BootstrapReport, MigrationDefinition, MigrationOutcome, MigrationState, MigrationStatus,
    RunReport, SchemaVersionRecord, StatusEntry, StatusReport,
};
pub use error::{MigrateError, MigrateResult};
pub use loader::{checksum, MigrationFilename, MigrationLoader};
pub use runner::{plan, run, MigrationPlan, MigrationRunner, RunOptions};
pub use scaffold::{create_migration, create_revert, slugify};
pub use status::{collect, status};
pub use store::{LedgerTable, PgVersionStore, VersionStore};
