//! # keel-lint: static checks for migration files
//!
//! Reads migration files without touching a database and reports patterns
//! that break under keel's one-transaction-per-file model or fail on re-run.
//! Findings are plain data; only error-severity findings should fail a run.

pub mod error;
pub mod finding;
pub mod linter;
pub mod rules;
pub mod scanner;

pub use error::LintError;
pub use finding::{FileReport, Finding, LintReport, Severity};
pub use linter::Linter;
pub use rules::{default_rules, Rule};
pub use scanner::{scan, ScannedSql, Statement};
