//! Lint error types
//!
//! Findings are data; these errors only cover reading the corpus.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LintError {
    #[error("Migrations directory {path} does not exist")]
    MissingDirectory { path: PathBuf },

    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not valid UTF-8")]
    Encoding { path: PathBuf },
}

impl LintError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
