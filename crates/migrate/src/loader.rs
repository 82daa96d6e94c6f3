//! Migration Loader - reads migration files into definitions
//!
//! File names follow `V<14-digit UTC timestamp>__<lowercase_snake_description>.sql`.
//! Loading is pure file I/O and always happens before a database connection
//! is opened, so a broken corpus never reaches the server.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};

use crate::definitions::MigrationDefinition;
use crate::error::{MigrateError, MigrateResult};

/// Format of the version stamp embedded in file names
pub const VERSION_FORMAT: &str = "%Y%m%d%H%M%S";

static FILENAME_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^V(?P<version>\d{14})__(?P<slug>[a-z0-9]+(?:_[a-z0-9]+)*)\.sql$")
        .expect("valid migration filename pattern")
});

/// Parsed pieces of a migration file name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFilename {
    pub version: String,
    pub slug: String,
}

impl MigrationFilename {
    /// Parse a file name, returning `None` when it does not follow the grammar
    pub fn parse(filename: &str) -> Option<Self> {
        let captures = FILENAME_PATTERN.captures(filename)?;
        let version = captures["version"].to_string();
        NaiveDateTime::parse_from_str(&version, VERSION_FORMAT).ok()?;
        Some(Self {
            version,
            slug: captures["slug"].to_string(),
        })
    }

    pub fn description(&self) -> String {
        self.slug.replace('_', " ")
    }

    pub fn to_filename(&self) -> String {
        format!("V{}__{}.sql", self.version, self.slug)
    }
}

/// Lowercase hex SHA-256 of `content`
pub fn checksum(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

/// Loads migration definitions from a directory
#[derive(Debug, Clone)]
pub struct MigrationLoader {
    dir: PathBuf,
}

impl MigrationLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Load every well-formed migration, sorted by file name.
    ///
    /// Misnamed `.sql` files are skipped with a warning. Two files sharing a
    /// version fail the whole load.
    pub fn load(&self) -> MigrateResult<Vec<MigrationDefinition>> {
        let mut migrations = Vec::new();

        for path in self.sql_files()? {
            let filename = file_name(&path)?;
            let Some(parsed) = MigrationFilename::parse(&filename) else {
                tracing::warn!(
                    file = %filename,
                    "Skipping .sql file that does not match V<14-digit timestamp>__<snake_case>.sql"
                );
                continue;
            };
            migrations.push(self.read_definition(&path, filename, parsed)?);
        }

        migrations.sort_by(|a, b| a.filename.cmp(&b.filename));
        check_unique_versions(&migrations)?;

        tracing::debug!(
            dir = %self.dir.display(),
            count = migrations.len(),
            "Loaded migrations"
        );
        Ok(migrations)
    }

    /// Locate the migration carrying `version`
    pub fn find_by_version(&self, version: &str) -> MigrateResult<Option<MigrationDefinition>> {
        Ok(self.load()?.into_iter().find(|m| m.version == version))
    }

    /// All `.sql` files in the directory, sorted by name; misnamed ones included
    pub fn sql_files(&self) -> MigrateResult<Vec<PathBuf>> {
        if !self.dir.is_dir() {
            return Err(MigrateError::load(
                &self.dir,
                "migrations directory does not exist",
            ));
        }

        let entries = fs::read_dir(&self.dir)
            .map_err(|e| MigrateError::load(&self.dir, format!("failed to read directory: {}", e)))?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| {
                MigrateError::load(&self.dir, format!("failed to read directory entry: {}", e))
            })?;
            let path = entry.path();
            if path.is_file() && path.extension().map_or(false, |ext| ext == "sql") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    fn read_definition(
        &self,
        path: &Path,
        filename: String,
        parsed: MigrationFilename,
    ) -> MigrateResult<MigrationDefinition> {
        let bytes = fs::read(path)
            .map_err(|e| MigrateError::load(path, format!("failed to read file: {}", e)))?;
        let checksum = checksum(&bytes);
        let sql = String::from_utf8(bytes)
            .map_err(|_| MigrateError::load(path, "file is not valid UTF-8"))?;

        Ok(MigrationDefinition {
            filename,
            description: parsed.description(),
            version: parsed.version,
            checksum,
            sql,
        })
    }
}

fn file_name(path: &Path) -> MigrateResult<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| MigrateError::load(path, "file name is not valid UTF-8"))
}

fn check_unique_versions(migrations: &[MigrationDefinition]) -> MigrateResult<()> {
    let mut seen: HashMap<&str, &str> = HashMap::new();
    for migration in migrations {
        if let Some(first) = seen.insert(&migration.version, &migration.filename) {
            return Err(MigrateError::DuplicateVersion {
                version: migration.version.clone(),
                first: first.to_string(),
                second: migration.filename.clone(),
            });
        }
    }
    Ok(())
}
