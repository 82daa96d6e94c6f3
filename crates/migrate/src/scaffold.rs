//! Scaffolding generators for new and revert migration files
//!
//! Generated files only ever contain comments; reverse SQL is suggested but
//! never written as executable statements, because deletes and updates are
//! not mechanically invertible.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use keel_lint::scan;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{MigrateError, MigrateResult};
use crate::loader::{MigrationFilename, MigrationLoader, VERSION_FORMAT};

const MAX_SLUG_LEN: usize = 80;

const IDENT: &str = r#"((?:"[^"]+"|[A-Za-z_][A-Za-z0-9_$]*)(?:\.(?:"[^"]+"|[A-Za-z_][A-Za-z0-9_$]*))?)"#;

static ALTER_TABLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?is)^\s*ALTER\s+TABLE\s+(?:IF\s+EXISTS\s+)?(?:ONLY\s+)?{}",
        IDENT
    ))
    .expect("valid alter table pattern")
});

static ADD_COLUMN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?is)\bADD\s+COLUMN\s+(?:IF\s+NOT\s+EXISTS\s+)?{}",
        IDENT
    ))
    .expect("valid add column pattern")
});

static ADD_CONSTRAINT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?is)\bADD\s+CONSTRAINT\s+{}", IDENT))
        .expect("valid add constraint pattern")
});

static CREATE_TABLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?is)^\s*CREATE\s+(?:UNLOGGED\s+)?TABLE\s+(?:IF\s+NOT\s+EXISTS\s+)?{}",
        IDENT
    ))
    .expect("valid create table pattern")
});

static CREATE_INDEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?is)^\s*CREATE\s+(?:UNIQUE\s+)?INDEX\s+(?:CONCURRENTLY\s+)?(?:IF\s+NOT\s+EXISTS\s+)?{}",
        IDENT
    ))
    .expect("valid create index pattern")
});

static CREATE_POLICY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?is)^\s*CREATE\s+POLICY\s+{}\s+ON\s+{}",
        IDENT, IDENT
    ))
    .expect("valid create policy pattern")
});

static CREATE_FUNCTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?is)^\s*CREATE\s+(?:OR\s+REPLACE\s+)?FUNCTION\s+{}",
        IDENT
    ))
    .expect("valid create function pattern")
});

static DATA_CHANGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)^\s*(?:WITH\b.*?\b)?(INSERT|UPDATE|DELETE)\b").expect("valid data change pattern")
});

/// Turn free text into a file-name slug: lowercase ASCII words joined by `_`
pub fn slugify(description: &str) -> MigrateResult<String> {
    let mut slug = String::with_capacity(description.len());
    for c in description.trim().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }

    let mut slug = slug.trim_matches('_').to_string();
    if slug.len() > MAX_SLUG_LEN {
        slug.truncate(MAX_SLUG_LEN);
        slug = slug.trim_end_matches('_').to_string();
    }

    if slug.is_empty() {
        return Err(MigrateError::Scaffold(format!(
            "description '{}' contains no letters or digits",
            description
        )));
    }
    Ok(slug)
}

/// 14-digit version stamp for `now`
pub fn version_stamp(now: DateTime<Utc>) -> String {
    now.format(VERSION_FORMAT).to_string()
}

/// Write a new, commented migration template. Refuses to overwrite.
pub fn create_migration(dir: &Path, description: &str, now: DateTime<Utc>) -> MigrateResult<PathBuf> {
    let name = MigrationFilename {
        version: version_stamp(now),
        slug: slugify(description)?,
    };

    let template = format!(
        "-- Migration: {description}\n\
         -- Version: {version}\n\
         -- Created: {created}\n\
         --\n\
         -- Describe what this migration changes and why.\n\
         -- The whole file runs inside one transaction: do not add BEGIN/COMMIT.\n\
         -- Prefer idempotent DDL (IF NOT EXISTS / IF EXISTS) so a re-run is safe.\n\
         -- Never edit this file after it has been applied; add a new migration instead.\n\n",
        description = description.trim(),
        version = name.version,
        created = now.format("%Y-%m-%d %H:%M:%S UTC"),
    );

    let path = dir.join(name.to_filename());
    write_new(dir, &path, &template)?;
    tracing::info!(file = %path.display(), "Created migration");
    Ok(path)
}

/// Write a forward-dated revert template for the migration at `version`
pub fn create_revert(dir: &Path, version: &str, now: DateTime<Utc>) -> MigrateResult<PathBuf> {
    let original = MigrationLoader::new(dir)
        .find_by_version(version)?
        .ok_or_else(|| {
            MigrateError::Scaffold(format!(
                "no migration with version {} in {}",
                version,
                dir.display()
            ))
        })?;

    let new_version = version_stamp(now);
    if new_version.as_str() <= original.version.as_str() {
        return Err(MigrateError::Scaffold(format!(
            "revert version {} would not sort after {}; check the system clock",
            new_version, original.version
        )));
    }

    let original_name = MigrationFilename::parse(&original.filename).ok_or_else(|| {
        MigrateError::Scaffold(format!("cannot parse file name {}", original.filename))
    })?;
    let mut slug = format!("revert_{}", original_name.slug);
    if slug.len() > MAX_SLUG_LEN {
        slug.truncate(MAX_SLUG_LEN);
        slug = slug.trim_end_matches('_').to_string();
    }
    let name = MigrationFilename {
        version: new_version,
        slug,
    };

    let content = render_revert(
        &original.filename,
        &original.sql,
        &name.version,
        now,
    );

    let path = dir.join(name.to_filename());
    write_new(dir, &path, &content)?;
    tracing::info!(file = %path.display(), reverts = %original.filename, "Created revert template");
    Ok(path)
}

fn render_revert(original_filename: &str, original_sql: &str, version: &str, now: DateTime<Utc>) -> String {
    let mut out = String::new();
    out.push_str(&format!("-- Revert of: {}\n", original_filename));
    out.push_str(&format!("-- Version: {}\n", version));
    out.push_str(&format!("-- Created: {}\n", now.format("%Y-%m-%d %H:%M:%S UTC")));
    out.push_str("--\n-- Original summary:\n");

    let summary = leading_comment_block(original_sql);
    if summary.is_empty() {
        out.push_str("--   (the original file has no leading comment)\n");
    } else {
        for line in summary {
            out.push_str(&format!("--   {}\n", line));
        }
    }

    out.push_str(
        "--\n\
         -- Rollback checklist:\n\
         --   [ ] Confirm the original migration is applied in the target environment (keel status)\n\
         --   [ ] Reverse its statements in reverse order\n\
         --   [ ] INSERT/UPDATE/DELETE are not mechanically invertible: restore from backup or write compensating statements\n\
         --   [ ] Keep every statement guarded (IF EXISTS) so the revert can be re-run\n\
         --   [ ] Do not add BEGIN/COMMIT; the file already runs in one transaction\n\
         --   [ ] Run keel lint and keel run --check before applying\n\
         --\n",
    );

    let hints = reversal_hints(original_sql);
    if hints.is_empty() {
        out.push_str("-- No reversible statements were recognised in the original file.\n");
    } else {
        out.push_str("-- Suggested reversal (review, then uncomment):\n");
        for hint in hints {
            out.push_str(&format!("-- {}\n", hint));
        }
    }

    out.push_str(
        "--\n\
         -- Common idioms:\n\
         --   ADD COLUMN c           ->  DROP COLUMN IF EXISTS c\n\
         --   ADD CONSTRAINT k       ->  DROP CONSTRAINT IF EXISTS k\n\
         --   CREATE TABLE t         ->  DROP TABLE IF EXISTS t\n\
         --   CREATE INDEX i         ->  DROP INDEX IF EXISTS i\n\
         --   CREATE POLICY p ON t   ->  DROP POLICY IF EXISTS p ON t\n\
         --   CREATE FUNCTION f      ->  DROP FUNCTION IF EXISTS f(<argument types>)\n\n",
    );
    out
}

/// Comment lines at the top of a file, without their `--` markers
fn leading_comment_block(sql: &str) -> Vec<String> {
    sql.lines()
        .map(str::trim)
        .skip_while(|line| line.is_empty())
        .take_while(|line| line.starts_with("--"))
        .map(|line| line.trim_start_matches('-').trim().to_string())
        .filter(|line| !line.is_empty())
        .collect()
}

/// Suggested reverse statements, newest first
fn reversal_hints(sql: &str) -> Vec<String> {
    let scanned = scan(sql);

    let mut hints = Vec::new();
    for statement in scanned.statements.iter().map(|s| s.text.as_str()) {
        let mut statement_hints = Vec::new();

        if let Some(table) = ALTER_TABLE.captures(statement).map(|c| c[1].to_string()) {
            for column in ADD_COLUMN.captures_iter(statement) {
                statement_hints.push(format!(
                    "ALTER TABLE {} DROP COLUMN IF EXISTS {};",
                    table, &column[1]
                ));
            }
            for constraint in ADD_CONSTRAINT.captures_iter(statement) {
                statement_hints.push(format!(
                    "ALTER TABLE {} DROP CONSTRAINT IF EXISTS {};",
                    table, &constraint[1]
                ));
            }
        } else if let Some(c) = CREATE_TABLE.captures(statement) {
            statement_hints.push(format!("DROP TABLE IF EXISTS {};", &c[1]));
        } else if let Some(c) = CREATE_INDEX.captures(statement) {
            statement_hints.push(format!("DROP INDEX IF EXISTS {};", &c[1]));
        } else if let Some(c) = CREATE_POLICY.captures(statement) {
            statement_hints.push(format!("DROP POLICY IF EXISTS {} ON {};", &c[1], &c[2]));
        } else if let Some(c) = CREATE_FUNCTION.captures(statement) {
            statement_hints.push(format!("DROP FUNCTION IF EXISTS {}(<argument types>);", &c[1]));
        } else if let Some(c) = DATA_CHANGE.captures(statement) {
            statement_hints.push(format!(
                "{} detected: not invertible, restore affected rows manually",
                c[1].to_uppercase()
            ));
        }

        // Later statements are undone first
        statement_hints.reverse();
        hints.push(statement_hints);
    }

    hints.into_iter().rev().flatten().collect()
}

fn write_new(dir: &Path, path: &Path, content: &str) -> MigrateResult<()> {
    std::fs::create_dir_all(dir).map_err(|e| {
        MigrateError::Scaffold(format!("failed to create {}: {}", dir.display(), e))
    })?;

    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::AlreadyExists {
                MigrateError::Scaffold(format!("{} already exists; refusing to overwrite", path.display()))
            } else {
                MigrateError::Scaffold(format!("failed to create {}: {}", path.display(), e))
            }
        })?;

    file.write_all(content.as_bytes())
        .map_err(|e| MigrateError::Scaffold(format!("failed to write {}: {}", path.display(), e)))
}
