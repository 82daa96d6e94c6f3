//! Linter - runs the rule set over files and directories

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::LintError;
use crate::finding::{FileReport, Finding, LintReport, Severity};
use crate::rules::{default_rules, Rule};
use crate::scanner::scan;

static MIGRATION_FILENAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^V(\d{14})__[a-z0-9]+(?:_[a-z0-9]+)*\.sql$").expect("valid filename pattern")
});

/// Whether the runner would pick the file up: grammar and a real UTC timestamp
fn is_migration_filename(name: &str) -> bool {
    MIGRATION_FILENAME
        .captures(name)
        .map(|caps| NaiveDateTime::parse_from_str(&caps[1], "%Y%m%d%H%M%S").is_ok())
        .unwrap_or(false)
}

pub struct Linter {
    rules: Vec<Box<dyn Rule>>,
}

impl Default for Linter {
    fn default() -> Self {
        Self::new(default_rules())
    }
}

impl Linter {
    pub fn new(rules: Vec<Box<dyn Rule>>) -> Self {
        Self { rules }
    }

    /// Findings for one file's content, ordered by line then severity
    pub fn lint_source(&self, sql: &str) -> Vec<Finding> {
        let scanned = scan(sql);
        let mut findings: Vec<Finding> = self
            .rules
            .iter()
            .flat_map(|rule| rule.check(&scanned))
            .collect();
        findings.sort_by(|a, b| a.line.cmp(&b.line).then(b.severity.cmp(&a.severity)));
        findings
    }

    pub fn lint_file(&self, path: &Path) -> Result<FileReport, LintError> {
        let bytes = fs::read(path).map_err(|e| LintError::io(path, e))?;
        let sql = String::from_utf8(bytes).map_err(|_| LintError::Encoding {
            path: path.to_path_buf(),
        })?;

        let mut findings = Vec::new();
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        if !is_migration_filename(name) {
            findings.push(
                Finding::new(
                    "filename",
                    Severity::Warning,
                    0,
                    format!("{} does not match V<YYYYMMDDHHMMSS>__<snake_case>.sql with a valid UTC timestamp and is ignored by the runner", name),
                )
                .with_suggestion("Rename the file, e.g. with `keel create <description>`"),
            );
        }
        findings.extend(self.lint_source(&sql));

        tracing::debug!(file = %path.display(), findings = findings.len(), "Linted file");
        Ok(FileReport {
            path: path.to_path_buf(),
            findings,
        })
    }

    /// Lint every `.sql` file directly inside `dir`, in file-name order
    pub fn lint_dir(&self, dir: &Path) -> Result<LintReport, LintError> {
        if !dir.is_dir() {
            return Err(LintError::MissingDirectory {
                path: dir.to_path_buf(),
            });
        }

        let mut paths: Vec<PathBuf> = Vec::new();
        for entry in fs::read_dir(dir).map_err(|e| LintError::io(dir, e))? {
            let path = entry.map_err(|e| LintError::io(dir, e))?.path();
            if path.is_file() && path.extension().map(|ext| ext == "sql").unwrap_or(false) {
                paths.push(path);
            }
        }
        paths.sort();

        let files = paths
            .iter()
            .map(|path| self.lint_file(path))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(LintReport { files })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_begin_is_reported_with_line_and_suggestion() {
        let findings = Linter::default().lint_source(
            "-- Adds the tags table\nBEGIN;\nCREATE TABLE IF NOT EXISTS tags (id int);\n",
        );

        assert_eq!(findings.len(), 1);
        let finding = &findings[0];
        assert_eq!(finding.rule, "transaction-control");
        assert_eq!(finding.severity, Severity::Error);
        assert_eq!(finding.line, 2);
        assert!(finding.message.contains("`BEGIN`"));
        assert!(finding.message.contains("line 2"));
        assert!(finding.suggestion.as_deref().unwrap_or_default().starts_with("Remove"));
    }

    #[test]
    fn test_begin_inside_do_block_is_clean() {
        let findings = Linter::default().lint_source(
            "-- Backfill owners\nDO $$\nBEGIN\n  UPDATE cards SET owner = 1 WHERE owner IS NULL;\nEND\n$$;\n",
        );
        assert!(findings.is_empty(), "{:?}", findings);
    }

    #[test]
    fn test_plain_index_build_is_informational() {
        let findings = Linter::default().lint_source(
            "-- Index cards by deck\nCREATE INDEX IF NOT EXISTS cards_deck_idx ON cards (deck_id);\n",
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].rule, "index-without-concurrently");
        assert_eq!(findings[0].severity, Severity::Info);
        assert_eq!(findings[0].line, 2);
    }

    #[test]
    fn test_findings_are_ordered() {
        let findings = Linter::default().lint_source("CREATE TABLE t (id int);\nDROP TABLE t;\nCOMMIT;");
        let summary: Vec<_> = findings.iter().map(|f| (f.line, f.rule)).collect();
        assert_eq!(
            summary,
            vec![
                (0, "missing-description"),
                (1, "non-idempotent-create"),
                (2, "unguarded-drop"),
                (3, "transaction-control"),
            ]
        );
    }

    #[test]
    fn test_lint_dir() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("V20240101000000__create_tags.sql"),
            "-- Tags\nCREATE TABLE IF NOT EXISTS tags (id int);\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("V20240102000000__seed.sql"),
            "-- Seed rows\nBEGIN;\nINSERT INTO tags VALUES (1);\nCOMMIT;\n",
        )
        .unwrap();
        fs::write(dir.path().join("fixup.sql"), "-- Manual fix\nSELECT 1;\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "BEGIN;").unwrap();

        let report = Linter::default().lint_dir(dir.path()).unwrap();
        let names: Vec<_> = report
            .files
            .iter()
            .map(|f| f.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "V20240101000000__create_tags.sql",
                "V20240102000000__seed.sql",
                "fixup.sql"
            ]
        );

        assert!(report.files[0].findings.is_empty());
        assert_eq!(report.files[1].count(Severity::Error), 2);
        assert_eq!(report.files[2].findings[0].rule, "filename");
        assert!(report.has_errors());
    }

    #[test]
    fn test_impossible_timestamp_is_misnamed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("V20241315093000__bad_month.sql");
        fs::write(&path, "-- Month 13\nSELECT 1;\n").unwrap();

        let report = Linter::default().lint_file(&path).unwrap();
        assert_eq!(report.findings.len(), 1);
        assert_eq!(report.findings[0].rule, "filename");
        assert_eq!(report.findings[0].severity, Severity::Warning);

        assert!(is_migration_filename("V20240229235959__leap_day.sql"));
        assert!(!is_migration_filename("V20230229000000__not_leap.sql"));
        assert!(!is_migration_filename("V20240101250000__bad_hour.sql"));
    }

    #[test]
    fn test_lint_dir_missing() {
        let dir = TempDir::new().unwrap();
        let err = Linter::default().lint_dir(&dir.path().join("absent")).unwrap_err();
        assert!(matches!(err, LintError::MissingDirectory { .. }));
    }

    #[test]
    fn test_non_utf8_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("V20240101000000__bad.sql"), [0xff, 0xfe, 0x00]).unwrap();
        let err = Linter::default().lint_dir(dir.path()).unwrap_err();
        assert!(matches!(err, LintError::Encoding { .. }));
    }
}
