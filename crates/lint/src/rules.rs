//! Lint rules
//!
//! Every rule sees the scanned file: statements with comments, literals and
//! dollar-quoted bodies already masked, plus the extracted comments.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::finding::{Finding, Severity};
use crate::scanner::{ScannedSql, Statement};

/// A check over one scanned file
pub trait Rule: Send + Sync {
    /// Stable identifier reported with every finding
    fn id(&self) -> &'static str;

    fn severity(&self) -> Severity;

    fn check(&self, sql: &ScannedSql) -> Vec<Finding>;

    fn finding(&self, line: usize, message: String) -> Finding {
        Finding::new(self.id(), self.severity(), line, message)
    }
}

/// The built-in rule set
pub fn default_rules() -> Vec<Box<dyn Rule>> {
    vec![
        Box::new(TransactionControl),
        Box::new(NonTransactional),
        Box::new(UnguardedDrop),
        Box::new(NonIdempotentCreate),
        Box::new(IndexWithoutConcurrently),
        Box::new(PolicyWithoutDrop),
        Box::new(MissingDescription),
    ]
}

const IDENT: &str = r#"(?:"(?:[^"]|"")+"|[A-Za-z_][A-Za-z0-9_$]*)"#;

fn pattern(source: &str) -> Regex {
    Regex::new(&source.replace("{ident}", IDENT)).expect("valid lint pattern")
}

static TRANSACTION_CONTROL: Lazy<Regex> = Lazy::new(|| {
    pattern(r"(?is)^(?:BEGIN|START\s+TRANSACTION|COMMIT|END|ROLLBACK|ABORT|SAVEPOINT|RELEASE)\b")
});
static BEGIN_ATOMIC: Lazy<Regex> = Lazy::new(|| pattern(r"(?is)\bBEGIN\s+ATOMIC\b"));
static END: Lazy<Regex> = Lazy::new(|| pattern(r"(?is)^END\b"));

static NON_TRANSACTIONAL: Lazy<Regex> = Lazy::new(|| {
    pattern(
        r"(?is)^(?:CREATE\s+(?:UNIQUE\s+)?INDEX\s+CONCURRENTLY|DROP\s+INDEX\s+CONCURRENTLY|REINDEX\b.*\bCONCURRENTLY|VACUUM|(?:CREATE|DROP)\s+(?:DATABASE|TABLESPACE)|ALTER\s+SYSTEM)\b",
    )
});
static CREATE_INDEX_LOCKING: Lazy<Regex> =
    Lazy::new(|| pattern(r"(?is)^CREATE\s+(?:UNIQUE\s+)?INDEX\b"));
static CONCURRENTLY: Lazy<Regex> = Lazy::new(|| pattern(r"(?i)\bCONCURRENTLY\b"));

static ALTER_TABLE: Lazy<Regex> = Lazy::new(|| pattern(r"(?is)^ALTER\s+TABLE\b"));
static DROP_TABLE: Lazy<Regex> = Lazy::new(|| pattern(r"(?is)^DROP\s+TABLE\s+(IF\s+EXISTS\b)?"));
static DROP_COLUMN: Lazy<Regex> = Lazy::new(|| pattern(r"(?is)\bDROP\s+COLUMN\s+(IF\s+EXISTS\b)?"));
static TRUNCATE: Lazy<Regex> = Lazy::new(|| pattern(r"(?is)^TRUNCATE\b"));

static CREATE_TABLE: Lazy<Regex> = Lazy::new(|| {
    pattern(
        r"(?is)^CREATE\s+(?:(?:GLOBAL|LOCAL)\s+)?(?:(?:TEMP|TEMPORARY|UNLOGGED)\s+)?TABLE\s+(IF\s+NOT\s+EXISTS\b)?",
    )
});
static CREATE_INDEX: Lazy<Regex> = Lazy::new(|| {
    pattern(r"(?is)^CREATE\s+(?:UNIQUE\s+)?INDEX\s+(?:CONCURRENTLY\s+)?(IF\s+NOT\s+EXISTS\b)?")
});
static ADD_COLUMN: Lazy<Regex> = Lazy::new(|| pattern(r"(?is)\bADD\s+COLUMN\s+(IF\s+NOT\s+EXISTS\b)?"));

static CREATE_POLICY: Lazy<Regex> = Lazy::new(|| {
    pattern(r"(?is)^CREATE\s+POLICY\s+({ident})\s+ON\s+({ident}(?:\s*\.\s*{ident})?)")
});
static DROP_POLICY: Lazy<Regex> = Lazy::new(|| {
    pattern(r"(?is)^DROP\s+POLICY\s+(?:IF\s+EXISTS\s+)?({ident})\s+ON\s+({ident}(?:\s*\.\s*{ident})?)")
});

/// Line of byte `offset` within a statement
fn line_at(statement: &Statement, offset: usize) -> usize {
    statement.line + statement.text[..offset].matches('\n').count()
}

/// Case-fold unquoted parts and drop quotes and whitespace
fn normalize_ident(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut quoted = false;
    for c in raw.chars() {
        match c {
            '"' => quoted = !quoted,
            c if quoted => out.push(c),
            c if c.is_whitespace() => {}
            c => out.extend(c.to_lowercase()),
        }
    }
    out
}

/// `BEGIN`, `COMMIT` and friends at the top level of a file
pub struct TransactionControl;

impl Rule for TransactionControl {
    fn id(&self) -> &'static str {
        "transaction-control"
    }

    fn severity(&self) -> Severity {
        Severity::Error
    }

    fn check(&self, sql: &ScannedSql) -> Vec<Finding> {
        let mut findings = Vec::new();
        // SQL-standard function bodies end with a bare END
        let mut in_atomic_body = false;

        for statement in &sql.statements {
            if in_atomic_body {
                if END.is_match(&statement.text) {
                    in_atomic_body = false;
                }
                continue;
            }
            if BEGIN_ATOMIC.is_match(&statement.text) {
                in_atomic_body = true;
                continue;
            }

            if TRANSACTION_CONTROL.is_match(&statement.text) {
                let summary = statement.summary();
                findings.push(
                    self.finding(
                        statement.line,
                        format!(
                            "Transaction control statement `{}` at line {}: each migration already runs in its own transaction",
                            summary, statement.line
                        ),
                    )
                    .with_suggestion(format!("Remove `{}` from the file", summary)),
                );
            }
        }
        findings
    }
}

/// Statements PostgreSQL refuses inside a transaction block
pub struct NonTransactional;

impl Rule for NonTransactional {
    fn id(&self) -> &'static str {
        "non-transactional"
    }

    fn severity(&self) -> Severity {
        Severity::Error
    }

    fn check(&self, sql: &ScannedSql) -> Vec<Finding> {
        sql.statements
            .iter()
            .filter(|statement| NON_TRANSACTIONAL.is_match(&statement.text))
            .map(|statement| {
                let suggestion = if CONCURRENTLY.is_match(&statement.text) {
                    "Drop CONCURRENTLY (the index build then blocks writes) or run the statement manually outside keel"
                } else {
                    "Run the statement manually outside keel"
                };
                self.finding(
                    statement.line,
                    format!(
                        "`{}` at line {} cannot run inside a transaction block",
                        statement.summary(),
                        statement.line
                    ),
                )
                .with_suggestion(suggestion)
            })
            .collect()
    }
}

/// Destructive statements that fail or lose data on re-run
pub struct UnguardedDrop;

impl Rule for UnguardedDrop {
    fn id(&self) -> &'static str {
        "unguarded-drop"
    }

    fn severity(&self) -> Severity {
        Severity::Warning
    }

    fn check(&self, sql: &ScannedSql) -> Vec<Finding> {
        let mut findings = Vec::new();

        for statement in &sql.statements {
            let text = &statement.text;

            if let Some(caps) = DROP_TABLE.captures(text) {
                if caps.get(1).is_none() {
                    findings.push(
                        self.finding(
                            statement.line,
                            format!("`{}` has no IF EXISTS guard", statement.summary()),
                        )
                        .with_suggestion("Use DROP TABLE IF EXISTS"),
                    );
                }
            } else if ALTER_TABLE.is_match(text) {
                for caps in DROP_COLUMN.captures_iter(text) {
                    if caps.get(1).is_none() {
                        let start = caps.get(0).map(|m| m.start()).unwrap_or(0);
                        findings.push(
                            self.finding(
                                line_at(statement, start),
                                "DROP COLUMN has no IF EXISTS guard".to_string(),
                            )
                            .with_suggestion("Use DROP COLUMN IF EXISTS"),
                        );
                    }
                }
            } else if TRUNCATE.is_match(text) {
                findings.push(
                    self.finding(
                        statement.line,
                        format!("`{}` removes every row of the table", statement.summary()),
                    )
                    .with_suggestion("Confirm the data loss is intended and a backup exists"),
                );
            }
        }
        findings
    }
}

/// Creation statements that fail when re-run
pub struct NonIdempotentCreate;

impl Rule for NonIdempotentCreate {
    fn id(&self) -> &'static str {
        "non-idempotent-create"
    }

    fn severity(&self) -> Severity {
        Severity::Warning
    }

    fn check(&self, sql: &ScannedSql) -> Vec<Finding> {
        let mut findings = Vec::new();

        for statement in &sql.statements {
            let text = &statement.text;

            if let Some(caps) = CREATE_TABLE.captures(text) {
                if caps.get(1).is_none() {
                    findings.push(
                        self.finding(
                            statement.line,
                            format!("`{}` has no IF NOT EXISTS guard", statement.summary()),
                        )
                        .with_suggestion("Use CREATE TABLE IF NOT EXISTS"),
                    );
                }
            } else if let Some(caps) = CREATE_INDEX.captures(text) {
                if caps.get(1).is_none() {
                    findings.push(
                        self.finding(
                            statement.line,
                            format!("`{}` has no IF NOT EXISTS guard", statement.summary()),
                        )
                        .with_suggestion("Use CREATE INDEX IF NOT EXISTS with an explicit index name"),
                    );
                }
            } else if ALTER_TABLE.is_match(text) {
                for caps in ADD_COLUMN.captures_iter(text) {
                    if caps.get(1).is_none() {
                        let start = caps.get(0).map(|m| m.start()).unwrap_or(0);
                        findings.push(
                            self.finding(
                                line_at(statement, start),
                                "ADD COLUMN has no IF NOT EXISTS guard".to_string(),
                            )
                            .with_suggestion("Use ADD COLUMN IF NOT EXISTS"),
                        );
                    }
                }
            }
        }
        findings
    }
}

/// Index builds that take a write-blocking lock on the table
pub struct IndexWithoutConcurrently;

impl Rule for IndexWithoutConcurrently {
    fn id(&self) -> &'static str {
        "index-without-concurrently"
    }

    fn severity(&self) -> Severity {
        Severity::Info
    }

    fn check(&self, sql: &ScannedSql) -> Vec<Finding> {
        sql.statements
            .iter()
            .filter(|statement| {
                CREATE_INDEX_LOCKING.is_match(&statement.text) && !CONCURRENTLY.is_match(&statement.text)
            })
            .map(|statement| {
                self.finding(
                    statement.line,
                    format!(
                        "`{}` blocks writes to the table while the index builds; expect lock contention on large tables",
                        statement.summary()
                    ),
                )
                .with_suggestion(
                    "On large tables, build the index CONCURRENTLY manually outside keel (it cannot run inside the migration's transaction)",
                )
            })
            .collect()
    }
}

/// `CREATE POLICY` has no IF NOT EXISTS, so it needs a preceding drop
pub struct PolicyWithoutDrop;

impl Rule for PolicyWithoutDrop {
    fn id(&self) -> &'static str {
        "policy-without-drop"
    }

    fn severity(&self) -> Severity {
        Severity::Warning
    }

    fn check(&self, sql: &ScannedSql) -> Vec<Finding> {
        let mut findings = Vec::new();
        let mut dropped = HashSet::new();

        for statement in &sql.statements {
            if let Some(caps) = DROP_POLICY.captures(&statement.text) {
                dropped.insert((normalize_ident(&caps[1]), normalize_ident(&caps[2])));
                continue;
            }

            if let Some(caps) = CREATE_POLICY.captures(&statement.text) {
                let key = (normalize_ident(&caps[1]), normalize_ident(&caps[2]));
                if !dropped.contains(&key) {
                    findings.push(
                        self.finding(
                            statement.line,
                            format!(
                                "CREATE POLICY {} ON {} is not preceded by a DROP POLICY",
                                &caps[1], &caps[2]
                            ),
                        )
                        .with_suggestion(format!(
                            "Add `DROP POLICY IF EXISTS {} ON {};` before it",
                            &caps[1], &caps[2]
                        )),
                    );
                }
            }
        }
        findings
    }
}

/// Files should say what they change
pub struct MissingDescription;

impl Rule for MissingDescription {
    fn id(&self) -> &'static str {
        "missing-description"
    }

    fn severity(&self) -> Severity {
        Severity::Info
    }

    fn check(&self, sql: &ScannedSql) -> Vec<Finding> {
        let described = sql
            .comments
            .iter()
            .any(|comment| comment.text.chars().filter(|c| c.is_alphabetic()).count() >= 3);

        if described {
            Vec::new()
        } else {
            vec![self
                .finding(0, "File has no comment describing the change".to_string())
                .with_suggestion("Start the file with a `--` comment saying what it changes and why")]
        }
    }
}
