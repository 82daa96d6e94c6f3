//! Lint findings and reports

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

/// Finding severity. Only `Error` fails a lint run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// One rule violation at a line of a file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub rule: &'static str,
    pub severity: Severity,
    /// 1-based line, 0 when the finding concerns the whole file
    pub line: usize,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl Finding {
    pub fn new(rule: &'static str, severity: Severity, line: usize, message: impl Into<String>) -> Self {
        Self {
            rule,
            severity,
            line,
            message: message.into(),
            suggestion: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {} [{}]", self.severity, self.message, self.rule)
    }
}

/// Findings for one file, ordered by line
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    pub findings: Vec<Finding>,
}

impl FileReport {
    pub fn count(&self, severity: Severity) -> usize {
        self.findings.iter().filter(|f| f.severity == severity).count()
    }
}

/// Findings for a whole directory
#[derive(Debug, Clone, Default, Serialize)]
pub struct LintReport {
    pub files: Vec<FileReport>,
}

impl LintReport {
    pub fn count(&self, severity: Severity) -> usize {
        self.files.iter().map(|file| file.count(severity)).sum()
    }

    /// Whether the run must exit non-zero
    pub fn has_errors(&self) -> bool {
        self.count(Severity::Error) > 0
    }

    pub fn findings(&self) -> impl Iterator<Item = (&FileReport, &Finding)> {
        self.files
            .iter()
            .flat_map(|file| file.findings.iter().map(move |finding| (file, finding)))
    }

    /// Human-readable report, one line per finding followed by a summary
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        for (file, finding) in self.findings() {
            out.push_str(&format!("{}:{}: {}\n", file.path.display(), finding.line, finding));
            if let Some(suggestion) = &finding.suggestion {
                out.push_str(&format!("    suggestion: {}\n", suggestion));
            }
        }
        out.push_str(&format!(
            "{} file(s) checked: {} error(s), {} warning(s), {} info\n",
            self.files.len(),
            self.count(Severity::Error),
            self.count(Severity::Warning),
            self.count(Severity::Info),
        ));
        out
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
