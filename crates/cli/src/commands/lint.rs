use std::path::PathBuf;

use clap::ValueEnum;
use keel_lint::{Linter, Severity};

use super::migrations_config;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Lint the corpus. Error-severity findings make the command fail.
pub fn run(dir: Option<PathBuf>, format: OutputFormat) -> anyhow::Result<()> {
    let config = migrations_config(dir)?;
    let report = Linter::default().lint_dir(&config.dir)?;

    match format {
        OutputFormat::Text => print!("{}", report.render_text()),
        OutputFormat::Json => println!("{}", report.to_json()?),
    }

    if report.has_errors() {
        anyhow::bail!(
            "Lint failed with {} error-severity finding(s)",
            report.count(Severity::Error)
        );
    }
    Ok(())
}
