use std::path::PathBuf;

use keel_migrate::{RunOptions, RunReport};

use super::database_config;

pub async fn run(check: bool, verbose: bool, dir: Option<PathBuf>) -> anyhow::Result<()> {
    let config = database_config(dir)?;
    let options = if check {
        RunOptions::check()
    } else {
        RunOptions::default()
    };

    tracing::info!(
        database = %config.connection.display_target(),
        dir = %config.migrations.dir.display(),
        dry_run = options.dry_run,
        "Starting migration run"
    );

    let report = match keel_migrate::run(&config, options).await {
        Ok(report) => report,
        Err(e) => {
            if e.is_pre_connection() {
                tracing::error!("Migration corpus rejected before connecting; the database was not touched");
            }
            return Err(e.into());
        }
    };
    print!("{}", render(&report, verbose));
    Ok(())
}

fn render(report: &RunReport, verbose: bool) -> String {
    let mut out = String::new();

    if report.dry_run {
        if report.pending.is_empty() {
            out.push_str(&format!(
                "✅ Database is up to date ({} applied)\n",
                report.skipped_count
            ));
        } else {
            out.push_str(&format!("📋 {} pending migration(s):\n", report.pending.len()));
            for migration in &report.pending {
                out.push_str(&format!("  ⏳ {}\n", migration.filename));
                if verbose {
                    for line in migration.numbered_sql().lines() {
                        out.push_str(&format!("      {}\n", line));
                    }
                }
            }
        }
    } else if report.applied.is_empty() {
        out.push_str(&format!(
            "✅ Nothing to apply ({} already applied)\n",
            report.skipped_count
        ));
    } else {
        out.push_str(&format!(
            "✅ Applied {} migration(s) in {} ms\n",
            report.applied_count(),
            report.execution_time_ms
        ));
        for outcome in &report.applied {
            out.push_str(&format!("  ✔ {} ({} ms)\n", outcome.filename, outcome.execution_time_ms));
        }
    }

    for version in &report.orphaned {
        out.push_str(&format!("⚠️ Ledger records version {} but no file exists\n", version));
    }
    out
}
