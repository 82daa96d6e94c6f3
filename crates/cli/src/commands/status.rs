use std::path::PathBuf;

use keel_migrate::{MigrationStatus, StatusReport};

use super::database_config;

/// Show every migration file and whether it has been applied
pub async fn run(dir: Option<PathBuf>, json: bool) -> anyhow::Result<()> {
    let config = database_config(dir)?;
    let report = keel_migrate::status(&config).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render(&report));
    }
    Ok(())
}

fn render(report: &StatusReport) -> String {
    let mut out = String::new();
    out.push_str("Migration Status:\n");
    out.push_str("================\n");

    if !report.ledger_exists {
        out.push_str("(ledger table not created yet)\n");
    }
    if report.entries.is_empty() {
        out.push_str("No migrations found\n");
    }

    for entry in &report.entries {
        let filename = &entry.migration.filename;
        let line = match &entry.status {
            MigrationStatus::Pending => format!("  ⏳ {}\n", filename),
            MigrationStatus::Applied {
                executed_at,
                execution_time_ms,
            } => format!(
                "  ✅ {} (applied {}, {} ms)\n",
                filename,
                executed_at.format("%Y-%m-%d %H:%M:%S UTC"),
                execution_time_ms
            ),
            MigrationStatus::Drifted { .. } => {
                format!("  ❌ {} (changed since it was applied)\n", filename)
            }
        };
        out.push_str(&line);
    }

    for record in &report.orphaned {
        out.push_str(&format!("  ⚠️ {} (recorded, file missing)\n", record.filename));
    }

    out.push_str(&format!(
        "\n{} migration(s): {} pending, {} drifted\n",
        report.entries.len(),
        report.pending_count(),
        report.drifted_count()
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use keel_migrate::{MigrationDefinition, StatusEntry};

    fn definition(version: &str, slug: &str) -> MigrationDefinition {
        MigrationDefinition {
            filename: format!("V{}__{}.sql", version, slug),
            version: version.to_string(),
            description: slug.replace('_', " "),
            checksum: "abc".to_string(),
            sql: String::new(),
        }
    }

    #[test]
    fn test_render_status() {
        let report = StatusReport {
            ledger_exists: true,
            entries: vec![
                StatusEntry {
                    migration: definition("20240101000000", "create_table"),
                    status: MigrationStatus::Applied {
                        executed_at: Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap(),
                        execution_time_ms: 7,
                    },
                },
                StatusEntry {
                    migration: definition("20240102000000", "seed"),
                    status: MigrationStatus::Drifted {
                        recorded: "old".to_string(),
                    },
                },
                StatusEntry {
                    migration: definition("20240103000000", "add_index"),
                    status: MigrationStatus::Pending,
                },
            ],
            orphaned: vec![],
        };

        let text = render(&report);
        assert!(text.contains("  ✅ V20240101000000__create_table.sql (applied 2024-01-02 03:04:05 UTC, 7 ms)\n"));
        assert!(text.contains("  ❌ V20240102000000__seed.sql (changed since it was applied)\n"));
        assert!(text.contains("  ⏳ V20240103000000__add_index.sql\n"));
        assert!(text.ends_with("3 migration(s): 1 pending, 1 drifted\n"));
        assert!(!text.contains("ledger table not created"));
    }

    #[test]
    fn test_render_without_ledger() {
        let text = render(&StatusReport::default());
        assert!(text.contains("(ledger table not created yet)"));
        assert!(text.contains("No migrations found"));
    }
}
