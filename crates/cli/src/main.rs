mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use commands::lint::OutputFormat;
use keel_core::{init_logging, LogFormat, LoggingConfig};

#[derive(Parser)]
#[command(name = "keel")]
#[command(version, about = "Versioned, checksummed SQL migrations for PostgreSQL")]
struct Cli {
    /// Log filter when RUST_LOG is not set (e.g. "debug", "keel_migrate=trace")
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Log line format: compact, pretty or json
    #[arg(long, global = true, default_value = "compact")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending migrations in version order
    Run {
        /// Report pending migrations and drift without writing anything
        #[arg(long, visible_alias = "dry-run")]
        check: bool,

        /// With --check, print the SQL of each pending migration
        #[arg(long, short)]
        verbose: bool,

        /// Migrations directory (default: $KEEL_MIGRATIONS_DIR or ./migrations)
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Check migration files for unsafe patterns
    Lint {
        #[arg(long)]
        dir: Option<PathBuf>,

        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Record existing migrations as applied without running them
    Bootstrap {
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Only record migrations up to and including this version
        #[arg(long)]
        until: Option<String>,
    },

    /// Create a new migration file
    Create {
        /// What the migration does, e.g. "add deck tags"
        #[arg(required = true, num_args = 1..)]
        description: Vec<String>,

        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Create a revert template for an applied migration
    CreateRevert {
        /// Version of the migration to revert (YYYYMMDDHHMMSS)
        version: String,

        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Show applied, pending and drifted migrations
    Status {
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(LoggingConfig::new(&cli.log_level, cli.log_format))
        .map_err(|e| anyhow::anyhow!("Failed to initialise logging: {}", e))?;

    match cli.command {
        Commands::Run {
            check,
            verbose,
            dir,
        } => {
            commands::run::run(check, verbose, dir).await?;
        }
        Commands::Lint { dir, format } => {
            commands::lint::run(dir, format)?;
        }
        Commands::Bootstrap { dir, until } => {
            commands::bootstrap::run(dir, until).await?;
        }
        Commands::Create { description, dir } => {
            commands::create::create(&description.join(" "), dir)?;
        }
        Commands::CreateRevert { version, dir } => {
            commands::create::create_revert(&version, dir)?;
        }
        Commands::Status { dir, json } => {
            commands::status::run(dir, json).await?;
        }
    }

    Ok(())
}
