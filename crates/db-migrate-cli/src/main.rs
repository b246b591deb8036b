//! db-migrate CLI - resumable cross-dialect database migration.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use db_migrate::{Config, MigrateError, MigrationResult, Orchestrator};
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;

#[derive(Parser)]
#[command(name = "db-migrate")]
#[command(about = "Copy a relational database between SQLite, PostgreSQL and MySQL")]
#[command(version)]
struct Cli {
    /// Origin connection URL (sqlite://file.db, postgres://..., mysql://...)
    origin: Option<String>,

    /// Destination connection URL
    dest: Option<String>,

    /// Path to YAML configuration file; URLs and flags given here override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of parallel table workers [default: CPU cores]
    #[arg(long)]
    workers: Option<usize>,

    /// Create tables on the destination [default: true]
    #[arg(long, value_name = "BOOL")]
    copy_schema: Option<bool>,

    /// Copy rows [default: true]
    #[arg(long, value_name = "BOOL")]
    copy_data: Option<bool>,

    /// Add unique, check and foreign key constraints [default: true]
    #[arg(long, value_name = "BOOL")]
    copy_constraints: Option<bool>,

    /// Create secondary indexes [default: true]
    #[arg(long, value_name = "BOOL")]
    copy_indexes: Option<bool>,

    /// Rows per chunk [default: 1000]
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Tables to leave out, comma-separated
    #[arg(long, value_delimiter = ',')]
    exclude_tables: Vec<String>,

    /// Columns to leave out as table.column, comma-separated
    #[arg(long, value_delimiter = ',')]
    exclude_columns: Vec<String>,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: trace, debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    /// Also write a debug-level log to this file
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run(cli: Cli) -> Result<(), MigrateError> {
    setup_logging(&cli.verbosity, &cli.log_format, cli.log_file.as_deref())?;

    let config = build_config(&cli)?.with_auto_tuning();
    let orchestrator = Orchestrator::new(config).await?;
    let result = orchestrator.run().await?;

    if cli.output_json {
        println!("{}", result.to_json()?);
    } else {
        print_summary(&result);
    }

    Ok(())
}

/// Merge the optional config file with positional URLs and flags.
fn build_config(cli: &Cli) -> Result<Config, MigrateError> {
    let mut config = match &cli.config {
        Some(path) => {
            let config = Config::load(path)?;
            info!("Loaded configuration from {:?}", path);
            config
        }
        None => Config::new(String::new(), String::new()),
    };

    if let Some(origin) = &cli.origin {
        config.origin = origin.clone();
    }
    if let Some(dest) = &cli.dest {
        config.destination = dest.clone();
    }
    if config.origin.is_empty() || config.destination.is_empty() {
        return Err(MigrateError::Config(
            "ORIGIN and DEST are required unless --config names them".to_string(),
        ));
    }

    let migration = &mut config.migration;
    if let Some(w) = cli.workers {
        migration.workers = Some(w);
    }
    if let Some(size) = cli.chunk_size {
        migration.chunk_size = Some(size);
    }
    if let Some(v) = cli.copy_schema {
        migration.copy_schema = v;
    }
    if let Some(v) = cli.copy_data {
        migration.copy_data = v;
    }
    if let Some(v) = cli.copy_constraints {
        migration.copy_constraints = v;
    }
    if let Some(v) = cli.copy_indexes {
        migration.copy_indexes = v;
    }
    if !cli.exclude_tables.is_empty() {
        migration.exclude_tables = cli.exclude_tables.clone();
    }
    if !cli.exclude_columns.is_empty() {
        migration.exclude_columns = cli.exclude_columns.clone();
    }

    config.validate()?;
    Ok(config)
}

fn print_summary(result: &MigrationResult) {
    println!("Migration {}", result.status);
    println!("  Run ID:     {}", result.run_id);
    println!("  Duration:   {:.1}s", result.duration_seconds);
    println!(
        "  Tables:     {} ok, {} skipped, {} failed (of {})",
        result.tables_success, result.tables_skipped, result.tables_failed, result.tables_total
    );
    println!(
        "  Rows:       {} ({} rows/s)",
        result.rows_transferred, result.rows_per_second
    );
    println!("  Validated:  {}", result.validated);
    if !result.failed_tables.is_empty() {
        println!("  Failed:     {}", result.failed_tables.join(", "));
    }
}

fn setup_logging(
    verbosity: &str,
    format: &str,
    log_file: Option<&Path>,
) -> Result<(), MigrateError> {
    let level = match verbosity.to_lowercase().as_str() {
        "trace" => LevelFilter::TRACE,
        "debug" => LevelFilter::DEBUG,
        "info" => LevelFilter::INFO,
        "warn" => LevelFilter::WARN,
        "error" => LevelFilter::ERROR,
        _ => LevelFilter::INFO,
    };

    let console = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);
    let console = if format == "json" {
        console.json().with_filter(level).boxed()
    } else {
        console.with_filter(level).boxed()
    };

    let file_layer = match log_file {
        Some(path) => {
            let file = std::fs::File::create(path)?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(Arc::new(file))
                    .with_ansi(false)
                    .with_target(false)
                    .with_filter(LevelFilter::DEBUG),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .init();

    Ok(())
}
