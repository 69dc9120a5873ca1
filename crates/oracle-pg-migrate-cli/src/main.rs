//! oracle-pg-migrate CLI - Oracle to PostgreSQL schema and data migration.

mod wizard;

use clap::{Parser, Subcommand};
use dialoguer::Confirm;
use oracle_pg_migrate::{
    reset_database, CheckReport, Config, DriverFactory, MigrateError, MigrationResult,
    Orchestrator, Parallelism, RunOptions,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

/// Exit code for a run that finished but left failed tables or mismatched counts.
const EXIT_COMPLETED_WITH_ERRORS: u8 = 5;

/// Exit code for a cancelled run.
const EXIT_CANCELLED: u8 = 130;

#[derive(Parser)]
#[command(name = "oracle-pg-migrate")]
#[command(about = "Oracle to PostgreSQL schema and data migration")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    /// Log file [default: YYYY_MM_DD_migration.log]
    #[arg(long)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build target schemas, copy all rows and check row counts
    Run {
        /// Override the schemas to migrate (comma-separated)
        #[arg(long, value_delimiter = ',')]
        schemas: Option<Vec<String>>,

        /// Override rows per batch
        #[arg(long)]
        batch_size: Option<usize>,

        /// Trial run: copy only the first batches of each table
        #[arg(long)]
        trial: bool,

        /// Schema workers: a count or "auto"
        #[arg(long)]
        workers: Option<Parallelism>,

        /// Keep target tables LOGGED while loading
        #[arg(long)]
        keep_logging: bool,

        /// Skip the row-count check after copying
        #[arg(long)]
        skip_verify: bool,

        /// Copy into existing target tables without building schemas
        #[arg(long)]
        skip_schema: bool,
    },

    /// Create target schemas and tables without copying data
    BuildSchema,

    /// Validate row counts between source and target
    Validate,

    /// Scan source text columns for null characters
    ScanNulls {
        /// Strip null characters on the source instead of reporting them
        #[arg(long)]
        remove: bool,
    },

    /// Test database connections
    HealthCheck,

    /// Drop and recreate the target database
    ResetTarget {
        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },

    /// Create or edit a configuration file interactively
    Init {
        /// Output path for configuration file [default: config.yaml]
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Force overwrite existing file without confirmation
        #[arg(long, short)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<ExitCode, MigrateError> {
    let cli = Cli::parse();

    // The wizard needs no config and keeps the terminal free of log lines
    if let Commands::Init { output, force } = cli.command {
        let output_path = output.unwrap_or_else(|| PathBuf::from("config.yaml"));
        wizard::run_wizard(&output_path, force)
            .await
            .map_err(|e| MigrateError::Config(e.to_string()))?;
        return Ok(ExitCode::SUCCESS);
    }

    let mut config = Config::load(&cli.config)?;

    let log_file = cli.log_file.clone().unwrap_or_else(default_log_file);
    // Flushes the log file on drop
    let _log_guard = setup_logging(&cli.verbosity, &cli.log_format, &log_file)?;
    info!("Loaded configuration from {:?}", cli.config);

    let cancel_token = setup_signal_handler()?;

    match cli.command {
        Commands::Init { .. } => unreachable!(),

        Commands::Run {
            schemas,
            batch_size,
            trial,
            workers,
            keep_logging,
            skip_verify,
            skip_schema,
        } => {
            if let Some(schemas) = schemas {
                config.source.schemas = schemas;
            }
            if let Some(size) = batch_size {
                config.migration.batch_size = size;
            }
            if trial {
                config.migration.trial_run = true;
            }
            if workers.is_some() {
                config.migration.workers = workers;
            }
            if keep_logging {
                config.migration.disable_logging = false;
            }
            if skip_verify {
                config.migration.verify = false;
            }
            config.validate()?;

            let result = orchestrator(config)
                .with_cancellation(cancel_token)
                .with_options(RunOptions {
                    build_schema: !skip_schema,
                })
                .run()
                .await?;

            if cli.output_json {
                println!("{}", result.to_json()?);
            } else {
                print_run_summary(&result);
            }

            if result.status == "cancelled" {
                return Ok(ExitCode::from(EXIT_CANCELLED));
            }
            if result.has_failures() {
                return Ok(ExitCode::from(EXIT_COMPLETED_WITH_ERRORS));
            }
        }

        Commands::BuildSchema => {
            let outcomes = orchestrator(config).build_schemas().await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&outcomes)?);
            } else {
                println!("Schema build results:");
                for outcome in &outcomes {
                    match &outcome.error {
                        None => println!("  {}: {} tables", outcome.schema, outcome.tables.len()),
                        Some(err) => println!("  {}: FAILED ({})", outcome.schema, err),
                    }
                }
            }

            if let Some(failed) = outcomes.into_iter().find(|o| o.error.is_some()) {
                return Err(MigrateError::Ddl {
                    schema: failed.schema,
                    message: failed.error.unwrap_or_default(),
                });
            }
        }

        Commands::Validate => {
            let report = orchestrator(config).validate().await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_check_report(&report);
            }

            if !report.is_consistent() {
                return Ok(ExitCode::from(EXIT_COMPLETED_WITH_ERRORS));
            }
        }

        Commands::ScanNulls { remove } => {
            let found = orchestrator(config).scan_nulls(remove).await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&found)?);
            } else if found.is_empty() {
                println!("No null characters found");
            } else {
                let verb = if remove { "Removed null characters from" } else { "Null characters in" };
                println!("{} {} column(s):", verb, found.len());
                for column in &found {
                    println!("  {}", column);
                }
            }

            if !remove && !found.is_empty() {
                return Err(MigrateError::NullCharacters(found));
            }
        }

        Commands::HealthCheck => {
            let result = orchestrator(config).health_check().await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  Source (Oracle): {} ({}ms)",
                    if result.source_connected { "OK" } else { "FAILED" },
                    result.source_latency_ms
                );
                if let Some(ref err) = result.source_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "  Target (PostgreSQL): {} ({}ms)",
                    if result.target_connected { "OK" } else { "FAILED" },
                    result.target_latency_ms
                );
                if let Some(ref err) = result.target_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "\n  Overall: {}",
                    if result.healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if !result.healthy {
                return Err(MigrateError::Database("Health check failed".to_string()));
            }
        }

        Commands::ResetTarget { yes } => {
            let database = config.target.database.clone();
            if !yes {
                let confirmed = Confirm::new()
                    .with_prompt(format!(
                        "Drop and recreate database '{}' on {}:{}? All data in it will be lost",
                        database, config.target.host, config.target.port
                    ))
                    .default(false)
                    .interact()
                    .map_err(|e| MigrateError::Io(std::io::Error::other(e.to_string())))?;
                if !confirmed {
                    println!("Reset cancelled");
                    return Ok(ExitCode::SUCCESS);
                }
            }

            reset_database(&config.target).await?;
            println!("Database '{}' recreated", database);
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn orchestrator(config: Config) -> Orchestrator {
    let factory = Arc::new(DriverFactory::new(config.clone()));
    Orchestrator::new(config, factory)
}

fn print_run_summary(result: &MigrationResult) {
    let status_msg = match result.status.as_str() {
        "cancelled" => "Migration cancelled",
        "completed_with_errors" => "Migration completed with errors",
        _ => "Migration completed!",
    };
    println!("\n{}", status_msg);
    println!("  Run ID: {}", result.run_id);
    println!("  Duration: {:.2}s", result.duration_seconds);
    println!("  Schemas: {}", result.schemas.len());
    println!("  Tables: {}/{}", result.tables_success, result.tables_total);
    println!("  Rows: {}", result.rows_copied);
    println!("  Throughput: {} rows/sec", result.rows_per_second);
    if !result.failed_schemas.is_empty() {
        println!("  Failed schemas: {:?}", result.failed_schemas);
    }
    if !result.failed_tables.is_empty() {
        println!("  Failed tables: {:?}", result.failed_tables);
    }
    if let Some(ref check) = result.check {
        println!(
            "  Row counts: {} match, {} mismatch, {} errors",
            check.matched(),
            check.mismatched(),
            check.count_errors()
        );
    }
}

fn print_check_report(report: &CheckReport) {
    println!("Row count check:");
    for table in &report.tables {
        let counts = match (table.source_count, table.target_count) {
            (Some(s), Some(t)) => format!("source={} target={}", s, t),
            _ => table.error.clone().unwrap_or_default(),
        };
        println!("  {:?} {} ({})", table.status, table.full_name(), counts);
    }
    for err in &report.schema_errors {
        println!("  Schema {}: {}", err.schema, err.error);
    }
    println!(
        "\n  {} match, {} mismatch, {} errors",
        report.matched(),
        report.mismatched(),
        report.count_errors()
    );
}

fn default_log_file() -> PathBuf {
    PathBuf::from(format!(
        "{}_migration.log",
        chrono::Local::now().format("%Y_%m_%d")
    ))
}

/// Console logging at the requested verbosity, plus info-and-above to the log file.
///
/// The file is written from a background thread; keep the returned guard alive
/// until the last event has been logged.
fn setup_logging(
    verbosity: &str,
    format: &str,
    log_file: &Path,
) -> Result<WorkerGuard, MigrateError> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => LevelFilter::DEBUG,
        "info" => LevelFilter::INFO,
        "warn" => LevelFilter::WARN,
        "error" => LevelFilter::ERROR,
        _ => LevelFilter::INFO,
    };

    let directory = match log_file.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let file_name = log_file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| MigrateError::Config(format!("Invalid log file path: {}", log_file.display())))?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name)
        .build(directory)
        .map_err(|e| MigrateError::Io(std::io::Error::other(e.to_string())))?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let json = format == "json";
    let console_json = json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(false)
            .with_filter(level)
    });
    let console_text = (!json).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_filter(level)
    });
    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_target(false)
        .with_writer(non_blocking)
        .with_filter(LevelFilter::INFO);

    tracing_subscriber::registry()
        .with(console_json)
        .with(console_text)
        .with(file_layer)
        .try_init()
        .map_err(|e| MigrateError::Config(format!("Failed to initialise logging: {}", e)))?;

    Ok(guard)
}

/// Cancel the returned token on SIGINT or SIGTERM.
#[cfg(unix)]
fn setup_signal_handler() -> Result<CancellationToken, MigrateError> {
    let cancel_token = CancellationToken::new();

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    let token = cancel_token.clone();
    tokio::spawn(async move {
        let name = tokio::select! {
            _ = sigint.recv() => "SIGINT",
            _ = sigterm.recv() => "SIGTERM",
        };
        eprintln!("\nReceived {}. Finishing current batches and stopping...", name);
        token.cancel();
    });

    Ok(cancel_token)
}

#[cfg(not(unix))]
fn setup_signal_handler() -> Result<CancellationToken, MigrateError> {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nReceived Ctrl-C. Finishing current batches and stopping...");
            token.cancel();
        }
    });

    Ok(cancel_token)
}
