//! Interactive configuration wizard for creating/editing config files.

use dialoguer::{Confirm, Input, Password, Select};
use oracle_pg_migrate::{
    Config, DriverFactory, MigrationConfig, NullCharPolicy, Orchestrator, Parallelism,
    SourceConfig, TargetConfig, DEFAULT_ODBC_DRIVER,
};
use std::path::Path;
use std::sync::Arc;

/// Result type for wizard operations.
pub type WizardResult<T> = Result<T, WizardError>;

/// Errors that can occur during wizard execution.
#[derive(Debug)]
pub enum WizardError {
    /// User cancelled the wizard.
    Cancelled,
    /// IO error (file read/write).
    Io(std::io::Error),
    /// Config serialization error.
    Config(String),
    /// Validation error.
    Validation(String),
}

impl std::fmt::Display for WizardError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cancelled => write!(f, "Configuration cancelled"),
            Self::Io(e) => write!(f, "IO error: {}", e),
            Self::Config(msg) => write!(f, "Config error: {}", msg),
            Self::Validation(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl std::error::Error for WizardError {}

impl From<std::io::Error> for WizardError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<dialoguer::Error> for WizardError {
    fn from(e: dialoguer::Error) -> Self {
        Self::Io(std::io::Error::other(e.to_string()))
    }
}

/// Run the configuration wizard.
pub async fn run_wizard(output: &Path, force: bool) -> WizardResult<()> {
    println!();
    println!("Oracle to PostgreSQL Migration - Configuration Wizard");
    println!("=====================================================");
    println!();

    let existing = if output.exists() && !force {
        load_existing(output)?
    } else {
        None
    };

    let source = prompt_source_config(existing.as_ref().map(|c| &c.source))?;
    let target = prompt_target_config(existing.as_ref().map(|c| &c.target))?;
    let migration = prompt_migration_config(existing.as_ref().map(|c| &c.migration))?;

    let config = Config {
        source,
        target,
        migration,
    };

    config
        .validate()
        .map_err(|e| WizardError::Validation(e.to_string()))?;

    print_summary(&config);

    if Confirm::new()
        .with_prompt("Test database connections?")
        .default(false)
        .interact()?
    {
        test_connections(&config).await;
    }

    if !Confirm::new()
        .with_prompt(format!("Save to {}?", output.display()))
        .default(true)
        .interact()?
    {
        return Err(WizardError::Cancelled);
    }

    write_config(&config, output)?;

    println!("\nConfiguration saved to {}", output.display());
    println!("Run 'oracle-pg-migrate run' to start the migration.");

    Ok(())
}

fn load_existing(path: &Path) -> WizardResult<Option<Config>> {
    println!("File already exists: {}\n", path.display());

    let options = &["Edit existing configuration", "Overwrite with new", "Abort"];
    let selection = Select::new()
        .with_prompt("What would you like to do?")
        .items(options)
        .default(0)
        .interact()?;

    match selection {
        0 => match Config::load(path) {
            Ok(config) => Ok(Some(config)),
            Err(e) => {
                println!("Warning: Could not parse existing file: {}", e);
                println!("Starting with fresh configuration.\n");
                Ok(None)
            }
        },
        1 => Ok(None),
        _ => Err(WizardError::Cancelled),
    }
}

fn prompt_source_config(existing: Option<&SourceConfig>) -> WizardResult<SourceConfig> {
    println!("Source Database (Oracle)");
    println!("------------------------");

    let host: String = Input::new()
        .with_prompt("  Host")
        .default(
            existing
                .map(|c| c.host.clone())
                .unwrap_or_else(|| "localhost".to_string()),
        )
        .interact_text()?;

    let port: u16 = Input::new()
        .with_prompt("  Port")
        .default(existing.map(|c| c.port).unwrap_or(1521))
        .interact_text()?;

    let service_name: String = Input::new()
        .with_prompt("  Service name")
        .default(
            existing
                .map(|c| c.service_name.clone())
                .unwrap_or_else(|| "sys".to_string()),
        )
        .interact_text()?;

    let user: String = Input::new()
        .with_prompt("  User")
        .default(
            existing
                .map(|c| c.user.clone())
                .unwrap_or_else(|| "sys".to_string()),
        )
        .interact_text()?;

    let password = prompt_password("  Password", existing.map(|c| c.password.as_str()))?;

    let driver: String = Input::new()
        .with_prompt("  ODBC driver")
        .default(
            existing
                .map(|c| c.driver.clone())
                .unwrap_or_else(|| DEFAULT_ODBC_DRIVER.to_string()),
        )
        .interact_text()?;

    let schemas_str: String = Input::new()
        .with_prompt("  Schemas (comma-separated)")
        .default(existing.map(|c| c.schemas.join(", ")).unwrap_or_default())
        .interact_text()?;

    println!();

    Ok(SourceConfig {
        r#type: "oracle".to_string(),
        host,
        port,
        service_name,
        user,
        password,
        driver,
        schemas: split_list(&schemas_str),
    })
}

fn prompt_target_config(existing: Option<&TargetConfig>) -> WizardResult<TargetConfig> {
    println!("Target Database (PostgreSQL)");
    println!("----------------------------");

    let host: String = Input::new()
        .with_prompt("  Host")
        .default(existing.map(|c| c.host.clone()).unwrap_or_default())
        .interact_text()?;

    let port: u16 = Input::new()
        .with_prompt("  Port")
        .default(existing.map(|c| c.port).unwrap_or(5432))
        .interact_text()?;

    let database: String = Input::new()
        .with_prompt("  Database")
        .default(
            existing
                .map(|c| c.database.clone())
                .unwrap_or_else(|| "oracle_migration".to_string()),
        )
        .interact_text()?;

    let maintenance_database: String = Input::new()
        .with_prompt("  Maintenance database (used by reset-target)")
        .default(
            existing
                .map(|c| c.maintenance_database.clone())
                .unwrap_or_else(|| "postgres".to_string()),
        )
        .interact_text()?;

    let user: String = Input::new()
        .with_prompt("  User")
        .default(
            existing
                .map(|c| c.user.clone())
                .unwrap_or_else(|| "postgres".to_string()),
        )
        .interact_text()?;

    let password = prompt_password("  Password", existing.map(|c| c.password.as_str()))?;

    let ssl_modes = &["disable", "require", "verify-ca", "verify-full"];
    let default_idx = existing
        .and_then(|c| ssl_modes.iter().position(|&m| m == c.ssl_mode))
        .unwrap_or(0);

    let ssl_mode_idx = Select::new()
        .with_prompt("  SSL Mode")
        .items(ssl_modes)
        .default(default_idx)
        .interact()?;

    println!();

    Ok(TargetConfig {
        r#type: "postgres".to_string(),
        host,
        port,
        database,
        maintenance_database,
        user,
        password,
        ssl_mode: ssl_modes[ssl_mode_idx].to_string(),
    })
}

fn prompt_migration_config(existing: Option<&MigrationConfig>) -> WizardResult<MigrationConfig> {
    println!("Migration Settings");
    println!("------------------");

    let mut config = existing.cloned().unwrap_or_default();

    config.batch_size = Input::new()
        .with_prompt("  Rows per batch")
        .default(config.batch_size)
        .interact_text()?;

    let workers_default = match config.workers {
        Some(Parallelism::Fixed(n)) => n.to_string(),
        Some(Parallelism::Auto) => "auto".to_string(),
        None => "1".to_string(),
    };
    let workers: String = Input::new()
        .with_prompt("  Schema workers (number or auto)")
        .default(workers_default)
        .interact_text()?;
    config.workers = match workers.parse::<Parallelism>() {
        Ok(Parallelism::Fixed(1)) => None,
        Ok(p) => Some(p),
        Err(e) => return Err(WizardError::Validation(e)),
    };

    config.trial_run = Confirm::new()
        .with_prompt("  Trial run (copy only the first batches of each table)")
        .default(config.trial_run)
        .interact()?;

    config.disable_logging = Confirm::new()
        .with_prompt("  Load into UNLOGGED tables (faster, not crash-safe)")
        .default(config.disable_logging)
        .interact()?;

    config.timestamp_with_time_zone = Confirm::new()
        .with_prompt("  Map dates to timestamp with time zone")
        .default(config.timestamp_with_time_zone)
        .interact()?;

    let policies = &["check", "remove", "ignore"];
    let policy_idx = Select::new()
        .with_prompt("  Null characters in source text")
        .items(policies)
        .default(match config.null_chars {
            NullCharPolicy::Check => 0,
            NullCharPolicy::Remove => 1,
            NullCharPolicy::Ignore => 2,
        })
        .interact()?;
    config.null_chars = match policy_idx {
        0 => NullCharPolicy::Check,
        1 => NullCharPolicy::Remove,
        _ => NullCharPolicy::Ignore,
    };

    config.verify = Confirm::new()
        .with_prompt("  Check row counts after copying")
        .default(config.verify)
        .interact()?;

    println!();

    Ok(config)
}

/// Prompt for a password; blank keeps the existing one.
fn prompt_password(prompt: &str, existing: Option<&str>) -> WizardResult<String> {
    match existing {
        Some(current) => {
            let input: String = Password::new()
                .with_prompt(format!("{} (blank to keep existing)", prompt))
                .allow_empty_password(true)
                .interact()?;
            Ok(if input.is_empty() {
                current.to_string()
            } else {
                input
            })
        }
        None => Ok(Password::new().with_prompt(prompt).interact()?),
    }
}

fn split_list(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn print_summary(config: &Config) {
    println!("Configuration Summary");
    println!("---------------------");
    println!(
        "  Source: {}@{}:{}/{}",
        config.source.user, config.source.host, config.source.port, config.source.service_name
    );
    println!("  Schemas: {}", config.source.schemas.join(", "));
    println!(
        "  Target: {}@{}:{}/{} (ssl: {})",
        config.target.user,
        config.target.host,
        config.target.port,
        config.target.database,
        config.target.ssl_mode
    );
    println!("  Batch size: {}", config.migration.batch_size);
    if config.migration.trial_run {
        println!("  Trial run");
    }
    println!("  Null characters: {:?}", config.migration.null_chars);
    println!();
}

async fn test_connections(config: &Config) {
    use std::time::Duration;
    use tokio::time::timeout;

    println!("\nTesting connections...");

    let factory = Arc::new(DriverFactory::new(config.clone()));
    let orchestrator = Orchestrator::new(config.clone(), factory);

    match timeout(Duration::from_secs(30), orchestrator.health_check()).await {
        Err(_) => println!("  Health check timed out after 30 seconds"),
        Ok(Err(e)) => println!("  Connection test failed: {}", e),
        Ok(Ok(health)) => {
            println!(
                "  Source (Oracle): {} ({}ms)",
                if health.source_connected { "OK" } else { "FAILED" },
                health.source_latency_ms
            );
            if let Some(ref err) = health.source_error {
                println!("    Error: {}", err);
            }
            println!(
                "  Target (PostgreSQL): {} ({}ms)",
                if health.target_connected { "OK" } else { "FAILED" },
                health.target_latency_ms
            );
            if let Some(ref err) = health.target_error {
                println!("    Error: {}", err);
            }
            if !health.healthy {
                println!("\n  Warning: One or more connections failed.");
            }
        }
    }

    println!();
}

fn write_config(config: &Config, path: &Path) -> WizardResult<()> {
    let header = "# Oracle to PostgreSQL Migration Configuration\n\
                  # Generated by oracle-pg-migrate init\n\n";

    let yaml = config
        .to_yaml()
        .map_err(|e| WizardError::Config(e.to_string()))?;

    std::fs::write(path, format!("{}{}", header, yaml))?;

    Ok(())
}
