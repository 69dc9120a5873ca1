//! Configuration type definitions.

use serde::{Deserialize, Serialize};
use std::fmt;
use sysinfo::System;
use tracing::info;

/// System resource information used to size the worker pool.
#[derive(Debug, Clone)]
pub struct SystemResources {
    /// Total RAM in GB.
    pub total_memory_gb: f64,
    /// Number of CPU cores.
    pub cpu_cores: usize,
}

impl SystemResources {
    /// Detect system resources.
    pub fn detect() -> Self {
        let mut sys = System::new_all();
        sys.refresh_all();

        let total_memory_gb = sys.total_memory() as f64 / (1024.0 * 1024.0 * 1024.0);
        let cpu_cores = sys.cpus().len();

        Self {
            total_memory_gb,
            cpu_cores,
        }
    }

    /// Log detected system resources.
    pub fn log(&self) {
        info!(
            "System resources: {:.1} GB RAM, {} CPU cores",
            self.total_memory_gb, self.cpu_cores
        );
    }
}

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source database configuration (Oracle).
    pub source: SourceConfig,

    /// Target database configuration (PostgreSQL).
    pub target: TargetConfig,

    /// Migration behavior configuration.
    #[serde(default)]
    pub migration: MigrationConfig,
}

/// Source database (Oracle) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Database type (always "oracle").
    #[serde(default = "default_oracle")]
    pub r#type: String,

    /// Database host.
    #[serde(default = "default_localhost")]
    pub host: String,

    /// Listener port (default: 1521).
    #[serde(default = "default_oracle_port")]
    pub port: u16,

    /// Service name (default: "sys").
    #[serde(default = "default_sys")]
    pub service_name: String,

    /// Username (default: "sys").
    #[serde(default = "default_sys")]
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// ODBC driver name as registered with the driver manager.
    #[serde(default = "default_odbc_driver")]
    pub driver: String,

    /// Schemas to migrate.
    #[serde(default)]
    pub schemas: Vec<String>,
}

impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConfig")
            .field("type", &self.r#type)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("service_name", &self.service_name)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("driver", &self.driver)
            .field("schemas", &self.schemas)
            .finish()
    }
}

/// Target database (PostgreSQL) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Database type (always "postgres").
    #[serde(default = "default_postgres")]
    pub r#type: String,

    /// Database host.
    #[serde(default = "default_localhost")]
    pub host: String,

    /// Database port (default: 5432).
    #[serde(default = "default_pg_port")]
    pub port: u16,

    /// Database name (default: "oracle_migration").
    #[serde(default = "default_target_database")]
    pub database: String,

    /// Database used for administrative connections by `reset-target`.
    #[serde(default = "default_postgres")]
    pub maintenance_database: String,

    /// Username (default: "postgres").
    #[serde(default = "default_postgres")]
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// SSL mode: disable, require, verify-ca, verify-full.
    #[serde(default = "default_disable")]
    pub ssl_mode: String,
}

impl fmt::Debug for TargetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetConfig")
            .field("type", &self.r#type)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("maintenance_database", &self.maintenance_database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

/// Degree of schema-level parallelism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ParallelismRepr", into = "ParallelismRepr")]
pub enum Parallelism {
    /// One worker per CPU core, capped by the number of schemas.
    Auto,
    /// Fixed number of workers.
    Fixed(usize),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum ParallelismRepr {
    Count(usize),
    Keyword(String),
}

impl TryFrom<ParallelismRepr> for Parallelism {
    type Error = String;

    fn try_from(value: ParallelismRepr) -> std::result::Result<Self, Self::Error> {
        match value {
            ParallelismRepr::Count(n) => Ok(Parallelism::Fixed(n)),
            ParallelismRepr::Keyword(s) => s.parse(),
        }
    }
}

impl From<Parallelism> for ParallelismRepr {
    fn from(value: Parallelism) -> Self {
        match value {
            Parallelism::Auto => ParallelismRepr::Keyword("auto".to_string()),
            Parallelism::Fixed(n) => ParallelismRepr::Count(n),
        }
    }
}

impl std::str::FromStr for Parallelism {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("auto") {
            return Ok(Parallelism::Auto);
        }
        s.parse::<usize>()
            .map(Parallelism::Fixed)
            .map_err(|_| format!("workers must be 'auto' or a positive integer, got '{}'", s))
    }
}

impl Parallelism {
    /// Resolve to a concrete worker count for `schema_count` schemas.
    pub fn resolve(&self, schema_count: usize) -> usize {
        let wanted = match self {
            Parallelism::Auto => SystemResources::detect().cpu_cores,
            Parallelism::Fixed(n) => *n,
        };
        wanted.clamp(1, schema_count.max(1))
    }
}

/// What to do about NUL characters embedded in source text columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NullCharPolicy {
    /// Skip the scan.
    Ignore,
    /// Scan and abort the run if any are found.
    #[default]
    Check,
    /// Scan and strip them on the source before copying.
    Remove,
}

/// Migration behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Rows per batch window (default: 300000).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Trial run: copy only the first few windows of each table.
    #[serde(default)]
    pub trial_run: bool,

    /// Switch tables to UNLOGGED while loading (default: true).
    #[serde(default = "default_true")]
    pub disable_logging: bool,

    /// Schema workers: "auto" or a count. Omitted runs schemas one at a time.
    #[serde(default)]
    pub workers: Option<Parallelism>,

    /// Abort a table on a read error instead of treating it as end of data.
    #[serde(default)]
    pub strict_reads: bool,

    /// NUL character handling before the schema build.
    #[serde(default)]
    pub null_chars: NullCharPolicy,

    /// Map source date/time columns to `timestamp with time zone`.
    #[serde(default)]
    pub timestamp_with_time_zone: bool,

    /// Run the row-count consistency check after copying (default: true).
    #[serde(default = "default_true")]
    pub verify: bool,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            trial_run: false,
            disable_logging: true,
            workers: None,
            strict_reads: false,
            null_chars: NullCharPolicy::default(),
            timestamp_with_time_zone: false,
            verify: true,
        }
    }
}

/// Largest batch used in trial mode.
pub const TRIAL_BATCH_CAP: usize = 100;

impl MigrationConfig {
    /// Batch size after the trial-mode clamp.
    pub fn effective_batch_size(&self) -> usize {
        if self.trial_run {
            self.batch_size.min(TRIAL_BATCH_CAP)
        } else {
            self.batch_size
        }
    }

    /// Number of concurrent schema workers for `schema_count` schemas.
    pub fn worker_count(&self, schema_count: usize) -> usize {
        match self.workers {
            Some(p) => p.resolve(schema_count),
            None => 1,
        }
    }
}

fn default_oracle() -> String {
    "oracle".to_string()
}

fn default_postgres() -> String {
    "postgres".to_string()
}

fn default_localhost() -> String {
    "localhost".to_string()
}

fn default_oracle_port() -> u16 {
    1521
}

fn default_pg_port() -> u16 {
    5432
}

fn default_sys() -> String {
    "sys".to_string()
}

/// ODBC driver name used when the configuration names none.
pub const DEFAULT_ODBC_DRIVER: &str = "Oracle 21 ODBC driver";

fn default_odbc_driver() -> String {
    DEFAULT_ODBC_DRIVER.to_string()
}

fn default_target_database() -> String {
    "oracle_migration".to_string()
}

fn default_disable() -> String {
    "disable".to_string()
}

fn default_batch_size() -> usize {
    300_000
}

fn default_true() -> bool {
    true
}
