//! # oracle-pg-migrate
//!
//! Oracle to PostgreSQL schema and data migration library.
//!
//! - **Type translation** from Oracle column types to PostgreSQL types
//! - **Schema building**: one target schema per source schema, tables only
//! - **Batch copy** in row-key windows over `COPY`, one transaction per batch
//! - **Parallel schemas** through a bounded worker pool
//! - **Row-count check** between source and target after the copy
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use oracle_pg_migrate::{Config, DriverFactory, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> oracle_pg_migrate::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let factory = Arc::new(DriverFactory::new(config.clone()));
//!     let result = Orchestrator::new(config, factory).run().await?;
//!     println!("Copied {} rows", result.rows_copied);
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod config;
pub mod core;
pub mod drivers;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod scan;
pub mod transfer;
pub mod typemap;
pub mod verify;

// Re-exports for convenient access
pub use builder::{build_schema, prepare_table, TargetColumn, TargetTable};
pub use config::{
    Config, MigrationConfig, NullCharPolicy, Parallelism, SourceConfig, TargetConfig,
    DEFAULT_ODBC_DRIVER,
};
pub use crate::core::{Batch, Column, ConnectionFactory, SourceReader, SourceType, SqlValue, Table};
pub use crate::core::{TargetSession, TargetWriter};
pub use drivers::memory::{MemoryFactory, MemorySource, MemoryTarget};
pub use drivers::postgres::reset_database;
pub use drivers::DriverFactory;
pub use error::{MigrateError, Result};
pub use events::{CollectingSink, EventLevel, EventSink, SharedSink, TracingSink};
pub use orchestrator::{
    migrate_schema, BuildOutcome, HealthCheckResult, MigrationResult, Orchestrator, RunOptions,
    SchemaOutcome,
};
pub use transfer::{CopyOptions, CopyResult, CopyStatus, TransferEngine};
pub use typemap::{TargetType, TypeTranslator};
pub use verify::{check_migration, CheckReport, CheckStatus};
