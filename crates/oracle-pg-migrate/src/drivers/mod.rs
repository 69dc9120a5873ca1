//! Database driver implementations.
//!
//! - [`oracle`]: Oracle source over ODBC (reader behind the `oracle` feature)
//! - [`postgres`]: PostgreSQL target
//! - [`memory`]: in-memory source and target
//! - [`common`]: shared utilities (TLS)

pub mod common;
pub mod memory;
pub mod oracle;
pub mod postgres;

pub use common::{SslMode, TlsBuilder};

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::Config;
use crate::core::traits::{ConnectionFactory, SourceReader, TargetWriter};
use crate::error::Result;

/// Connections per target handle: one copy session plus one for DDL and counts.
const TARGET_POOL_SIZE: usize = 2;

/// Opens real database connections from the run configuration.
#[derive(Debug, Clone)]
pub struct DriverFactory {
    config: Config,
}

impl DriverFactory {
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ConnectionFactory for DriverFactory {
    #[cfg(feature = "oracle")]
    async fn open_source(&self) -> Result<Arc<dyn SourceReader>> {
        Ok(Arc::new(oracle::OracleReader::connect(&self.config.source)?))
    }

    #[cfg(not(feature = "oracle"))]
    async fn open_source(&self) -> Result<Arc<dyn SourceReader>> {
        Err(crate::error::MigrateError::Config(
            "built without Oracle support; rebuild with --features oracle".to_string(),
        ))
    }

    async fn open_target(&self) -> Result<Arc<dyn TargetWriter>> {
        Ok(Arc::new(
            postgres::PgTarget::connect(&self.config.target, TARGET_POOL_SIZE).await?,
        ))
    }
}
