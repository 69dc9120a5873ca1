//! PostgreSQL target writer.
//!
//! Uses deadpool-postgres for connection pooling. Each copy session holds one
//! pooled connection for the whole table so session settings stick.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod};
use futures::SinkExt;
use tokio_postgres::Config as PgConfig;
use tracing::{debug, info, warn};

use crate::builder::ddl::{qualify_table, quote_ident};
use crate::builder::{ddl, TargetTable};
use crate::config::TargetConfig;
use crate::core::traits::{TargetSession, TargetWriter};
use crate::core::value::Batch;
use crate::drivers::common::{SslMode, TlsBuilder};
use crate::error::{MigrateError, Result};

use super::copy::encode_row;

/// Connection pool timeout.
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Build a pool against `database` on the target server.
pub fn build_pool(config: &TargetConfig, database: &str, max_conns: usize) -> Result<Pool> {
    let mut pg_config = PgConfig::new();
    pg_config.host(&config.host);
    pg_config.port(config.port);
    pg_config.dbname(database);
    pg_config.user(&config.user);
    pg_config.password(&config.password);
    pg_config.keepalives(true);
    pg_config.keepalives_idle(Duration::from_secs(30));
    pg_config.connect_timeout(POOL_CONNECTION_TIMEOUT);

    let mgr_config = ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    };

    let ssl_mode = SslMode::parse(&config.ssl_mode)?;
    let manager = match TlsBuilder::new(ssl_mode).build() {
        Some(tls) => Manager::from_config(pg_config, tls, mgr_config),
        None => {
            warn!("PostgreSQL TLS is disabled. Credentials will be transmitted in plaintext.");
            Manager::from_config(pg_config, tokio_postgres::NoTls, mgr_config)
        }
    };

    Pool::builder(manager)
        .max_size(max_conns.max(1))
        .build()
        .map_err(|e| MigrateError::pool(e, "creating PostgreSQL target pool"))
}

/// PostgreSQL target.
pub struct PgTarget {
    pool: Pool,
}

impl PgTarget {
    /// Connect to the configured target database.
    pub async fn connect(config: &TargetConfig, max_conns: usize) -> Result<Self> {
        let pool = build_pool(config, &config.database, max_conns)?;

        let client = pool
            .get()
            .await
            .map_err(|e| MigrateError::pool(e, "testing PostgreSQL target connection"))?;
        client.simple_query("SELECT 1").await?;

        info!(
            "Connected to PostgreSQL target: {}:{}/{}",
            config.host, config.port, config.database
        );
        Ok(Self { pool })
    }

    async fn client(&self) -> Result<Object> {
        self.pool
            .get()
            .await
            .map_err(|e| MigrateError::pool(e, "getting PostgreSQL connection"))
    }
}

#[async_trait]
impl TargetWriter for PgTarget {
    async fn open_session(&self) -> Result<Box<dyn TargetSession>> {
        Ok(Box::new(PgSession {
            client: self.client().await?,
        }))
    }

    async fn create_schema(&self, schema: &str) -> Result<()> {
        let client = self.client().await?;
        client.batch_execute(&ddl::create_schema(schema)).await?;
        debug!("Created schema '{}'", schema);
        Ok(())
    }

    async fn execute_ddl(&self, statement: &str) -> Result<()> {
        let client = self.client().await?;
        client.batch_execute(statement).await?;
        Ok(())
    }

    async fn create_table(&self, table: &TargetTable) -> Result<()> {
        let client = self.client().await?;
        client
            .batch_execute(&ddl::create_table(table))
            .await
            .map_err(|e| MigrateError::Ddl {
                schema: table.schema.clone(),
                message: format!("{}: {}", table.name, e),
            })
    }

    async fn count_rows(&self, schema: &str, table: &str) -> Result<i64> {
        let client = self.client().await?;
        let sql = format!("SELECT COUNT(*)::int8 FROM {}", qualify_table(schema, table));
        let row = client.query_one(&sql, &[]).await?;
        Ok(row.get::<_, i64>(0))
    }

    fn db_type(&self) -> &str {
        "postgres"
    }

    async fn close(&self) {
        self.pool.close();
    }
}

/// A pooled connection dedicated to one table copy.
pub struct PgSession {
    client: Object,
}

#[async_trait]
impl TargetSession for PgSession {
    async fn set_search_path(&mut self, schema: &str) -> Result<()> {
        self.client
            .batch_execute(&format!("SET search_path TO {}", quote_ident(schema)))
            .await?;
        Ok(())
    }

    async fn set_table_unlogged(&mut self, table: &str) -> Result<()> {
        self.client
            .batch_execute(&ddl::set_unlogged(table))
            .await
            .map_err(|e| MigrateError::write(table, e))
    }

    async fn set_table_logged(&mut self, table: &str) -> Result<()> {
        self.client
            .batch_execute(&ddl::set_logged(table))
            .await
            .map_err(|e| MigrateError::write(table, e))
    }

    async fn begin(&mut self) -> Result<()> {
        self.client.batch_execute("BEGIN").await?;
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.client.batch_execute("COMMIT").await?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.client.batch_execute("ROLLBACK").await?;
        Ok(())
    }

    async fn set_session_flag(&mut self, name: &str, value: &str) -> Result<()> {
        self.client
            .batch_execute(&format!("SET {} = {}", name, value))
            .await?;
        Ok(())
    }

    async fn bulk_insert(&mut self, table: &str, columns: &[String], batch: &Batch) -> Result<u64> {
        if batch.is_empty() {
            return Ok(0);
        }

        let col_list: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
        let copy_sql = format!(
            "COPY {} ({}) FROM STDIN WITH (FORMAT TEXT)",
            quote_ident(table),
            col_list.join(", ")
        );

        let mut text = String::with_capacity(batch.len() * 128);
        for row in &batch.rows {
            encode_row(&mut text, row);
        }

        let sink = self
            .client
            .copy_in(&copy_sql)
            .await
            .map_err(|e| MigrateError::write(table, e))?;
        tokio::pin!(sink);
        sink.send(bytes::Bytes::from(text))
            .await
            .map_err(|e| MigrateError::write(table, e))?;
        let written = sink
            .finish()
            .await
            .map_err(|e| MigrateError::write(table, e))?;

        Ok(written)
    }
}
