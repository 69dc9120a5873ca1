//! Core traits the migration engine talks to.
//!
//! - [`SourceReader`]: reflects schema and reads row windows from the source
//! - [`TargetWriter`]: creates schema objects and hands out write sessions
//! - [`TargetSession`]: one target connection with its session state
//! - [`ConnectionFactory`]: opens a fresh handle pair for each schema worker

use async_trait::async_trait;
use std::sync::Arc;

use crate::builder::{ddl, TargetTable};
use crate::error::Result;

use super::schema::Table;
use super::value::Batch;

/// Read schema metadata and data from the source database.
#[async_trait]
pub trait SourceReader: Send + Sync {
    /// Whether `schema` exists on the source.
    async fn schema_exists(&self, schema: &str) -> Result<bool>;

    /// Reflect every table in `schema`, columns in ordinal order.
    async fn reflect_tables(&self, schema: &str) -> Result<Vec<Table>>;

    /// Read rows `[low, high)` of `table` ordered by its row key.
    ///
    /// `columns` are the already-rendered select expressions. A window past
    /// the end of the table yields an empty batch (some drivers raise
    /// instead, which the copy engine treats as end of data).
    async fn read_range(&self, table: &Table, columns: &[String], low: i64, high: i64)
        -> Result<Batch>;

    /// Exact row count.
    async fn count_rows(&self, schema: &str, table: &str) -> Result<i64>;

    /// Find character columns of `table` holding NUL characters.
    ///
    /// Returns the affected column names. With `remove`, the characters are
    /// stripped in place on the source.
    async fn scan_null_chars(&self, table: &Table, remove: bool) -> Result<Vec<String>>;

    /// Get the database type identifier (e.g., "oracle").
    fn db_type(&self) -> &str;

    /// Release the connection.
    async fn close(&self);
}

/// Write schema objects and data to the target database.
#[async_trait]
pub trait TargetWriter: Send + Sync {
    /// Open a dedicated session. Session settings (search path, role) stay
    /// on that session until it is dropped.
    async fn open_session(&self) -> Result<Box<dyn TargetSession>>;

    /// `CREATE SCHEMA IF NOT EXISTS`.
    async fn create_schema(&self, schema: &str) -> Result<()>;

    /// Execute a single DDL statement.
    async fn execute_ddl(&self, statement: &str) -> Result<()>;

    /// Create a table. Fails if it already exists.
    async fn create_table(&self, table: &TargetTable) -> Result<()> {
        self.execute_ddl(&ddl::create_table(table)).await
    }

    /// Exact row count.
    async fn count_rows(&self, schema: &str, table: &str) -> Result<i64>;

    /// Get the database type identifier (e.g., "postgres").
    fn db_type(&self) -> &str;

    /// Close the connection pool.
    async fn close(&self);
}

/// One target connection used for a table copy.
#[async_trait]
pub trait TargetSession: Send {
    /// Resolve unqualified table names in `schema`.
    async fn set_search_path(&mut self, schema: &str) -> Result<()>;

    /// `ALTER TABLE .. SET UNLOGGED`.
    async fn set_table_unlogged(&mut self, table: &str) -> Result<()>;

    /// `ALTER TABLE .. SET LOGGED`.
    async fn set_table_logged(&mut self, table: &str) -> Result<()>;

    async fn begin(&mut self) -> Result<()>;

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;

    /// `SET name = value` for the rest of the session.
    async fn set_session_flag(&mut self, name: &str, value: &str) -> Result<()>;

    /// Insert every row of `batch` into `table` (resolved via the search path).
    /// Returns the number of rows written.
    async fn bulk_insert(&mut self, table: &str, columns: &[String], batch: &Batch) -> Result<u64>;
}

/// Opens connected handles for a schema worker.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    async fn open_source(&self) -> Result<Arc<dyn SourceReader>>;

    async fn open_target(&self) -> Result<Arc<dyn TargetWriter>>;
}
