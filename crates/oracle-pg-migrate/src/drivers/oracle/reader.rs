//! ODBC-backed [`SourceReader`] for Oracle.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use odbc_api::buffers::TextRowSet;
use odbc_api::{Connection, ConnectionOptions, Cursor, Environment, ResultSetMetadata};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::SourceConfig;
use crate::core::schema::{Column, SourceType, Table};
use crate::core::traits::SourceReader;
use crate::core::value::{Batch, SqlValue};
use crate::error::{MigrateError, Result};

use super::catalog::{self, normalize_name};

/// Rows fetched per ODBC round trip.
const FETCH_ROWS: usize = 5000;
/// Longest text value fetched; longer values fail the read instead of truncating.
const MAX_TEXT_BYTES: usize = 1024 * 1024;

type TextRows = Vec<Vec<Option<String>>>;

/// Oracle source.
pub struct OracleReader {
    env: Arc<Environment>,
    connection_string: String,
    /// ODBC handles are used from one task at a time.
    conn_mutex: Mutex<()>,
}

impl OracleReader {
    /// Create the ODBC environment and test the connection.
    pub fn connect(config: &SourceConfig) -> Result<Self> {
        let env = Environment::new().map_err(|e| {
            MigrateError::pool(
                format!(
                    "Failed to create ODBC environment: {}. Make sure unixODBC and the \
                     Oracle ODBC driver are installed.",
                    e
                ),
                "ODBC environment",
            )
        })?;
        let connection_string = config.connection_string();

        {
            let conn = env
                .connect_with_connection_string(&connection_string, ConnectionOptions::default())
                .map_err(|e| {
                    MigrateError::pool(
                        format!("Failed to connect to Oracle via ODBC: {}", e),
                        "ODBC connection",
                    )
                })?;
            conn.execute("SELECT 1 FROM dual", ())?;
        }

        info!(
            "Connected to Oracle via ODBC ({}): {}:{}/{}",
            config.driver, config.host, config.port, config.service_name
        );

        Ok(Self {
            env: Arc::new(env),
            connection_string,
            conn_mutex: Mutex::new(()),
        })
    }

    fn connection(&self) -> Result<Connection<'_>> {
        self.env
            .connect_with_connection_string(&self.connection_string, ConnectionOptions::default())
            .map_err(|e| MigrateError::pool(e, "getting ODBC connection"))
    }

    /// Run `sql` and return every row as text.
    fn query_text(&self, sql: &str) -> Result<TextRows> {
        let conn = self.connection()?;
        let mut rows = Vec::new();

        let Some(mut cursor) = conn.execute(sql, ())? else {
            return Ok(rows);
        };
        let num_cols = cursor.num_result_cols()? as usize;
        let mut buffers = TextRowSet::for_cursor(FETCH_ROWS, &mut cursor, Some(MAX_TEXT_BYTES))?;
        let mut row_cursor = cursor.bind_buffer(&mut buffers)?;

        while let Some(batch) = row_cursor.fetch_with_truncation_check(true)? {
            for row_idx in 0..batch.num_rows() {
                let row = (0..num_cols)
                    .map(|col_idx| {
                        batch
                            .at(col_idx, row_idx)
                            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
                    })
                    .collect();
                rows.push(row);
            }
        }
        Ok(rows)
    }

    fn query_count(&self, sql: &str) -> Result<i64> {
        let rows = self.query_text(sql)?;
        rows.first()
            .and_then(|r| r.first())
            .and_then(|v| v.as_deref())
            .and_then(|s| s.trim().parse().ok())
            .ok_or_else(|| MigrateError::Source(format!("no count returned by: {}", sql)))
    }

    fn reflect_tables_sync(&self, schema: &str) -> Result<Vec<Table>> {
        let extraction = |e: MigrateError| MigrateError::SchemaExtraction(format!("{}: {}", schema, e));

        let names = self.query_text(&catalog::tables_sql(schema)).map_err(extraction)?;
        let mut tables: Vec<Table> = names
            .into_iter()
            .filter_map(|row| row.into_iter().next().flatten())
            .map(|name| Table::new(schema, normalize_name(&name), Vec::new()))
            .collect();
        let index: HashMap<String, usize> = tables
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name.clone(), i))
            .collect();

        for row in self.query_text(&catalog::columns_sql(schema)).map_err(extraction)? {
            let Some(&i) = field(&row, 0).and_then(|t| index.get(&normalize_name(t))) else {
                continue;
            };
            let Some(name) = field(&row, 1) else { continue };
            let data_type = field(&row, 2).unwrap_or_default();
            let source_type =
                SourceType::from_catalog(data_type, int(&row, 3), int(&row, 4), int(&row, 5));
            tables[i].columns.push(Column {
                name: normalize_name(name),
                data_type: data_type.to_string(),
                source_type,
                is_nullable: field(&row, 6) != Some("N"),
                default: None,
                server_default: field(&row, 7)
                    .map(str::trim)
                    .filter(|d| !d.is_empty())
                    .map(str::to_string),
                ordinal_pos: int(&row, 8).unwrap_or(0),
            });
        }

        for row in self.query_text(&catalog::references_sql(schema)).map_err(extraction)? {
            if let (Some(child), Some(parent)) = (field(&row, 0), field(&row, 1)) {
                if let Some(&i) = index.get(&normalize_name(child)) {
                    tables[i].references.push(normalize_name(parent));
                }
            }
        }

        for row in self.query_text(&catalog::constraint_counts_sql(schema)).map_err(extraction)? {
            if let Some(&i) = field(&row, 0).and_then(|t| index.get(&normalize_name(t))) {
                tables[i].constraint_count = int(&row, 1).unwrap_or(0) as usize;
            }
        }
        for row in self.query_text(&catalog::index_counts_sql(schema)).map_err(extraction)? {
            if let Some(&i) = field(&row, 0).and_then(|t| index.get(&normalize_name(t))) {
                tables[i].index_count = int(&row, 1).unwrap_or(0) as usize;
            }
        }

        for table in &tables {
            table.ensure_unique_columns()?;
        }
        debug!("Schema {}: reflected {} tables", schema, tables.len());
        Ok(tables)
    }

    fn read_range_sync(&self, table: &Table, columns: &[String], low: i64, high: i64) -> Result<Batch> {
        let sql = catalog::read_range_sql(&table.schema, &table.name, columns, low, high);
        let rows = self
            .query_text(&sql)
            .map_err(|e| MigrateError::read(table.full_name(), e))?;

        let rows = rows
            .into_iter()
            .map(|row| {
                row.iter()
                    .zip(&table.columns)
                    .map(|(value, col)| SqlValue::from_source_text(value.as_deref(), &col.source_type))
                    .collect()
            })
            .collect();
        Ok(Batch::new(rows))
    }

    fn scan_null_chars_sync(&self, table: &Table, remove: bool) -> Result<Vec<String>> {
        let mut affected = Vec::new();
        for col in table.columns.iter().filter(|c| c.source_type.is_character()) {
            let sql = catalog::has_null_chars_sql(&table.schema, &table.name, &col.name);
            if self.query_count(&sql)? == 0 {
                continue;
            }
            if remove {
                let conn = self.connection()?;
                conn.execute(
                    &catalog::strip_null_chars_sql(&table.schema, &table.name, &col.name),
                    (),
                )?;
            }
            affected.push(col.name.clone());
        }
        Ok(affected)
    }
}

fn field(row: &[Option<String>], idx: usize) -> Option<&str> {
    row.get(idx).and_then(|v| v.as_deref())
}

fn int(row: &[Option<String>], idx: usize) -> Option<i32> {
    field(row, idx).and_then(|s| s.trim().parse().ok())
}

#[async_trait]
impl SourceReader for OracleReader {
    async fn schema_exists(&self, schema: &str) -> Result<bool> {
        let _lock = self.conn_mutex.lock().await;
        Ok(self.query_count(&catalog::schema_exists_sql(schema))? > 0)
    }

    async fn reflect_tables(&self, schema: &str) -> Result<Vec<Table>> {
        let _lock = self.conn_mutex.lock().await;
        self.reflect_tables_sync(schema)
    }

    async fn read_range(
        &self,
        table: &Table,
        columns: &[String],
        low: i64,
        high: i64,
    ) -> Result<Batch> {
        let _lock = self.conn_mutex.lock().await;
        self.read_range_sync(table, columns, low, high)
    }

    async fn count_rows(&self, schema: &str, table: &str) -> Result<i64> {
        let _lock = self.conn_mutex.lock().await;
        self.query_count(&catalog::count_sql(schema, table))
    }

    async fn scan_null_chars(&self, table: &Table, remove: bool) -> Result<Vec<String>> {
        let _lock = self.conn_mutex.lock().await;
        self.scan_null_chars_sync(table, remove)
    }

    fn db_type(&self) -> &str {
        "oracle"
    }

    async fn close(&self) {
        // Connections are opened per call and dropped with it.
    }
}
