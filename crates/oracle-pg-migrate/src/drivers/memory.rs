//! In-memory source and target.
//!
//! Both sides honour the same contracts as the real drivers, including
//! per-session search paths and transactional batches, and can be told to
//! fail at specific points. Clones share state, so a test can keep a handle
//! while the engine owns another.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::builder::TargetTable;
use crate::core::schema::Table;
use crate::core::traits::{ConnectionFactory, SourceReader, TargetSession, TargetWriter};
use crate::core::value::{Batch, Row, SqlValue};
use crate::error::{MigrateError, Result};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct SourceState {
    /// schema -> table name -> (definition, rows in row-key order)
    schemas: BTreeMap<String, BTreeMap<String, (Table, Vec<Row>)>>,
    reads: Vec<(String, i64, i64)>,
    fail_reads_at: HashMap<String, i64>,
    error_past_end: bool,
    fail_counts: HashSet<String>,
    fail_scans: HashSet<String>,
    closes: usize,
}

/// In-memory source database.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    state: Arc<Mutex<SourceState>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table (and implicitly its schema) with rows in row-key order.
    pub fn add_table(&self, table: Table, rows: Vec<Row>) {
        let mut state = lock(&self.state);
        state
            .schemas
            .entry(table.schema.clone())
            .or_default()
            .insert(table.name.clone(), (table, rows));
    }

    /// Register an empty schema.
    pub fn add_schema(&self, schema: &str) {
        lock(&self.state).schemas.entry(schema.to_string()).or_default();
    }

    /// Make the read starting at `offset` of `full_name` fail.
    pub fn fail_read_at(&self, full_name: &str, offset: i64) {
        lock(&self.state)
            .fail_reads_at
            .insert(full_name.to_string(), offset);
    }

    /// Raise instead of returning an empty batch for windows past the end.
    pub fn error_past_end(&self, enabled: bool) {
        lock(&self.state).error_past_end = enabled;
    }

    /// Make `count_rows` fail for `full_name`.
    pub fn fail_count(&self, full_name: &str) {
        lock(&self.state).fail_counts.insert(full_name.to_string());
    }

    /// Make the NUL character scan fail for `full_name`.
    pub fn fail_scan(&self, full_name: &str) {
        lock(&self.state).fail_scans.insert(full_name.to_string());
    }

    /// Number of `close` calls across all handles.
    pub fn closes(&self) -> usize {
        lock(&self.state).closes
    }

    /// Windows requested so far for `full_name`, as `(low, high)`.
    pub fn reads(&self, full_name: &str) -> Vec<(i64, i64)> {
        lock(&self.state)
            .reads
            .iter()
            .filter(|(name, _, _)| name == full_name)
            .map(|(_, low, high)| (*low, *high))
            .collect()
    }

    /// Current rows of `full_name`.
    pub fn rows(&self, full_name: &str) -> Vec<Row> {
        let state = lock(&self.state);
        find(&state.schemas, full_name)
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default()
    }
}

fn find<'a>(
    schemas: &'a BTreeMap<String, BTreeMap<String, (Table, Vec<Row>)>>,
    full_name: &str,
) -> Option<&'a (Table, Vec<Row>)> {
    let (schema, table) = full_name.split_once('.')?;
    schemas.get(schema)?.get(table)
}

#[async_trait]
impl SourceReader for MemorySource {
    async fn schema_exists(&self, schema: &str) -> Result<bool> {
        Ok(lock(&self.state).schemas.contains_key(schema))
    }

    async fn reflect_tables(&self, schema: &str) -> Result<Vec<Table>> {
        let state = lock(&self.state);
        let tables = state
            .schemas
            .get(schema)
            .ok_or_else(|| MigrateError::SchemaNotFound(schema.to_string()))?;
        let tables: Vec<Table> = tables.values().map(|(t, _)| t.clone()).collect();
        for table in &tables {
            table.ensure_unique_columns()?;
        }
        Ok(tables)
    }

    async fn read_range(
        &self,
        table: &Table,
        columns: &[String],
        low: i64,
        high: i64,
    ) -> Result<Batch> {
        let full_name = table.full_name();
        let mut state = lock(&self.state);
        state.reads.push((full_name.clone(), low, high));

        if state.fail_reads_at.get(&full_name) == Some(&low) {
            return Err(MigrateError::read(&full_name, "injected read failure"));
        }

        let (definition, rows) = find(&state.schemas, &full_name)
            .ok_or_else(|| MigrateError::read(&full_name, "table does not exist"))?;
        if columns.len() != definition.columns.len() {
            return Err(MigrateError::read(
                &full_name,
                format!("expected {} columns, got {}", definition.columns.len(), columns.len()),
            ));
        }

        let len = rows.len() as i64;
        if low >= len && low > 0 && state.error_past_end {
            return Err(MigrateError::read(&full_name, "offset beyond end of table"));
        }
        let start = low.clamp(0, len) as usize;
        let end = high.clamp(0, len) as usize;
        Ok(Batch::new(rows[start..end.max(start)].to_vec()))
    }

    async fn count_rows(&self, schema: &str, table: &str) -> Result<i64> {
        let full_name = format!("{}.{}", schema, table);
        let state = lock(&self.state);
        if state.fail_counts.contains(&full_name) {
            return Err(MigrateError::Database(format!(
                "count failed for {}",
                full_name
            )));
        }
        find(&state.schemas, &full_name)
            .map(|(_, rows)| rows.len() as i64)
            .ok_or_else(|| MigrateError::Database(format!("table {} does not exist", full_name)))
    }

    async fn scan_null_chars(&self, table: &Table, remove: bool) -> Result<Vec<String>> {
        let full_name = table.full_name();
        let mut state = lock(&self.state);
        if state.fail_scans.contains(&full_name) {
            return Err(MigrateError::read(&full_name, "scan failed"));
        }
        let Some((definition, rows)) = table_mut(&mut state.schemas, &full_name) else {
            return Err(MigrateError::read(&full_name, "table does not exist"));
        };

        let mut affected = Vec::new();
        for (idx, col) in definition.columns.iter().enumerate() {
            if !col.source_type.is_character() {
                continue;
            }
            let mut found = false;
            for row in rows.iter_mut() {
                if let Some(SqlValue::Text(text)) = row.get_mut(idx) {
                    if text.contains('\0') {
                        found = true;
                        if remove {
                            *text = text.replace('\0', "");
                        }
                    }
                }
            }
            if found {
                affected.push(col.name.clone());
            }
        }
        Ok(affected)
    }

    fn db_type(&self) -> &str {
        "memory"
    }

    async fn close(&self) {
        lock(&self.state).closes += 1;
    }
}

fn table_mut<'a>(
    schemas: &'a mut BTreeMap<String, BTreeMap<String, (Table, Vec<Row>)>>,
    full_name: &str,
) -> Option<&'a mut (Table, Vec<Row>)> {
    let (schema, table) = full_name.split_once('.')?;
    schemas.get_mut(schema)?.get_mut(table)
}

/// A table as stored by [`MemoryTarget`].
#[derive(Debug, Clone)]
pub struct StoredTable {
    pub definition: TargetTable,
    pub rows: Vec<Row>,
    pub unlogged: bool,
}

#[derive(Debug, Default)]
struct TargetState {
    schemas: BTreeSet<String>,
    tables: BTreeMap<String, StoredTable>,
    statements: Vec<String>,
    reject_unlogged: bool,
    fail_inserts: HashMap<String, usize>,
    inserts: HashMap<String, usize>,
    fail_counts: HashSet<String>,
}

/// In-memory target database.
#[derive(Debug, Clone, Default)]
pub struct MemoryTarget {
    state: Arc<Mutex<TargetState>>,
}

impl MemoryTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse `SET UNLOGGED`, as on servers that do not support it.
    pub fn reject_unlogged(&self) {
        lock(&self.state).reject_unlogged = true;
    }

    /// Make the `nth` (1-based) bulk insert into `full_name` fail.
    pub fn fail_insert(&self, full_name: &str, nth: usize) {
        lock(&self.state)
            .fail_inserts
            .insert(full_name.to_string(), nth);
    }

    /// Make `count_rows` fail for `full_name`.
    pub fn fail_count(&self, full_name: &str) {
        lock(&self.state).fail_counts.insert(full_name.to_string());
    }

    pub fn has_schema(&self, schema: &str) -> bool {
        lock(&self.state).schemas.contains(schema)
    }

    /// Snapshot of a stored table.
    pub fn table(&self, full_name: &str) -> Option<StoredTable> {
        lock(&self.state).tables.get(full_name).cloned()
    }

    /// Every statement-like action in execution order.
    pub fn statements(&self) -> Vec<String> {
        lock(&self.state).statements.clone()
    }

    /// Number of bulk inserts attempted against `full_name`.
    pub fn insert_attempts(&self, full_name: &str) -> usize {
        lock(&self.state)
            .inserts
            .get(full_name)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl TargetWriter for MemoryTarget {
    async fn open_session(&self) -> Result<Box<dyn TargetSession>> {
        Ok(Box::new(MemorySession {
            state: Arc::clone(&self.state),
            search_path: None,
            in_transaction: false,
            pending: Vec::new(),
        }))
    }

    async fn create_schema(&self, schema: &str) -> Result<()> {
        let mut state = lock(&self.state);
        state.schemas.insert(schema.to_string());
        state
            .statements
            .push(crate::builder::ddl::create_schema(schema));
        Ok(())
    }

    async fn execute_ddl(&self, statement: &str) -> Result<()> {
        lock(&self.state).statements.push(statement.to_string());
        Ok(())
    }

    async fn create_table(&self, table: &TargetTable) -> Result<()> {
        let mut state = lock(&self.state);
        if !state.schemas.contains(&table.schema) {
            return Err(MigrateError::Ddl {
                schema: table.schema.clone(),
                message: format!("schema \"{}\" does not exist", table.schema),
            });
        }
        let full_name = table.full_name();
        if state.tables.contains_key(&full_name) {
            return Err(MigrateError::Ddl {
                schema: table.schema.clone(),
                message: format!("relation \"{}\" already exists", table.name),
            });
        }
        state.statements.push(crate::builder::ddl::create_table(table));
        state.tables.insert(
            full_name,
            StoredTable {
                definition: table.clone(),
                rows: Vec::new(),
                unlogged: false,
            },
        );
        Ok(())
    }

    async fn count_rows(&self, schema: &str, table: &str) -> Result<i64> {
        let full_name = format!("{}.{}", schema, table);
        let state = lock(&self.state);
        if state.fail_counts.contains(&full_name) {
            return Err(MigrateError::Database(format!(
                "count failed for {}",
                full_name
            )));
        }
        state
            .tables
            .get(&full_name)
            .map(|t| t.rows.len() as i64)
            .ok_or_else(|| {
                MigrateError::Database(format!("relation \"{}\" does not exist", full_name))
            })
    }

    fn db_type(&self) -> &str {
        "memory"
    }

    async fn close(&self) {}
}

/// Session on a [`MemoryTarget`]. Inserts inside a transaction become
/// visible on commit and vanish on rollback.
pub struct MemorySession {
    state: Arc<Mutex<TargetState>>,
    search_path: Option<String>,
    in_transaction: bool,
    pending: Vec<(String, Vec<Row>)>,
}

impl MemorySession {
    fn resolve(&self, table: &str) -> Result<String> {
        let schema = self
            .search_path
            .as_ref()
            .ok_or_else(|| MigrateError::write(table, "no search_path set"))?;
        Ok(format!("{}.{}", schema, table))
    }

    fn record(&self, statement: String) {
        lock(&self.state).statements.push(statement);
    }
}

#[async_trait]
impl TargetSession for MemorySession {
    async fn set_search_path(&mut self, schema: &str) -> Result<()> {
        self.search_path = Some(schema.to_string());
        self.record(format!("SET search_path TO {}", schema));
        Ok(())
    }

    async fn set_table_unlogged(&mut self, table: &str) -> Result<()> {
        let full_name = self.resolve(table)?;
        let mut state = lock(&self.state);
        if state.reject_unlogged {
            return Err(MigrateError::write(
                &full_name,
                "unlogged tables are not supported",
            ));
        }
        let stored = state
            .tables
            .get_mut(&full_name)
            .ok_or_else(|| MigrateError::write(&full_name, "relation does not exist"))?;
        stored.unlogged = true;
        state
            .statements
            .push(crate::builder::ddl::set_unlogged(table));
        Ok(())
    }

    async fn set_table_logged(&mut self, table: &str) -> Result<()> {
        let full_name = self.resolve(table)?;
        let mut state = lock(&self.state);
        let stored = state
            .tables
            .get_mut(&full_name)
            .ok_or_else(|| MigrateError::write(&full_name, "relation does not exist"))?;
        stored.unlogged = false;
        state.statements.push(crate::builder::ddl::set_logged(table));
        Ok(())
    }

    async fn begin(&mut self) -> Result<()> {
        self.in_transaction = true;
        self.record("BEGIN".to_string());
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        let pending = std::mem::take(&mut self.pending);
        let mut state = lock(&self.state);
        for (full_name, rows) in pending {
            if let Some(stored) = state.tables.get_mut(&full_name) {
                stored.rows.extend(rows);
            }
        }
        state.statements.push("COMMIT".to_string());
        self.in_transaction = false;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.pending.clear();
        self.in_transaction = false;
        self.record("ROLLBACK".to_string());
        Ok(())
    }

    async fn set_session_flag(&mut self, name: &str, value: &str) -> Result<()> {
        self.record(format!("SET {} = {}", name, value));
        Ok(())
    }

    async fn bulk_insert(&mut self, table: &str, columns: &[String], batch: &Batch) -> Result<u64> {
        let full_name = self.resolve(table)?;
        let mut state = lock(&self.state);

        let attempt = {
            let counter = state.inserts.entry(full_name.clone()).or_insert(0);
            *counter += 1;
            *counter
        };
        if state.fail_inserts.get(&full_name) == Some(&attempt) {
            return Err(MigrateError::write(&full_name, "injected write failure"));
        }

        let stored = state
            .tables
            .get(&full_name)
            .ok_or_else(|| MigrateError::write(&full_name, "relation does not exist"))?;
        if columns.len() != stored.definition.columns.len() {
            return Err(MigrateError::write(
                &full_name,
                format!(
                    "column count mismatch: table has {}, insert names {}",
                    stored.definition.columns.len(),
                    columns.len()
                ),
            ));
        }
        if let Some(row) = batch.rows.iter().find(|r| r.len() != columns.len()) {
            return Err(MigrateError::write(
                &full_name,
                format!("row has {} values for {} columns", row.len(), columns.len()),
            ));
        }

        state
            .statements
            .push(format!("COPY {} ({} rows)", table, batch.len()));
        drop(state);

        if self.in_transaction {
            self.pending.push((full_name, batch.rows.clone()));
        } else {
            let mut state = lock(&self.state);
            if let Some(stored) = state.tables.get_mut(&full_name) {
                stored.rows.extend(batch.rows.iter().cloned());
            }
        }
        Ok(batch.len() as u64)
    }
}

#[derive(Debug, Default)]
struct FactoryState {
    source_opens: usize,
    target_opens: usize,
    fail_target_opens_from: Option<usize>,
}

/// Hands out handles sharing one in-memory source and target.
#[derive(Debug, Clone, Default)]
pub struct MemoryFactory {
    pub source: MemorySource,
    pub target: MemoryTarget,
    state: Arc<Mutex<FactoryState>>,
}

impl MemoryFactory {
    pub fn new(source: MemorySource, target: MemoryTarget) -> Self {
        Self {
            source,
            target,
            state: Arc::default(),
        }
    }

    /// Fail the `nth` (1-based) and every later `open_target`.
    pub fn fail_target_opens_from(&self, nth: usize) {
        lock(&self.state).fail_target_opens_from = Some(nth);
    }

    /// Number of sources handed out so far.
    pub fn source_opens(&self) -> usize {
        lock(&self.state).source_opens
    }
}

#[async_trait]
impl ConnectionFactory for MemoryFactory {
    async fn open_source(&self) -> Result<Arc<dyn SourceReader>> {
        lock(&self.state).source_opens += 1;
        Ok(Arc::new(self.source.clone()))
    }

    async fn open_target(&self) -> Result<Arc<dyn TargetWriter>> {
        let mut state = lock(&self.state);
        state.target_opens += 1;
        if state.fail_target_opens_from.is_some_and(|nth| state.target_opens >= nth) {
            return Err(MigrateError::pool(
                format!("target connection {} refused", state.target_opens),
                "opening memory target",
            ));
        }
        Ok(Arc::new(self.target.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::{Column, SourceType};

    fn table() -> Table {
        Table::new("s", "t", vec![Column::new("v", SourceType::Text)])
    }

    fn rows(n: usize) -> Vec<Row> {
        (0..n).map(|i| vec![SqlValue::Text(i.to_string())]).collect()
    }

    #[tokio::test]
    async fn test_read_range_windows() {
        let source = MemorySource::new();
        source.add_table(table(), rows(5));
        let cols = vec!["v".to_string()];

        assert_eq!(source.read_range(&table(), &cols, 0, 3).await.unwrap().len(), 3);
        assert_eq!(source.read_range(&table(), &cols, 3, 6).await.unwrap().len(), 2);
        assert!(source.read_range(&table(), &cols, 6, 9).await.unwrap().is_empty());
        assert_eq!(source.reads("s.t"), vec![(0, 3), (3, 6), (6, 9)]);

        source.error_past_end(true);
        assert!(source.read_range(&table(), &cols, 6, 9).await.is_err());
    }

    #[tokio::test]
    async fn test_transaction_visibility() {
        let target = MemoryTarget::new();
        target.create_schema("s").await.unwrap();
        let prepared = crate::builder::prepare_table(
            &table(),
            &crate::typemap::TypeTranslator::default(),
            &crate::events::CollectingSink::new(),
        );
        target.create_table(&prepared).await.unwrap();

        let mut session = target.open_session().await.unwrap();
        session.set_search_path("s").await.unwrap();
        let cols = vec!["v".to_string()];

        session.begin().await.unwrap();
        session.bulk_insert("t", &cols, &Batch::new(rows(2))).await.unwrap();
        assert_eq!(target.count_rows("s", "t").await.unwrap(), 0);
        session.commit().await.unwrap();
        assert_eq!(target.count_rows("s", "t").await.unwrap(), 2);

        session.begin().await.unwrap();
        session.bulk_insert("t", &cols, &Batch::new(rows(3))).await.unwrap();
        session.rollback().await.unwrap();
        assert_eq!(target.count_rows("s", "t").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_scan_and_strip_null_chars() {
        let source = MemorySource::new();
        source.add_table(table(), vec![vec![SqlValue::Text("a\0b".into())]]);

        assert_eq!(source.scan_null_chars(&table(), false).await.unwrap(), vec!["v"]);
        assert_eq!(source.scan_null_chars(&table(), true).await.unwrap(), vec!["v"]);
        assert!(source.scan_null_chars(&table(), false).await.unwrap().is_empty());
        assert_eq!(source.rows("s.t"), vec![vec![SqlValue::Text("ab".into())]]);
    }
}
