//! Migration orchestrator - main workflow coordinator.
//!
//! A run validates the configuration, checks the source schemas, scans for
//! NUL characters, builds the target schemas and then copies schemas through
//! a bounded worker pool. Each worker opens its own source/target handles.

mod order;

pub use order::dependency_order;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::builder::build_schema;
use crate::config::{Config, SystemResources};
use crate::core::traits::{ConnectionFactory, SourceReader, TargetWriter};
use crate::error::{MigrateError, Result};
use crate::events::{SharedSink, TracingSink};
use crate::scan;
use crate::transfer::{CopyOptions, CopyResult, CopyStatus, TransferEngine};
use crate::typemap::TypeTranslator;
use crate::verify::{check_migration, CheckReport};

/// Per-invocation switches that are not part of the configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Create the target schemas and tables before copying.
    pub build_schema: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self { build_schema: true }
    }
}

/// Migration orchestrator.
pub struct Orchestrator {
    config: Config,
    factory: Arc<dyn ConnectionFactory>,
    sink: SharedSink,
    cancel: CancellationToken,
    options: RunOptions,
}

/// Outcome of one schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaOutcome {
    pub schema: String,

    /// One entry per table, in copy order.
    pub tables: Vec<CopyResult>,

    /// Set when the schema could not be built or copied at all.
    pub error: Option<String>,
}

/// Outcome of building one schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildOutcome {
    pub schema: String,
    pub tables: Vec<String>,
    pub error: Option<String>,
}

/// Result of a migration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationResult {
    /// Unique run identifier.
    pub run_id: String,

    /// Final status: completed, completed_with_errors or cancelled.
    pub status: String,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// When the migration started.
    pub started_at: DateTime<Utc>,

    /// When the migration completed.
    pub completed_at: DateTime<Utc>,

    /// Per-schema outcomes, in configuration order.
    pub schemas: Vec<SchemaOutcome>,

    /// Total tables processed.
    pub tables_total: usize,

    /// Tables copied without being aborted.
    pub tables_success: usize,

    /// Tables whose copy was aborted.
    pub tables_failed: usize,

    /// Total rows copied.
    pub rows_copied: i64,

    /// Average throughput (rows/second).
    pub rows_per_second: i64,

    /// List of failed table names.
    pub failed_tables: Vec<String>,

    /// Schemas that failed to build or copy.
    pub failed_schemas: Vec<String>,

    /// Row-count check, when enabled.
    pub check: Option<CheckReport>,
}

impl MigrationResult {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Any table or schema failed, or the row counts disagree.
    pub fn has_failures(&self) -> bool {
        !self.failed_tables.is_empty()
            || !self.failed_schemas.is_empty()
            || self.check.as_ref().is_some_and(|c| !c.is_consistent())
    }
}

/// Connectivity of both sides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub source_connected: bool,
    pub source_latency_ms: u64,
    pub source_error: Option<String>,
    pub target_connected: bool,
    pub target_latency_ms: u64,
    pub target_error: Option<String>,
    pub healthy: bool,
}

impl Orchestrator {
    /// Create a new orchestrator. Connections are opened lazily per operation.
    pub fn new(config: Config, factory: Arc<dyn ConnectionFactory>) -> Self {
        Self {
            config,
            factory,
            sink: Arc::new(TracingSink),
            cancel: CancellationToken::new(),
            options: RunOptions::default(),
        }
    }

    /// Send progress events to `sink` instead of the log.
    pub fn with_sink(mut self, sink: SharedSink) -> Self {
        self.sink = sink;
        self
    }

    /// Stop cooperatively once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run the migration.
    ///
    /// Configuration errors, missing schemas and NUL characters (under the
    /// `check` policy) fail the run before any DDL. Failures after that are
    /// recorded in the result and the run carries on.
    pub async fn run(&self) -> Result<MigrationResult> {
        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        info!("Starting migration run: {}", run_id);

        self.config.validate()?;
        let schemas = self.config.source.schemas.clone();
        let migration = &self.config.migration;

        let (source, target) = open_connections(self.factory.as_ref()).await?;

        let prepared = self.prepare(&schemas, source.as_ref(), target.as_ref()).await;
        let (ready, mut outcomes) = match prepared {
            Ok(split) => split,
            Err(e) => {
                source.close().await;
                target.close().await;
                return Err(e);
            }
        };

        if migration.workers == Some(crate::config::Parallelism::Auto) {
            SystemResources::detect().log();
        }
        let workers = migration.worker_count(ready.len());
        let options = CopyOptions::from_config(migration);
        info!(
            "Copying {} schemas with {} workers (batch size {})",
            ready.len(),
            workers,
            options.batch_size
        );

        outcomes.extend(self.copy_schemas(&ready, workers, options).await);

        let check = if migration.verify && !self.cancel.is_cancelled() {
            info!("Checking row counts");
            Some(check_migration(source.as_ref(), target.as_ref(), &ready, self.sink.as_ref()).await)
        } else {
            None
        };

        source.close().await;
        target.close().await;

        // Keep configuration order in the report.
        outcomes.sort_by_key(|o| schemas.iter().position(|s| *s == o.schema));

        let result = summarize(run_id, started_at, outcomes, check, self.cancel.is_cancelled());
        info!(
            "Migration {}: {} tables, {} rows in {:.1}s ({} rows/s)",
            result.status,
            result.tables_total,
            result.rows_copied,
            result.duration_seconds,
            result.rows_per_second
        );
        Ok(result)
    }

    /// Pre-copy phases. Returns the schemas ready to copy and the outcomes
    /// of schemas that failed to build.
    async fn prepare(
        &self,
        schemas: &[String],
        source: &dyn SourceReader,
        target: &dyn TargetWriter,
    ) -> Result<(Vec<String>, Vec<SchemaOutcome>)> {
        ensure_schemas_exist(source, schemas).await?;

        scan::enforce_policy(
            self.config.migration.null_chars,
            source,
            schemas,
            self.sink.as_ref(),
        )
        .await?;

        if !self.options.build_schema {
            info!("Skipping schema build");
            return Ok((schemas.to_vec(), Vec::new()));
        }

        let mut ready = Vec::new();
        let mut failed = Vec::new();
        for outcome in self.build_each(schemas, source, target).await {
            match outcome.error {
                None => ready.push(outcome.schema),
                Some(error) => failed.push(SchemaOutcome {
                    schema: outcome.schema,
                    tables: Vec::new(),
                    error: Some(error),
                }),
            }
        }
        Ok((ready, failed))
    }

    async fn build_each(
        &self,
        schemas: &[String],
        source: &dyn SourceReader,
        target: &dyn TargetWriter,
    ) -> Vec<BuildOutcome> {
        let translator = TypeTranslator::new(self.config.migration.timestamp_with_time_zone);
        let mut outcomes = Vec::with_capacity(schemas.len());

        for schema in schemas {
            let outcome = match build_schema(schema, source, target, &translator, self.sink.as_ref()).await {
                Ok(tables) => BuildOutcome {
                    schema: schema.clone(),
                    tables: tables.iter().map(|t| t.name.clone()).collect(),
                    error: None,
                },
                Err(e) => {
                    self.sink
                        .error(&format!("Schema {} will not be copied: {}", schema, e));
                    BuildOutcome {
                        schema: schema.clone(),
                        tables: Vec::new(),
                        error: Some(e.to_string()),
                    }
                }
            };
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Fan schemas out over at most `workers` concurrent tasks.
    async fn copy_schemas(
        &self,
        schemas: &[String],
        workers: usize,
        options: CopyOptions,
    ) -> Vec<SchemaOutcome> {
        let semaphore = Arc::new(Semaphore::new(workers.max(1)));
        let mut handles = Vec::new();
        let mut outcomes = Vec::new();

        for schema in schemas {
            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    info!("Cancellation requested, not starting schema {}", schema);
                    outcomes.push(SchemaOutcome {
                        schema: schema.clone(),
                        tables: Vec::new(),
                        error: Some(MigrateError::Cancelled.to_string()),
                    });
                    continue;
                }
                permit = semaphore.clone().acquire_owned() => permit,
            };
            let permit = match permit {
                Ok(permit) => permit,
                Err(e) => {
                    outcomes.push(SchemaOutcome {
                        schema: schema.clone(),
                        tables: Vec::new(),
                        error: Some(e.to_string()),
                    });
                    continue;
                }
            };

            let factory = Arc::clone(&self.factory);
            let sink = Arc::clone(&self.sink);
            let cancel = self.cancel.clone();
            let name = schema.clone();

            let handle = tokio::spawn(async move {
                let _permit = permit;
                let result = async {
                    let (source, target) = open_connections(factory.as_ref()).await?;
                    let copied = migrate_schema(
                        &name,
                        Arc::clone(&source),
                        Arc::clone(&target),
                        options,
                        sink,
                        cancel,
                    )
                    .await;
                    source.close().await;
                    target.close().await;
                    copied
                }
                .await;
                (name, result)
            });
            handles.push((schema.clone(), handle));
        }

        for (schema, handle) in handles {
            let outcome = match handle.await {
                Ok((schema, Ok(tables))) => SchemaOutcome {
                    schema,
                    tables,
                    error: None,
                },
                Ok((schema, Err(e))) => {
                    self.sink.error(&format!("Schema {} failed: {}", schema, e));
                    SchemaOutcome {
                        schema,
                        tables: Vec::new(),
                        error: Some(e.to_string()),
                    }
                }
                Err(e) => {
                    self.sink
                        .error(&format!("Schema {}: worker panicked: {}", schema, e));
                    SchemaOutcome {
                        schema,
                        tables: Vec::new(),
                        error: Some(format!("Task panicked: {}", e)),
                    }
                }
            };
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Only create the target schemas and tables.
    pub async fn build_schemas(&self) -> Result<Vec<BuildOutcome>> {
        self.config.validate()?;
        let schemas = &self.config.source.schemas;
        let (source, target) = open_connections(self.factory.as_ref()).await?;

        let outcomes = match ensure_schemas_exist(source.as_ref(), schemas).await {
            Ok(()) => Ok(self.build_each(schemas, source.as_ref(), target.as_ref()).await),
            Err(e) => Err(e),
        };

        source.close().await;
        target.close().await;
        outcomes
    }

    /// Compare source and target row counts for the configured schemas.
    pub async fn validate(&self) -> Result<CheckReport> {
        let (source, target) = open_connections(self.factory.as_ref()).await?;
        let report = check_migration(
            source.as_ref(),
            target.as_ref(),
            &self.config.source.schemas,
            self.sink.as_ref(),
        )
        .await;
        source.close().await;
        target.close().await;
        Ok(report)
    }

    /// Scan the configured schemas for NUL characters, stripping them when
    /// `remove` is set.
    pub async fn scan_nulls(&self, remove: bool) -> Result<Vec<String>> {
        let source = self.factory.open_source().await?;
        let found = scan::scan_null_chars(
            source.as_ref(),
            &self.config.source.schemas,
            remove,
            self.sink.as_ref(),
        )
        .await;
        source.close().await;
        found
    }

    /// Test connectivity to both databases.
    pub async fn health_check(&self) -> Result<HealthCheckResult> {
        let first_schema = self.config.source.schemas.first().cloned().unwrap_or_default();

        let start = Instant::now();
        let source = async {
            let source = self.factory.open_source().await?;
            let exists = source.schema_exists(&first_schema).await;
            source.close().await;
            exists.map(|_| ())
        }
        .await;
        let source_latency_ms = start.elapsed().as_millis() as u64;

        let start = Instant::now();
        let target = async {
            let target = self.factory.open_target().await?;
            let session = target.open_session().await.map(drop);
            target.close().await;
            session
        }
        .await;
        let target_latency_ms = start.elapsed().as_millis() as u64;

        let source_error = source.err().map(|e| e.to_string());
        let target_error = target.err().map(|e| e.to_string());
        Ok(HealthCheckResult {
            source_connected: source_error.is_none(),
            source_latency_ms,
            target_connected: target_error.is_none(),
            target_latency_ms,
            healthy: source_error.is_none() && target_error.is_none(),
            source_error,
            target_error,
        })
    }
}

/// Open a source and a target. The source is closed again when the target
/// cannot be opened.
async fn open_connections(
    factory: &dyn ConnectionFactory,
) -> Result<(Arc<dyn SourceReader>, Arc<dyn TargetWriter>)> {
    let source = factory.open_source().await?;
    match factory.open_target().await {
        Ok(target) => Ok((source, target)),
        Err(e) => {
            source.close().await;
            Err(e)
        }
    }
}

/// Fail with [`MigrateError::SchemaNotFound`] for the first absent schema.
async fn ensure_schemas_exist(source: &dyn SourceReader, schemas: &[String]) -> Result<()> {
    for schema in schemas {
        if !source.schema_exists(schema).await? {
            return Err(MigrateError::SchemaNotFound(schema.clone()));
        }
    }
    Ok(())
}

/// Copy every table of `schema` in dependency order.
///
/// An aborted table is recorded and the next table proceeds. Only a failure
/// to reflect the schema is returned as an error.
pub async fn migrate_schema(
    schema: &str,
    source: Arc<dyn SourceReader>,
    target: Arc<dyn TargetWriter>,
    options: CopyOptions,
    sink: SharedSink,
    cancel: CancellationToken,
) -> Result<Vec<CopyResult>> {
    let tables = dependency_order(source.reflect_tables(schema).await?);
    sink.info(&format!("Schema {}: copying {} tables", schema, tables.len()));

    let engine =
        TransferEngine::new(source, target, options, Arc::clone(&sink)).with_cancellation(cancel.clone());
    let mut results = Vec::with_capacity(tables.len());

    for table in &tables {
        if cancel.is_cancelled() {
            debug!("Schema {}: cancelled before {}", schema, table.name);
            break;
        }
        let started_at = Utc::now();
        match engine.copy_table(table).await {
            Ok(result) => {
                if result.status == CopyStatus::CompletedWithErrors {
                    warn!("{}: completed with errors", result.table);
                }
                results.push(result);
            }
            Err(e) => {
                sink.error(&e.to_string());
                results.push(CopyResult::aborted(table.full_name(), started_at, &e));
            }
        }
    }

    Ok(results)
}

fn summarize(
    run_id: String,
    started_at: DateTime<Utc>,
    schemas: Vec<SchemaOutcome>,
    check: Option<CheckReport>,
    cancelled: bool,
) -> MigrationResult {
    let completed_at = Utc::now();
    let duration = (completed_at - started_at).num_milliseconds() as f64 / 1000.0;

    let tables: Vec<&CopyResult> = schemas.iter().flat_map(|s| s.tables.iter()).collect();
    let failed_tables: Vec<String> = tables
        .iter()
        .filter(|t| !t.is_success())
        .map(|t| t.table.clone())
        .collect();
    let failed_schemas: Vec<String> = schemas
        .iter()
        .filter(|s| s.error.is_some())
        .map(|s| s.schema.clone())
        .collect();
    let rows_copied: i64 = tables.iter().map(|t| t.rows_copied).sum();

    let rows_per_second = if duration > 0.0 {
        (rows_copied as f64 / duration) as i64
    } else {
        0
    };

    let mut result = MigrationResult {
        run_id,
        status: String::new(),
        duration_seconds: duration,
        started_at,
        completed_at,
        tables_total: tables.len(),
        tables_success: tables.len() - failed_tables.len(),
        tables_failed: failed_tables.len(),
        rows_copied,
        rows_per_second,
        failed_tables,
        failed_schemas,
        check,
        schemas,
    };

    result.status = if cancelled {
        "cancelled"
    } else if result.has_failures() {
        "completed_with_errors"
    } else {
        "completed"
    }
    .to_string();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{NullCharPolicy, Parallelism};
    use crate::core::schema::{Column, SourceType, Table};
    use crate::core::value::SqlValue;
    use crate::drivers::memory::{MemoryFactory, MemorySource, MemoryTarget};
    use crate::events::{CollectingSink, EventLevel};

    const YAML: &str = r#"
source:
  password: secret
  schemas: [hr, sales]
target:
  host: pg.internal
  password: secret
migration:
  batch_size: 10
"#;

    fn config() -> Config {
        Config::from_yaml(YAML).unwrap()
    }

    fn text_table(schema: &str, name: &str) -> Table {
        Table::new(schema, name, vec![Column::new("v", SourceType::Text)])
    }

    fn rows(n: usize) -> Vec<Vec<SqlValue>> {
        (0..n).map(|i| vec![SqlValue::Text(format!("r{}", i))]).collect()
    }

    fn factory() -> MemoryFactory {
        let source = MemorySource::new();
        source.add_table(text_table("hr", "emp"), rows(25));
        source.add_table(text_table("hr", "dept").with_reference("emp"), rows(3));
        source.add_table(text_table("sales", "orders"), rows(12));
        MemoryFactory::new(source, MemoryTarget::new())
    }

    fn orchestrator(config: Config, factory: &MemoryFactory, sink: Arc<CollectingSink>) -> Orchestrator {
        Orchestrator::new(config, Arc::new(factory.clone())).with_sink(sink)
    }

    #[tokio::test]
    async fn test_run_copies_every_schema() {
        let factory = factory();
        let sink = Arc::new(CollectingSink::new());
        let result = orchestrator(config(), &factory, sink.clone()).run().await.unwrap();

        assert_eq!(result.status, "completed");
        assert_eq!(result.tables_total, 3);
        assert_eq!(result.rows_copied, 40);
        assert!(!result.has_failures());
        assert!(result.check.as_ref().unwrap().is_consistent());
        assert_eq!(result.schemas[0].schema, "hr");
        let order: Vec<&str> = result.schemas[0].tables.iter().map(|t| t.table.as_str()).collect();
        assert_eq!(order, vec!["hr.emp", "hr.dept"]);
        assert!(sink.contains(EventLevel::Info, "sales.orders: 12 rows (match)"));
    }

    #[tokio::test]
    async fn test_missing_schema_fails_before_ddl() {
        let factory = factory();
        let mut config = config();
        config.source.schemas.push("ghost".to_string());
        let err = orchestrator(config, &factory, Arc::new(CollectingSink::new()))
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, MigrateError::SchemaNotFound(ref s) if s == "ghost"));
        assert!(!factory.target.has_schema("hr"));
    }

    #[tokio::test]
    async fn test_failed_schema_build_skips_copy() {
        let factory = factory();
        factory.target.create_schema("sales").await.unwrap();
        let existing = crate::builder::prepare_table(
            &text_table("sales", "orders"),
            &TypeTranslator::default(),
            &CollectingSink::new(),
        );
        factory.target.create_table(&existing).await.unwrap();

        let result = orchestrator(config(), &factory, Arc::new(CollectingSink::new()))
            .run()
            .await
            .unwrap();

        assert_eq!(result.failed_schemas, vec!["sales"]);
        assert_eq!(result.status, "completed_with_errors");
        assert_eq!(factory.target.count_rows("hr", "emp").await.unwrap(), 25);
        assert_eq!(factory.target.count_rows("sales", "orders").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_aborted_table_does_not_stop_schema() {
        let factory = factory();
        factory.target.fail_insert("hr.emp", 2);
        let mut config = config();
        config.migration.verify = false;

        let result = orchestrator(config, &factory, Arc::new(CollectingSink::new()))
            .run()
            .await
            .unwrap();

        assert_eq!(result.failed_tables, vec!["hr.emp"]);
        assert_eq!(result.tables_success, 2);
        let emp = &result.schemas[0].tables[0];
        assert_eq!(emp.status, CopyStatus::Aborted);
        assert_eq!(emp.rows_copied, 10);
        assert_eq!(factory.target.count_rows("hr", "dept").await.unwrap(), 3);
        assert!(result.check.is_none());
    }

    #[tokio::test]
    async fn test_source_closed_when_target_open_fails() {
        let factory = factory();
        factory.fail_target_opens_from(2);
        let mut config = config();
        config.migration.verify = false;

        let result = orchestrator(config, &factory, Arc::new(CollectingSink::new()))
            .run()
            .await
            .unwrap();

        assert_eq!(result.failed_schemas, vec!["hr", "sales"]);
        assert_eq!(factory.source_opens(), 3);
        assert_eq!(factory.source.closes(), 3);

        let err = orchestrator(self::config(), &factory, Arc::new(CollectingSink::new()))
            .validate()
            .await
            .unwrap_err();
        assert!(matches!(err, MigrateError::Pool { .. }));
        assert_eq!(factory.source.closes(), factory.source_opens());
    }

    #[tokio::test]
    async fn test_parallel_workers() {
        let factory = factory();
        let mut config = config();
        config.migration.workers = Some(Parallelism::Fixed(4));
        let result = orchestrator(config, &factory, Arc::new(CollectingSink::new()))
            .run()
            .await
            .unwrap();
        assert_eq!(result.rows_copied, 40);
        assert_eq!(result.schemas.len(), 2);
        assert_eq!(result.schemas[1].schema, "sales");
    }

    #[tokio::test]
    async fn test_null_characters_abort_run() {
        let factory = factory();
        factory
            .source
            .add_table(text_table("hr", "notes"), vec![vec![SqlValue::Text("a\0".into())]]);
        let err = orchestrator(config(), &factory, Arc::new(CollectingSink::new()))
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, MigrateError::NullCharacters(_)));
        assert!(!factory.target.has_schema("hr"));

        let mut config = config();
        config.migration.null_chars = NullCharPolicy::Remove;
        let result = orchestrator(config, &factory, Arc::new(CollectingSink::new()))
            .run()
            .await
            .unwrap();
        assert_eq!(result.status, "completed");
    }

    #[tokio::test]
    async fn test_cancelled_run() {
        let factory = factory();
        let token = CancellationToken::new();
        token.cancel();
        let result = orchestrator(config(), &factory, Arc::new(CollectingSink::new()))
            .with_cancellation(token)
            .run()
            .await
            .unwrap();
        assert_eq!(result.status, "cancelled");
        assert_eq!(result.rows_copied, 0);
        assert!(result.check.is_none());
    }

    #[tokio::test]
    async fn test_skip_schema_build() {
        let factory = factory();
        let result = orchestrator(config(), &factory, Arc::new(CollectingSink::new()))
            .with_options(RunOptions { build_schema: false })
            .run()
            .await
            .unwrap();
        // Nothing to copy into: every table aborts on its first write.
        assert_eq!(result.tables_failed, 3);
    }

    #[tokio::test]
    async fn test_health_check() {
        let factory = factory();
        let result = orchestrator(config(), &factory, Arc::new(CollectingSink::new()))
            .health_check()
            .await
            .unwrap();
        assert!(result.healthy);
        assert!(result.source_connected && result.target_connected);
    }
}
