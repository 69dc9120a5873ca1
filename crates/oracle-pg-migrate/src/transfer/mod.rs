//! Batch copy engine: stream one table from source to target in windows.
//!
//! Each window is read ordered by the table's row key and written inside its
//! own transaction with replication triggers and foreign keys disabled
//! (`session_replication_role = replica`). A failed write rolls back only the
//! current batch; earlier batches stay committed.

mod window;

pub use window::{column_expr, column_list, BatchWindow, RESERVED_COLUMN_NAMES};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::MigrationConfig;
use crate::core::schema::Table;
use crate::core::traits::{SourceReader, TargetSession, TargetWriter};
use crate::core::value::Batch;
use crate::error::{MigrateError, Result};
use crate::events::SharedSink;

/// In trial mode, stop after the window starting past this offset.
pub const TRIAL_OFFSET_LIMIT: i64 = 200;

/// Session setting that disables triggers and FK checks for the batch.
pub const REPLICATION_ROLE: &str = "session_replication_role";

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Per-table copy options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyOptions {
    /// Rows per window (already clamped for trial runs).
    pub batch_size: usize,
    /// Switch the table to UNLOGGED while loading.
    pub suppress_logging: bool,
    /// Stop early once past [`TRIAL_OFFSET_LIMIT`].
    pub trial_run: bool,
    /// Abort on read errors instead of treating them as end of data.
    pub strict_reads: bool,
}

impl CopyOptions {
    pub fn from_config(config: &MigrationConfig) -> Self {
        Self {
            batch_size: config.effective_batch_size(),
            suppress_logging: config.disable_logging,
            trial_run: config.trial_run,
            strict_reads: config.strict_reads,
        }
    }
}

/// Outcome of a table copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CopyStatus {
    Completed,
    CompletedWithErrors,
    Aborted,
}

/// Result of copying one table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyResult {
    /// Fully qualified table name.
    pub table: String,
    pub rows_copied: i64,
    /// Windows that returned rows and were written.
    pub batches: usize,
    /// Exclusive end of the last written window.
    pub last_offset: i64,
    pub trial_cap_hit: bool,
    pub logging_suppressed: bool,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub status: CopyStatus,
    pub error: Option<String>,
}

impl CopyResult {
    /// Result for a table that never got going, or whose copy stopped with `err`.
    pub fn aborted(table: impl Into<String>, started_at: DateTime<Utc>, err: &MigrateError) -> Self {
        let rows_copied = match err {
            MigrateError::TableAborted { rows_committed, .. } => *rows_committed,
            _ => 0,
        };
        Self {
            table: table.into(),
            rows_copied,
            batches: 0,
            last_offset: 0,
            trial_cap_hit: false,
            logging_suppressed: false,
            started_at,
            completed_at: Utc::now(),
            status: CopyStatus::Aborted,
            error: Some(err.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status != CopyStatus::Aborted
    }
}

#[derive(Debug, Default)]
struct Progress {
    rows: i64,
    batches: usize,
    last_offset: i64,
    trial_cap_hit: bool,
    cancelled: bool,
}

/// Copies tables from a source to a target handle pair.
pub struct TransferEngine {
    source: Arc<dyn SourceReader>,
    target: Arc<dyn TargetWriter>,
    options: CopyOptions,
    sink: SharedSink,
    cancel: CancellationToken,
}

impl TransferEngine {
    pub fn new(
        source: Arc<dyn SourceReader>,
        target: Arc<dyn TargetWriter>,
        options: CopyOptions,
        sink: SharedSink,
    ) -> Self {
        Self {
            source,
            target,
            options,
            sink,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop at the next window boundary once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Copy every row of `table`.
    ///
    /// A failed batch write returns [`MigrateError::TableAborted`]; rows from
    /// earlier batches remain on the target.
    pub async fn copy_table(&self, table: &Table) -> Result<CopyResult> {
        let full_name = table.full_name();
        let started_at = Utc::now();
        self.sink.info(&format!(
            "Began copy of {} at {}",
            full_name,
            started_at.format(TIME_FORMAT)
        ));

        let mut session = self.target.open_session().await?;
        session.set_search_path(&table.schema).await?;

        let logging_suppressed = if self.options.suppress_logging {
            self.suppress_logging(session.as_mut(), table).await?
        } else {
            false
        };

        let outcome = self.copy_windows(session.as_mut(), table).await;

        let mut restore_error = None;
        if logging_suppressed {
            if let Err(e) = session.set_table_logged(&table.name).await {
                let message = format!("Failed to restore LOGGED on {}: {}", full_name, e);
                self.sink.error(&message);
                restore_error = Some(message);
            }
        }

        let progress = outcome?;
        let completed_at = Utc::now();

        let (status, error) = if progress.cancelled {
            (CopyStatus::Aborted, Some(MigrateError::Cancelled.to_string()))
        } else if let Some(e) = restore_error {
            (CopyStatus::CompletedWithErrors, Some(e))
        } else {
            (CopyStatus::Completed, None)
        };

        self.sink.info(&format!(
            "Finished copy of {} at {}: {} rows in {} batches (offsets 0-{})",
            full_name,
            completed_at.format(TIME_FORMAT),
            progress.rows,
            progress.batches,
            progress.last_offset
        ));

        Ok(CopyResult {
            table: full_name,
            rows_copied: progress.rows,
            batches: progress.batches,
            last_offset: progress.last_offset,
            trial_cap_hit: progress.trial_cap_hit,
            logging_suppressed,
            started_at,
            completed_at,
            status,
            error,
        })
    }

    /// Try to switch the table to UNLOGGED. Failure is not fatal.
    async fn suppress_logging(&self, session: &mut dyn TargetSession, table: &Table) -> Result<bool> {
        match session.set_table_unlogged(&table.name).await {
            Ok(()) => Ok(true),
            Err(e) => {
                session.rollback().await?;
                session.set_search_path(&table.schema).await?;
                self.sink.warn(&format!(
                    "Could not disable logging for {}, copying with logging on: {}",
                    table.full_name(),
                    e
                ));
                Ok(false)
            }
        }
    }

    async fn copy_windows(&self, session: &mut dyn TargetSession, table: &Table) -> Result<Progress> {
        let full_name = table.full_name();
        let select_list = column_list(&table.columns);
        let target_columns = table.column_names();
        let mut progress = Progress::default();
        let mut window = BatchWindow::first(self.options.batch_size);

        loop {
            if self.cancel.is_cancelled() {
                warn!("{}: cancelled at offset {}", full_name, window.offset);
                progress.cancelled = true;
                break;
            }

            let batch = match self
                .source
                .read_range(table, &select_list, window.offset, window.end())
                .await
            {
                Ok(batch) => batch,
                Err(e) if self.options.strict_reads => {
                    return Err(MigrateError::aborted(&full_name, progress.rows, e));
                }
                Err(e) => {
                    self.sink.warn(&format!(
                        "Read of {} rows {}-{} failed, treating as end of data: {}",
                        full_name,
                        window.offset,
                        window.end(),
                        e
                    ));
                    break;
                }
            };

            if batch.is_empty() {
                break;
            }

            let written = self
                .write_batch(session, &table.name, &target_columns, &batch)
                .await
                .map_err(|e| MigrateError::aborted(&full_name, progress.rows, e))?;

            progress.rows += written as i64;
            progress.batches += 1;
            progress.last_offset = window.end();
            self.sink.debug(&format!(
                "{}: copied rows {}-{} ({} rows)",
                full_name,
                window.offset,
                window.end(),
                written
            ));

            if self.options.trial_run && window.offset > TRIAL_OFFSET_LIMIT {
                progress.trial_cap_hit = true;
                break;
            }

            window = window.next();
        }

        Ok(progress)
    }

    /// Write one batch in its own transaction.
    async fn write_batch(
        &self,
        session: &mut dyn TargetSession,
        table: &str,
        columns: &[String],
        batch: &Batch,
    ) -> Result<u64> {
        session.begin().await?;

        let result = async {
            session.set_session_flag(REPLICATION_ROLE, "replica").await?;
            let written = session.bulk_insert(table, columns, batch).await?;
            session.set_session_flag(REPLICATION_ROLE, "DEFAULT").await?;
            Ok::<u64, MigrateError>(written)
        }
        .await;

        match result {
            Ok(written) => {
                session.commit().await?;
                Ok(written)
            }
            Err(e) => {
                if let Err(rollback_err) = session.rollback().await {
                    debug!("rollback after failed batch on {} failed: {}", table, rollback_err);
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::prepare_table;
    use crate::core::schema::{Column, SourceType};
    use crate::core::value::SqlValue;
    use crate::drivers::memory::{MemorySource, MemoryTarget};
    use crate::events::{CollectingSink, EventLevel};
    use crate::typemap::TypeTranslator;

    fn orders() -> Table {
        Table::new(
            "sales",
            "orders",
            vec![
                Column::new(
                    "id",
                    SourceType::Numeric {
                        precision: None,
                        scale: None,
                    },
                ),
                Column::new("order", SourceType::Text),
            ],
        )
    }

    fn rows(n: usize) -> Vec<Vec<SqlValue>> {
        (0..n)
            .map(|i| vec![SqlValue::I64(i as i64), SqlValue::Text(format!("o{}", i))])
            .collect()
    }

    async fn setup(n: usize) -> (MemorySource, MemoryTarget) {
        let source = MemorySource::new();
        source.add_table(orders(), rows(n));
        let target = MemoryTarget::new();
        target.create_schema("sales").await.unwrap();
        let sink = CollectingSink::new();
        target
            .create_table(&prepare_table(&orders(), &TypeTranslator::default(), &sink))
            .await
            .unwrap();
        (source, target)
    }

    fn options(batch_size: usize) -> CopyOptions {
        CopyOptions {
            batch_size,
            suppress_logging: true,
            trial_run: false,
            strict_reads: false,
        }
    }

    fn engine(
        source: &MemorySource,
        target: &MemoryTarget,
        options: CopyOptions,
        sink: Arc<CollectingSink>,
    ) -> TransferEngine {
        TransferEngine::new(Arc::new(source.clone()), Arc::new(target.clone()), options, sink)
    }

    #[tokio::test]
    async fn test_copy_in_windows() {
        let (source, target) = setup(250).await;
        let sink = Arc::new(CollectingSink::new());
        let result = engine(&source, &target, options(100), sink.clone())
            .copy_table(&orders())
            .await
            .unwrap();

        assert_eq!(result.status, CopyStatus::Completed);
        assert_eq!(result.rows_copied, 250);
        assert_eq!(result.batches, 3);
        assert_eq!(
            source.reads("sales.orders"),
            vec![(0, 100), (100, 200), (200, 300), (300, 400)]
        );
        let stored = target.table("sales.orders").unwrap();
        assert_eq!(stored.rows, rows(250));
        assert!(!stored.unlogged);
        assert!(result.logging_suppressed);
        assert!(sink.contains(EventLevel::Info, "Began copy of sales.orders"));
    }

    #[tokio::test]
    async fn test_batch_runs_under_replica_role() {
        let (source, target) = setup(5).await;
        let sink = Arc::new(CollectingSink::new());
        engine(&source, &target, options(10), sink)
            .copy_table(&orders())
            .await
            .unwrap();

        let statements = target.statements();
        let begin = statements.iter().position(|s| s == "BEGIN").unwrap();
        assert_eq!(statements[begin + 1], "SET session_replication_role = replica");
        assert!(statements[begin + 2].starts_with("COPY orders"));
        assert_eq!(statements[begin + 3], "SET session_replication_role = DEFAULT");
        assert_eq!(statements[begin + 4], "COMMIT");
    }

    #[tokio::test]
    async fn test_empty_table_writes_nothing() {
        let (source, target) = setup(0).await;
        let sink = Arc::new(CollectingSink::new());
        let result = engine(&source, &target, options(100), sink)
            .copy_table(&orders())
            .await
            .unwrap();
        assert_eq!(result.rows_copied, 0);
        assert_eq!(result.batches, 0);
        assert_eq!(target.insert_attempts("sales.orders"), 0);
    }

    #[tokio::test]
    async fn test_trial_mode_stops_after_offset_limit() {
        let (source, target) = setup(1000).await;
        let sink = Arc::new(CollectingSink::new());
        let opts = CopyOptions {
            trial_run: true,
            ..options(100)
        };
        let result = engine(&source, &target, opts, sink)
            .copy_table(&orders())
            .await
            .unwrap();

        assert!(result.trial_cap_hit);
        assert_eq!(result.rows_copied, 400);
        let reads = source.reads("sales.orders");
        assert!(reads.iter().all(|(low, _)| *low <= TRIAL_OFFSET_LIMIT + 100));
    }

    #[tokio::test]
    async fn test_write_failure_keeps_committed_batches_and_restores_logging() {
        let (source, target) = setup(250).await;
        target.fail_insert("sales.orders", 3);
        let sink = Arc::new(CollectingSink::new());
        let err = engine(&source, &target, options(100), sink)
            .copy_table(&orders())
            .await
            .unwrap_err();

        match err {
            MigrateError::TableAborted { rows_committed, .. } => assert_eq!(rows_committed, 200),
            other => panic!("unexpected error {other}"),
        }
        let stored = target.table("sales.orders").unwrap();
        assert_eq!(stored.rows.len(), 200);
        assert!(!stored.unlogged);
        assert!(target.statements().contains(&"ROLLBACK".to_string()));
    }

    #[tokio::test]
    async fn test_unlogged_rejected_continues_logged() {
        let (source, target) = setup(30).await;
        target.reject_unlogged();
        let sink = Arc::new(CollectingSink::new());
        let result = engine(&source, &target, options(100), sink.clone())
            .copy_table(&orders())
            .await
            .unwrap();

        assert!(!result.logging_suppressed);
        assert_eq!(result.rows_copied, 30);
        assert!(sink.contains(EventLevel::Warn, "Could not disable logging"));
        assert!(!target
            .statements()
            .iter()
            .any(|s| s.contains("SET LOGGED")));
        // Search path re-applied after the rollback.
        let statements = target.statements();
        let rollback = statements.iter().position(|s| s == "ROLLBACK").unwrap();
        assert_eq!(statements[rollback + 1], "SET search_path TO sales");
    }

    #[tokio::test]
    async fn test_read_error_soft_by_default() {
        let (source, target) = setup(250).await;
        source.fail_read_at("sales.orders", 100);
        let sink = Arc::new(CollectingSink::new());
        let result = engine(&source, &target, options(100), sink.clone())
            .copy_table(&orders())
            .await
            .unwrap();

        assert_eq!(result.status, CopyStatus::Completed);
        assert_eq!(result.error, None);
        assert_eq!(result.rows_copied, 100);
        assert!(sink.contains(EventLevel::Warn, "treating as end of data"));
    }

    #[tokio::test]
    async fn test_read_error_past_end_keeps_all_rows() {
        let (source, target) = setup(200).await;
        source.error_past_end(true);
        let sink = Arc::new(CollectingSink::new());
        let result = engine(&source, &target, options(100), sink.clone())
            .copy_table(&orders())
            .await
            .unwrap();
        assert_eq!(result.rows_copied, 200);
        assert_eq!(result.batches, 2);
        assert_eq!(result.status, CopyStatus::Completed);
        assert!(result.error.is_none());
        assert!(result.is_success());
        assert!(sink.contains(EventLevel::Warn, "rows 200-300 failed"));
    }

    #[tokio::test]
    async fn test_read_error_strict_aborts() {
        let (source, target) = setup(250).await;
        source.fail_read_at("sales.orders", 100);
        let sink = Arc::new(CollectingSink::new());
        let opts = CopyOptions {
            strict_reads: true,
            ..options(100)
        };
        let err = engine(&source, &target, opts, sink)
            .copy_table(&orders())
            .await
            .unwrap_err();
        assert!(matches!(err, MigrateError::TableAborted { rows_committed: 100, .. }));
        assert!(!target.table("sales.orders").unwrap().unlogged);
    }

    #[tokio::test]
    async fn test_cancellation_stops_before_first_window() {
        let (source, target) = setup(50).await;
        let sink = Arc::new(CollectingSink::new());
        let token = CancellationToken::new();
        token.cancel();
        let result = engine(&source, &target, options(10), sink)
            .with_cancellation(token)
            .copy_table(&orders())
            .await
            .unwrap();
        assert_eq!(result.status, CopyStatus::Aborted);
        assert_eq!(result.rows_copied, 0);
        assert!(!target.table("sales.orders").unwrap().unlogged);
    }
}
