//! Post-migration row-count consistency check.
//!
//! Read-only on both sides. A failure on one table is recorded and the check
//! moves on; nothing here aborts the run.

mod types;

pub use types::{CheckReport, CheckStatus, SchemaCheckError, TableCheck};

use crate::core::traits::{SourceReader, TargetWriter};
use crate::events::EventSink;

/// Compare source and target row counts for every table of every schema.
pub async fn check_migration(
    source: &dyn SourceReader,
    target: &dyn TargetWriter,
    schemas: &[String],
    sink: &dyn EventSink,
) -> CheckReport {
    let mut report = CheckReport::default();

    for schema in schemas {
        let tables = match source.reflect_tables(schema).await {
            Ok(tables) => tables,
            Err(e) => {
                sink.error(&format!("Could not list tables of schema {}: {}", schema, e));
                report.schema_errors.push(SchemaCheckError {
                    schema: schema.clone(),
                    error: e.to_string(),
                });
                continue;
            }
        };

        for table in &tables {
            report
                .tables
                .push(check_table(source, target, schema, &table.name, sink).await);
        }
    }

    sink.info(&format!(
        "Consistency check: {} match, {} mismatch, {} count errors",
        report.matched(),
        report.mismatched(),
        report.count_errors()
    ));
    report
}

async fn check_table(
    source: &dyn SourceReader,
    target: &dyn TargetWriter,
    schema: &str,
    table: &str,
    sink: &dyn EventSink,
) -> TableCheck {
    let full_name = format!("{}.{}", schema, table);
    let counts = async {
        let source_count = source.count_rows(schema, table).await?;
        let target_count = target.count_rows(schema, table).await?;
        Ok::<_, crate::error::MigrateError>((source_count, target_count))
    }
    .await;

    match counts {
        Ok((source_count, target_count)) if source_count == target_count => {
            sink.info(&format!("{}: {} rows (match)", full_name, source_count));
            TableCheck {
                schema: schema.to_string(),
                table: table.to_string(),
                source_count: Some(source_count),
                target_count: Some(target_count),
                status: CheckStatus::Match,
                error: None,
            }
        }
        Ok((source_count, target_count)) => {
            sink.warn(&format!(
                "{}: source={} target={} (MISMATCH)",
                full_name, source_count, target_count
            ));
            TableCheck {
                schema: schema.to_string(),
                table: table.to_string(),
                source_count: Some(source_count),
                target_count: Some(target_count),
                status: CheckStatus::Mismatch,
                error: None,
            }
        }
        Err(e) => {
            sink.error(&format!("{}: unable to compare row counts: {}", full_name, e));
            TableCheck {
                schema: schema.to_string(),
                table: table.to_string(),
                source_count: None,
                target_count: None,
                status: CheckStatus::CountError,
                error: Some(e.to_string()),
            }
        }
    }
}
