//! NUL character scan over source text columns.
//!
//! PostgreSQL text values cannot contain `\0`, so a column holding them would
//! fail part way through its copy. The scan runs before any DDL.

use crate::config::NullCharPolicy;
use crate::core::traits::SourceReader;
use crate::error::{MigrateError, Result};
use crate::events::EventSink;

/// Scan every table of `schemas`. Returns `schema.table.column` for each
/// affected column; with `remove` the characters are stripped on the source.
///
/// A table whose scan fails is reported as a warning and skipped.
pub async fn scan_null_chars(
    source: &dyn SourceReader,
    schemas: &[String],
    remove: bool,
    sink: &dyn EventSink,
) -> Result<Vec<String>> {
    let mut found = Vec::new();

    for schema in schemas {
        let tables = source.reflect_tables(schema).await?;
        for table in &tables {
            if !table.columns.iter().any(|c| c.source_type.is_character()) {
                continue;
            }
            match source.scan_null_chars(table, remove).await {
                Ok(columns) => {
                    for column in columns {
                        let fqn = table.column_fqn(&column);
                        if remove {
                            sink.info(&format!("Removed null characters from {}", fqn));
                        } else {
                            sink.warn(&format!("Null characters found in {}", fqn));
                        }
                        found.push(fqn);
                    }
                }
                Err(e) => sink.warn(&format!(
                    "Null character scan of {} failed: {}",
                    table.full_name(),
                    e
                )),
            }
        }
    }

    Ok(found)
}

/// Apply the configured policy before the schema build.
///
/// `Check` turns any finding into [`MigrateError::NullCharacters`].
pub async fn enforce_policy(
    policy: NullCharPolicy,
    source: &dyn SourceReader,
    schemas: &[String],
    sink: &dyn EventSink,
) -> Result<()> {
    match policy {
        NullCharPolicy::Ignore => Ok(()),
        NullCharPolicy::Remove => {
            scan_null_chars(source, schemas, true, sink).await?;
            Ok(())
        }
        NullCharPolicy::Check => {
            let found = scan_null_chars(source, schemas, false, sink).await?;
            if found.is_empty() {
                Ok(())
            } else {
                Err(MigrateError::NullCharacters(found))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::{Column, SourceType, Table};
    use crate::core::value::SqlValue;
    use crate::drivers::memory::MemorySource;
    use crate::events::{CollectingSink, EventLevel};

    fn source() -> MemorySource {
        let source = MemorySource::new();
        source.add_table(
            Table::new(
                "hr",
                "emp",
                vec![
                    Column::new("id", SourceType::Numeric { precision: None, scale: None }),
                    Column::new("note", SourceType::Text),
                ],
            ),
            vec![
                vec![SqlValue::I64(1), SqlValue::Text("fine".into())],
                vec![SqlValue::I64(2), SqlValue::Text("bad\0value".into())],
            ],
        );
        source
    }

    #[tokio::test]
    async fn test_check_policy_aborts() {
        let source = source();
        let sink = CollectingSink::new();
        let err = enforce_policy(NullCharPolicy::Check, &source, &["hr".to_string()], &sink)
            .await
            .unwrap_err();
        match err {
            MigrateError::NullCharacters(cols) => assert_eq!(cols, vec!["hr.emp.note"]),
            other => panic!("unexpected {other}"),
        }
        assert!(sink.contains(EventLevel::Warn, "hr.emp.note"));
    }

    #[tokio::test]
    async fn test_remove_policy_strips() {
        let source = source();
        let sink = CollectingSink::new();
        enforce_policy(NullCharPolicy::Remove, &source, &["hr".to_string()], &sink)
            .await
            .unwrap();
        assert_eq!(source.rows("hr.emp")[1][1], SqlValue::Text("badvalue".into()));
        enforce_policy(NullCharPolicy::Check, &source, &["hr".to_string()], &sink)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_failed_table_scan_warns_and_continues() {
        let source = source();
        source.add_table(
            Table::new("hr", "audit", vec![Column::new("entry", SourceType::Text)]),
            vec![vec![SqlValue::Text("x\0".into())]],
        );
        source.fail_scan("hr.emp");
        let sink = CollectingSink::new();

        let err = enforce_policy(NullCharPolicy::Check, &source, &["hr".to_string()], &sink)
            .await
            .unwrap_err();
        match err {
            MigrateError::NullCharacters(cols) => assert_eq!(cols, vec!["hr.audit.entry"]),
            other => panic!("unexpected {other}"),
        }
        assert!(sink.contains(EventLevel::Warn, "Null character scan of hr.emp failed"));
    }

    #[tokio::test]
    async fn test_ignore_policy_skips_scan() {
        let source = source();
        let sink = CollectingSink::new();
        enforce_policy(NullCharPolicy::Ignore, &source, &["hr".to_string()], &sink)
            .await
            .unwrap();
        assert!(sink.events().is_empty());
    }
}
