//! Schema builder: recreate a source schema's tables on the target.
//!
//! Only column shapes survive. Indexes, constraints and server-side defaults
//! are reflected but never recreated, so the load runs without them.

pub mod ddl;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::schema::Table;
use crate::core::traits::{SourceReader, TargetWriter};
use crate::error::{MigrateError, Result};
use crate::events::EventSink;
use crate::typemap::{TargetType, TypeTranslator};

/// Target-side working copy of a reflected table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetTable {
    pub schema: String,
    pub name: String,
    pub columns: Vec<TargetColumn>,
}

impl TargetTable {
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }
}

/// Translated column definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetColumn {
    pub name: String,
    pub target_type: TargetType,
    pub is_nullable: bool,
    pub default: Option<String>,
}

/// Translate a reflected table into its target definition.
///
/// Server defaults are discarded; client defaults go through
/// [`check_default`](crate::typemap::check_default).
pub fn prepare_table(table: &Table, translator: &TypeTranslator, sink: &dyn EventSink) -> TargetTable {
    if table.index_count > 0 || table.constraint_count > 0 {
        sink.debug(&format!(
            "{}: discarding {} index(es) and {} constraint(s)",
            table.full_name(),
            table.index_count,
            table.constraint_count
        ));
    }

    let columns = table
        .columns
        .iter()
        .map(|col| {
            let fqn = table.column_fqn(&col.name);
            let translation = translator.translate(&fqn, &col.source_type, col.default.as_deref());
            if translation.converted {
                sink.debug(&format!(
                    "{} {} converted to {}",
                    fqn, col.data_type, translation.target_type
                ));
            }
            if let Some(server_default) = &col.server_default {
                debug!("{}: discarding server default {}", fqn, server_default.trim());
            }
            TargetColumn {
                name: col.name.clone(),
                target_type: translation.target_type,
                is_nullable: col.is_nullable,
                default: translation.default,
            }
        })
        .collect();

    TargetTable {
        schema: table.schema.clone(),
        name: table.name.clone(),
        columns,
    }
}

/// Reflect `schema` on the source and create it, table by table, on the target.
///
/// Any DDL failure aborts the build for this schema.
pub async fn build_schema(
    schema: &str,
    source: &dyn SourceReader,
    target: &dyn TargetWriter,
    translator: &TypeTranslator,
    sink: &dyn EventSink,
) -> Result<Vec<TargetTable>> {
    let tables = source.reflect_tables(schema).await?;
    info!("Schema {}: reflected {} tables", schema, tables.len());

    let ddl_error = |e: MigrateError| match e {
        MigrateError::Ddl { .. } => e,
        other => MigrateError::Ddl {
            schema: schema.to_string(),
            message: other.to_string(),
        },
    };

    target.create_schema(schema).await.map_err(ddl_error)?;

    let mut created = Vec::with_capacity(tables.len());
    for table in &tables {
        let target_table = prepare_table(table, translator, sink);
        target.create_table(&target_table).await.map_err(ddl_error)?;
        sink.debug(&format!("Created table {}", target_table.full_name()));
        created.push(target_table);
    }

    sink.info(&format!("Schema {}: created {} tables", schema, created.len()));
    Ok(created)
}
