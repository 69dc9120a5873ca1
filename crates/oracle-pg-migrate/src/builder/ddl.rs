//! PostgreSQL DDL rendering for translated tables.

use super::TargetTable;

/// Quote a PostgreSQL identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Qualify a table name with schema.
pub fn qualify_table(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(table))
}

pub fn create_schema(schema: &str) -> String {
    format!("CREATE SCHEMA IF NOT EXISTS {}", quote_ident(schema))
}

/// Plain `CREATE TABLE`: an existing table is an error on purpose.
pub fn create_table(table: &TargetTable) -> String {
    let col_defs: Vec<String> = table
        .columns
        .iter()
        .map(|c| {
            let mut def = format!("{} {}", quote_ident(&c.name), c.target_type);
            if !c.is_nullable {
                def.push_str(" NOT NULL");
            }
            if let Some(default) = &c.default {
                def.push_str(" DEFAULT ");
                def.push_str(default.trim());
            }
            def
        })
        .collect();

    format!(
        "CREATE TABLE {} (\n    {}\n)",
        qualify_table(&table.schema, &table.name),
        col_defs.join(",\n    ")
    )
}

pub fn set_unlogged(table: &str) -> String {
    format!("ALTER TABLE {} SET UNLOGGED", quote_ident(table))
}

pub fn set_logged(table: &str) -> String {
    format!("ALTER TABLE {} SET LOGGED", quote_ident(table))
}
