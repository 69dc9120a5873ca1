//! Catalogue queries and identifier handling for Oracle.

/// Oracle stores unquoted names in upper case. Those come back lower case;
/// anything created quoted keeps its spelling.
pub fn normalize_name(name: &str) -> String {
    if name.chars().any(|c| c.is_lowercase()) {
        name.to_string()
    } else {
        name.to_lowercase()
    }
}

/// Quoted identifier for a normalized name.
pub fn source_ident(name: &str) -> String {
    let stored = if name.chars().any(|c| c.is_uppercase()) {
        name.to_string()
    } else {
        name.to_uppercase()
    };
    format!("\"{}\"", stored.replace('"', "\"\""))
}

/// Owner name as stored in the `ALL_*` views, as an SQL literal.
pub fn owner_literal(schema: &str) -> String {
    let stored = if schema.chars().any(|c| c.is_uppercase()) {
        schema.to_string()
    } else {
        schema.to_uppercase()
    };
    format!("'{}'", stored.replace('\'', "''"))
}

pub fn schema_exists_sql(schema: &str) -> String {
    format!(
        "SELECT COUNT(*) FROM all_users WHERE username = {}",
        owner_literal(schema)
    )
}

pub fn tables_sql(schema: &str) -> String {
    format!(
        "SELECT table_name FROM all_tables WHERE owner = {} \
         AND nested = 'NO' AND secondary = 'N' ORDER BY table_name",
        owner_literal(schema)
    )
}

pub fn columns_sql(schema: &str) -> String {
    format!(
        "SELECT table_name, column_name, data_type, data_length, data_precision, \
         data_scale, nullable, data_default, column_id \
         FROM all_tab_columns WHERE owner = {} ORDER BY table_name, column_id",
        owner_literal(schema)
    )
}

/// `(child table, parent table)` for every foreign key within the schema.
pub fn references_sql(schema: &str) -> String {
    let owner = owner_literal(schema);
    format!(
        "SELECT c.table_name, p.table_name \
         FROM all_constraints c \
         JOIN all_constraints p \
           ON p.owner = c.r_owner AND p.constraint_name = c.r_constraint_name \
         WHERE c.owner = {owner} AND c.constraint_type = 'R' AND p.owner = {owner}"
    )
}

pub fn constraint_counts_sql(schema: &str) -> String {
    format!(
        "SELECT table_name, COUNT(*) FROM all_constraints \
         WHERE owner = {} AND constraint_type IN ('P', 'U', 'R', 'C') GROUP BY table_name",
        owner_literal(schema)
    )
}

pub fn index_counts_sql(schema: &str) -> String {
    format!(
        "SELECT table_name, COUNT(*) FROM all_indexes WHERE owner = {} GROUP BY table_name",
        owner_literal(schema)
    )
}

/// Rows `[low, high)` in ROWID order.
pub fn read_range_sql(schema: &str, table: &str, columns: &[String], low: i64, high: i64) -> String {
    format!(
        "SELECT {} FROM {}.{} ORDER BY ROWID OFFSET {} ROWS FETCH NEXT {} ROWS ONLY",
        columns.join(", "),
        source_ident(schema),
        source_ident(table),
        low,
        (high - low).max(0)
    )
}

pub fn count_sql(schema: &str, table: &str) -> String {
    format!(
        "SELECT COUNT(*) FROM {}.{}",
        source_ident(schema),
        source_ident(table)
    )
}

pub fn has_null_chars_sql(schema: &str, table: &str, column: &str) -> String {
    format!(
        "SELECT COUNT(*) FROM {}.{} WHERE INSTR({col}, CHR(0)) > 0",
        source_ident(schema),
        source_ident(table),
        col = source_ident(column)
    )
}

pub fn strip_null_chars_sql(schema: &str, table: &str, column: &str) -> String {
    format!(
        "UPDATE {}.{} SET {col} = REPLACE({col}, CHR(0), '') WHERE INSTR({col}, CHR(0)) > 0",
        source_ident(schema),
        source_ident(table),
        col = source_ident(column)
    )
}
