//! Schema metadata types for reflected source tables and columns.
//!
//! These are the source-side view of a table. The schema builder turns them
//! into [`TargetTable`](crate::builder::TargetTable) working copies; nothing
//! here is ever written back to the source.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::debug;

use crate::error::{MigrateError, Result};

/// Physical row identifier used to order windowed reads on Oracle.
pub const DEFAULT_ROW_KEY: &str = "ROWID";

/// Classified source column type.
///
/// Closed set of the categories the type translator distinguishes. Names in
/// [`RECOGNIZED_OTHER_TYPES`] land in [`SourceType::Other`] with their
/// catalogue name intact; anything unrecognised becomes [`SourceType::Null`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceType {
    /// Type the catalogue could not describe, or one with no target rule.
    Null,
    /// NUMBER and friends.
    Numeric {
        precision: Option<i32>,
        scale: Option<i32>,
    },
    /// DATE and every TIMESTAMP variant.
    DateTime,
    /// CLOB, NCLOB, LONG.
    Text,
    /// NVARCHAR2, NCHAR.
    NationalChar,
    /// BLOB.
    Blob,
    /// RAW, LONG RAW.
    Raw,
    /// A recognised name the translator handles individually.
    Other { name: String, length: Option<i32> },
}

/// Catalogue names kept as [`SourceType::Other`]. Each has a translator rule
/// or a spelling PostgreSQL accepts.
pub const RECOGNIZED_OTHER_TYPES: &[&str] = &[
    "VARCHAR2",
    "VARCHAR",
    "CHAR",
    "BINARY_FLOAT",
    "BINARY_DOUBLE",
    "DOUBLE PRECISION",
    "REAL",
    "BOOLEAN",
    "INTERVAL DAY TO SECOND",
];

/// Whether `type_name` (precision decorations allowed) is in [`RECOGNIZED_OTHER_TYPES`].
pub fn is_recognized_other(type_name: &str) -> bool {
    RECOGNIZED_OTHER_TYPES.contains(&strip_precision(&type_name.to_uppercase()).as_str())
}

impl SourceType {
    /// Classify an Oracle catalogue type (`ALL_TAB_COLUMNS.DATA_TYPE`).
    pub fn from_catalog(
        data_type: &str,
        length: Option<i32>,
        precision: Option<i32>,
        scale: Option<i32>,
    ) -> Self {
        let upper = data_type.trim().to_uppercase();
        match strip_precision(&upper).as_str() {
            "" | "UNDEFINED" | "NULL" => SourceType::Null,
            "NUMBER" | "DECIMAL" | "NUMERIC" | "FLOAT" | "INTEGER" | "INT" | "SMALLINT" => {
                SourceType::Numeric { precision, scale }
            }
            "DATE"
            | "TIMESTAMP"
            | "TIMESTAMP WITH TIME ZONE"
            | "TIMESTAMP WITH LOCAL TIME ZONE" => SourceType::DateTime,
            "CLOB" | "NCLOB" | "LONG" => SourceType::Text,
            "NVARCHAR2" | "NCHAR" => SourceType::NationalChar,
            "BLOB" => SourceType::Blob,
            "RAW" | "LONG RAW" => SourceType::Raw,
            name if RECOGNIZED_OTHER_TYPES.contains(&name) => SourceType::Other {
                name: upper,
                length,
            },
            _ => {
                debug!("Unrecognised source type {}, treating as NULL", upper);
                SourceType::Null
            }
        }
    }

    /// Whether values of this type are character data that can hold NUL.
    pub fn is_character(&self) -> bool {
        match self {
            SourceType::Text | SourceType::NationalChar => true,
            SourceType::Other { name, .. } => matches!(
                strip_precision(name).as_str(),
                "VARCHAR2" | "VARCHAR" | "CHAR"
            ),
            _ => false,
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceType::Null => write!(f, "NULL"),
            SourceType::Numeric {
                precision: Some(p),
                scale: Some(s),
            } => write!(f, "NUMBER({},{})", p, s),
            SourceType::Numeric {
                precision: Some(p),
                scale: None,
            } => write!(f, "NUMBER({})", p),
            SourceType::Numeric { .. } => write!(f, "NUMBER"),
            SourceType::DateTime => write!(f, "DATE"),
            SourceType::Text => write!(f, "CLOB"),
            SourceType::NationalChar => write!(f, "NVARCHAR2"),
            SourceType::Blob => write!(f, "BLOB"),
            SourceType::Raw => write!(f, "RAW"),
            SourceType::Other { name, .. } => write!(f, "{}", name),
        }
    }
}

/// Remove parenthesised precision decorations:
/// `INTERVAL DAY(2) TO SECOND(6)` becomes `INTERVAL DAY TO SECOND`.
pub fn strip_precision(type_name: &str) -> String {
    let mut out = String::with_capacity(type_name.len());
    let mut depth = 0usize;
    for ch in type_name.chars() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(ch),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Table metadata as reflected from the source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    /// Schema name.
    pub schema: String,

    /// Table name.
    pub name: String,

    /// Column definitions in ordinal order.
    pub columns: Vec<Column>,

    /// Stable row ordering key for windowed reads.
    pub row_key: String,

    /// Tables in the same schema this table references through foreign keys.
    pub references: Vec<String>,

    /// Number of indexes reflected (never recreated).
    pub index_count: usize,

    /// Number of constraints reflected (never recreated).
    pub constraint_count: usize,
}

impl Table {
    /// Create a table ordered by the default row key.
    pub fn new(schema: impl Into<String>, name: impl Into<String>, columns: Vec<Column>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
            columns,
            row_key: DEFAULT_ROW_KEY.to_string(),
            references: Vec::new(),
            index_count: 0,
            constraint_count: 0,
        }
    }

    /// Record a foreign-key target.
    pub fn with_reference(mut self, table: impl Into<String>) -> Self {
        self.references.push(table.into());
        self
    }

    /// Get the fully qualified table name.
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    /// Fully qualified name of one of this table's columns.
    pub fn column_fqn(&self, column: &str) -> String {
        format!("{}.{}.{}", self.schema, self.name, column)
    }

    /// Column names in ordinal order.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Reject tables whose column names collide.
    pub fn ensure_unique_columns(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for col in &self.columns {
            if !seen.insert(col.name.to_lowercase()) {
                return Err(MigrateError::SchemaExtraction(format!(
                    "duplicate column '{}' in {}",
                    col.name,
                    self.full_name()
                )));
            }
        }
        Ok(())
    }
}

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,

    /// Declared type as the catalogue spells it (e.g. "NUMBER", "TIMESTAMP(6)").
    pub data_type: String,

    /// Classified type.
    pub source_type: SourceType,

    /// Whether the column allows NULL.
    pub is_nullable: bool,

    /// Client-side default expression.
    pub default: Option<String>,

    /// Default expression stored in the source catalogue.
    pub server_default: Option<String>,

    /// Ordinal position (1-based).
    pub ordinal_pos: i32,
}

impl Column {
    /// Nullable column without defaults.
    pub fn new(name: impl Into<String>, source_type: SourceType) -> Self {
        Self {
            name: name.into(),
            data_type: source_type.to_string(),
            source_type,
            is_nullable: true,
            default: None,
            server_default: None,
            ordinal_pos: 0,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.is_nullable = false;
        self
    }

    pub fn with_default(mut self, expr: impl Into<String>) -> Self {
        self.default = Some(expr.into());
        self
    }

    pub fn with_server_default(mut self, expr: impl Into<String>) -> Self {
        self.server_default = Some(expr.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_catalog_categories() {
        assert_eq!(
            SourceType::from_catalog("NUMBER", None, Some(10), Some(2)),
            SourceType::Numeric {
                precision: Some(10),
                scale: Some(2)
            }
        );
        assert_eq!(SourceType::from_catalog("DATE", None, None, None), SourceType::DateTime);
        assert_eq!(
            SourceType::from_catalog("TIMESTAMP(6) WITH TIME ZONE", None, None, None),
            SourceType::DateTime
        );
        assert_eq!(SourceType::from_catalog("nclob", None, None, None), SourceType::Text);
        assert_eq!(
            SourceType::from_catalog("NVARCHAR2", Some(40), None, None),
            SourceType::NationalChar
        );
        assert_eq!(SourceType::from_catalog("LONG RAW", None, None, None), SourceType::Raw);
        assert_eq!(SourceType::from_catalog("UNDEFINED", None, None, None), SourceType::Null);
        assert_eq!(
            SourceType::from_catalog("BINARY_DOUBLE", None, None, None),
            SourceType::Other {
                name: "BINARY_DOUBLE".into(),
                length: None
            }
        );
        assert_eq!(
            SourceType::from_catalog("INTERVAL DAY(2) TO SECOND(6)", None, None, None),
            SourceType::Other {
                name: "INTERVAL DAY(2) TO SECOND(6)".into(),
                length: None
            }
        );
    }

    #[test]
    fn test_unrecognised_types_become_null() {
        for name in [
            "XMLTYPE",
            "SDO_GEOMETRY",
            "INTERVAL YEAR(2) TO MONTH",
            "UROWID",
            "ANYDATA",
            "weird type(3)",
        ] {
            assert_eq!(
                SourceType::from_catalog(name, Some(10), None, None),
                SourceType::Null,
                "{}",
                name
            );
        }
    }

    #[test]
    fn test_strip_precision() {
        assert_eq!(strip_precision("INTERVAL DAY(2) TO SECOND(6)"), "INTERVAL DAY TO SECOND");
        assert_eq!(strip_precision("TIMESTAMP(9)"), "TIMESTAMP");
        assert_eq!(strip_precision("VARCHAR2"), "VARCHAR2");
    }

    #[test]
    fn test_is_character() {
        assert!(SourceType::Text.is_character());
        assert!(SourceType::from_catalog("VARCHAR2", Some(10), None, None).is_character());
        assert!(!SourceType::Blob.is_character());
        assert!(!SourceType::Numeric {
            precision: None,
            scale: None
        }
        .is_character());
    }

    #[test]
    fn test_duplicate_columns_rejected() {
        let table = Table::new(
            "hr",
            "emp",
            vec![
                Column::new("id", SourceType::Text),
                Column::new("ID", SourceType::Text),
            ],
        );
        let err = table.ensure_unique_columns().unwrap_err();
        assert!(matches!(err, MigrateError::SchemaExtraction(_)));
    }

    #[test]
    fn test_names() {
        let table = Table::new("sales", "orders", vec![Column::new("id", SourceType::Text)]);
        assert_eq!(table.full_name(), "sales.orders");
        assert_eq!(table.column_fqn("id"), "sales.orders.id");
        assert_eq!(table.row_key, "ROWID");
    }
}
