//! Error types for the migration library.

use thiserror::Error;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A configured schema is not present on the source
    #[error("Schema '{0}' does not exist on the source database")]
    SchemaNotFound(String),

    /// Source database connection or query error (ODBC)
    #[error("Source database error: {0}")]
    Source(String),

    /// Target database connection or query error
    #[error("Target database error: {0}")]
    Target(#[from] tokio_postgres::Error),

    /// Driver-agnostic database failure (used by drivers without a native error type)
    #[error("Database error: {0}")]
    Database(String),

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// Schema reflection failed
    #[error("Schema extraction failed: {0}")]
    SchemaExtraction(String),

    /// DDL rejected by the target while building a schema
    #[error("DDL failed for schema {schema}: {message}")]
    Ddl { schema: String, message: String },

    /// Reading a window from the source failed
    #[error("Read failed for table {table}: {message}")]
    Read { table: String, message: String },

    /// Writing a batch to the target failed
    #[error("Write failed for table {table}: {message}")]
    Write { table: String, message: String },

    /// A table copy stopped part way; earlier batches stay committed
    #[error("Copy of {table} aborted after {rows_committed} committed rows")]
    TableAborted {
        table: String,
        rows_committed: i64,
        #[source]
        source: Box<MigrateError>,
    },

    /// Embedded NUL characters found in source text columns
    #[error("Null characters found in {} column(s): {}", .0.len(), .0.join(", "))]
    NullCharacters(Vec<String>),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Migration was cancelled (SIGINT, etc.)
    #[error("Migration cancelled")]
    Cancelled,
}

#[cfg(feature = "oracle")]
impl From<odbc_api::Error> for MigrateError {
    fn from(err: odbc_api::Error) -> Self {
        MigrateError::Source(err.to_string())
    }
}

impl MigrateError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl std::fmt::Display, context: impl Into<String>) -> Self {
        MigrateError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a Read error
    pub fn read(table: impl Into<String>, message: impl std::fmt::Display) -> Self {
        MigrateError::Read {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Create a Write error
    pub fn write(table: impl Into<String>, message: impl std::fmt::Display) -> Self {
        MigrateError::Write {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Wrap an error that stopped a table copy part way.
    pub fn aborted(table: impl Into<String>, rows_committed: i64, source: MigrateError) -> Self {
        MigrateError::TableAborted {
            table: table.into(),
            rows_committed,
            source: Box::new(source),
        }
    }

    /// Process exit code for this error class.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_)
            | MigrateError::SchemaNotFound(_)
            | MigrateError::NullCharacters(_)
            | MigrateError::Yaml(_) => 2,
            MigrateError::Source(_)
            | MigrateError::Target(_)
            | MigrateError::Database(_)
            | MigrateError::Pool { .. } => 3,
            MigrateError::SchemaExtraction(_) | MigrateError::Ddl { .. } => 4,
            MigrateError::Read { .. }
            | MigrateError::Write { .. }
            | MigrateError::TableAborted { .. } => 5,
            MigrateError::Cancelled => 130,
            MigrateError::Io(_) | MigrateError::Json(_) => 1,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_by_class() {
        assert_eq!(MigrateError::Config("x".into()).exit_code(), 2);
        assert_eq!(MigrateError::SchemaNotFound("s".into()).exit_code(), 2);
        assert_eq!(MigrateError::pool("refused", "connecting").exit_code(), 3);
        assert_eq!(
            MigrateError::Ddl {
                schema: "s".into(),
                message: "exists".into()
            }
            .exit_code(),
            4
        );
        assert_eq!(MigrateError::write("s.t", "boom").exit_code(), 5);
        assert_eq!(MigrateError::Cancelled.exit_code(), 130);
    }

    #[test]
    fn test_format_detailed_includes_cause() {
        let err = MigrateError::aborted("sales.orders", 200, MigrateError::write("sales.orders", "type mismatch"));
        let text = err.format_detailed();
        assert!(text.contains("Copy of sales.orders aborted after 200 committed rows"));
        assert!(text.contains("Caused by:"));
        assert!(text.contains("type mismatch"));
    }

    #[test]
    fn test_null_characters_message_lists_columns() {
        let err = MigrateError::NullCharacters(vec!["hr.emp.note".into(), "hr.emp.bio".into()]);
        assert_eq!(
            err.to_string(),
            "Null characters found in 2 column(s): hr.emp.note, hr.emp.bio"
        );
    }
}
