//! Report types for the row-count consistency check.

use serde::{Deserialize, Serialize};

/// Outcome for one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Match,
    Mismatch,
    CountError,
}

/// Row counts on both sides for one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableCheck {
    pub schema: String,
    pub table: String,
    pub source_count: Option<i64>,
    pub target_count: Option<i64>,
    pub status: CheckStatus,
    pub error: Option<String>,
}

impl TableCheck {
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }
}

/// A schema whose table list could not be reflected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaCheckError {
    pub schema: String,
    pub error: String,
}

/// Result of checking every table of every schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckReport {
    pub tables: Vec<TableCheck>,
    pub schema_errors: Vec<SchemaCheckError>,
}

impl CheckReport {
    pub fn matched(&self) -> usize {
        self.count(CheckStatus::Match)
    }

    pub fn mismatched(&self) -> usize {
        self.count(CheckStatus::Mismatch)
    }

    pub fn count_errors(&self) -> usize {
        self.count(CheckStatus::CountError)
    }

    /// Every table matched and every schema was readable.
    pub fn is_consistent(&self) -> bool {
        self.schema_errors.is_empty() && self.tables.iter().all(|t| t.status == CheckStatus::Match)
    }

    /// Look up a table by `schema.table`.
    pub fn table(&self, full_name: &str) -> Option<&TableCheck> {
        self.tables.iter().find(|t| t.full_name() == full_name)
    }

    fn count(&self, status: CheckStatus) -> usize {
        self.tables.iter().filter(|t| t.status == status).count()
    }
}
