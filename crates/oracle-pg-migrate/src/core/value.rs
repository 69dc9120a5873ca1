//! SQL value types carried between source reads and target writes.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use std::str::FromStr;

use super::schema::{strip_precision, SourceType};

/// SQL value enum for type-safe row handling.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// NULL.
    Null,

    /// Boolean value.
    Bool(bool),

    /// 64-bit signed integer.
    I64(i64),

    /// 32-bit floating point (BINARY_FLOAT).
    F32(f32),

    /// 64-bit floating point (BINARY_DOUBLE).
    F64(f64),

    /// Exact numeric value.
    Decimal(Decimal),

    /// Text/string data.
    Text(String),

    /// Binary data.
    Bytes(Vec<u8>),

    /// Date without time component.
    Date(NaiveDate),

    /// Timestamp without timezone.
    DateTime(NaiveDateTime),

    /// Timestamp with timezone offset.
    DateTimeOffset(DateTime<FixedOffset>),

    /// Interval in the textual form the target accepts.
    Interval(String),
}

impl SqlValue {
    /// Check if this value is NULL.
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Decode a value the source rendered as text, according to its column type.
    ///
    /// Values that do not parse as the expected type are kept as text so the
    /// target can still try to coerce them.
    pub fn from_source_text(text: Option<&str>, source_type: &SourceType) -> Self {
        let Some(text) = text else {
            return SqlValue::Null;
        };

        match source_type {
            SourceType::Numeric { .. } => Decimal::from_str(text)
                .or_else(|_| Decimal::from_scientific(text))
                .map(SqlValue::Decimal)
                .unwrap_or_else(|_| SqlValue::Text(text.to_string())),
            SourceType::DateTime => parse_datetime(text),
            SourceType::Blob | SourceType::Raw => match hex::decode(text) {
                Ok(bytes) => SqlValue::Bytes(bytes),
                Err(_) => SqlValue::Bytes(text.as_bytes().to_vec()),
            },
            SourceType::Other { name, .. } => match strip_precision(name).as_str() {
                "BINARY_FLOAT" => text
                    .parse::<f32>()
                    .map(SqlValue::F32)
                    .unwrap_or_else(|_| SqlValue::Text(text.to_string())),
                "BINARY_DOUBLE" => text
                    .parse::<f64>()
                    .map(SqlValue::F64)
                    .unwrap_or_else(|_| SqlValue::Text(text.to_string())),
                "BOOLEAN" => match text.to_ascii_lowercase().as_str() {
                    "1" | "true" | "t" | "y" => SqlValue::Bool(true),
                    "0" | "false" | "f" | "n" => SqlValue::Bool(false),
                    _ => SqlValue::Text(text.to_string()),
                },
                n if n.starts_with("INTERVAL") => SqlValue::Interval(oracle_interval(text)),
                _ => SqlValue::Text(text.to_string()),
            },
            SourceType::Null | SourceType::Text | SourceType::NationalChar => {
                SqlValue::Text(text.to_string())
            }
        }
    }
}

fn parse_datetime(text: &str) -> SqlValue {
    const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];
    const OFFSET_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f %:z", "%Y-%m-%d %H:%M:%S%.f%:z"];

    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(text, fmt) {
            return SqlValue::DateTimeOffset(dt);
        }
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, fmt) {
            return SqlValue::DateTime(dt);
        }
    }
    match NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        Ok(d) => SqlValue::Date(d),
        Err(_) => SqlValue::Text(text.to_string()),
    }
}

/// Oracle renders day-to-second intervals as `+DD HH:MM:SS.FFFFFF`;
/// PostgreSQL wants `DD days HH:MM:SS.FFFFFF`.
fn oracle_interval(text: &str) -> String {
    let trimmed = text.trim();
    let (sign, rest) = match trimmed.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", trimmed.trim_start_matches('+')),
    };
    match rest.split_once(' ') {
        Some((days, time)) if days.chars().all(|c| c.is_ascii_digit()) => {
            let days: i64 = days.parse().unwrap_or(0);
            format!("{sign}{days} days {sign}{time}")
        }
        _ => trimmed.to_string(),
    }
}

/// One row of values in column order.
pub type Row = Vec<SqlValue>;

/// A window's worth of rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    /// Rows in row-key order.
    pub rows: Vec<Row>,
}

impl Batch {
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
