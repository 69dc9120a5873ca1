//! Type mapping between Oracle and PostgreSQL.
//!
//! The rules are ordered and the first match wins. The shared primitives
//! (`VARCHAR2`, `CHAR`, `BOOLEAN`, ...) pass through under their own name;
//! every other type falls back to `varchar`.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::core::schema::{is_recognized_other, strip_precision, SourceType};

/// Fractional-second digits kept on translated intervals.
pub const INTERVAL_SECOND_PRECISION: u8 = 6;

/// PostgreSQL column type produced by translation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetType {
    Varchar,
    Numeric,
    Timestamp,
    TimestampTz,
    Text,
    Bytea,
    Real,
    Interval { precision: u8 },
    /// Source type emitted under its own name.
    Passthrough { name: String, length: Option<i32> },
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetType::Varchar => write!(f, "varchar"),
            TargetType::Numeric => write!(f, "numeric"),
            TargetType::Timestamp => write!(f, "timestamp"),
            TargetType::TimestampTz => write!(f, "timestamp with time zone"),
            TargetType::Text => write!(f, "text"),
            TargetType::Bytea => write!(f, "bytea"),
            TargetType::Real => write!(f, "real"),
            TargetType::Interval { precision } => write!(f, "interval({})", precision),
            TargetType::Passthrough { name, length } => {
                // Oracle spellings of the shared primitives.
                match (strip_precision(name).as_str(), length) {
                    ("VARCHAR2" | "VARCHAR", Some(n)) if *n > 0 => write!(f, "varchar({})", n),
                    ("VARCHAR2" | "VARCHAR", _) => write!(f, "varchar"),
                    ("CHAR", Some(n)) if *n > 0 => write!(f, "char({})", n),
                    ("CHAR", _) => write!(f, "char"),
                    ("BINARY_DOUBLE", _) => write!(f, "double precision"),
                    _ => write!(f, "{}", name.to_lowercase()),
                }
            }
        }
    }
}

/// Result of translating one column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translation {
    pub target_type: TargetType,
    pub default: Option<String>,
    /// False when the type passed through unchanged.
    pub converted: bool,
}

/// Maps source column types and defaults to target equivalents.
#[derive(Debug, Clone, Copy, Default)]
pub struct TypeTranslator {
    /// Map date/time columns to `timestamp with time zone`.
    pub timestamp_with_time_zone: bool,
}

impl TypeTranslator {
    pub fn new(timestamp_with_time_zone: bool) -> Self {
        Self {
            timestamp_with_time_zone,
        }
    }

    /// Translate a column's type and default. `fqn` is `schema.table.column`.
    pub fn translate(&self, fqn: &str, source: &SourceType, default: Option<&str>) -> Translation {
        let (target_type, converted) = self.map_type(fqn, source);
        Translation {
            target_type,
            default: check_default(fqn, default),
            converted,
        }
    }

    /// Map a type alone. Returns the target type and whether it changed.
    pub fn map_type(&self, fqn: &str, source: &SourceType) -> (TargetType, bool) {
        let target = match source {
            SourceType::Null => {
                debug!("NULL DETECTED in {}, mapping to varchar", fqn);
                TargetType::Varchar
            }
            SourceType::Numeric { .. } => TargetType::Numeric,
            SourceType::DateTime if self.timestamp_with_time_zone => TargetType::TimestampTz,
            SourceType::DateTime => TargetType::Timestamp,
            SourceType::Text => TargetType::Text,
            SourceType::NationalChar => TargetType::Varchar,
            SourceType::Blob | SourceType::Raw => TargetType::Bytea,
            SourceType::Other { name, length } => match strip_precision(name).as_str() {
                "BINARY_FLOAT" => TargetType::Real,
                "INTERVAL DAY TO SECOND" => TargetType::Interval {
                    precision: INTERVAL_SECOND_PRECISION,
                },
                _ if is_recognized_other(name) => {
                    return (
                        TargetType::Passthrough {
                            name: name.clone(),
                            length: *length,
                        },
                        false,
                    )
                }
                _ => {
                    debug!("NULL DETECTED in {} ({}), mapping to varchar", fqn, name);
                    TargetType::Varchar
                }
            },
        };

        debug!("{} {} converted to {}", fqn, source, target);
        (target, true)
    }
}

/// Drop defaults the target cannot evaluate. Only `SYSDATE` today.
pub fn check_default(fqn: &str, default: Option<&str>) -> Option<String> {
    let value = default?;
    if value.trim().eq_ignore_ascii_case("sysdate") {
        debug!("{}: dropping default {}", fqn, value.trim());
        return None;
    }
    Some(value.to_string())
}
