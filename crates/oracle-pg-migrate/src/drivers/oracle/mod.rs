//! Oracle source over ODBC.
//!
//! The reader needs the `oracle` feature and an Oracle ODBC driver registered
//! with the driver manager (`source.driver` names it). Catalogue SQL and
//! identifier handling are always compiled.

pub mod catalog;
#[cfg(feature = "oracle")]
mod reader;

pub use catalog::{normalize_name, source_ident};
#[cfg(feature = "oracle")]
pub use reader::OracleReader;
