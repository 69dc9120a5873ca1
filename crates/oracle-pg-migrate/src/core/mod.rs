//! Core abstractions shared by the migration components and the drivers.
//!
//! - [`schema`]: reflected table and column metadata
//! - [`value`]: SQL values and row batches
//! - [`traits`]: source, target and session interfaces

pub mod schema;
pub mod traits;
pub mod value;

pub use schema::{Column, SourceType, Table, DEFAULT_ROW_KEY};
pub use traits::{ConnectionFactory, SourceReader, TargetSession, TargetWriter};
pub use value::{Batch, Row, SqlValue};
