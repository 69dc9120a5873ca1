//! PostgreSQL target driver.
//!
//! - [`PgTarget`]: pooled target writer
//! - [`PgSession`]: one pooled connection used for a table copy
//! - [`copy`]: text-format `COPY` encoding
//! - [`reset_database`]: drop and recreate the target database

mod admin;
pub mod copy;
mod writer;

pub use admin::reset_database;
pub use writer::{build_pool, PgSession, PgTarget};
