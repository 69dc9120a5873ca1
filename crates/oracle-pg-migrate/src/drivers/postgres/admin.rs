//! Administrative operations on the target server.

use tracing::info;

use crate::builder::ddl::quote_ident;
use crate::config::TargetConfig;
use crate::error::{MigrateError, Result};

use super::writer::build_pool;

/// Terminate other sessions on the target database, drop it and create it
/// again, working through the maintenance database.
pub async fn reset_database(config: &TargetConfig) -> Result<()> {
    let name = &config.database;
    if name == &config.maintenance_database {
        return Err(MigrateError::Config(format!(
            "refusing to reset the maintenance database '{}'",
            name
        )));
    }

    let pool = build_pool(config, &config.maintenance_database, 1)?;
    let client = pool
        .get()
        .await
        .map_err(|e| MigrateError::pool(e, "connecting to the maintenance database"))?;

    let terminated = client
        .execute(
            "SELECT pg_terminate_backend(pid) FROM pg_stat_activity \
             WHERE datname = $1 AND pid <> pg_backend_pid()",
            &[name],
        )
        .await?;
    info!("Terminated {} session(s) on {}", terminated, name);

    client
        .batch_execute(&format!("DROP DATABASE IF EXISTS {}", quote_ident(name)))
        .await?;
    client
        .batch_execute(&format!("CREATE DATABASE {}", quote_ident(name)))
        .await?;
    info!("Recreated database {}", name);

    pool.close();
    Ok(())
}
