//! Configuration validation.

use super::{Config, Parallelism};
use crate::error::{MigrateError, Result};
use std::collections::HashSet;

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Source validation
    if config.source.host.is_empty() {
        return Err(MigrateError::Config("source.host is required".into()));
    }
    if config.source.service_name.is_empty() {
        return Err(MigrateError::Config("source.service_name is required".into()));
    }
    if config.source.user.is_empty() {
        return Err(MigrateError::Config("source.user is required".into()));
    }
    if config.source.r#type != "oracle" {
        return Err(MigrateError::Config(format!(
            "source.type must be 'oracle', got '{}'",
            config.source.r#type
        )));
    }
    if config.source.schemas.is_empty() {
        return Err(MigrateError::Config(
            "source.schemas must list at least one schema".into(),
        ));
    }
    let mut seen = HashSet::new();
    for schema in &config.source.schemas {
        if schema.trim().is_empty() {
            return Err(MigrateError::Config(
                "source.schemas contains a blank entry".into(),
            ));
        }
        if !seen.insert(schema.to_lowercase()) {
            return Err(MigrateError::Config(format!(
                "source.schemas lists '{}' more than once",
                schema
            )));
        }
    }

    // Target validation
    if config.target.host.is_empty() {
        return Err(MigrateError::Config("target.host is required".into()));
    }
    if config.target.database.is_empty() {
        return Err(MigrateError::Config("target.database is required".into()));
    }
    if config.target.user.is_empty() {
        return Err(MigrateError::Config("target.user is required".into()));
    }
    if config.target.r#type != "postgres" {
        return Err(MigrateError::Config(format!(
            "target.type must be 'postgres', got '{}'",
            config.target.r#type
        )));
    }
    crate::drivers::common::SslMode::parse(&config.target.ssl_mode)?;

    // Cannot migrate onto the listener we read from
    if config.source.host == config.target.host && config.source.port == config.target.port {
        return Err(MigrateError::Config(
            "source and target cannot be the same server".into(),
        ));
    }

    if config.migration.batch_size == 0 {
        return Err(MigrateError::Config(
            "migration.batch_size must be at least 1".into(),
        ));
    }
    if let Some(Parallelism::Fixed(0)) = config.migration.workers {
        return Err(MigrateError::Config(
            "migration.workers must be at least 1".into(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MigrationConfig, SourceConfig, TargetConfig};

    fn valid_config() -> Config {
        Config {
            source: SourceConfig {
                r#type: "oracle".to_string(),
                host: "ora.internal".to_string(),
                port: 1521,
                service_name: "ORCLPDB1".to_string(),
                user: "system".to_string(),
                password: "password".to_string(),
                driver: "Oracle 21 ODBC driver".to_string(),
                schemas: vec!["sales".to_string()],
            },
            target: TargetConfig {
                r#type: "postgres".to_string(),
                host: "pg.internal".to_string(),
                port: 5432,
                database: "oracle_migration".to_string(),
                maintenance_database: "postgres".to_string(),
                user: "postgres".to_string(),
                password: "password".to_string(),
                ssl_mode: "disable".to_string(),
            },
            migration: MigrationConfig::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        let config = valid_config();
        assert!(validate(&config).is_ok());
    }

    fn rejection(config: &Config) -> String {
        validate(config).unwrap_err().to_string()
    }

    #[test]
    fn test_missing_source_host() {
        let mut config = valid_config();
        config.source.host.clear();
        assert!(rejection(&config).contains("source.host is required"));
    }

    #[test]
    fn test_database_types_are_fixed() {
        let mut config = valid_config();
        config.source.r#type = "mssql".to_string();
        assert!(rejection(&config).contains("source.type must be 'oracle'"));

        let mut config = valid_config();
        config.target.r#type = "oracle".to_string();
        assert!(rejection(&config).contains("target.type must be 'postgres'"));
    }

    #[test]
    fn test_empty_schema_list() {
        let mut config = valid_config();
        config.source.schemas.clear();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_duplicate_schema_rejected() {
        let mut config = valid_config();
        config.source.schemas = vec!["sales".into(), "SALES".into()];
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let mut config = valid_config();
        config.migration.batch_size = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let mut config = valid_config();
        config.migration.workers = Some(Parallelism::Fixed(0));
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_bad_ssl_mode_rejected() {
        let mut config = valid_config();
        config.target.ssl_mode = "sometimes".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_same_server_rejected() {
        let mut config = valid_config();
        config.target.host = config.source.host.clone();
        config.target.port = config.source.port;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_debug_output_hides_passwords() {
        let config = valid_config();
        let rendered = format!("{:?}", config);
        assert_eq!(rendered.matches("[REDACTED]").count(), 2);
        assert!(!rendered.contains("password: \"password\""));
        assert!(rendered.contains("ORCLPDB1"));
    }
}
