//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::{MigrateError, Result};
use std::path::Path;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                MigrateError::Config(format!("Config file not found: {}", path.display()))
            }
            _ => MigrateError::Io(e),
        })?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Serialize back to YAML (used by the init wizard).
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

impl SourceConfig {
    /// Build an ODBC connection string for the Oracle driver.
    pub fn connection_string(&self) -> String {
        format!(
            "Driver={{{}}};DBQ={}:{}/{};UID={};PWD={};",
            self.driver, self.host, self.port, self.service_name, self.user, self.password
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
source:
  password: oracle
  schemas: [sales, hr]
target:
  password: secret
"#;

    #[test]
    fn test_defaults_applied() {
        let config = Config::from_yaml(MINIMAL).unwrap();
        assert_eq!(config.source.host, "localhost");
        assert_eq!(config.source.port, 1521);
        assert_eq!(config.source.service_name, "sys");
        assert_eq!(config.source.user, "sys");
        assert_eq!(config.target.port, 5432);
        assert_eq!(config.target.database, "oracle_migration");
        assert_eq!(config.target.user, "postgres");
        assert_eq!(config.migration.batch_size, 300_000);
        assert!(config.migration.disable_logging);
        assert!(!config.migration.trial_run);
        assert_eq!(config.migration.workers, None);
        assert_eq!(config.migration.null_chars, NullCharPolicy::Check);
        assert!(config.migration.verify);
    }

    #[test]
    fn test_workers_auto_and_count() {
        let auto = Config::from_yaml(&format!("{}migration:\n  workers: auto\n", MINIMAL)).unwrap();
        assert_eq!(auto.migration.workers, Some(Parallelism::Auto));

        let fixed = Config::from_yaml(&format!("{}migration:\n  workers: 4\n", MINIMAL)).unwrap();
        assert_eq!(fixed.migration.workers, Some(Parallelism::Fixed(4)));
        assert_eq!(fixed.migration.worker_count(2), 2);
        assert_eq!(fixed.migration.worker_count(10), 4);
    }

    #[test]
    fn test_workers_rejects_garbage() {
        let result = Config::from_yaml(&format!("{}migration:\n  workers: lots\n", MINIMAL));
        assert!(result.is_err());
    }

    #[test]
    fn test_trial_run_clamps_batch_size() {
        let mut config = Config::from_yaml(MINIMAL).unwrap();
        config.migration.trial_run = true;
        assert_eq!(config.migration.effective_batch_size(), 100);
        config.migration.batch_size = 40;
        assert_eq!(config.migration.effective_batch_size(), 40);
        config.migration.trial_run = false;
        config.migration.batch_size = 300_000;
        assert_eq!(config.migration.effective_batch_size(), 300_000);
    }

    #[test]
    fn test_source_connection_string() {
        let config = Config::from_yaml(MINIMAL).unwrap();
        assert_eq!(
            config.source.connection_string(),
            "Driver={Oracle 21 ODBC driver};DBQ=localhost:1521/sys;UID=sys;PWD=oracle;"
        );
    }

    #[test]
    fn test_load_missing_file_is_config_error() {
        let err = Config::load("/definitely/not/here.yaml").unwrap_err();
        assert!(matches!(err, MigrateError::Config(_)));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_yaml_round_trip_keeps_workers() {
        let config = Config::from_yaml(&format!("{}migration:\n  workers: auto\n", MINIMAL)).unwrap();
        let yaml = config.to_yaml().unwrap();
        let again = Config::from_yaml(&yaml).unwrap();
        assert_eq!(again.migration.workers, Some(Parallelism::Auto));
    }
}
