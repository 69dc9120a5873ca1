//! CLI integration tests for oracle-pg-migrate.
//!
//! These tests verify command-line argument parsing, help output,
//! and exit codes for configuration errors. None of them reach a database.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

/// Get a command for the oracle-pg-migrate binary.
fn cmd() -> Command {
    Command::cargo_bin("oracle-pg-migrate").unwrap()
}

fn config_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{}", contents).unwrap();
    file
}

const VALID_CONFIG: &str = r#"
source:
  host: ora.internal
  service_name: ORCLPDB1
  user: system
  password: secret
  schemas: [hr, sales]
target:
  host: pg.internal
  database: warehouse
  user: loader
  password: secret
"#;

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
fn test_help_shows_all_commands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("build-schema"))
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("scan-nulls"))
        .stdout(predicate::str::contains("health-check"))
        .stdout(predicate::str::contains("reset-target"))
        .stdout(predicate::str::contains("init"));
}

#[test]
fn test_run_subcommand_help() {
    cmd()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--schemas"))
        .stdout(predicate::str::contains("--batch-size"))
        .stdout(predicate::str::contains("--trial"))
        .stdout(predicate::str::contains("--workers"))
        .stdout(predicate::str::contains("--keep-logging"))
        .stdout(predicate::str::contains("--skip-verify"))
        .stdout(predicate::str::contains("--skip-schema"));
}

#[test]
fn test_scan_nulls_help() {
    cmd()
        .args(["scan-nulls", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--remove"));
}

#[test]
fn test_reset_target_help() {
    cmd()
        .args(["reset-target", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--yes"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("oracle-pg-migrate"));
}

// =============================================================================
// Global Flag Defaults
// =============================================================================

#[test]
fn test_global_flag_defaults() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--output-json"))
        .stdout(predicate::str::contains("--log-file"))
        .stdout(predicate::str::contains("[default: config.yaml]"))
        .stdout(predicate::str::contains("[default: text]"))
        .stdout(predicate::str::contains("[default: info]"));
}

#[test]
fn test_short_config_flag() {
    cmd()
        .args(["-c", "some_config.yaml", "--help"])
        .assert()
        .success();
}

#[test]
fn test_no_subcommand_shows_usage() {
    cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}

#[test]
fn test_invalid_workers_rejected_by_parser() {
    cmd()
        .args(["run", "--workers", "many"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("workers must be 'auto' or a positive integer"));
}

// =============================================================================
// Exit Code Tests - Config Errors (Exit Code 2)
// =============================================================================

#[test]
fn test_missing_config_exits_with_code_2() {
    cmd()
        .args(["--config", "nonexistent_config_file.yaml", "health-check"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Config file not found"));
}

#[test]
fn test_invalid_yaml_exits_with_code_2() {
    let file = config_file("invalid: yaml: content: [\n");

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "validate"])
        .assert()
        .code(2);
}

#[test]
fn test_missing_schemas_exits_with_code_2() {
    let file = config_file(
        "source:\n  host: ora.internal\ntarget:\n  host: pg.internal\n  user: loader\n",
    );

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "health-check"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("source.schemas"));
}

#[test]
fn test_same_server_exits_with_code_2() {
    let file = config_file(&VALID_CONFIG.replace("pg.internal", "ora.internal").replace(
        "database: warehouse",
        "database: warehouse\n  port: 1521",
    ));

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "build-schema"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("cannot be the same server"));
}

#[test]
fn test_run_override_is_validated() {
    let file = config_file(VALID_CONFIG);
    let logs = tempfile::tempdir().unwrap();
    let log_file = logs.path().join("migration.log");

    cmd()
        .args([
            "--config",
            file.path().to_str().unwrap(),
            "--log-file",
            log_file.to_str().unwrap(),
            "run",
            "--batch-size",
            "0",
        ])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("migration.batch_size must be at least 1"));

    let written = std::fs::read_to_string(&log_file).unwrap();
    assert!(written.contains("Loaded configuration"));
}

#[test]
fn test_log_file_directory_is_created() {
    let file = config_file(VALID_CONFIG);
    let logs = tempfile::tempdir().unwrap();
    let log_file = logs.path().join("nested").join("run.log");

    cmd()
        .args([
            "--config",
            file.path().to_str().unwrap(),
            "--log-file",
            log_file.to_str().unwrap(),
            "run",
            "--batch-size",
            "0",
        ])
        .assert()
        .code(2);

    let written = std::fs::read_to_string(&log_file).unwrap();
    assert!(written.contains("INFO"));
}
