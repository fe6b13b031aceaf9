//! CLI integration tests for data-checksum.
//!
//! These tests verify command-line argument parsing, help output,
//! and exit codes for configuration errors. None of them reach a database.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

/// Get a command for the data-checksum binary.
fn cmd() -> Command {
    Command::cargo_bin("data-checksum").unwrap()
}

fn config_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{}", contents).unwrap();
    file
}

const CONNECTIONS: &str = r#"
source:
  host: 127.0.0.1
  port: 1
  user: checker
  password: secret
target:
  host: 127.0.0.1
  port: 1
  user: checker
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
        .stdout(predicate::str::contains("resume"))
        .stdout(predicate::str::contains("pairs"))
        .stdout(predicate::str::contains("health-check"));
}

#[test]
fn test_run_subcommand_help() {
    cmd()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--workers"))
        .stdout(predicate::str::contains("--chunk-size"))
        .stdout(predicate::str::contains("--superset-as-equal"))
        .stdout(predicate::str::contains("--differential"));
}

#[test]
fn test_resume_subcommand_help() {
    cmd()
        .args(["resume", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--job-id"))
        .stdout(predicate::str::contains("--workers"));
}

#[test]
fn test_resume_requires_job_id() {
    cmd()
        .arg("resume")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--job-id"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("data-checksum"));
}

// =============================================================================
// Global Flags Tests
// =============================================================================

#[test]
fn test_shutdown_timeout_default() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--shutdown-timeout"))
        .stdout(predicate::str::contains("[default: 60]"));
}

#[test]
fn test_progress_flag_exists() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--progress"));
}

#[test]
fn test_output_json_flag_exists() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--output-json"));
}

#[test]
fn test_log_file_flag_exists() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--log-file"));
}

#[test]
fn test_log_format_flag_exists() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--log-format"))
        .stdout(predicate::str::contains("[default: text]"));
}

#[test]
fn test_verbosity_flag_exists() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--verbosity"))
        .stdout(predicate::str::contains("[default: info]"));
}

#[test]
fn test_config_default() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("[default: config.yaml]"));
}

// =============================================================================
// Exit Code Tests
// =============================================================================

#[test]
fn test_missing_config_exits_with_code_7() {
    // Missing file is an IO error (code 7), not config error (code 1)
    cmd()
        .args(["--config", "nonexistent_config_file.yaml", "health-check"])
        .assert()
        .code(7);
}

#[test]
fn test_invalid_yaml_exits_with_code_1() {
    let file = config_file("invalid: yaml: content: [\n");

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "health-check"])
        .assert()
        .code(1);
}

#[test]
fn test_empty_config_exits_with_code_1() {
    let file = config_file("");

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "health-check"])
        .assert()
        .code(1);
}

#[test]
fn test_missing_target_exits_with_code_1() {
    let file = config_file(
        r#"
source:
  host: 127.0.0.1
  user: checker
tables:
  pairs:
    - source: shop.orders
"#,
    );

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "run"])
        .assert()
        .code(1);
}

#[test]
fn test_missing_table_selection_exits_with_code_1() {
    let file = config_file(CONNECTIONS);

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "run"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("tables.pairs"));
}

#[test]
fn test_unqualified_pair_exits_with_code_1() {
    let file = config_file(&format!(
        "{}tables:\n  pairs:\n    - source: orders\n",
        CONNECTIONS
    ));

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "pairs"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("database.table"));
}

#[test]
fn test_zero_workers_override_exits_with_code_1() {
    let file = config_file(&format!(
        "{}tables:\n  pairs:\n    - source: shop.orders\n",
        CONNECTIONS
    ));

    cmd()
        .args([
            "--config",
            file.path().to_str().unwrap(),
            "run",
            "--workers",
            "0",
        ])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("workers"));
}

#[test]
fn test_resume_without_tracking_exits_with_code_1() {
    let file = config_file(&format!(
        "{}tables:\n  pairs:\n    - source: shop.orders\n",
        CONNECTIONS
    ));

    cmd()
        .args([
            "--config",
            file.path().to_str().unwrap(),
            "resume",
            "--job-id",
            "a_b_20260101000000",
        ])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("tracking"));
}

// =============================================================================
// Offline Commands
// =============================================================================

#[test]
fn test_pairs_lists_explicit_pairs_without_connecting() {
    let file = config_file(&format!(
        "{}tables:\n  pairs:\n    - source: shop.orders\n      target: archive.orders\n    - source: shop.items\n",
        CONNECTIONS
    ));

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "pairs"])
        .assert()
        .success()
        .stdout(predicate::str::contains("shop.orders"))
        .stdout(predicate::str::contains("archive.orders"))
        .stdout(predicate::str::contains("2 table pairs"));
}

#[test]
fn test_pairs_output_json() {
    let file = config_file(&format!(
        "{}tables:\n  pairs:\n    - source: shop.orders\n",
        CONNECTIONS
    ));

    let output = cmd()
        .args([
            "--output-json",
            "--config",
            file.path().to_str().unwrap(),
            "pairs",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());

    let pairs: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(pairs.as_array().unwrap().len(), 1);
}

// =============================================================================
// Argument Parsing Tests
// =============================================================================

#[test]
fn test_short_config_flag() {
    cmd()
        .args(["-c", "nonexistent.yaml", "health-check"])
        .assert()
        .code(7);
}

#[test]
fn test_no_subcommand_shows_help() {
    cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}

#[test]
fn test_unknown_subcommand_fails() {
    cmd()
        .arg("sync")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized subcommand"));
}
