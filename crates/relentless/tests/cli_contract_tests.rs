//! CLI contract tests
//!
//! Runs the `relentless` binary against small shell commands.
//!
//! Contract guarantees tested:
//! - Deterministic exit codes (0 success, 1 failure)
//! - Stable JSON schema in `--format json` mode
//! - Config file values apply and flags override them
//! - Actionable error messages for invalid options

#![cfg(unix)]

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

// =============================================================================
// Test fixture helpers
// =============================================================================

#[allow(deprecated)]
fn relentless() -> Command {
    let mut cmd = Command::cargo_bin("relentless").expect("relentless binary should be built");
    cmd.env_remove("RUST_LOG");
    cmd.env_remove("RELENTLESS_CONFIG");
    cmd
}

/// A shell command that fails until it has run `succeed_on` times, counting
/// runs in a file under `dir`.
fn flaky(dir: &TempDir, succeed_on: u32) -> String {
    let counter = dir.path().join("runs");
    format!(
        "n=$(cat {path} 2>/dev/null || echo 0); n=$((n+1)); echo $n > {path}; [ $n -ge {succeed_on} ]",
        path = counter.display()
    )
}

fn runs(dir: &TempDir) -> u32 {
    std::fs::read_to_string(dir.path().join("runs"))
        .map(|s| s.trim().parse().unwrap_or(0))
        .unwrap_or(0)
}

fn json_summary(output: &[u8]) -> serde_json::Value {
    serde_json::from_slice(output).expect("stdout should be a JSON summary")
}

// =============================================================================
// Exit codes
// =============================================================================

#[test]
fn contract_success_exits_zero() {
    relentless().args(["--", "true"]).assert().success();
}

#[test]
fn contract_exhausted_exits_one() {
    relentless()
        .args(["--max-attempts", "2", "--min-wait-ms", "0", "--", "false"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("exhausted after 2 attempt(s)"));
}

#[test]
fn contract_flaky_command_eventually_succeeds() {
    let dir = TempDir::new().expect("create temp dir");
    relentless()
        .args(["--max-attempts", "5", "--min-wait-ms", "1", "--", "sh", "-c"])
        .arg(flaky(&dir, 3))
        .assert()
        .success();
    assert_eq!(runs(&dir), 3);
}

#[test]
fn contract_stop_on_exit_code() {
    relentless()
        .args([
            "--max-attempts",
            "10",
            "--min-wait-ms",
            "0",
            "--stop-on-exit",
            "3",
            "--",
            "sh",
            "-c",
            "exit 3",
        ])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("stopped after 1 attempt(s)"))
        .stderr(predicate::str::contains("exited with status 3"));
}

#[test]
fn contract_missing_program_stops_immediately() {
    relentless()
        .args(["--max-attempts", "10", "--", "relentless-test-no-such-program"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("failed to start"));
}

// =============================================================================
// --format json
// =============================================================================

#[test]
fn contract_json_summary_on_failure() {
    let output = relentless()
        .args([
            "--format",
            "json",
            "--max-attempts",
            "3",
            "--min-wait-ms",
            "0",
            "--allow-duplicate-errors",
            "--",
            "false",
        ])
        .assert()
        .code(1)
        .get_output()
        .stdout
        .clone();

    let summary = json_summary(&output);
    assert_eq!(summary["state"], "exhausted");
    assert_eq!(summary["attempts"], 3);
    assert_eq!(summary["retries_consumed"], 3);
    let errors = summary["errors"].as_array().expect("errors array");
    assert_eq!(errors.len(), 3);
    assert_eq!(errors[0]["category"], "CommandError");
    assert!(summary["elapsed_ms"].is_u64());
}

#[test]
fn contract_json_summary_dedups_by_default() {
    let output = relentless()
        .args(["--format", "json", "--max-attempts", "3", "--min-wait-ms", "0", "--", "false"])
        .assert()
        .code(1)
        .get_output()
        .stdout
        .clone();

    let summary = json_summary(&output);
    assert_eq!(summary["errors"].as_array().map(Vec::len), Some(1));
}

#[test]
fn contract_json_summary_on_success() {
    let output = relentless()
        .args(["--format", "json", "--", "true"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let summary = json_summary(&output);
    assert_eq!(summary["state"], "succeeded");
    assert_eq!(summary["attempts"], 1);
    assert_eq!(summary["errors"].as_array().map(Vec::len), Some(0));
}

#[test]
fn contract_plain_success_is_quiet() {
    relentless()
        .args(["--", "true"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("\x1b[").not());
}

// =============================================================================
// Config file
// =============================================================================

#[test]
fn contract_config_file_applies() {
    let dir = TempDir::new().expect("create temp dir");
    let path = dir.path().join("relentless.toml");
    std::fs::write(&path, "[retry]\nmax_attempts = 4\nmin_wait_ms = 0\n").expect("write config");

    let output = relentless()
        .arg("--config")
        .arg(&path)
        .args(["--format", "json", "--", "false"])
        .assert()
        .code(1)
        .get_output()
        .stdout
        .clone();
    assert_eq!(json_summary(&output)["attempts"], 4);
}

#[test]
fn contract_flags_override_config_file() {
    let dir = TempDir::new().expect("create temp dir");
    let path = dir.path().join("relentless.toml");
    std::fs::write(&path, "[retry]\nmax_attempts = 4\nmin_wait_ms = 0\n").expect("write config");

    let output = relentless()
        .arg("--config")
        .arg(&path)
        .args(["--max-attempts", "2", "--format", "json", "--", "false"])
        .assert()
        .code(1)
        .get_output()
        .stdout
        .clone();
    assert_eq!(json_summary(&output)["attempts"], 2);
}

#[test]
fn contract_unknown_config_key_is_rejected() {
    let dir = TempDir::new().expect("create temp dir");
    let path = dir.path().join("relentless.toml");
    std::fs::write(&path, "[retry]\nretries = 4\n").expect("write config");

    relentless()
        .arg("--config")
        .arg(&path)
        .args(["--", "true"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("relentless.toml"));
}

// =============================================================================
// Invalid options
// =============================================================================

#[test]
fn contract_invalid_attempts_names_field() {
    relentless()
        .args(["--max-attempts", "0", "--", "true"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("max_attempts"));
}

#[test]
fn contract_inverted_wait_bounds_rejected() {
    relentless()
        .args(["--min-wait-ms", "500", "--max-wait-ms", "100", "--", "true"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("min_wait_ms"));
}

#[test]
fn contract_missing_command_is_usage_error() {
    relentless()
        .arg("--jitter")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

// =============================================================================
// Logging
// =============================================================================

#[test]
fn contract_debug_json_logs_retries() {
    relentless()
        .args([
            "--log-level",
            "debug",
            "--log-format",
            "json",
            "--max-attempts",
            "2",
            "--min-wait-ms",
            "0",
            "--",
            "false",
        ])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Retrying operation after failure"))
        .stderr(predicate::str::contains("\"attempt\":1"));
}
