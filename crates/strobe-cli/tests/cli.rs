// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Integration tests for the strobe CLI
//!
//! These tests verify CLI commands work correctly end-to-end using the
//! assert_cmd crate pattern. No hardware is required, every command runs
//! against simulated frames.

use assert_cmd::Command;
use predicates::prelude::*;
use serial_test::serial;
use std::{env, fs, path::PathBuf};

/// Helper to create a Command for the strobe binary
/// Uses STROBE_BIN environment variable if set, otherwise the cargo-built binary
fn strobe_cmd() -> Command {
    let mut cmd = match env::var("STROBE_BIN") {
        Ok(bin_path) => Command::new(bin_path),
        Err(_) => Command::cargo_bin("strobe").unwrap(),
    };
    cmd.env_remove("STROBE_FLASH_CONFIG");
    cmd
}

/// Get the test data directory (target/testdata/strobe-cli)
/// Creates it if it doesn't exist
fn get_test_data_dir() -> PathBuf {
    let test_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .join("target")
        .join("testdata")
        .join("strobe-cli");

    fs::create_dir_all(&test_dir).expect("Failed to create test data directory");
    test_dir
}

fn json_output(cmd: &mut Command) -> serde_json::Value {
    let output = cmd.assert().success().get_output().stdout.clone();
    serde_json::from_slice(&output).expect("stdout is not valid JSON")
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

#[test]
fn test_cli_help() {
    strobe_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("simulate"))
        .stdout(predicate::str::contains("locker"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_cli_version() {
    strobe_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("strobe"));
}

#[test]
fn test_simulate_help() {
    strobe_cmd()
        .args(["simulate", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--cancel-at"))
        .stdout(predicate::str::contains("--script"));
}

// =============================================================================
// Config
// =============================================================================

#[test]
fn test_config_defaults_json() {
    let config = json_output(strobe_cmd().args(["--json", "config"]));

    assert_eq!(config["timeout"], 5);
    assert_eq!(config["ae_timeout"], 10);
    assert_eq!(config["main_wait"], 3);
    assert_eq!(config["liveness_bound"], 33);
}

#[test]
#[serial]
fn test_config_from_file_and_env() {
    let path = get_test_data_dir().join("short-ae.json");
    fs::write(&path, r#"{"ae_timeout": 2}"#).unwrap();

    let config = json_output(
        strobe_cmd()
            .args(["--json", "config", "--config"])
            .arg(&path),
    );
    assert_eq!(config["ae_timeout"], 2);
    assert_eq!(config["liveness_bound"], 25);

    let config = json_output(
        strobe_cmd()
            .env("STROBE_FLASH_CONFIG", &path)
            .args(["--json", "config"]),
    );
    assert_eq!(config["ae_timeout"], 2);
}

#[test]
fn test_config_missing_file() {
    strobe_cmd()
        .args(["config", "--config", "/nonexistent/strobe.json"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Configuration error"));
}

// =============================================================================
// Simulate
// =============================================================================

#[test]
fn test_simulate_single_episode() {
    let report = json_output(strobe_cmd().args(["--json", "simulate"]));

    assert_eq!(report["request"], "on");
    assert_eq!(report["episodes_completed"], 1);
    assert_eq!(report["episodes_cancelled"], 0);
    assert_eq!(report["episode_frames_max"], 33);
    assert_eq!(report["frames_processed"], 33);
    assert_eq!(report["timeouts"]["PRE_ON"], 1);
    assert!(report.get("trace").is_none());
}

#[test]
fn test_simulate_trace() {
    let report = json_output(strobe_cmd().args(["--json", "simulate", "--trace", "--request", "auto"]));

    let trace = report["trace"].as_array().unwrap();
    assert_eq!(trace.len(), 34);
    assert_eq!(trace[0]["status"], "off");
    assert_eq!(trace[33]["status"], "main_done");
}

#[test]
fn test_simulate_text_trace() {
    strobe_cmd()
        .args(["simulate", "--trace", "--episodes", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("MAIN_DONE"))
        .stdout(predicate::str::contains("Episodes done:     2"));
}

#[test]
fn test_simulate_cancel() {
    let report = json_output(strobe_cmd().args(["--json", "simulate", "--cancel-at", "5"]));

    assert_eq!(report["episodes_cancelled"], 1);
    assert_eq!(report["episodes_completed"], 0);
    assert_eq!(report["frames_processed"], 6);
}

#[test]
fn test_simulate_skipped_frames() {
    let report = json_output(strobe_cmd().args([
        "--json",
        "simulate",
        "--episodes",
        "3",
        "--skip-every",
        "5",
    ]));

    assert_eq!(report["episodes_completed"], 3);
    assert!(report["skipped_frames"].as_u64().unwrap() > 0);
}

#[test]
#[serial]
fn test_simulate_script() {
    let path = get_test_data_dir().join("ae-done.json");
    fs::write(&path, r#"[{}, {}, {"flash_ready": 1}]"#).unwrap();

    let report = json_output(
        strobe_cmd()
            .args(["--json", "simulate", "--script"])
            .arg(&path),
    );
    assert_eq!(report["episode_frames_max"], 26);
    assert!(report["timeouts"].get("PRE_ON").is_none());
}

#[test]
#[serial]
fn test_simulate_invalid_script() {
    let path = get_test_data_dir().join("invalid-script.json");
    fs::write(&path, r#"{"flash_ready": 1}"#).unwrap();

    strobe_cmd()
        .args(["simulate", "--script"])
        .arg(&path)
        .assert()
        .code(3);
}

#[test]
fn test_simulate_torch_requires_frames() {
    strobe_cmd()
        .args(["simulate", "--request", "torch"])
        .assert()
        .code(2);

    let report = json_output(strobe_cmd().args([
        "--json",
        "simulate",
        "--request",
        "torch",
        "--frames",
        "10",
    ]));
    assert_eq!(report["frames_processed"], 10);
    assert_eq!(report["episodes_completed"], 0);
}

#[test]
fn test_simulate_auto_converged_times_out() {
    strobe_cmd()
        .args(["simulate", "--request", "auto", "--ae-state", "converged"])
        .assert()
        .code(6)
        .stderr(predicate::str::contains("0 of 1 episodes"));
}

// =============================================================================
// Locker
// =============================================================================

#[test]
fn test_locker_json() {
    let report = json_output(strobe_cmd().args([
        "--json", "locker", "--buffers", "4", "--frames", "200",
    ]));

    assert_eq!(report["frames_submitted"], 200);
    assert_eq!(report["frames_consumed"], 200);
    assert_eq!(report["out_of_order"], 0);
    assert_eq!(report["snapshot"]["qnum"], 0);
    assert_eq!(report["snapshot"]["slots"].as_array().unwrap().len(), 4);
}

#[test]
fn test_locker_zero_buffers() {
    strobe_cmd()
        .args(["locker", "--buffers", "0"])
        .assert()
        .code(2);
}
