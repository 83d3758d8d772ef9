//! CLI integration tests

use std::process::Command;

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = Command::new("cargo")
        .args(["run", "-p", "wopt-cli", "--", "--help"])
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(
        stdout.contains("Workload Optimizer"),
        "Should show app name"
    );
    assert!(stdout.contains("metrics"), "Should show metrics command");
    assert!(stdout.contains("status"), "Should show status command");
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = Command::new("cargo")
        .args(["run", "-p", "wopt-cli", "--", "--version"])
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("wopt"), "Should show binary name");
}

/// Test metrics subcommand help
#[test]
fn test_metrics_help() {
    let output = Command::new("cargo")
        .args(["run", "-p", "wopt-cli", "--", "metrics", "--help"])
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Metrics help should succeed");
    assert!(
        stdout.contains("optimization"),
        "Should show optimization subcommand"
    );
    assert!(
        stdout.contains("executors"),
        "Should show executors subcommand"
    );
    assert!(stdout.contains("safety"), "Should show safety subcommand");
}

/// Test that an unreachable API surfaces an error
#[test]
fn test_unreachable_api_fails() {
    let output = Command::new("cargo")
        .args([
            "run",
            "-p",
            "wopt-cli",
            "--",
            "--api-url",
            "http://localhost:1",
            "status",
        ])
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success(), "Unreachable API should fail");
}
