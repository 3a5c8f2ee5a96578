//! End-to-end tests of the `query-profile` binary.
//!
//! A small shell script stands in for the query shell: it ignores the
//! query flags and just occupies a process for a while.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

fn profiler() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_query-profile"));
    cmd.env("RUST_LOG", "warn");
    cmd
}

#[cfg(unix)]
fn stub_shell(dir: &Path, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("run");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// GIVEN a shell path that does not exist
/// WHEN the profiler starts
/// THEN it fails before launching anything
#[test]
fn test_missing_shell_exits_nonzero() {
    profiler()
        .args(["--shell", "/nonexistent/run", "--query", "SELECT 1;"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("cannot find query shell"));
}

#[test]
fn test_missing_tables_exits_nonzero() {
    let dir = TempDir::new().unwrap();
    let shell = dir.path().join("run");
    std::fs::write(&shell, "").unwrap();

    profiler()
        .arg("--shell")
        .arg(&shell)
        .args(["--tables", "/nonexistent/specs"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot find table specs"));
}

#[test]
fn test_unparsable_config_exits_nonzero() {
    let dir = TempDir::new().unwrap();
    let shell = dir.path().join("run");
    std::fs::write(&shell, "").unwrap();
    let config = dir.path().join("osquery.conf");
    std::fs::write(&config, "{ scheduledQueries: ").unwrap();

    profiler()
        .arg("--shell")
        .arg(&shell)
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot parse config"));
}

#[test]
fn test_config_without_queries_exits_cleanly() {
    let dir = TempDir::new().unwrap();
    let shell = dir.path().join("run");
    std::fs::write(&shell, "").unwrap();
    let config = dir.path().join("osquery.conf");
    std::fs::write(&config, r#"{"options": {"host_identifier": "hostname"}}"#).unwrap();

    profiler()
        .arg("--shell")
        .arg(&shell)
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("does not contain any scheduledQueries"));
}

/// GIVEN a query shell that runs for about a second
/// WHEN one query is profiled with JSON output on stdout
/// THEN the report holds one averaged result with consistent CPU times
#[cfg(target_os = "linux")]
#[test]
fn test_profiles_manual_query() {
    let dir = TempDir::new().unwrap();
    let shell = stub_shell(dir.path(), "exec sleep 1");
    let output = dir.path().join("report.json");

    profiler()
        .arg("--shell")
        .arg(&shell)
        .args(["--query", "SELECT * FROM time;"])
        .arg("--output")
        .arg(&output)
        .timeout(Duration::from_secs(30))
        .assert()
        .success()
        .stdout(predicate::str::contains("Profiling query: SELECT * FROM time;"))
        .stdout(predicate::str::contains("manual   avg"));

    let report: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
    let manual = &report["manual"];
    let user = manual["user_time"].as_f64().unwrap();
    let system = manual["system_time"].as_f64().unwrap();
    let cpu = manual["cpu_time"].as_f64().unwrap();
    assert!((cpu - (user + system)).abs() < 1e-9);
    assert!(manual["memory"].as_f64().unwrap() > 0.0);
    assert!(manual["fds"].as_f64().unwrap() >= 0.0);
}

/// GIVEN a query shell that never finishes
/// WHEN it is profiled with a one second timeout
/// THEN it is killed and the profiler returns promptly
#[cfg(target_os = "linux")]
#[test]
fn test_timeout_kills_hung_query() {
    let dir = TempDir::new().unwrap();
    let shell = stub_shell(dir.path(), "exec sleep 60");

    profiler()
        .arg("--shell")
        .arg(&shell)
        .args(["--query", "SELECT 1;", "--timeout", "1", "--summary", "--output", "-"])
        .timeout(Duration::from_secs(20))
        .assert()
        .success()
        .stdout(predicate::str::contains("\"manual\""))
        .stdout(predicate::str::contains("\"duration\""));
}

#[cfg(target_os = "linux")]
#[test]
fn test_rounds_are_reported() {
    let dir = TempDir::new().unwrap();
    let shell = stub_shell(dir.path(), "exit 0");

    profiler()
        .arg("--shell")
        .arg(&shell)
        .args(["--query", "SELECT 1;", "--rounds", "2"])
        .timeout(Duration::from_secs(20))
        .assert()
        .success()
        .stdout(predicate::str::contains("manual (1/2)"))
        .stdout(predicate::str::contains("manual (2/2)"));
}
