use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::{TempDir, tempdir};

/// `shift` rooted at `root`, isolated from the user's global config.
fn shift(root: &Path) -> Command {
    let mut cmd = Command::cargo_bin("shift").unwrap();
    cmd.current_dir(root)
        .env("XDG_CONFIG_HOME", root.join(".xdg"))
        .env("HOME", root)
        .env("SHIFT_USER", "ci")
        .env("SHIFT_EMAIL", "ci@example.com")
        .env_remove("SHIFT_CONFIG")
        .env_remove("SHIFT_DATABASE")
        .env_remove("SHIFT_TARGET")
        .arg("--root")
        .arg(root);
    cmd
}

fn json(cmd: &mut Command) -> Value {
    let output = cmd.arg("--json").output().unwrap();
    serde_json::from_slice(&output.stdout).unwrap()
}

fn project() -> TempDir {
    let dir = tempdir().unwrap();
    shift(dir.path()).arg("init").assert().success();
    dir
}

#[test]
fn test_cli_help() {
    Command::cargo_bin("shift")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("rewind"));
}

#[test]
fn test_cli_version() {
    Command::cargo_bin("shift")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_init_creates_layout() {
    let dir = project();
    assert!(dir.path().join("shift.toml").is_file());
    assert!(dir.path().join("changes").is_dir());
    assert!(dir.path().join("schema").is_dir());
    assert!(dir.path().join(".shift/shift.db").is_file());

    shift(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));
}

#[test]
fn test_new_add_run_list_history_flow() {
    let dir = project();
    let root = dir.path();

    let created = json(shift(root).args(["new", "create", "users", "--date", "2024-06-01"]));
    assert_eq!(created["status"], "ok");
    assert_eq!(created["data"]["name"], "2024-06-01-create-users");

    shift(root)
        .args(["add", "2024-06-01-create-users", "users table"])
        .assert()
        .success();
    fs::write(
        root.join("changes/2024-06-01-create-users/change/001_users_table.sql"),
        "CREATE TABLE users(id INTEGER PRIMARY KEY, email TEXT);",
    )
    .unwrap();
    shift(root)
        .args(["add", "2024-06-01-create-users", "drop users", "--revert"])
        .assert()
        .success();
    fs::write(
        root.join("changes/2024-06-01-create-users/revert/001_drop_users.sql"),
        "DROP TABLE users;",
    )
    .unwrap();

    let listed = json(shift(root).args(["list", "--pending"]));
    assert_eq!(listed["data"]["count"], 1);
    assert_eq!(listed["data"]["changes"][0]["status"], "pending");

    let ran = json(shift(root).args(["run", "2024-06-01-create-users"]));
    assert_eq!(ran["status"], "ok");
    assert_eq!(ran["data"]["files"][0]["status"], "success");

    let again = json(shift(root).args(["run", "2024-06-01-create-users"]));
    assert_eq!(again["data"]["up_to_date"], true);

    let listed = json(shift(root).arg("list"));
    assert_eq!(listed["data"]["changes"][0]["status"], "success");
    assert_eq!(listed["data"]["changes"][0]["applied_by"], "ci <ci@example.com>");

    let history = json(shift(root).arg("history"));
    let operations = history["data"]["operations"].as_array().unwrap();
    assert_eq!(operations.len(), 1);
    assert_eq!(operations[0]["direction"], "change");

    let reverted = json(shift(root).args(["rewind", "1"]));
    assert_eq!(reverted["status"], "ok");
    assert_eq!(reverted["data"]["results"][0]["name"], "2024-06-01-create-users");
}

#[test]
fn test_failed_change_exits_with_execution_code() {
    let dir = project();
    let root = dir.path();
    let change = root.join("changes/2024-06-02-broken/change");
    fs::create_dir_all(&change).unwrap();
    fs::write(change.join("001_bad.sql"), "NOT VALID SQL;").unwrap();

    let output = shift(root)
        .args(["--json", "run", "2024-06-02-broken"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    let body: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(body["status"]["failed"]["failed"], 1);
    assert_eq!(body["data"]["files"][0]["status"], "failed");
}

#[test]
fn test_unknown_change_is_a_structured_error() {
    let dir = project();
    let output = shift(dir.path())
        .args(["--json", "run", "2099-01-01-missing"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let body: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(body["status"]["error"]["code"], "CHANGE_NOT_FOUND");
    assert_eq!(body["status"]["error"]["numeric_code"], 101);
}

#[test]
fn test_lock_acquire_status_release() {
    let dir = project();
    let root = dir.path();

    let acquired = json(shift(root).args(["lock", "acquire", "--reason", "deploy"]));
    assert_eq!(acquired["data"]["locked_by"], "ci <ci@example.com>");
    assert_eq!(acquired["data"]["reason"], "deploy");

    let status = json(shift(root).args(["lock", "status"]));
    assert_eq!(status["data"]["is_locked"], true);

    let other = shift(root)
        .env("SHIFT_USER", "someone")
        .args(["--json", "lock", "acquire"])
        .output()
        .unwrap();
    assert!(!other.status.success());
    let body: Value = serde_json::from_slice(&other.stdout).unwrap();
    assert_eq!(body["status"]["error"]["code"], "LOCK_HELD");

    shift(root).args(["lock", "release"]).assert().success();
    let status = json(shift(root).args(["lock", "status"]));
    assert_eq!(status["data"]["is_locked"], false);
}

#[test]
fn test_exec_runs_loose_files() {
    let dir = project();
    let root = dir.path();
    fs::write(root.join("seed.sql"), "CREATE TABLE seeded(id INTEGER);").unwrap();

    let ran = json(shift(root).args(["exec", "seed.sql"]));
    assert_eq!(ran["status"], "ok");
    assert_eq!(ran["data"]["files"][0]["filepath"], "seed.sql");

    let again = json(shift(root).args(["exec", "seed.sql"]));
    assert_eq!(again["data"]["files"][0]["status"], "skipped");
}
