use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use assert_fs::prelude::*;
use assert_fs::TempDir;
use predicates::prelude::*;
use predicates::str::contains;
use serde_json::Value;

use syncward_daemon::HostLock;

fn syncward(base: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("syncward"));
    cmd.arg("--base-dir")
        .arg(base)
        .env("HOME", base)
        .env_remove("SYNCWARD_BASE_DIR")
        .env_remove("SYNCWARD_LOCK_DIR")
        .env_remove("SYNCWARD_BRIDGE_COMMAND")
        .env_remove("RUST_LOG");
    cmd
}

fn status_json(base: &Path) -> Vec<Value> {
    let output = syncward(base)
        .args(["status", "--json"])
        .output()
        .expect("run status");
    assert!(output.status.success());
    serde_json::from_slice(&output.stdout).expect("status JSON")
}

#[test]
fn init_creates_layout_and_settings() {
    let base = TempDir::new().expect("base");

    syncward(base.path())
        .arg("init")
        .assert()
        .success()
        .stdout(contains("Wrote default settings.yaml"));

    base.child("settings.yaml").assert(predicate::path::is_file());
    base.child("state").assert(predicate::path::is_dir());
    base.child("queues/edit").assert(predicate::path::is_dir());
    base.child("queues/synchronize").assert(predicate::path::is_dir());
    base.child("webwork").assert(predicate::path::is_dir());
    base.child("logs").assert(predicate::path::is_dir());

    syncward(base.path())
        .arg("init")
        .assert()
        .success()
        .stdout(contains("Kept existing settings.yaml"));
}

#[test]
fn enqueue_is_idempotent_and_visible_in_status() {
    let base = TempDir::new().expect("base");

    syncward(base.path())
        .args(["enqueue", "proja", "--stage", "edit"])
        .assert()
        .success()
        .stdout(contains("Queued 'proja' for edit"));
    syncward(base.path())
        .args(["enqueue", "proja", "--stage", "edit"])
        .assert()
        .success()
        .stdout(contains("already queued"));
    base.child("queues/edit/proja").assert(predicate::path::is_file());

    let rows = status_json(base.path());
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["project"], "proja");
    assert_eq!(rows[0]["status"], "IDLE");
    assert_eq!(rows[0]["queued"], serde_json::json!(["edit"]));
}

#[test]
fn enqueue_rejects_bad_codes_and_stages() {
    let base = TempDir::new().expect("base");

    syncward(base.path())
        .args(["enqueue", "../escape"])
        .assert()
        .failure()
        .stderr(contains("not a usable project code"));
    syncward(base.path())
        .args(["enqueue", "proja", "--stage", "none"])
        .assert()
        .failure()
        .stderr(contains("unknown queue stage"));
}

#[test]
fn hold_and_release_round_trip() {
    let base = TempDir::new().expect("base");

    syncward(base.path())
        .args(["hold", "proja", "--reason", "remote repository is being migrated"])
        .assert()
        .success();
    let rows = status_json(base.path());
    assert_eq!(rows[0]["status"], "HOLD");
    assert_eq!(rows[0]["error_message"], "remote repository is being migrated");

    syncward(base.path())
        .args(["status"])
        .assert()
        .success()
        .stdout(contains("1 on hold"));

    syncward(base.path())
        .args(["release", "proja"])
        .assert()
        .success()
        .stdout(contains("released"));
    let rows = status_json(base.path());
    assert_eq!(rows[0]["status"], "IDLE");
    assert_eq!(rows[0]["error_message"], Value::Null);

    syncward(base.path())
        .args(["release", "proja"])
        .assert()
        .success()
        .stdout(contains("not on hold"));
}

#[test]
fn run_on_empty_queues_is_clean() {
    let base = TempDir::new().expect("base");

    syncward(base.path())
        .arg("run")
        .assert()
        .success()
        .stdout(contains("swept 0 project turn(s)"));
}

#[test]
fn run_without_bridge_fails_only_the_project() {
    let base = TempDir::new().expect("base");
    syncward(base.path())
        .args(["enqueue", "proja"])
        .assert()
        .success();

    syncward(base.path())
        .args(["run", "-p", "proja"])
        .assert()
        .success()
        .stdout(contains("swept 1 project turn(s)"))
        .stdout(contains("1 failed"));

    base.child("queues/synchronize/proja")
        .assert(predicate::path::missing());
    let rows = status_json(base.path());
    assert_eq!(rows[0]["status"], "IDLE");
}

#[test]
fn run_leaves_queues_alone_when_lock_is_held() {
    let base = TempDir::new().expect("base");
    syncward(base.path())
        .args(["enqueue", "proja"])
        .assert()
        .success();
    let _held = HostLock::require(&base.path().join("run").join("syncward.pid")).expect("lock");

    syncward(base.path())
        .arg("run")
        .assert()
        .success()
        .stderr(contains("another syncward process holds"));

    base.child("queues/synchronize/proja")
        .assert(predicate::path::is_file());
}

#[test]
fn status_filters_by_project() {
    let base = TempDir::new().expect("base");
    for code in ["proja", "projb"] {
        syncward(base.path())
            .args(["enqueue", code])
            .assert()
            .success();
    }

    let output = syncward(base.path())
        .args(["status", "--project", "projb", "--json"])
        .output()
        .expect("status");
    let rows: Vec<Value> = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["project"], "projb");
    assert_eq!(rows[0]["queued"], serde_json::json!(["synchronize"]));
}
