use std::path::Path;

use predicates::prelude::*;
use serde_json::Value;
use tempfile::tempdir;

fn bin(db: &Path) -> assert_cmd::Command {
    let mut cmd = assert_cmd::Command::cargo_bin("dw").expect("binary");
    cmd.env_remove("DW_CONFIG")
        .env_remove("DW_DB")
        .env_remove("DW_AUTO_ADVANCE")
        .env("RUST_LOG", "warn")
        .arg("--db")
        .arg(db);
    cmd
}

fn json_out(cmd: &mut assert_cmd::Command) -> Value {
    let out = cmd.arg("--json").assert().success().get_output().stdout.clone();
    serde_json::from_slice(&out).expect("json output")
}

#[test]
fn add_complete_and_search() {
    let tmp = tempdir().expect("tmpdir");
    let db = tmp.path().join("dw.sqlite");

    let added = json_out(
        bin(&db)
            .args(["add", "Fix login", "--client", "Acme", "--priority", "high"])
            .args(["--description", "Users cannot sign in"]),
    );
    let id = added["id"].as_str().expect("id").to_string();
    assert_eq!(added["status"], "open");
    assert_eq!(added["priority"], "high");

    bin(&db)
        .args(["list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Acme: Fix login"));

    let done = json_out(bin(&db).args(["done", &id[..8]]));
    assert_eq!(done["status"], "done");

    let hits = json_out(bin(&db).args(["search", "login"]));
    assert_eq!(hits["demands"][0]["id"], id.as_str());
    let none = json_out(bin(&db).args(["search", "zzz-no-match"]));
    assert_eq!(none["demands"].as_array().map(Vec::len), Some(0));

    bin(&db)
        .args(["status", &id, "urgent"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot move"));
}

#[test]
fn advance_carries_open_work() {
    let tmp = tempdir().expect("tmpdir");
    let db = tmp.path().join("dw.sqlite");

    let added = json_out(bin(&db).args(["add", "Quarterly report", "-c", "Globex"]));
    let id = added["id"].as_str().expect("id").to_string();

    let report = json_out(bin(&db).args(["advance", "--at", "2099-01-07"]));
    assert_eq!(report["week"]["key"], "2099-01-05_2099-01-11");
    assert_eq!(report["carried"], 1);

    let week = json_out(bin(&db).args(["week", "show"]));
    assert_eq!(week["key"], "2099-01-05_2099-01-11");

    let board = json_out(bin(&db).args(["list"]));
    let first = &board["inProgress"][0];
    assert_eq!(first["id"], id.as_str());
    assert_eq!(first["status"], "urgent");
    assert_eq!(first["carriedOver"], true);
}

#[test]
fn disabled_auto_advance_is_respected() {
    let tmp = tempdir().expect("tmpdir");
    let db = tmp.path().join("dw.sqlite");
    bin(&db)
        .args(["settings", "set", "autoAdvance", "false"])
        .assert()
        .success()
        .stdout(predicate::str::contains("autoAdvance = false"));
    let out = json_out(bin(&db).args(["advance", "--at", "2099-01-07"]));
    assert_eq!(out["advanced"], false);
}

#[test]
fn clients_rename_cascades() {
    let tmp = tempdir().expect("tmpdir");
    let db = tmp.path().join("dw.sqlite");
    bin(&db).args(["add", "Audit", "-c", "Acme"]).assert().success();
    bin(&db).args(["clients", "add", "Acme"]).assert().success();
    bin(&db)
        .args(["clients", "rename", "Acme", "Acme Corp"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Acme Corp"));
    let rows = json_out(bin(&db).args(["clients", "summary"]));
    assert_eq!(rows[0]["client"], "Acme Corp");
    assert_eq!(rows[0]["total"], 1);
}

#[test]
fn reset_requires_confirmation() {
    let tmp = tempdir().expect("tmpdir");
    let db = tmp.path().join("dw.sqlite");
    bin(&db).args(["add", "Audit", "-c", "Acme"]).assert().success();
    bin(&db)
        .arg("reset")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--yes"));
    bin(&db).args(["reset", "--yes"]).assert().success();
    let board = json_out(bin(&db).args(["list"]));
    assert_eq!(board["inProgress"].as_array().map(Vec::len), Some(0));
}

#[test]
fn paths_and_completions() {
    let tmp = tempdir().expect("tmpdir");
    let db = tmp.path().join("dw.sqlite");
    let paths = json_out(bin(&db).arg("paths"));
    assert_eq!(paths["db"], db.to_string_lossy().as_ref());

    bin(&db)
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("dw"));
}

#[test]
fn week_at_the_calendar_edge_is_rejected() {
    let tmp = tempdir().expect("tmpdir");
    let db = tmp.path().join("dw.sqlite");
    bin(&db)
        .args(["week", "set", "+262142-12-31"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid week"))
        .stderr(predicate::str::contains("panicked").not());
}
