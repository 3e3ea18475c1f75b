use assert_cmd::Command;
use predicates::prelude::*;
use std::path::{Path, PathBuf};

fn fixture() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/ct_study.json")
}

fn dcmtree(config_home: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("dcmtree"));
    cmd.env("XDG_CONFIG_HOME", config_home)
        .env("HOME", config_home)
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn print_shows_full_tree() {
    let temp = tempfile::tempdir().unwrap();

    dcmtree(temp.path())
        .arg("--print")
        .arg(fixture())
        .assert()
        .success()
        .stdout(predicate::str::contains("(0010,0010)"))
        .stdout(predicate::str::contains("Patient's Name"))
        .stdout(predicate::str::contains("DOE^JOHN"))
        .stdout(predicate::str::contains("    Item 2"))
        .stdout(predicate::str::contains("<Binary Data>"))
        .stdout(predicate::str::contains("match(es)").not());
}

#[test]
fn print_with_query_prunes_and_counts() {
    let temp = tempfile::tempdir().unwrap();

    let assert = dcmtree(temp.path())
        .args(["--print", "--query", "doe"])
        .arg(fixture())
        .assert()
        .success()
        .stdout(predicate::str::contains("1 match(es)"));

    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("FILE: "));
    assert!(lines[1].contains("DOE^JOHN"));
}

#[test]
fn print_json_exposes_highlights() {
    let temp = tempfile::tempdir().unwrap();

    let assert = dcmtree(temp.path())
        .args(["--print", "--json", "--query", "scan"])
        .arg(fixture())
        .assert()
        .success();

    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
    let json_end = stdout.rfind('}').unwrap() + 1;
    let root: serde_json::Value = serde_json::from_str(&stdout[..json_end]).unwrap();
    let node = &root["children"][0];
    assert!(node["label"].as_str().unwrap().contains("CT SCAN CHEST"));
    assert_eq!(node["highlights"][0]["field"], "Value");
    assert_eq!(node["highlights"][0]["range"]["start"], 3);
    assert_eq!(node["highlights"][0]["range"]["end"], 7);
}

#[test]
fn missing_file_fails_cleanly() {
    let temp = tempfile::tempdir().unwrap();

    dcmtree(temp.path())
        .arg("--print")
        .arg(temp.path().join("absent.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read"));
}

#[test]
fn settings_file_limits_depth() {
    let temp = tempfile::tempdir().unwrap();
    let config = temp.path().join("settings.json");
    std::fs::write(&config, r#"{"max_depth": 2}"#).unwrap();

    dcmtree(temp.path())
        .arg("--print")
        .arg("--config")
        .arg(&config)
        .arg(fixture())
        .assert()
        .success()
        .stdout(predicate::str::contains("tree too deep to fully display"))
        .stdout(predicate::str::contains("NESTED-7").not());
}
