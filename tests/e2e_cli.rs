//! CLI end-to-end tests.

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::process::Command;
use tempfile::tempdir;

#[allow(deprecated)]
fn renderforge_cmd() -> Command {
    Command::cargo_bin("renderforge").unwrap()
}

#[test]
fn no_args_shows_help() {
    renderforge_cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn version_command() {
    renderforge_cmd()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("renderforge"));
}

#[test]
fn check_tools_mentions_ffmpeg() {
    renderforge_cmd()
        .arg("check-tools")
        .assert()
        .success()
        .stdout(predicate::str::contains("ffmpeg"));
}

#[test]
fn validate_reports_warnings() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.json");
    fs::write(
        &path,
        r#"{"server": {"port": 9100}, "queue": {"max_concurrent": 0}}"#,
    )
    .unwrap();

    renderforge_cmd()
        .args(["validate", path.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("9100"))
        .stdout(predicate::str::contains("max_concurrent"));
}

#[test]
fn validate_rejects_unparsable_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.json");
    fs::write(&path, "{ nope").unwrap();

    renderforge_cmd()
        .args(["validate", path.to_str().unwrap()])
        .assert()
        .failure();
}

#[test]
fn derive_prints_render_params() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("request.json");
    fs::write(
        &path,
        r#"{
            "project": {"timeline": {"fps": 24}},
            "settings": {"source": {"kind": "timeline", "inFrame": 0, "outFrame": 239}}
        }"#,
    )
    .unwrap();

    let output = renderforge_cmd()
        .args(["derive", path.to_str().unwrap()])
        .output()
        .unwrap();
    assert!(output.status.success());

    let params: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(params["durationSeconds"], 10.0);
    assert_eq!(params["width"], 640);
    assert_eq!(params["height"], 360);
}

#[test]
fn derive_rejects_oversized_request() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("request.json");
    fs::write(
        &path,
        r#"{"settings": {"resolutionMode": "custom", "width": 20000, "height": 20000}}"#,
    )
    .unwrap();

    renderforge_cmd()
        .args(["derive", path.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("too large"));
}
