//! End-to-end tests for the snippet-verdict binary: exit codes, config
//! approval and report output.

#![cfg(unix)]
#![allow(deprecated)]

mod common;

use assert_cmd::Command;
use common::TestFixture;
use serde_json::Value;
use std::path::Path;
use tempfile::TempDir;

fn snippet_verdict(data_home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("snippet-verdict").unwrap();
    cmd.env("XDG_DATA_HOME", data_home);
    cmd
}

fn approve(data_home: &Path, config: &Path) {
    snippet_verdict(data_home)
        .arg("allow")
        .arg(config)
        .assert()
        .success();
}

#[test]
fn cli_matching_fixture_exits_zero() {
    let data_home = TempDir::new().unwrap();
    let fixture = TestFixture::new("matching").unwrap();
    let config = fixture.write_config().unwrap();
    approve(data_home.path(), &config);

    let output = snippet_verdict(data_home.path())
        .arg("check")
        .arg(fixture.path())
        .arg("--config")
        .arg(&config)
        .assert()
        .code(0)
        .get_output()
        .stdout
        .clone();

    let table = String::from_utf8(output).unwrap();
    assert!(table.contains("SNIPPET"), "missing table header:\n{}", table);
    assert!(
        table.contains("7 matched, 0 mismatched"),
        "unexpected summary:\n{}",
        table
    );
}

#[test]
fn cli_mismatch_exits_one() {
    let data_home = TempDir::new().unwrap();
    let fixture = TestFixture::new("mismatch").unwrap();
    let config = fixture.write_config().unwrap();
    approve(data_home.path(), &config);

    let output = snippet_verdict(data_home.path())
        .arg("check")
        .arg(fixture.path())
        .arg("--config")
        .arg(&config)
        .assert()
        .code(1)
        .get_output()
        .stderr
        .clone();

    let stderr = String::from_utf8(output).unwrap();
    assert!(stderr.contains("Verdict mismatch"), "stderr:\n{}", stderr);
}

#[test]
fn cli_unapproved_config_is_tooling_error() {
    let data_home = TempDir::new().unwrap();
    let fixture = TestFixture::new("matching").unwrap();
    let config = fixture.write_config().unwrap();

    let output = snippet_verdict(data_home.path())
        .arg("check")
        .arg(fixture.path())
        .arg("--config")
        .arg(&config)
        .assert()
        .code(2)
        .get_output()
        .stderr
        .clone();

    let stderr = String::from_utf8(output).unwrap();
    assert!(stderr.contains("snippet-verdict allow"), "stderr:\n{}", stderr);
}

#[test]
fn cli_denied_config_needs_approval_again() {
    let data_home = TempDir::new().unwrap();
    let fixture = TestFixture::new("empty").unwrap();
    let config = fixture.write_config().unwrap();
    approve(data_home.path(), &config);

    snippet_verdict(data_home.path())
        .arg("deny")
        .arg(&config)
        .assert()
        .success();

    snippet_verdict(data_home.path())
        .arg("check")
        .arg(fixture.path())
        .arg("--config")
        .arg(&config)
        .assert()
        .code(2);
}

#[test]
fn cli_missing_directory_is_tooling_error() {
    let data_home = TempDir::new().unwrap();

    snippet_verdict(data_home.path())
        .arg("check")
        .arg(data_home.path().join("does-not-exist"))
        .assert()
        .code(2);
}

#[test]
fn cli_zero_timeout_is_rejected() {
    let data_home = TempDir::new().unwrap();
    let fixture = TestFixture::new("empty").unwrap();

    snippet_verdict(data_home.path())
        .arg("check")
        .arg(fixture.path())
        .args(["--timeout", "0"])
        .assert()
        .code(2);
}

#[test]
fn cli_builtin_toolchains_need_no_config() {
    let data_home = TempDir::new().unwrap();
    let fixture = TestFixture::new("matching").unwrap();

    // Without the config the `shc` fences have no toolchain and are skipped
    let output = snippet_verdict(data_home.path())
        .arg("check")
        .arg(fixture.path())
        .args(["--format", "json"])
        .assert()
        .code(0)
        .get_output()
        .stdout
        .clone();

    let report: Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(report["summary"]["snippets"], 4);
    assert_eq!(report["summary"]["skipped_by_reason"]["unsupported_language"], 3);
}

#[test]
fn cli_json_report_written_to_file() {
    let data_home = TempDir::new().unwrap();
    let fixture = TestFixture::new("mismatch").unwrap();
    let config = fixture.write_config().unwrap();
    approve(data_home.path(), &config);
    let report_path = data_home.path().join("report.json");

    snippet_verdict(data_home.path())
        .arg("check")
        .arg(fixture.path())
        .arg("--config")
        .arg(&config)
        .args(["--format", "json", "--lang", "shell"])
        .arg("--output")
        .arg(&report_path)
        .assert()
        .code(1);

    let report: Value =
        serde_json::from_str(&std::fs::read_to_string(&report_path).unwrap()).unwrap();
    assert_eq!(report["summary"]["snippets"], 2);
    assert_eq!(report["summary"]["mismatched"], 1);
    assert_eq!(report["summary"]["skipped_by_reason"]["filtered"], 1);

    let entries = report["entries"].as_array().unwrap();
    assert_eq!(entries[0]["expected"], "fixed");
    assert_eq!(entries[0]["observed"], "runtime_error");
    assert_eq!(entries[0]["verdict"], "mismatch");
}

#[test]
fn cli_languages_lists_builtins() {
    let data_home = TempDir::new().unwrap();

    let output = snippet_verdict(data_home.path())
        .arg("languages")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let listing = String::from_utf8(output).unwrap();
    assert!(listing.contains("python"));
    assert!(listing.contains("run:     sh {src}"));
}
