use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn write_config(dir: &std::path::Path, body: &str) -> std::path::PathBuf {
    let path = dir.join("artifact-sanity.yaml");
    fs::write(&path, body).expect("failed to write config");
    path
}

#[test]
fn select_prints_the_variant_for_configured_platform() {
    let temp = tempdir().expect("failed to create tempdir");
    let config = write_config(
        temp.path(),
        "platform:\n  name: CentOS\n  version: \"7\"\n  release: \"4\"\n",
    );

    Command::cargo_bin("artifact-sanity")
        .unwrap()
        .args(["select", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::diff("centos-7\n"));
}

#[test]
fn select_honours_the_ami_flag_and_json_output() {
    let temp = tempdir().expect("failed to create tempdir");
    let config = write_config(
        temp.path(),
        "platform:\n  name: ubuntu\n  version: \"16\"\n  release: \"04\"\n",
    );

    Command::cargo_bin("artifact-sanity")
        .unwrap()
        .args(["select", "--ami", "--json", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""variant":"ami""#))
        .stdout(predicate::str::contains(r#""platform":"ubuntu 16.04""#));
}

#[test]
fn unsupported_platform_exits_non_zero() {
    let temp = tempdir().expect("failed to create tempdir");
    let config = write_config(temp.path(), "platform:\n  name: arch\n  version: rolling\n");

    Command::cargo_bin("artifact-sanity")
        .unwrap()
        .args(["--log-level", "off", "select", "-c"])
        .arg(&config)
        .assert()
        .code(1)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("Unsupported platform: arch rolling"));
}

#[test]
fn unknown_config_keys_are_rejected() {
    let temp = tempdir().expect("failed to create tempdir");
    let config = write_config(temp.path(), "sw_repository: http://example.com/scylla.repo\n");

    Command::cargo_bin("artifact-sanity")
        .unwrap()
        .args(["select", "--config"])
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid YAML format"));
}

#[test]
fn empty_mode_is_rejected_before_touching_the_host() {
    let temp = tempdir().expect("failed to create tempdir");

    Command::cargo_bin("artifact-sanity")
        .unwrap()
        .args(["install", "--mode", " "])
        .current_dir(temp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("install mode cannot be empty"));
}
