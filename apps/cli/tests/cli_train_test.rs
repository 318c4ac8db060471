//! Integration tests for the `lumen` binary.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// `lumen` isolated from any settings files on the machine.
fn lumen(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("lumen").unwrap();
    cmd.current_dir(home.path()).env("HOME", home.path());
    cmd
}

fn empty_settings(home: &TempDir) -> String {
    let path = home.path().join("settings.toml");
    std::fs::write(&path, "").unwrap();
    path.to_str().unwrap().to_string()
}

#[test]
fn test_archs_lists_every_tag() {
    let home = TempDir::new().unwrap();
    lumen(&home)
        .arg("archs")
        .assert()
        .success()
        .stdout(predicate::str::contains("alexnet"))
        .stdout(predicate::str::contains("resnet"))
        .stdout(predicate::str::contains("vgg"));
}

#[test]
fn test_archs_json() {
    let home = TempDir::new().unwrap();
    let output = lumen(&home).args(["archs", "--json"]).output().unwrap();
    assert!(output.status.success());

    let archs: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let tags: Vec<_> = archs.as_array().unwrap().iter().map(|a| a["architecture"].as_str().unwrap()).collect();
    assert_eq!(tags, vec!["alexnet", "resnet", "vgg"]);
    assert_eq!(archs[1]["head"], "fc");
}

#[test]
fn test_unknown_architecture_fails() {
    let home = TempDir::new().unwrap();
    lumen(&home)
        .args(["train", r#"{"architecture":"squeezenet","epochCount":2,"learningRate":0.001}"#])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unsupported architecture: squeezenet"));
}

#[test]
fn test_non_canonical_config_field_rejected() {
    let home = TempDir::new().unwrap();
    lumen(&home)
        .arg("train")
        .write_stdin(r#"{"architecture":"resnet","maxEpochs":2,"learningRate":0.001}"#)
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid training config"));
}

#[test]
fn test_config_from_file_with_missing_corpus() {
    let home = TempDir::new().unwrap();
    let config = home.path().join("job.json");
    std::fs::write(&config, r#"{"architecture":"alexnet","epochCount":1,"learningRate":0.01}"#).unwrap();
    let settings = empty_settings(&home);

    lumen(&home)
        .args(["train", config.to_str().unwrap(), "--settings", &settings, "--bind", "127.0.0.1:0"])
        .args(["--data-root", "does-not-exist", "--device", "cpu", "--linger-ms", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("corpus root is not a directory"));
}

#[test]
fn test_invalid_settings_fail_before_bind() {
    let home = TempDir::new().unwrap();
    let settings = empty_settings(&home);
    lumen(&home)
        .args(["train", r#"{"architecture":"vgg","epochCount":1,"learningRate":0.01}"#, "--settings", &settings])
        .args(["--batch-size", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("batch_size must be >= 1"));
}

#[test]
fn test_watch_without_job_fails() {
    let home = TempDir::new().unwrap();
    lumen(&home)
        .args(["watch", "--addr", "127.0.0.1:9", "--wait", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to connect to progress socket"));
}
