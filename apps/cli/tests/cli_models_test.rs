//! Integration tests for the models command.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn reverie(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("reverie").unwrap();
    cmd.env("HOME", home.path()).current_dir(home.path());
    cmd
}

#[test]
fn test_models_lists_registry() {
    let home = TempDir::new().unwrap();

    reverie(&home)
        .arg("models")
        .assert()
        .success()
        .stdout(predicate::str::contains("inception"))
        .stdout(predicate::str::contains("vgg16"))
        .stdout(predicate::str::contains("(default)"));
}

#[test]
fn test_models_json() {
    let home = TempDir::new().unwrap();

    let output = reverie(&home).args(["models", "--json"]).output().unwrap();
    assert!(output.status.success());

    let models: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let models = models.as_array().unwrap();
    assert_eq!(models.len(), 2);
    assert_eq!(models[0]["id"], "inception");
    assert_eq!(models[0]["layers"], serde_json::json!(["mixed3", "mixed5"]));
    assert_eq!(models[0]["is_default"], true);
    assert_eq!(models[1]["architecture"], "vgg16");
}

#[test]
fn test_invalid_config_file_is_reported() {
    let home = TempDir::new().unwrap();
    std::fs::write(home.path().join(".reverierc"), "steps = \"many\"").unwrap();

    reverie(&home)
        .arg("models")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load configuration"));
}
