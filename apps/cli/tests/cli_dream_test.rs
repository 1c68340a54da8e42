//! Integration tests for the dream command.
//!
//! No pretrained weights are available here, so these cover everything up to
//! the weight load.

use assert_cmd::Command;
use image::{Rgb, RgbImage};
use predicates::prelude::*;
use std::path::PathBuf;
use tempfile::TempDir;

fn reverie(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("reverie").unwrap();
    cmd.env("HOME", home.path())
        .env("REVERIE_WEIGHTS_DIR", home.path().join("weights"))
        .current_dir(home.path());
    cmd
}

fn write_input(home: &TempDir) -> PathBuf {
    let path = home.path().join("cat.png");
    RgbImage::from_pixel(40, 30, Rgb([120, 80, 40])).save(&path).unwrap();
    path
}

#[test]
fn test_help() {
    let home = TempDir::new().unwrap();

    reverie(&home)
        .args(["dream", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--step-size"))
        .stdout(predicate::str::contains("--max-dimension"));
}

#[test]
fn test_missing_input() {
    let home = TempDir::new().unwrap();

    reverie(&home)
        .args(["dream", "missing.jpg"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read"));
}

#[test]
fn test_undecodable_input() {
    let home = TempDir::new().unwrap();
    let path = home.path().join("notes.png");
    std::fs::write(&path, "not an image").unwrap();

    reverie(&home)
        .arg("dream")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to decode"));
}

#[test]
fn test_unknown_model() {
    let home = TempDir::new().unwrap();
    let input = write_input(&home);

    reverie(&home)
        .arg("dream")
        .arg(&input)
        .args(["--model", "resnet"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown model type: resnet"));

    assert!(!home.path().join("cat_dream.png").exists());
}

#[test]
fn test_invalid_step_size() {
    let home = TempDir::new().unwrap();
    let input = write_input(&home);

    reverie(&home)
        .arg("dream")
        .arg(&input)
        .args(["--step-size", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration Error"));
}

#[test]
fn test_missing_weights() {
    let home = TempDir::new().unwrap();
    let input = write_input(&home);

    reverie(&home)
        .arg("dream")
        .arg(&input)
        .args(["--model", "vgg16", "--json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Resource Error"))
        .stderr(predicate::str::contains("vgg16.mpk"));
}
