//! Integration tests for the `kinodata evaluate` command.

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;

const RECORDS: &str = concat!(
    r#"{"prediction": [1.0, 2.0], "target": [1.5, 2.5], "identifier": ["101", "102"]}"#,
    "\n",
    r#"{"prediction": [3.0], "target": [2.0], "identifier": [103]}"#,
    "\n",
);

fn kinodata(temp: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("kinodata").unwrap();
    cmd.current_dir(temp.path())
        .env("HOME", temp.path())
        .env_remove("KINODATA_OUTPUT_DIR")
        .env_remove("RUST_LOG");
    cmd
}

fn write_records(dir: &Path, contents: &str) -> std::path::PathBuf {
    let path = dir.join("records.jsonl");
    std::fs::write(&path, contents).unwrap();
    path
}

#[test]
fn test_evaluate_validation_json_output() {
    let temp = TempDir::new().unwrap();
    let input = write_records(temp.path(), RECORDS);
    let runs = temp.path().join("runs");

    let assert = kinodata(&temp)
        .arg("evaluate")
        .arg("--input")
        .arg(&input)
        .arg("--output-dir")
        .arg(&runs)
        .arg("--json")
        .assert()
        .success();

    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
    let json: serde_json::Value =
        serde_json::from_str(&stdout).expect("evaluate --json should print JSON");
    assert_eq!(json["metrics"]["kind"], "validation");
    assert_eq!(json["metrics"]["num_samples"], 3);
    let mae = json["metrics"]["mae"].as_f64().unwrap();
    assert!((mae - 2.0 / 3.0).abs() < 1e-9);

    let run_dir = Path::new(json["run_dir"].as_str().unwrap());
    assert!(run_dir.starts_with(&runs));
    assert!(run_dir.join("images/scatter_val.svg").exists());
    assert!(run_dir.join("metrics.jsonl").exists());
    assert!(run_dir.join("run_manifest.json").exists());
}

#[test]
fn test_evaluate_test_pass_writes_prediction_table() {
    let temp = TempDir::new().unwrap();
    let input = write_records(temp.path(), RECORDS);

    let assert = kinodata(&temp)
        .args(["evaluate", "--kind", "test", "--json", "--input"])
        .arg(&input)
        .env("KINODATA_OUTPUT_DIR", temp.path().join("env-runs"))
        .assert()
        .success();

    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
    let json: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let run_dir = Path::new(json["run_dir"].as_str().unwrap());
    assert!(run_dir.starts_with(temp.path().join("env-runs")));

    let csv = std::fs::read_to_string(run_dir.join("tables/test_predictions.csv")).unwrap();
    assert_eq!(csv, "prediction,identifier\n1,101\n2,102\n3,103\n");
}

#[test]
fn test_evaluate_human_output_reports_undefined_correlation() {
    let temp = TempDir::new().unwrap();
    let input = write_records(
        temp.path(),
        r#"{"prediction": [1.0, 2.0, 3.0], "target": [2.0, 2.0, 2.0], "identifier": [1, 2, 3]}"#,
    );

    kinodata(&temp)
        .args(["evaluate", "--no-save", "--input"])
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains("validation pass, 3 samples"))
        .stdout(predicate::str::contains("undefined"));

    assert!(!temp.path().join("kinodata-runs").exists());
}

#[test]
fn test_evaluate_empty_input_fails() {
    let temp = TempDir::new().unwrap();
    let input = write_records(temp.path(), "\n");

    kinodata(&temp)
        .args(["evaluate", "--no-save", "--input"])
        .arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("no batches"));
}

#[test]
fn test_evaluate_rejects_misaligned_record() {
    let temp = TempDir::new().unwrap();
    let input = write_records(
        temp.path(),
        r#"{"prediction": [1.0, 2.0], "target": [1.0], "identifier": [1, 2]}"#,
    );

    kinodata(&temp)
        .args(["evaluate", "--no-save", "--input"])
        .arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("misaligned"));
}

#[test]
fn test_evaluate_uses_config_file_names() {
    let temp = TempDir::new().unwrap();
    let input = write_records(temp.path(), RECORDS);
    let config = temp.path().join("eval.toml");
    std::fs::write(&config, "[metrics]\nscatter_image = \"val_scatter\"\n").unwrap();

    let assert = kinodata(&temp)
        .arg("--config")
        .arg(&config)
        .args(["evaluate", "--json", "--output-dir"])
        .arg(temp.path().join("runs"))
        .arg("--input")
        .arg(&input)
        .assert()
        .success();

    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
    let json: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let run_dir = Path::new(json["run_dir"].as_str().unwrap());
    assert!(run_dir.join("images/val_scatter.svg").exists());
}
