//! CLI integration tests

mod common;

use common::{arar, step_heat_yaml, write_file};
use predicates::prelude::*;

const PLATEAU_STEPS: &[(f64, f64, f64)] = &[
    (10.0, 0.1, 10.0),
    (10.05, 0.1, 10.0),
    (10.1, 0.1, 10.0),
    (20.0, 0.1, 1.0),
];

// ============================================================================
// Basic
// ============================================================================

#[test]
fn test_help() {
    arar()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("reduce"))
        .stdout(predicate::str::contains("steps"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_version() {
    arar()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("arar"));
}

// ============================================================================
// reduce
// ============================================================================

#[test]
fn test_reduce_table_output() {
    let (_tmp, path) = write_file("sample.yaml", &step_heat_yaml("interpreted", PLATEAU_STEPS));
    arar()
        .arg("reduce")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("test-sample"))
        .stdout(predicate::str::contains("Plateau steps"))
        .stdout(predicate::str::contains("A-C"))
        .stdout(predicate::str::contains("Preferred values"));
}

#[test]
fn test_reduce_json_output() {
    let (_tmp, path) = write_file("sample.yaml", &step_heat_yaml("step_heat", PLATEAU_STEPS));
    let output = arar()
        .args(["reduce", "--output", "json"])
        .arg(&path)
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["variant"], "step_heat");
    assert_eq!(report["nratio"], "4/4");
    assert_eq!(report["plateau"]["steps"], "A-C");
    assert_eq!(report["plateau"]["mswd"]["n"], 3);
    let plateau_age = report["plateau"]["age"]["nominal"].as_f64().unwrap();
    assert!((plateau_age - 10.05).abs() < 1e-6);
}

#[test]
fn test_reduce_preferred_age_kind() {
    let (_tmp, path) = write_file("sample.yaml", &step_heat_yaml("interpreted", PLATEAU_STEPS));
    let output = arar()
        .args(["reduce", "-o", "json", "--age-kind", "plateau else weighted mean", "-e", "SEM"])
        .arg(&path)
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let age = &report["preferred"][0];
    assert_eq!(age["attr"], "age");
    assert_eq!(age["kind"], "Plateau else Weighted Mean");
    assert_eq!(age["computed_kind"], "Plateau");
    assert_eq!(age["error_kind"], "SEM");
    assert_eq!(report["nratio"], "3/4");
}

#[test]
fn test_reduce_error_kind_reaches_preferred_age() {
    let (_tmp, path) = write_file("sample.yaml", &step_heat_yaml("interpreted", PLATEAU_STEPS));
    let output = arar()
        .args(["reduce", "-o", "json", "-e", "SD"])
        .arg(&path)
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let age = &report["preferred"][0];
    assert_eq!(age["attr"], "age");
    assert_eq!(age["kind"], "Weighted Mean");
    assert_eq!(age["error_kind"], "SD");
}

#[test]
fn test_reduce_units_scale_display() {
    let (_tmp, path) = write_file("sample.yaml", &step_heat_yaml("simple", PLATEAU_STEPS));
    let output = arar()
        .args(["reduce", "-o", "json", "--units", "ka"])
        .arg(&path)
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["age_units"], "ka");
    assert!(report["weighted_mean"]["nominal"].as_f64().unwrap() > 10_000.0);
    assert!(report.get("plateau").is_none());
}

#[test]
fn test_reduce_rejects_unsupported_kind() {
    let (_tmp, path) = write_file("sample.yaml", &step_heat_yaml("step_heat", PLATEAU_STEPS));
    arar()
        .args(["reduce", "--age-kind", "plateau"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("interpreted"));
}

#[test]
fn test_reduce_missing_file() {
    arar()
        .args(["reduce", "/nonexistent/sample.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read file"));
}

#[test]
fn test_reduce_invalid_yaml_points_at_file() {
    let (_tmp, path) = write_file("broken.yaml", "name: x\nanalyses: [unclosed\n");
    arar()
        .arg("reduce")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("broken.yaml"));
}

#[test]
fn test_reduce_unknown_attribute_is_usage_error() {
    let (_tmp, path) = write_file("sample.yaml", &step_heat_yaml("simple", PLATEAU_STEPS));
    arar()
        .args(["reduce", "--attribute", "bogus"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown attribute"));
}

// ============================================================================
// steps
// ============================================================================

#[test]
fn test_steps_yaml_output() {
    let (_tmp, path) = write_file("sample.yaml", &step_heat_yaml("simple", PLATEAU_STEPS));
    let output = arar()
        .args(["steps", "-o", "yaml"])
        .arg(&path)
        .output()
        .unwrap();
    assert!(output.status.success());

    let steps: serde_yml::Value = serde_yml::from_slice(&output.stdout).unwrap();
    let steps = steps.as_sequence().unwrap();
    assert_eq!(steps.len(), 4);
    assert_eq!(steps[0]["runid"].as_str(), Some("1000-01A"));
    assert_eq!(steps[2]["plateau"].as_bool(), Some(true));
    assert_eq!(steps[3]["plateau"].as_bool(), Some(false));
}

#[test]
fn test_steps_fixed_bounds() {
    let (_tmp, path) = write_file("sample.yaml", &step_heat_yaml("step_heat", PLATEAU_STEPS));
    arar()
        .args(["steps", "--low", "B", "--high", "C"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("plateau B-C"));
}

#[test]
fn test_steps_no_plateau() {
    let steps = [(10.0, 0.1, 1.0), (20.0, 0.1, 1.0), (30.0, 0.1, 1.0)];
    let (_tmp, path) = write_file("sample.yaml", &step_heat_yaml("step_heat", &steps));
    arar()
        .arg("steps")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("no plateau"));
}

// ============================================================================
// config
// ============================================================================

#[test]
fn test_config_defaults() {
    arar()
        .args(["config", "-o", "yaml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("mswd_confidence: 0.95"))
        .stdout(predicate::str::contains("nsteps: 3"));
}

#[test]
fn test_config_from_env() {
    let (_tmp, path) = write_file("arar.yaml", "plateau:\n  nsteps: 5\n  definition: mahon\n");
    arar()
        .env("ARAR_CONFIG", &path)
        .args(["config", "-o", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"nsteps\": 5"))
        .stdout(predicate::str::contains("\"mahon\""));
}

#[test]
fn test_config_invalid_value() {
    let (_tmp, path) = write_file("arar.yaml", "mswd_confidence: 2.0\n");
    arar()
        .arg("--config")
        .arg(&path)
        .arg("config")
        .assert()
        .failure()
        .stderr(predicate::str::contains("mswd_confidence"));
}

#[test]
fn test_config_changes_plateau_search() {
    let (_tmp, config) = write_file("arar.yaml", "plateau:\n  nsteps: 4\n");
    let (_tmp2, path) = write_file("sample.yaml", &step_heat_yaml("step_heat", PLATEAU_STEPS));
    arar()
        .arg("--config")
        .arg(&config)
        .arg("steps")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("no plateau"));
}
