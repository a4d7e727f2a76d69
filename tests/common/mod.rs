//! Shared test helpers for integration tests

#![allow(dead_code)]

use arar::core::analysis::{Analysis, AnalysisRecord};
use arar::core::uvalue::UValue;
use assert_cmd::cargo;
use assert_cmd::Command;
use std::path::PathBuf;
use std::rc::Rc;
use tempfile::TempDir;

/// Helper to get an arar command with no ambient configuration
pub fn arar() -> Command {
    let mut cmd = Command::new(cargo::cargo_bin!("arar"));
    cmd.env_remove("ARAR_CONFIG");
    cmd
}

/// Write `content` to `name` inside a fresh temp directory
pub fn write_file(name: &str, content: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join(name);
    std::fs::write(&path, content).unwrap();
    (tmp, path)
}

/// A heating step with an age, J = 0.01 (exact) and a 39ArK signal
pub fn step(runid: &str, age: f64, err: f64, k39: f64) -> AnalysisRecord {
    AnalysisRecord::new(runid, UValue::new(age, err), UValue::exact(0.01))
        .with_aliquot("01")
        .with_k39(UValue::exact(k39))
}

/// Shared handles plus the trait objects a group consumes
pub fn share(records: Vec<AnalysisRecord>) -> (Vec<Rc<AnalysisRecord>>, Vec<Rc<dyn Analysis>>) {
    let handles: Vec<Rc<AnalysisRecord>> = records.into_iter().map(Rc::new).collect();
    let members = handles
        .iter()
        .map(|r| r.clone() as Rc<dyn Analysis>)
        .collect();
    (handles, members)
}

/// YAML for a step-heat dataset from (age, err, k39) triples
pub fn step_heat_yaml(kind: &str, steps: &[(f64, f64, f64)]) -> String {
    let mut yaml = format!("name: test-sample\nkind: {}\nanalyses:\n", kind);
    for (i, (age, err, k39)) in steps.iter().enumerate() {
        let letter = char::from(b'A' + i as u8);
        yaml.push_str(&format!(
            "  - runid: 1000-01{letter}\n    aliquot: \"01\"\n    step: {letter}\n    age: {{ nominal: {age}, std_dev: {err} }}\n    j: {{ nominal: 0.01 }}\n    signals:\n      k39: {{ nominal: {k39} }}\n"
        ));
    }
    yaml
}
