//! Exit statuses and output of the `shapecheck` binary.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

const CHECKS: &str = "\
checks:
  - name: classes
    code: CDF
    id: C001
    pattern: './/ClassDef'
";

fn shapecheck(cwd: &Path, args: &[&str]) -> Output {
    let global = cwd.join("no-global-config");
    Command::new(env!("CARGO_BIN_EXE_shapecheck"))
        .current_dir(cwd)
        .env("SHAPECHECK_CONFIG_DIR", global)
        .args(args)
        .output()
        .unwrap()
}

fn project(source: &str) -> TempDir {
    let tmp = TempDir::new().unwrap();
    fs::create_dir(tmp.path().join("src")).unwrap();
    fs::write(tmp.path().join("src/app.py"), source).unwrap();
    fs::write(tmp.path().join("checks.yml"), CHECKS).unwrap();
    tmp
}

#[test]
fn passing_run_exits_zero() {
    let tmp = project("class App:\n    pass\n");
    let out = shapecheck(tmp.path(), &["analyze", "src", "--checks-file", "checks.yml"]);
    assert_eq!(out.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("[CDF/C001] classes: 1 match(es)"));
}

#[test]
fn project_defaults_to_the_working_directory() {
    let tmp = project("class App:\n    pass\n");
    let out = shapecheck(tmp.path(), &["analyze", "--checks-file", "checks.yml"]);
    assert_eq!(out.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&out.stdout).contains("1 match(es)"));
}

#[test]
fn failing_rule_exits_one() {
    let tmp = project("def main():\n    pass\n");
    let out = shapecheck(tmp.path(), &["analyze", "src", "--checks-file", "checks.yml"]);
    assert_eq!(out.status.code(), Some(1));
}

#[test]
fn json_report_is_machine_readable() {
    let tmp = project("class App:\n    pass\n");
    let out = shapecheck(
        tmp.path(),
        &["analyze", "src", "--checks-file", "checks.yml", "--format", "json"],
    );
    let report: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(report["passed"], true);
    assert_eq!(report["rules"][0]["total"], 1);
    assert_eq!(report["rules"][0]["status"], "passed");
}

#[test]
fn missing_configuration_exits_one() {
    let tmp = project("class App:\n    pass\n");
    let out = shapecheck(tmp.path(), &["analyze", "src"]);
    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("Cannot perform analysis due to configuration"));
}

#[test]
fn invalid_checks_file_exits_one() {
    let tmp = project("class App:\n    pass\n");
    fs::write(tmp.path().join("bad.yml"), "checks:\n  - name: x\n").unwrap();
    let out = shapecheck(tmp.path(), &["analyze", "src", "--checks-file", "bad.yml"]);
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("Cannot perform analysis"));
}

#[test]
fn usage_error_exits_two() {
    let tmp = TempDir::new().unwrap();
    let out = shapecheck(tmp.path(), &["analyze", "--format", "yaml", "."]);
    assert_eq!(out.status.code(), Some(2));
}

#[test]
fn created_configuration_drives_analysis() {
    let tmp = project("class App:\n    def run(self):\n        pass\n");
    let created = shapecheck(tmp.path(), &["configure", "create"]);
    assert_eq!(created.status.code(), Some(0));
    assert!(tmp.path().join(".shapecheck/config.yml").is_file());

    let again = shapecheck(tmp.path(), &["configure", "create"]);
    assert_eq!(again.status.code(), Some(1));

    let listed = shapecheck(tmp.path(), &["list-checks"]);
    assert_eq!(listed.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&listed.stdout).contains("C001"));

    let out = shapecheck(tmp.path(), &["analyze", "src", "--format", "compact"]);
    assert_eq!(out.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("src/app.py:1:1: [CDF/C001]"));
}

#[test]
fn dump_prints_the_lowered_tree() {
    let tmp = project("class App:\n    pass\n");
    let out = shapecheck(tmp.path(), &["dump", "src/app.py"]);
    assert_eq!(out.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.starts_with("<Module>"));
    assert!(stdout.contains("<ClassDef "));
}

#[test]
fn dump_of_invalid_source_exits_one() {
    let tmp = project("class App(:\n");
    let out = shapecheck(tmp.path(), &["dump", "src/app.py"]);
    assert_eq!(out.status.code(), Some(1));
}

#[test]
fn syntax_errors_fail_the_run() {
    let tmp = project("class App:\n    pass\n");
    fs::write(tmp.path().join("src/broken.py"), "def (:\n").unwrap();
    let out = shapecheck(tmp.path(), &["analyze", "src", "--checks-file", "checks.yml"]);
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stdout).contains("broken.py"));
}
