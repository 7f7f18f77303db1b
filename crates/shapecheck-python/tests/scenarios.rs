//! End-to-end runs of the analyzer over Python sources.

use std::fs;
use std::path::Path;

use shapecheck_core::{Analyzer, Bound, Cardinality, Rule, RunReport};
use shapecheck_python::PythonExtractor;
use tempfile::TempDir;

fn write(dir: &TempDir, name: &str, content: &str) {
    let path = dir.path().join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

fn run(roots: &[&Path], rules: Vec<Rule>) -> RunReport {
    let mut builder = Analyzer::builder()
        .roots(roots.iter().copied())
        .extractor(PythonExtractor::new());
    for rule in rules {
        builder = builder.rule(rule);
    }
    builder.build().unwrap().analyze().unwrap()
}

fn classes_rule() -> Rule {
    Rule::new("classes", "CDF", "C001", ".//ClassDef").unwrap()
}

const MIXED: &str = "\
def foo():
    pass


def test_bar():
    pass


class Baz:
    def baz(self):
        pass
";

#[test]
fn single_class_satisfies_default_bounds() {
    let dir = TempDir::new().unwrap();
    write(&dir, "models.py", "class Foo:\n    pass\n");

    let report = run(&[dir.path()], vec![classes_rule()]);

    assert_eq!(report.rules.len(), 1);
    let result = &report.rules[0];
    assert_eq!(result.total, 1);
    assert!(result.passed());
    assert!(report.passed);
    assert_eq!(report.exit_status().code(), 0);

    let record = &result.matches[0];
    assert!(record.file.ends_with("models.py"));
    assert_eq!((record.line, record.column), (1, 1));
    assert_eq!(record.node, "ClassDef");
    assert_eq!(record.snippet.as_deref(), Some("class Foo:"));
}

#[test]
fn empty_directory_fails_the_floor() {
    let dir = TempDir::new().unwrap();

    let report = run(&[dir.path()], vec![classes_rule()]);

    assert_eq!(report.files_scanned, 0);
    assert_eq!(report.rules[0].total, 0);
    assert_eq!(report.rules[0].violated(), Some(Bound::Min));
    assert!(!report.passed);
    assert_eq!(report.exit_status().code(), 1);
}

#[test]
fn functions_without_test_prefix() {
    let dir = TempDir::new().unwrap();
    write(&dir, "mixed.py", MIXED);
    let rule = Rule::new(
        "non-test functions",
        "FDF",
        "F001",
        ".//FunctionDef[not(contains(@name, 'test_'))]",
    )
    .unwrap();

    let report = run(&[dir.path()], vec![rule]);

    let lines: Vec<usize> = report.rules[0].matches.iter().map(|m| m.line).collect();
    assert_eq!(report.rules[0].total, 2);
    assert_eq!(lines, vec![1, 10]);
}

#[test]
fn missing_root_is_rejected_and_fails_the_run() {
    let dir = TempDir::new().unwrap();
    write(&dir, "models.py", "class Foo:\n    pass\n");
    let missing = dir.path().join("does-not-exist");

    let report = run(&[dir.path(), missing.as_path()], vec![classes_rule()]);

    assert!(report.rules[0].passed());
    assert_eq!(report.rejected, vec![missing]);
    assert!(!report.passed);
}

#[test]
fn syntax_errors_are_reported_once_across_rules() {
    let dir = TempDir::new().unwrap();
    write(&dir, "good.py", "class Good:\n    pass\n");
    write(&dir, "bad.py", "class Bad(:\n    pass\n");
    let functions = Rule::new("functions", "FDF", "F001", ".//FunctionDef")
        .unwrap()
        .with_count(Cardinality::new(Some(0), None).unwrap());

    let report = run(&[dir.path()], vec![classes_rule(), functions]);

    assert_eq!(report.parse_errors.len(), 1);
    assert!(report.parse_errors[0].path.ends_with("bad.py"));
    assert_eq!(report.parse_errors[0].line, 1);
    assert_eq!(report.rules[0].total, 1);
    assert!(report.rules[0]
        .matches
        .iter()
        .all(|m| !m.file.ends_with("bad.py")));
    assert!(report.rules.iter().all(|r| r.passed()));
    assert!(!report.passed);
}

#[test]
fn open_ceiling_never_fails_on_many_matches() {
    let dir = TempDir::new().unwrap();
    let many: String = (0..200).map(|i| format!("class C{i}:\n    pass\n")).collect();
    write(&dir, "many.py", &many);
    let rule = classes_rule().with_count(Cardinality::new(Some(1), None).unwrap());

    let report = run(&[dir.path()], vec![rule]);

    assert_eq!(report.rules[0].total, 200);
    assert!(report.passed);
}

#[test]
fn ceiling_breach_fails() {
    let dir = TempDir::new().unwrap();
    write(&dir, "mixed.py", MIXED);
    let rule = Rule::new("at most one", "FDF", "F002", ".//FunctionDef")
        .unwrap()
        .with_count(Cardinality::new(Some(0), Some(1)).unwrap());

    let report = run(&[dir.path()], vec![rule]);

    assert_eq!(report.rules[0].total, 3);
    assert_eq!(report.rules[0].violated(), Some(Bound::Max));
}

#[test]
fn invalid_pattern_errors_only_its_rule() {
    let dir = TempDir::new().unwrap();
    write(&dir, "models.py", "class Foo:\n    pass\n");
    let broken = Rule::new("broken", "X", "X001", ".//ClassDef[").unwrap();

    let report = run(&[dir.path()], vec![broken, classes_rule()]);

    assert!(report.rules[0].is_errored());
    assert!(report.rules[1].passed());
    assert!(!report.passed);
}

#[test]
fn nested_packages_are_discovered_in_path_order() {
    let dir = TempDir::new().unwrap();
    write(&dir, "pkg/b.py", "class B:\n    pass\n");
    write(&dir, "pkg/sub/a.py", "class A:\n    pass\n");
    write(&dir, "a.py", "class Top:\n    pass\n");
    write(&dir, "notes.txt", "class NotPython:\n");

    let report = run(&[dir.path()], vec![classes_rule()]);

    assert_eq!(report.files_scanned, 3);
    let files: Vec<_> = report.rules[0].matches.iter().map(|m| m.file.clone()).collect();
    let mut sorted = files.clone();
    sorted.sort();
    assert_eq!(files, sorted);
}

#[test]
fn repeated_runs_are_identical() {
    let dir = TempDir::new().unwrap();
    write(&dir, "mixed.py", MIXED);
    write(&dir, "pkg/models.py", "class A:\n    pass\n\nclass B(A):\n    pass\n");
    write(&dir, "pkg/bad.py", "def (:\n");
    let rules = || {
        vec![
            classes_rule(),
            Rule::new("functions", "FDF", "F001", "//FunctionDef/@name").unwrap(),
        ]
    };

    let first = serde_json::to_string(&run(&[dir.path()], rules())).unwrap();
    let second = serde_json::to_string(&run(&[dir.path()], rules())).unwrap();

    assert_eq!(first, second);
}

#[test]
fn operators_of_a_chained_comparison_each_count() {
    let dir = TempDir::new().unwrap();
    write(&dir, "chain.py", "x = a < b < c\n\n\ndef f():\n    global a, b\n");

    let report = run(
        &[dir.path()],
        vec![
            Rule::new("chained ops", "CMP", "O001", "//Compare/ops/*").unwrap(),
            Rule::new("global names", "GLB", "G001", "//Global/names/item").unwrap(),
        ],
    );

    assert_eq!(report.rules[0].total, 2);
    assert_eq!(report.rules[0].matches.len(), 2);
    assert_eq!(report.rules[1].total, 2);
}

#[test]
fn pattern_errors_surface_without_any_files() {
    let dir = TempDir::new().unwrap();

    let report = run(
        &[dir.path()],
        vec![
            Rule::new("count", "ERR", "E001", "count(//ClassDef)").unwrap(),
            Rule::new("sum", "ERR", "E002", "1 + 1").unwrap(),
            Rule::new("regex", "ERR", "E003", "//FunctionDef[re:test(@name, '(')]").unwrap(),
        ],
    );

    assert_eq!(report.files_scanned, 0);
    assert!(report.rules.iter().all(|r| r.is_errored()));
    assert_eq!(report.summary().errored, 3);
}

#[test]
fn python2_statements_are_parse_errors() {
    let dir = TempDir::new().unwrap();
    write(&dir, "legacy.py", "class Old:\n    pass\n\nprint \"hello\"\n");

    let report = run(&[dir.path()], vec![classes_rule()]);

    assert_eq!(report.parse_errors.len(), 1);
    assert_eq!(report.parse_errors[0].line, 4);
    assert_eq!(report.rules[0].total, 0);
    assert!(!report.passed);
}
