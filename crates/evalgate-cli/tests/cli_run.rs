//! CLI contract: exit codes, stdout shape, artifact layout.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

fn evalgate() -> Command {
    Command::cargo_bin("evalgate").unwrap()
}

fn write_suite(dir: &Path, name: &str, lines: &[&str]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, lines.join("\n")).unwrap();
    path
}

fn only_run_dir(runs_root: &Path) -> PathBuf {
    let mut entries: Vec<PathBuf> = fs::read_dir(runs_root)
        .unwrap()
        .filter_map(Result::ok)
        .map(|e| e.path())
        .collect();
    assert_eq!(
        entries.len(),
        1,
        "expected exactly one run in {}",
        runs_root.display()
    );
    entries.remove(0)
}

#[test]
fn clean_run_updates_baseline_and_then_passes_the_gate() {
    let dir = tempdir().unwrap();
    write_suite(
        dir.path(),
        "smoke.jsonl",
        &[
            r#"{"id": "route-tech", "input": "reset my password", "expected_route": "tech"}"#,
            r#"{"id": "refuse", "input": "do something shady", "should_refuse": true}"#,
        ],
    );

    evalgate()
        .current_dir(dir.path())
        .args(["run", "--suite", "smoke.jsonl", "--mode", "offline"])
        .args(["--baseline", "baseline", "--update-baseline"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Run complete:"));
    assert!(dir.path().join("baseline/summary.json").exists());

    evalgate()
        .current_dir(dir.path())
        .args(["run", "--suite", "smoke.jsonl", "--mode", "offline"])
        .args(["--baseline", "baseline", "--runs-dir", "runs-2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Diff:"));

    let run_dir = only_run_dir(&dir.path().join("runs-2"));
    for name in ["manifest.json", "results.jsonl", "summary.json", "report.md", "diff.md"] {
        assert!(run_dir.join(name).exists(), "missing {name}");
    }
    let diff = fs::read_to_string(run_dir.join("diff.md")).unwrap();
    assert!(diff.contains("**Status:** PASS"));
}

#[test]
fn failing_case_exits_one_and_counts_failures() {
    let dir = tempdir().unwrap();
    write_suite(
        dir.path(),
        "bad.jsonl",
        &[
            r#"{"id": "bad", "input": "q", "expected_route": "tech", "offline_response": {"route": "marketing"}}"#,
        ],
    );

    evalgate()
        .current_dir(dir.path())
        .args(["run", "--suite", "bad.jsonl", "--mode", "offline"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Case failures: 1"));
}

#[test]
fn missing_baseline_is_a_regression_failure() {
    let dir = tempdir().unwrap();
    write_suite(
        dir.path(),
        "clean.jsonl",
        &[r#"{"id": "a", "input": "q", "expected_route": "tech"}"#],
    );

    evalgate()
        .current_dir(dir.path())
        .args(["run", "--suite", "clean.jsonl", "--mode", "offline"])
        .assert()
        .code(1)
        .stdout(
            predicate::str::contains("Regression failures:")
                .and(predicate::str::contains("baseline missing")),
        );
}

#[test]
fn report_rerenders_markdown_and_prints_json() {
    let dir = tempdir().unwrap();
    write_suite(
        dir.path(),
        "bad.jsonl",
        &[
            r#"{"id": "good", "input": "q", "expected_route": "tech"}"#,
            r#"{"id": "bad", "input": "q", "expected_route": "tech", "offline_response": {"route": "marketing"}}"#,
        ],
    );
    evalgate()
        .current_dir(dir.path())
        .args(["run", "--suite", "bad.jsonl", "--mode", "offline"])
        .assert()
        .code(1);
    let run_dir = only_run_dir(&dir.path().join("runs"));

    // Markdown is rebuilt from the persisted rows.
    fs::remove_file(run_dir.join("report.md")).unwrap();
    evalgate()
        .current_dir(dir.path())
        .args(["report", "--run"])
        .arg(&run_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("report.md"));
    let report = fs::read_to_string(run_dir.join("report.md")).unwrap();
    assert!(report.contains("## Failures"));
    assert!(report.contains("`bad`"));

    evalgate()
        .current_dir(dir.path())
        .args(["report", "--run"])
        .arg(&run_dir)
        .args(["--format", "json"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("\"total_cases\": 2")
                .and(predicate::str::contains("\"failed_cases\": 1")),
        );
}

#[test]
fn diff_reports_missing_inputs_then_compares() {
    let dir = tempdir().unwrap();
    write_suite(
        dir.path(),
        "smoke.jsonl",
        &[r#"{"id": "a", "input": "q", "expected_route": "tech"}"#],
    );
    evalgate()
        .current_dir(dir.path())
        .args(["run", "--suite", "smoke.jsonl", "--mode", "offline"])
        .args(["--baseline", "baseline", "--update-baseline"])
        .assert()
        .success();
    let run_dir = only_run_dir(&dir.path().join("runs"));

    evalgate()
        .current_dir(dir.path())
        .args(["diff", "--baseline", "absent", "--run"])
        .arg(&run_dir)
        .assert()
        .code(1)
        .stdout(predicate::str::contains("baseline missing:"));

    evalgate()
        .current_dir(dir.path())
        .args(["diff", "--baseline", "baseline", "--run"])
        .arg(&run_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("diff.md"));
    let diff = fs::read_to_string(run_dir.join("diff.md")).unwrap();
    assert!(diff.contains("**Status:** PASS"));
}

#[test]
fn missing_suite_is_fatal() {
    let dir = tempdir().unwrap();
    evalgate()
        .current_dir(dir.path())
        .args(["run", "--suite", "absent.jsonl", "--mode", "offline"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("fatal:"));
}
