use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::process::Command;

mod common;

fn orchestrator() -> Command {
    let mut cmd = Command::cargo_bin("matrix-orchestrator").unwrap();
    cmd.env("NO_COLOR", "1").arg("--lang").arg("en");
    cmd
}

const MATRIX_WORKFLOW: &str = r#"
name = "cli"

[on.push]
branches = ["main"]

[matrix]
os = ["ubuntu-latest", "windows-latest"]
python-version = ["3.7", "3.8"]

[[steps]]
name = "Test"
run = "echo testing"
"#;

/// `plan --json` prints the filtered plan without executing anything.
///
/// `plan --json` 打印过滤后的计划而不执行任何内容。
#[test]
fn test_plan_json_with_filter() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::write_workflow(dir.path(), MATRIX_WORKFLOW);

    let output = orchestrator()
        .arg("plan")
        .arg("--config")
        .arg(&config)
        .arg("--filter")
        .arg("os=windows-latest")
        .arg("--json")
        .output()
        .unwrap();
    assert!(output.status.success());

    let plan: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(plan["total_combinations"], 4);
    assert_eq!(plan["filtered"], 2);
    let ids: Vec<&str> = plan["runs"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["windows-latest-3.7", "windows-latest-3.8"]);
}

#[test]
fn test_plan_with_sharding() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::write_workflow(dir.path(), MATRIX_WORKFLOW);

    orchestrator()
        .arg("plan")
        .arg("-c")
        .arg(&config)
        .arg("--total-runners")
        .arg("2")
        .arg("--runner-index")
        .arg("1")
        .assert()
        .success()
        .stdout(predicate::str::contains("Execution Plan (2 runs)"))
        .stdout(predicate::str::contains("ubuntu-latest-3.8"))
        .stdout(predicate::str::contains("windows-latest-3.8"));
}

#[test]
fn test_unknown_filter_value_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::write_workflow(dir.path(), MATRIX_WORKFLOW);

    orchestrator()
        .arg("plan")
        .arg("-c")
        .arg(&config)
        .arg("--filter")
        .arg("os=plan9")
        .assert()
        .failure()
        .stderr(predicate::str::contains("plan9"));
}

#[test]
fn test_invalid_config_fails() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::create_invalid_toml(dir.path());

    orchestrator()
        .arg("run")
        .arg("-c")
        .arg(&config)
        .arg("--project-dir")
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error"))
        .stderr(predicate::str::contains("Invalid workflow file"));
}

#[test]
fn test_missing_config_fails() {
    let dir = tempfile::tempdir().unwrap();
    orchestrator()
        .current_dir(dir.path())
        .arg("run")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Workflow file not found"));
}

#[cfg(unix)]
#[test]
fn test_successful_run_writes_summary_and_html() {
    let project = common::setup_project();
    let output = tempfile::tempdir().unwrap();
    let config = common::write_workflow(output.path(), MATRIX_WORKFLOW);
    let html = output.path().join("report.html");

    orchestrator()
        .arg("run")
        .arg("-c")
        .arg(&config)
        .arg("--project-dir")
        .arg(project.path())
        .arg("--output-dir")
        .arg(output.path().join("results"))
        .arg("-j")
        .arg("2")
        .arg("--html")
        .arg(&html)
        .assert()
        .success()
        .stdout(predicate::str::contains("Run Summary"))
        .stdout(predicate::str::contains("All runs succeeded!"));

    let summary: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(output.path().join("results").join("summary.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(summary["total"], 4);
    assert_eq!(summary["succeeded"], 4);
    assert!(output.path().join("results/runs/ubuntu-latest-3.7/log.txt").exists());

    let report = fs::read_to_string(&html).unwrap();
    assert!(report.contains("windows-latest-3.8"));
    assert!(report.contains("Matrix Report: cli"));
}

#[cfg(unix)]
#[test]
fn test_failed_run_exits_non_zero_with_details() {
    let project = common::setup_project();
    let output = tempfile::tempdir().unwrap();
    let config = common::write_workflow(
        output.path(),
        r#"
[matrix]
os = ["ubuntu-latest", "windows-latest"]

[[steps]]
name = "Test"
run = "if [ ${{ matrix.os }} = windows-latest ]; then echo 'assertion failed' >&2; exit 1; fi"
shell = "sh"
"#,
    );

    orchestrator()
        .arg("run")
        .arg("-c")
        .arg(&config)
        .arg("--project-dir")
        .arg(project.path())
        .arg("--output-dir")
        .arg(output.path().join("results"))
        .assert()
        .failure()
        .stdout(predicate::str::contains("Failure Details"))
        .stdout(predicate::str::contains("assertion failed"))
        .stdout(predicate::str::contains("1 of 2 runs failed."));
}

#[test]
fn test_untriggered_event_skips_execution() {
    let project = common::setup_project();
    let output = tempfile::tempdir().unwrap();
    let config = common::write_workflow(output.path(), MATRIX_WORKFLOW);

    orchestrator()
        .arg("run")
        .arg("-c")
        .arg(&config)
        .arg("--project-dir")
        .arg(project.path())
        .arg("--output-dir")
        .arg(output.path().join("results"))
        .arg("--event")
        .arg("push")
        .arg("--branch")
        .arg("feature/x")
        .assert()
        .success()
        .stdout(predicate::str::contains("not triggered"));
    assert!(!output.path().join("results").join("summary.json").exists());
}

#[test]
fn test_init_non_interactive_and_force() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ci").join("Workflow.toml");

    orchestrator()
        .arg("init")
        .arg("--non-interactive")
        .arg("-o")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("18 matrix combinations"));
    let content = fs::read_to_string(&path).unwrap();
    assert!(content.contains("[matrix]"));
    assert!(content.contains("webkit"));

    orchestrator()
        .arg("init")
        .arg("--non-interactive")
        .arg("-o")
        .arg(&path)
        .assert()
        .failure()
        .stdout(predicate::str::contains("--force"));

    orchestrator()
        .arg("init")
        .arg("--non-interactive")
        .arg("--force")
        .arg("-o")
        .arg(&path)
        .assert()
        .success();

    // The generated workflow plans cleanly.
    orchestrator()
        .arg("plan")
        .arg("-c")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Execution Plan (18 runs)"));
}

#[test]
fn test_chinese_output() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::write_workflow(dir.path(), MATRIX_WORKFLOW);

    let mut cmd = Command::cargo_bin("matrix-orchestrator").unwrap();
    cmd.env("NO_COLOR", "1")
        .arg("--lang")
        .arg("zh-CN")
        .arg("plan")
        .arg("-c")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("执行计划"));
}
