use matrix_orchestrator::cli::commands::init::WorkflowTemplate;
use matrix_orchestrator::config::{
    ConfigError, DEFAULT_TIMEOUT_SECS, Workflow, load_workflow, substitute_matrix,
};
use matrix_orchestrator::core::trigger::{EventKind, TriggerEvent};
use matrix_orchestrator::models::Assignment;

mod common;

fn assignment(pairs: &[(&str, &str)]) -> Assignment {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn test_parse_full_workflow() {
    let workflow = common::workflow(
        r#"
name = "ci"
language = "zh-CN"
env = { CI = "true" }

[on.push]
branches = ["main"]

[strategy]
fail_fast = true
max_parallel = 4
timeout_secs = 60
isolate = true

[matrix]
os = ["ubuntu-latest", "windows-latest"]
python-version = ["3.7", "3.8"]
exclude = [{ os = "windows-latest", python-version = "3.7" }]

[cache]
key = "pip-${{ matrix.os }}"
lockfile = "requirements.lock"
path = ".pip-cache"
populate_step = "Install"

[[steps]]
name = "Install"
run = "pip install -r requirements.lock"
setup = true

[[steps]]
name = "Lint"
run = "flake8"
only = { os = ["ubuntu-latest"] }

[[steps]]
name = "Test"
run = "pytest"
secrets = ["API_TOKEN"]
continue_on_error = false

[[artifacts]]
name = "junit"
path = "junit"
"#,
    );

    assert_eq!(workflow.name, "ci");
    assert_eq!(workflow.language, "zh-CN");
    assert_eq!(workflow.env.get("CI").map(String::as_str), Some("true"));
    assert!(workflow.strategy.fail_fast);
    assert_eq!(workflow.strategy.max_parallel, Some(4));
    assert_eq!(workflow.strategy.timeout_secs, 60);
    assert!(workflow.strategy.isolate);

    let dimensions: Vec<&str> = workflow.matrix.dimensions.keys().map(String::as_str).collect();
    assert_eq!(dimensions, vec!["os", "python-version"]);
    assert_eq!(workflow.matrix.exclude.len(), 1);
    assert_eq!(workflow.matrix.combination_count(), 4);

    assert_eq!(workflow.steps.len(), 3);
    assert!(workflow.steps[0].setup);
    assert_eq!(workflow.secret_names(), vec!["API_TOKEN".to_string()]);
    assert_eq!(workflow.cache.as_ref().map(|c| c.populate_step.as_str()), Some("Install"));
    assert_eq!(workflow.artifacts[0].name, "junit");

    let trigger = workflow.trigger.as_ref().expect("trigger should be parsed");
    assert!(trigger.matches(&TriggerEvent {
        kind: EventKind::Push,
        branch: "main".to_string()
    }));
}

#[test]
fn test_defaults_are_applied() {
    let workflow = common::workflow(
        r#"
[[steps]]
name = "Build"
run = "make"
"#,
    );
    assert_eq!(workflow.name, "workflow");
    assert_eq!(workflow.language, "en");
    assert!(!workflow.strategy.fail_fast);
    assert!(workflow.strategy.isolate);
    assert_eq!(workflow.strategy.timeout_secs, DEFAULT_TIMEOUT_SECS);
    assert!(workflow.matrix.dimensions.is_empty());
    assert!(workflow.trigger.is_none());
    assert!(workflow.cache.is_none());
}

#[test]
fn test_rejects_workflow_without_steps() {
    let err = Workflow::from_toml_str("name = \"empty\"\nsteps = []\n").unwrap_err();
    assert!(matches!(err, ConfigError::NoSteps));
}

#[test]
fn test_rejects_empty_dimension() {
    let err = Workflow::from_toml_str(
        r#"
[matrix]
os = []

[[steps]]
name = "Build"
run = "make"
"#,
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::EmptyDimension(ref d) if d == "os"));
}

#[test]
fn test_rejects_duplicate_dimension_value() {
    let err = Workflow::from_toml_str(
        r#"
[matrix]
os = ["linux", "linux"]

[[steps]]
name = "Build"
run = "make"
"#,
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::DuplicateValue { .. }));
}

#[test]
fn test_rejects_duplicate_step_names() {
    let err = Workflow::from_toml_str(
        r#"
[[steps]]
name = "Build"
run = "make"

[[steps]]
name = "Build"
run = "make install"
"#,
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::DuplicateStep(ref s) if s == "Build"));
}

#[test]
fn test_rejects_empty_command() {
    let err = Workflow::from_toml_str(
        r#"
[[steps]]
name = "Nothing"
run = "   "
"#,
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::EmptyCommand(_)));
}

#[test]
fn test_rejects_gate_on_unknown_dimension() {
    let err = Workflow::from_toml_str(
        r#"
[matrix]
os = ["linux"]

[[steps]]
name = "Lint"
run = "lint"
only = { arch = ["x86_64"] }
"#,
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::UnknownDimension { ref dimension, .. } if dimension == "arch"));
}

#[test]
fn test_rejects_exclude_with_undeclared_value() {
    let err = Workflow::from_toml_str(
        r#"
[matrix]
os = ["linux", "macos"]
exclude = [{ os = "windows" }]

[[steps]]
name = "Build"
run = "make"
"#,
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::UnknownValue { ref value, .. } if value == "windows"));
}

#[test]
fn test_rejects_unknown_populate_step() {
    let err = Workflow::from_toml_str(
        r#"
[cache]
key = "deps"
lockfile = "Cargo.lock"
path = "target"
populate_step = "Fetch"

[[steps]]
name = "Build"
run = "make"
"#,
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::UnknownPopulateStep(_)));
}

#[test]
fn test_rejects_zero_timeout_and_parallelism() {
    let zero_timeout = Workflow::from_toml_str(
        "[strategy]\ntimeout_secs = 0\n[[steps]]\nname = \"a\"\nrun = \"b\"\n",
    )
    .unwrap_err();
    assert!(matches!(zero_timeout, ConfigError::ZeroTimeout));

    let zero_parallel = Workflow::from_toml_str(
        "[strategy]\nmax_parallel = 0\n[[steps]]\nname = \"a\"\nrun = \"b\"\n",
    )
    .unwrap_err();
    assert!(matches!(zero_parallel, ConfigError::ZeroParallelism));
}

#[test]
fn test_load_workflow_reports_missing_and_malformed_files() {
    let dir = tempfile::tempdir().unwrap();

    let missing = load_workflow(&dir.path().join("nope.toml")).unwrap_err();
    assert!(matches!(missing, ConfigError::Read { .. }));

    let invalid = common::create_invalid_toml(dir.path());
    let malformed = load_workflow(&invalid).unwrap_err();
    assert!(matches!(malformed, ConfigError::Parse { .. }));
    assert!(malformed.to_string().contains("invalid.toml"));
}

#[test]
fn test_load_workflow_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = common::write_workflow(dir.path(), common::THREE_OS_WORKFLOW);
    let workflow = load_workflow(&path).unwrap();
    assert_eq!(workflow.name, "three-os");
    assert_eq!(workflow.matrix.combination_count(), 3);
    assert!(workflow.steps[2].always);
}

#[test]
fn test_substitute_matrix_placeholders() {
    let values = assignment(&[("os", "ubuntu-latest"), ("python-version", "3.8")]);
    assert_eq!(
        substitute_matrix("pytest --os=${{ matrix.os }} -p ${{matrix.python-version}}", &values),
        "pytest --os=ubuntu-latest -p 3.8"
    );
    // Unknown dimensions and other expressions stay as written.
    assert_eq!(
        substitute_matrix("echo ${{ matrix.arch }} ${{ secrets.TOKEN }}", &values),
        "echo ${{ matrix.arch }} ${{ secrets.TOKEN }}"
    );
    assert_eq!(substitute_matrix("unterminated ${{ matrix.os", &values), "unterminated ${{ matrix.os");
}

#[test]
fn test_step_gate_admits_only_listed_values() {
    let workflow = common::workflow(
        r#"
[matrix]
os = ["ubuntu-latest", "windows-latest"]

[[steps]]
name = "Lint"
run = "lint"
only = { os = ["ubuntu-latest"] }
"#,
    );
    let step = &workflow.steps[0];
    assert!(step.applies_to(&assignment(&[("os", "ubuntu-latest")])));
    assert!(!step.applies_to(&assignment(&[("os", "windows-latest")])));
}

#[test]
fn test_generated_starter_workflow_is_valid() {
    let content = WorkflowTemplate::full("en").render();
    let workflow = Workflow::from_toml_str(&content).expect("starter workflow must be valid");
    assert_eq!(workflow.matrix.combination_count(), 18);
    assert_eq!(workflow.matrix.dimensions.len(), 3);
    assert!(workflow.cache.is_some());
    assert!(workflow.step("Test").is_some());

    let mut reduced = WorkflowTemplate::full("en");
    reduced.os = vec!["ubuntu-latest".to_string()];
    reduced.browsers = vec!["chromium".to_string()];
    reduced.lint = false;
    let workflow = Workflow::from_toml_str(&reduced.render()).unwrap();
    assert_eq!(workflow.matrix.combination_count(), 2);
    assert!(workflow.step("Lint").is_none());
}
