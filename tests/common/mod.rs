// Shared test helpers for integration tests
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::{TempDir, tempdir};

use matrix_orchestrator::config::Workflow;

/// A throwaway project directory with a lock file and a small source tree.
pub fn setup_project() -> TempDir {
    let temp_dir = tempdir().expect("Failed to create temporary directory");
    let root = temp_dir.path();
    fs::create_dir_all(root.join("src")).expect("Failed to create src directory");
    fs::write(root.join("requirements.lock"), "pytest==7.4.0\nplaywright==1.40.0\n")
        .expect("Failed to write lock file");
    fs::write(root.join("src").join("app.txt"), "hello\n").expect("Failed to write source file");
    temp_dir
}

/// Writes `content` as `Workflow.toml` into `dir` and returns its path.
pub fn write_workflow(dir: &Path, content: &str) -> PathBuf {
    let path = dir.join("Workflow.toml");
    fs::write(&path, content).expect("Failed to write workflow file");
    path
}

/// Parses an inline workflow, panicking on invalid input.
pub fn workflow(content: &str) -> Workflow {
    Workflow::from_toml_str(content).expect("workflow should be valid")
}

/// Helper function to create an invalid TOML configuration
pub fn create_invalid_toml(dir: &Path) -> PathBuf {
    let path = dir.join("invalid.toml");
    let content = r#"
name = "broken"
# Invalid TOML - missing closing bracket
[[steps]
name = "Test"
run = "true"
"#;
    fs::write(&path, content).expect("Failed to write invalid workflow");
    path
}

/// The three-OS workflow whose test step fails on windows and whose report
/// step always runs.
pub const THREE_OS_WORKFLOW: &str = r#"
name = "three-os"

[strategy]
isolate = true

[matrix]
os = ["ubuntu-latest", "windows-latest", "macos-latest"]

[[steps]]
name = "Install"
run = "mkdir -p reports && echo installed"
shell = "sh"
setup = true

[[steps]]
name = "Test"
run = "if [ \"$MATRIX_OS\" = windows-latest ]; then echo boom; exit 3; fi; echo ok > reports/result.txt"
shell = "sh"

[[steps]]
name = "Report"
run = "echo ${{ matrix.os }} > reports/os.txt"
shell = "sh"
always = true

[[artifacts]]
name = "reports"
path = "reports"
"#;
