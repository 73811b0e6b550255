//! # Workflow Configuration Module / 工作流配置模块
//!
//! This module defines the declarative workflow description loaded from a TOML
//! file: the matrix dimensions, the ordered step list shared by every run, the
//! artifacts to collect, the dependency cache and the scheduling strategy.
//!
//! 此模块定义从 TOML 文件加载的声明式工作流描述：矩阵维度、所有运行共享的有序步骤列表、
//! 需要收集的产物、依赖缓存以及调度策略。

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::core::models::Assignment;
use crate::core::trigger::Trigger;

/// Default per-run time bound (30 minutes).
pub const DEFAULT_TIMEOUT_SECS: u64 = 30 * 60;

/// Errors raised while loading or validating a workflow file.
/// 加载或校验工作流文件时产生的错误。
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read workflow file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse workflow file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("workflow declares no steps")]
    NoSteps,
    #[error("matrix dimension '{0}' has no values")]
    EmptyDimension(String),
    #[error("matrix dimension '{dimension}' lists value '{value}' more than once")]
    DuplicateValue { dimension: String, value: String },
    #[error("step name '{0}' is used more than once")]
    DuplicateStep(String),
    #[error("step '{0}' has an empty command")]
    EmptyCommand(String),
    #[error("artifact name '{0}' is used more than once")]
    DuplicateArtifact(String),
    #[error("{context} refers to unknown matrix dimension '{dimension}'")]
    UnknownDimension { context: String, dimension: String },
    #[error("{context} refers to value '{value}' which is not declared for dimension '{dimension}'")]
    UnknownValue {
        context: String,
        dimension: String,
        value: String,
    },
    #[error("cache populate_step '{0}' does not name a declared step")]
    UnknownPopulateStep(String),
    #[error("strategy.timeout_secs must be greater than zero")]
    ZeroTimeout,
    #[error("strategy.max_parallel must be greater than zero")]
    ZeroParallelism,
}

/// The job matrix: ordered dimensions, each an ordered list of values.
///
/// Dimension order is the declaration order in the workflow file. The
/// `exclude` entries remove every combination that matches all of their
/// key/value pairs.
///
/// 作业矩阵：有序的维度，每个维度是一个有序的值列表。
/// 维度顺序即工作流文件中的声明顺序。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Matrix {
    #[serde(flatten)]
    pub dimensions: IndexMap<String, Vec<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<IndexMap<String, String>>,
}

impl Matrix {
    /// Builds a matrix from `(dimension, values)` pairs, keeping their order.
    pub fn from_dimensions<I, N, V>(dimensions: I) -> Self
    where
        I: IntoIterator<Item = (N, Vec<V>)>,
        N: Into<String>,
        V: Into<String>,
    {
        Self {
            dimensions: dimensions
                .into_iter()
                .map(|(name, values)| (name.into(), values.into_iter().map(Into::into).collect()))
                .collect(),
            exclude: Vec::new(),
        }
    }

    /// Number of combinations in the full cross product, before exclusions.
    pub fn combination_count(&self) -> usize {
        self.dimensions.values().map(Vec::len).product()
    }

    /// Returns `true` if the assignment matches one of the `exclude` entries.
    pub fn is_excluded(&self, assignment: &Assignment) -> bool {
        self.exclude.iter().any(|entry| {
            entry
                .iter()
                .all(|(dimension, value)| assignment.get(dimension) == Some(value))
        })
    }

    /// Checks that `dimension` exists and, if given, that `value` is declared for it.
    pub fn check_reference(
        &self,
        context: &str,
        dimension: &str,
        value: Option<&str>,
    ) -> Result<(), ConfigError> {
        let values = self
            .dimensions
            .get(dimension)
            .ok_or_else(|| ConfigError::UnknownDimension {
                context: context.to_string(),
                dimension: dimension.to_string(),
            })?;
        if let Some(value) = value {
            if !values.iter().any(|v| v == value) {
                return Err(ConfigError::UnknownValue {
                    context: context.to_string(),
                    dimension: dimension.to_string(),
                    value: value.to_string(),
                });
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (dimension, values) in &self.dimensions {
            if values.is_empty() {
                return Err(ConfigError::EmptyDimension(dimension.clone()));
            }
            let mut seen = HashSet::new();
            for value in values {
                if !seen.insert(value) {
                    return Err(ConfigError::DuplicateValue {
                        dimension: dimension.clone(),
                        value: value.clone(),
                    });
                }
            }
        }
        for entry in &self.exclude {
            for (dimension, value) in entry {
                self.check_reference("matrix.exclude", dimension, Some(value))?;
            }
        }
        Ok(())
    }
}

/// A single step: a named external command executed in every run.
/// 单个步骤：在每次运行中执行的具名外部命令。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Unique step name, used in logs and reports.
    /// 唯一的步骤名称，用于日志和报告。
    pub name: String,
    /// The command line. `${{ matrix.<dimension> }}` placeholders are substituted.
    /// 命令行。其中的 `${{ matrix.<dimension> }}` 占位符会被替换。
    pub run: String,
    /// Extra environment variables for this step.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub env: IndexMap<String, String>,
    /// Working directory relative to the run's workspace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<String>,
    /// Run the command through this shell (`sh`, `bash`, `pwsh`, `cmd`, ...)
    /// instead of executing it directly.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shell: Option<String>,
    /// Execute even when an earlier step of the run has failed.
    /// 即使运行中的先前步骤失败也会执行。
    #[serde(default, skip_serializing_if = "is_false")]
    pub always: bool,
    /// Marks dependency installation / runtime provisioning steps. A failure
    /// is reported as an environment setup failure.
    #[serde(default, skip_serializing_if = "is_false")]
    pub setup: bool,
    /// A failure of this step is recorded but does not fail the run.
    #[serde(default, skip_serializing_if = "is_false")]
    pub continue_on_error: bool,
    /// Restricts the step to runs whose assignment matches every listed dimension.
    /// 将步骤限制为其赋值与所有列出维度都匹配的运行。
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub only: IndexMap<String, Vec<String>>,
    /// Names of secrets injected into this step only.
    /// 仅注入到此步骤的密钥名称。
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secrets: Vec<String>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl Step {
    /// Creates a step with the given name and command and every option off.
    pub fn new(name: impl Into<String>, run: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            run: run.into(),
            ..Self::default()
        }
    }

    /// Returns `true` if the step's gate admits this assignment.
    pub fn applies_to(&self, assignment: &Assignment) -> bool {
        self.only.iter().all(|(dimension, allowed)| {
            assignment
                .get(dimension)
                .is_some_and(|value| allowed.iter().any(|a| a == value))
        })
    }
}

/// A named output file or directory preserved after every run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactSpec {
    pub name: String,
    /// Path relative to the run's workspace; placeholders are substituted.
    pub path: String,
}

/// Dependency cache keyed by a content hash of a lock file.
/// 以锁文件内容哈希为键的依赖缓存。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Key prefix; placeholders are substituted, the lockfile hash is appended.
    pub key: String,
    /// Lock file whose content hash completes the key.
    pub lockfile: String,
    /// Directory (relative to the workspace) that is saved and restored.
    pub path: String,
    /// Step that populates `path`; skipped on a cache hit.
    pub populate_step: String,
    /// Store location, relative to the project root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
}

impl CacheConfig {
    pub const DEFAULT_DIR: &'static str = ".matrix-cache";

    pub fn store_dir(&self, project_root: &Path) -> PathBuf {
        project_root.join(self.dir.as_deref().unwrap_or(Self::DEFAULT_DIR))
    }
}

/// Scheduling strategy for the runs of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    /// Cancel the remaining runs after the first failed run.
    #[serde(default)]
    pub fail_fast: bool,
    /// Upper bound on concurrently executing runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_parallel: Option<usize>,
    /// Per-run time bound in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Give every run a private copy of the project directory. Turning this
    /// off makes concurrent runs share the project tree.
    #[serde(default = "default_isolate")]
    pub isolate: bool,
}

impl Default for Strategy {
    fn default() -> Self {
        Self {
            fail_fast: false,
            max_parallel: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            isolate: true,
        }
    }
}

impl Strategy {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_isolate() -> bool {
    true
}

/// The complete workflow, loaded from a TOML file.
/// 从 TOML 文件加载的完整工作流。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    #[serde(default = "default_name")]
    pub name: String,

    /// The language for the orchestrator's console output (e.g., "en", "zh-CN").
    ///
    /// 编排器控制台输出的语言（例如 "en", "zh-CN"）。
    #[serde(default = "default_language")]
    pub language: String,

    /// Environment variables applied to every step.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub env: IndexMap<String, String>,

    /// Events that trigger the workflow. `None` means "always".
    #[serde(default, rename = "on", skip_serializing_if = "Option::is_none")]
    pub trigger: Option<Trigger>,

    #[serde(default)]
    pub strategy: Strategy,

    #[serde(default)]
    pub matrix: Matrix,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheConfig>,

    pub steps: Vec<Step>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<ArtifactSpec>,
}

fn default_name() -> String {
    "workflow".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

impl Workflow {
    /// Creates a workflow with default settings around a matrix and step list.
    pub fn new(matrix: Matrix, steps: Vec<Step>) -> Self {
        Self {
            name: default_name(),
            language: default_language(),
            env: IndexMap::new(),
            trigger: None,
            strategy: Strategy::default(),
            matrix,
            cache: None,
            steps,
            artifacts: Vec::new(),
        }
    }

    /// Parses and validates a workflow from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let workflow: Workflow = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        workflow.validate()?;
        Ok(workflow)
    }

    /// Every secret name declared by any step, deduplicated, in declaration order.
    pub fn secret_names(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.steps
            .iter()
            .flat_map(|step| step.secrets.iter())
            .filter(|name| seen.insert(name.as_str()))
            .cloned()
            .collect()
    }

    pub fn step(&self, name: &str) -> Option<&Step> {
        self.steps.iter().find(|step| step.name == name)
    }

    /// Checks the structural invariants of the workflow.
    /// 检查工作流的结构不变量。
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.steps.is_empty() {
            return Err(ConfigError::NoSteps);
        }
        self.matrix.validate()?;

        let mut step_names = HashSet::new();
        for step in &self.steps {
            if !step_names.insert(step.name.as_str()) {
                return Err(ConfigError::DuplicateStep(step.name.clone()));
            }
            if step.run.trim().is_empty() {
                return Err(ConfigError::EmptyCommand(step.name.clone()));
            }
            let context = format!("step '{}'", step.name);
            for (dimension, values) in &step.only {
                for value in values {
                    self.matrix.check_reference(&context, dimension, Some(value))?;
                }
            }
        }

        let mut artifact_names = HashSet::new();
        for artifact in &self.artifacts {
            if !artifact_names.insert(artifact.name.as_str()) {
                return Err(ConfigError::DuplicateArtifact(artifact.name.clone()));
            }
        }

        if let Some(cache) = &self.cache {
            if self.step(&cache.populate_step).is_none() {
                return Err(ConfigError::UnknownPopulateStep(cache.populate_step.clone()));
            }
        }

        if self.strategy.timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.strategy.max_parallel == Some(0) {
            return Err(ConfigError::ZeroParallelism);
        }
        Ok(())
    }
}

/// Loads, parses and validates a workflow file.
///
/// # Arguments
/// * `path` - Path to the TOML workflow file
pub fn load_workflow(path: &Path) -> Result<Workflow, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let workflow: Workflow = toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    workflow.validate()?;
    Ok(workflow)
}

/// Replaces `${{ matrix.<dimension> }}` placeholders with the run's values.
/// Unknown placeholders are left untouched.
///
/// 将 `${{ matrix.<dimension> }}` 占位符替换为运行的取值，未知占位符保持不变。
pub fn substitute_matrix(template: &str, assignment: &Assignment) -> String {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("${{") {
        rendered.push_str(&rest[..start]);
        let after_open = &rest[start + 3..];
        let Some(end) = after_open.find("}}") else {
            rendered.push_str(&rest[start..]);
            return rendered;
        };
        let expression = after_open[..end].trim();
        let value = expression
            .strip_prefix("matrix.")
            .and_then(|dimension| assignment.get(dimension.trim()));
        match value {
            Some(value) => rendered.push_str(value),
            None => rendered.push_str(&rest[start..start + 3 + end + 2]),
        }
        rest = &after_open[end + 2..];
    }
    rendered.push_str(rest);
    rendered
}
