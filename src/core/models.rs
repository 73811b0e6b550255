//! # Data Models Module / 数据模型模块
//!
//! This module defines the core data structures used throughout the orchestrator:
//! job runs and their lifecycle, step results, failure causes, artifacts, the
//! aggregated run summary, and the progress events sent by running jobs.
//!
//! 此模块定义了整个编排器中使用的核心数据结构：作业运行及其生命周期、步骤结果、
//! 失败原因、产物、汇总的运行摘要，以及运行中的作业发送的进度事件。

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// One concrete value per matrix dimension, in dimension declaration order.
/// 每个矩阵维度的一个具体取值，按维度声明顺序排列。
pub type Assignment = IndexMap<String, String>;

/// Lifecycle state of a [`JobRun`].
/// [`JobRun`] 的生命周期状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Succeeded | RunStatus::Failed)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Why a run failed. Every variant is local to one run.
/// 运行失败的原因。每个变体都仅限于单个运行。
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunFailure {
    /// An external command exited unsuccessfully.
    /// 外部命令以失败状态退出。
    #[error("step '{step}' failed ({})", describe_exit(.exit_code))]
    Step { step: String, exit_code: Option<i32> },
    /// A dependency installation or runtime provisioning step failed.
    /// 依赖安装或运行时准备步骤失败。
    #[error("environment setup step '{step}' failed ({})", describe_exit(.exit_code))]
    EnvironmentSetup { step: String, exit_code: Option<i32> },
    /// The run exceeded its time bound and was cancelled.
    /// 运行超出其时间限制并被取消。
    #[error("run exceeded its time limit of {limit_secs}s")]
    Timeout { limit_secs: u64 },
    /// The run was cancelled from outside (interrupt or fail-fast).
    #[error("run was cancelled")]
    Cancelled,
    /// The orchestrator could not prepare or drive the run.
    #[error("run could not be executed: {message}")]
    Internal { message: String },
}

fn describe_exit(exit_code: &Option<i32>) -> String {
    match exit_code {
        Some(code) => format!("exit code {code}"),
        None => "no exit code".to_string(),
    }
}

impl RunFailure {
    /// Short, stable label used in tables and CSS classes.
    pub fn label(&self) -> &'static str {
        match self {
            RunFailure::Step { .. } => "step",
            RunFailure::EnvironmentSetup { .. } => "setup",
            RunFailure::Timeout { .. } => "timeout",
            RunFailure::Cancelled => "cancelled",
            RunFailure::Internal { .. } => "internal",
        }
    }

    /// Name of the step that caused the failure, if any.
    pub fn step_name(&self) -> Option<&str> {
        match self {
            RunFailure::Step { step, .. } | RunFailure::EnvironmentSetup { step, .. } => Some(step),
            _ => None,
        }
    }
}

/// Rejected lifecycle transition.
#[derive(Debug, Error)]
#[error("run '{run_id}' cannot move from {from} to {to}")]
pub struct TransitionError {
    pub run_id: String,
    pub from: RunStatus,
    pub to: RunStatus,
}

/// Why a step did not execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// An earlier step failed and this step is not an "always" step.
    PriorFailure,
    /// The step's `only` gate excludes this run's assignment.
    Gated,
    /// The step populates the dependency cache and the cache already had the key.
    CacheHit,
    /// The run was cancelled before the step could start.
    Cancelled,
}

/// Outcome of a single step.
/// 单个步骤的结果。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepOutcome {
    Succeeded,
    Failed { exit_code: Option<i32> },
    Skipped { reason: SkipReason },
    /// The step was running when the run timed out or was cancelled.
    Interrupted,
}

/// The recorded result of one step of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub name: String,
    pub outcome: StepOutcome,
    /// Captured stdout and stderr, with secrets redacted.
    pub output: String,
    pub duration: Duration,
}

impl StepResult {
    pub fn succeeded(name: &str, output: String, duration: Duration) -> Self {
        Self {
            name: name.to_string(),
            outcome: StepOutcome::Succeeded,
            output,
            duration,
        }
    }

    pub fn failed(name: &str, exit_code: Option<i32>, output: String, duration: Duration) -> Self {
        Self {
            name: name.to_string(),
            outcome: StepOutcome::Failed { exit_code },
            output,
            duration,
        }
    }

    pub fn skipped(name: &str, reason: SkipReason) -> Self {
        Self {
            name: name.to_string(),
            outcome: StepOutcome::Skipped { reason },
            output: String::new(),
            duration: Duration::ZERO,
        }
    }

    pub fn interrupted(name: &str) -> Self {
        Self {
            name: name.to_string(),
            outcome: StepOutcome::Interrupted,
            output: String::new(),
            duration: Duration::ZERO,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == StepOutcome::Succeeded
    }

    /// `true` if the step actually started an external process.
    pub fn was_executed(&self) -> bool {
        !matches!(self.outcome, StepOutcome::Skipped { .. })
    }
}

/// An artifact declared by the workflow, as collected for one run.
/// 工作流声明的产物，在单次运行中被收集的结果。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    /// Per-run-qualified name: `<artifact-name>-<run-id>`.
    pub name: String,
    /// Where the run was expected to write it.
    pub source: PathBuf,
    /// Where it was preserved; `None` if the run never produced it.
    pub stored: Option<PathBuf>,
}

impl ArtifactRecord {
    pub fn is_present(&self) -> bool {
        self.stored.is_some()
    }
}

/// One concrete, isolated execution of the step list for one matrix combination.
///
/// A run is created `Pending` by the planner, moved to `Running` when its
/// execution starts, and ends in `Succeeded` or `Failed`. Terminal states are
/// immutable.
///
/// 针对单个矩阵组合的一次具体、隔离的步骤列表执行。
/// 运行由计划器以 `Pending` 状态创建，开始执行时转为 `Running`，
/// 并以 `Succeeded` 或 `Failed` 结束。终态不可变。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRun {
    /// Position in the expanded plan.
    pub index: usize,
    /// Identifier derived from the assigned values; qualifies artifact names.
    pub id: String,
    pub assignment: Assignment,
    status: RunStatus,
    failure: Option<RunFailure>,
    pub steps: Vec<StepResult>,
    pub artifacts: Vec<ArtifactRecord>,
    /// The run's step log, always written during finalization.
    pub log_path: Option<PathBuf>,
    pub duration: Duration,
}

impl JobRun {
    pub fn new(index: usize, id: impl Into<String>, assignment: Assignment) -> Self {
        Self {
            index,
            id: id.into(),
            assignment,
            status: RunStatus::Pending,
            failure: None,
            steps: Vec::new(),
            artifacts: Vec::new(),
            log_path: None,
            duration: Duration::ZERO,
        }
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn failure(&self) -> Option<&RunFailure> {
        self.failure.as_ref()
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Succeeded
    }

    pub fn is_failure(&self) -> bool {
        self.status == RunStatus::Failed
    }

    /// `Pending -> Running`.
    pub fn mark_running(&mut self) -> Result<(), TransitionError> {
        if self.status != RunStatus::Pending {
            return Err(self.transition_error(RunStatus::Running));
        }
        self.status = RunStatus::Running;
        Ok(())
    }

    /// Records the failure cause of a running run. The first cause wins.
    pub fn record_failure(&mut self, failure: RunFailure) -> Result<(), TransitionError> {
        if self.status.is_terminal() {
            return Err(self.transition_error(RunStatus::Failed));
        }
        if self.failure.is_none() {
            self.failure = Some(failure);
        }
        Ok(())
    }

    /// `Running -> Succeeded | Failed`, depending on whether a failure was recorded.
    pub fn finish(&mut self) -> Result<RunStatus, TransitionError> {
        let next = if self.failure.is_some() {
            RunStatus::Failed
        } else {
            RunStatus::Succeeded
        };
        if self.status != RunStatus::Running {
            return Err(self.transition_error(next));
        }
        self.status = next;
        Ok(next)
    }

    fn transition_error(&self, to: RunStatus) -> TransitionError {
        TransitionError {
            run_id: self.id.clone(),
            from: self.status,
            to,
        }
    }

    /// `os=ubuntu-latest, python-version=3.8` style label.
    pub fn label(&self) -> String {
        if self.assignment.is_empty() {
            return self.id.clone();
        }
        self.assignment
            .iter()
            .map(|(dimension, value)| format!("{dimension}={value}"))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// The result of the step that caused the failure, if one did.
    pub fn failed_step(&self) -> Option<&StepResult> {
        let name = self.failure.as_ref()?.step_name()?;
        self.steps.iter().find(|step| step.name == name)
    }

    pub fn step(&self, name: &str) -> Option<&StepResult> {
        self.steps.iter().find(|step| step.name == name)
    }
}

/// Where an artifact of a run was preserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactLocation {
    pub run_id: String,
    pub name: String,
    pub path: PathBuf,
}

/// Aggregation over every run of one orchestrator invocation.
/// 对一次编排器调用中所有运行的汇总。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub workflow: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Every run, in plan order.
    pub runs: Vec<JobRun>,
    pub artifacts: Vec<ArtifactLocation>,
}

impl RunSummary {
    /// Builds the summary from terminal runs, restoring plan order.
    pub fn from_runs(workflow: &str, started_at: DateTime<Utc>, mut runs: Vec<JobRun>) -> Self {
        runs.sort_by_key(|run| run.index);
        let succeeded = runs.iter().filter(|run| run.is_success()).count();
        let failed = runs.iter().filter(|run| run.is_failure()).count();
        let artifacts = runs
            .iter()
            .flat_map(|run| {
                run.artifacts.iter().filter_map(move |artifact| {
                    artifact.stored.as_ref().map(|path| ArtifactLocation {
                        run_id: run.id.clone(),
                        name: artifact.name.clone(),
                        path: path.clone(),
                    })
                })
            })
            .collect();

        Self {
            workflow: workflow.to_string(),
            started_at,
            finished_at: Utc::now(),
            total: runs.len(),
            succeeded,
            failed,
            runs,
            artifacts,
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.succeeded == self.total
    }

    pub fn failed_runs(&self) -> impl Iterator<Item = &JobRun> {
        self.runs.iter().filter(|run| run.is_failure())
    }

    pub fn run(&self, id: &str) -> Option<&JobRun> {
        self.runs.iter().find(|run| run.id == id)
    }

    /// Writes the summary as pretty JSON.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }
}

/// Progress messages sent by run tasks to the central aggregator.
/// 运行任务发送给中央汇总器的进度消息。
#[derive(Debug, Clone)]
pub enum RunEvent {
    RunStarted {
        index: usize,
        id: String,
    },
    StepFinished {
        run_id: String,
        step: String,
        outcome: StepOutcome,
        duration: Duration,
    },
    RunFinished {
        id: String,
        status: RunStatus,
        failure: Option<RunFailure>,
        duration: Duration,
    },
}
