//! # Run Execution Engine Module / 运行执行引擎模块
//!
//! This module executes a single [`JobRun`]: the workflow's steps in order,
//! bounded by the per-run timeout and the shared stop token, followed by the
//! finalization that always happens (artifact collection and the run log).
//!
//! 此模块执行单个 [`JobRun`]：按顺序执行工作流的步骤，受每次运行的超时和共享停止令牌约束，
//! 随后执行始终会发生的收尾工作（产物收集和运行日志）。
//!
//! ## Failure semantics / 失败语义
//!
//! - A failing step (non-zero exit) fails the run unless it is `continue_on_error`.
//! - After a failure only `always` steps execute; the others are skipped.
//! - A timeout interrupts the running step; `always` steps still run afterwards
//!   under a fresh bound.
//! - A cancellation interrupts the running step and skips everything else.
//! - Finalization runs in every case.
//!
//! - 失败的步骤（非零退出）会使运行失败，除非它被标记为 `continue_on_error`。
//! - 失败之后只执行 `always` 步骤，其余步骤被跳过。
//! - 超时会中断正在运行的步骤；之后 `always` 步骤仍会在新的时限内运行。
//! - 取消会中断正在运行的步骤并跳过其余所有步骤。
//! - 收尾工作在任何情况下都会执行。

use indexmap::IndexMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::cache::{CacheKey, CacheOutcome, CacheStore};
use crate::core::config::{CacheConfig, Step, Workflow, substitute_matrix};
use crate::core::models::{
    ArtifactRecord, JobRun, RunEvent, RunFailure, SkipReason, StepOutcome, StepResult,
};
use crate::core::secrets::SecretStore;
use crate::infra::command::{self, CommandSpec};
use crate::infra::fs;

/// Everything a run needs besides its own assignment. Cheap to clone; shared
/// read-only between concurrently executing runs.
///
/// 运行除自身赋值之外所需的一切。克隆开销很小，在并发执行的运行之间只读共享。
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub workflow: Arc<Workflow>,
    pub project_root: PathBuf,
    pub output_dir: PathBuf,
    pub secrets: Arc<SecretStore>,
    pub cache: Option<Arc<CacheStore>>,
    pub stop: CancellationToken,
    pub events: Option<mpsc::UnboundedSender<RunEvent>>,
}

impl ExecutionContext {
    pub fn new(workflow: Arc<Workflow>, project_root: PathBuf, output_dir: PathBuf) -> Self {
        let cache = workflow
            .cache
            .as_ref()
            .map(|config| Arc::new(CacheStore::new(config.store_dir(&project_root))));
        let secrets = SecretStore::default().with_declared(&workflow.secret_names());
        Self {
            workflow,
            project_root,
            output_dir,
            secrets: Arc::new(secrets),
            cache,
            stop: CancellationToken::new(),
            events: None,
        }
    }

    pub fn with_secrets(mut self, secrets: SecretStore) -> Self {
        let declared = self.workflow.secret_names();
        self.secrets = Arc::new(secrets.with_declared(&declared));
        self
    }

    pub fn with_stop_token(mut self, stop: CancellationToken) -> Self {
        self.stop = stop;
        self
    }

    pub fn with_events(mut self, events: mpsc::UnboundedSender<RunEvent>) -> Self {
        self.events = Some(events);
        self
    }

    fn emit(&self, event: RunEvent) {
        if let Some(events) = &self.events {
            // A closed receiver only means nobody is watching progress.
            let _ = events.send(event);
        }
    }
}

/// The directory the steps of one run execute in.
struct Workspace {
    root: PathBuf,
    _isolated: Option<TempDir>,
}

impl Workspace {
    fn prepare(ctx: &ExecutionContext) -> anyhow::Result<Self> {
        if !ctx.workflow.strategy.isolate {
            return Ok(Self {
                root: ctx.project_root.clone(),
                _isolated: None,
            });
        }
        let mut exclude = vec![ctx.output_dir.clone()];
        if let Some(cache) = &ctx.cache {
            exclude.push(cache.root().to_path_buf());
        }
        let dir = fs::prepare_isolated_workspace(&ctx.project_root, &exclude)?;
        Ok(Self {
            root: dir.path().to_path_buf(),
            _isolated: Some(dir),
        })
    }
}

/// Executes one run to a terminal state.
///
/// The run must be `Pending`; anything else is returned unchanged. The
/// returned run is always `Succeeded` or `Failed`, carries one
/// [`StepResult`] per declared step, and has been finalized.
///
/// 将一个运行执行到终态。
/// 运行必须处于 `Pending` 状态，否则原样返回。返回的运行总是 `Succeeded` 或 `Failed`，
/// 每个声明的步骤都有一个 [`StepResult`]，并且已完成收尾。
pub async fn execute(mut run: JobRun, ctx: &ExecutionContext) -> JobRun {
    let started = Instant::now();
    if let Err(e) = run.mark_running() {
        warn!(run = %run.id, error = %e, "refusing to execute a run that is not pending");
        return run;
    }
    debug!(run = %run.id, label = %run.label(), "run started");
    ctx.emit(RunEvent::RunStarted {
        index: run.index,
        id: run.id.clone(),
    });

    let workspace = if ctx.stop.is_cancelled() {
        record(&mut run, RunFailure::Cancelled);
        None
    } else {
        match Workspace::prepare(ctx) {
            Ok(workspace) => Some(workspace),
            Err(e) => {
                record(
                    &mut run,
                    RunFailure::Internal {
                        message: format!("{e:#}"),
                    },
                );
                None
            }
        }
    };

    match &workspace {
        Some(workspace) => drive_steps(&mut run, workspace, ctx).await,
        None => {
            let reason = if matches!(run.failure(), Some(RunFailure::Cancelled)) {
                SkipReason::Cancelled
            } else {
                SkipReason::PriorFailure
            };
            skip_remaining(&mut run, ctx, reason);
        }
    }

    finalize(&mut run, workspace.as_ref(), ctx);
    drop(workspace);

    run.duration = started.elapsed();
    match run.finish() {
        Ok(status) => info!(run = %run.id, %status, "run finished"),
        Err(e) => warn!(run = %run.id, error = %e, "run could not be finished"),
    }
    ctx.emit(RunEvent::RunFinished {
        id: run.id.clone(),
        status: run.status(),
        failure: run.failure().cloned(),
        duration: run.duration,
    });
    run
}

/// Runs the steps under the time bound, then deals with an interruption.
async fn drive_steps(run: &mut JobRun, workspace: &Workspace, ctx: &ExecutionContext) {
    let Some(failure) = run_bounded(run, workspace, ctx).await else {
        return;
    };
    let cancelled = failure == RunFailure::Cancelled;
    interrupt(run, ctx, failure);
    if cancelled {
        skip_remaining(run, ctx, SkipReason::Cancelled);
        return;
    }

    // The failure is recorded now, so only `always` steps remain eligible.
    if let Some(second) = run_bounded(run, workspace, ctx).await {
        let reason = if second == RunFailure::Cancelled {
            SkipReason::Cancelled
        } else {
            SkipReason::PriorFailure
        };
        interrupt(run, ctx, second);
        skip_remaining(run, ctx, reason);
    }
}

/// Runs the remaining steps until done, the run's time bound elapses, or the
/// stop token fires. Returns the interruption cause, if any.
async fn run_bounded(
    run: &mut JobRun,
    workspace: &Workspace,
    ctx: &ExecutionContext,
) -> Option<RunFailure> {
    let limit = ctx.workflow.strategy.timeout();
    tokio::select! {
        biased;
        _ = ctx.stop.cancelled() => Some(RunFailure::Cancelled),
        finished = tokio::time::timeout(limit, run_steps(run, workspace, ctx)) => match finished {
            Ok(()) => None,
            Err(_) => Some(RunFailure::Timeout { limit_secs: limit.as_secs() }),
        },
    }
}

/// Marks the step that was in flight as interrupted and records the cause.
fn interrupt(run: &mut JobRun, ctx: &ExecutionContext, failure: RunFailure) {
    warn!(run = %run.id, cause = %failure, "run interrupted");
    if let Some(step) = ctx.workflow.steps.get(run.steps.len()) {
        push_result(run, ctx, StepResult::interrupted(&step.name));
    }
    record(run, failure);
}

/// Executes every step that has no result yet, in declaration order.
async fn run_steps(run: &mut JobRun, workspace: &Workspace, ctx: &ExecutionContext) {
    let steps = &ctx.workflow.steps;
    while let Some(step) = steps.get(run.steps.len()) {
        let result = if !step.applies_to(&run.assignment) {
            StepResult::skipped(&step.name, SkipReason::Gated)
        } else if run.failure().is_some() && !step.always {
            StepResult::skipped(&step.name, SkipReason::PriorFailure)
        } else {
            run_step_with_cache(step, run, workspace, ctx).await
        };

        if let StepOutcome::Failed { exit_code } = result.outcome {
            if step.continue_on_error {
                debug!(run = %run.id, step = %step.name, "step failed, continuing on error");
            } else {
                let failure = if step.setup {
                    RunFailure::EnvironmentSetup {
                        step: step.name.clone(),
                        exit_code,
                    }
                } else {
                    RunFailure::Step {
                        step: step.name.clone(),
                        exit_code,
                    }
                };
                record(run, failure);
            }
        }
        push_result(run, ctx, result);
    }
}

fn skip_remaining(run: &mut JobRun, ctx: &ExecutionContext, reason: SkipReason) {
    while let Some(step) = ctx.workflow.steps.get(run.steps.len()) {
        push_result(run, ctx, StepResult::skipped(&step.name, reason));
    }
}

fn push_result(run: &mut JobRun, ctx: &ExecutionContext, result: StepResult) {
    ctx.emit(RunEvent::StepFinished {
        run_id: run.id.clone(),
        step: result.name.clone(),
        outcome: result.outcome.clone(),
        duration: result.duration,
    });
    run.steps.push(result);
}

fn record(run: &mut JobRun, failure: RunFailure) {
    if let Err(e) = run.record_failure(failure) {
        warn!(error = %e, "failure could not be recorded");
    }
}

/// Routes the cache's populate step through the cache; everything else runs directly.
async fn run_step_with_cache(
    step: &Step,
    run: &JobRun,
    workspace: &Workspace,
    ctx: &ExecutionContext,
) -> StepResult {
    if let (Some(store), Some(config)) = (&ctx.cache, &ctx.workflow.cache) {
        if config.populate_step == step.name {
            return run_cached_step(step, run, workspace, ctx, store, config).await;
        }
    }
    run_step(step, run, workspace, ctx).await
}

async fn run_cached_step(
    step: &Step,
    run: &JobRun,
    workspace: &Workspace,
    ctx: &ExecutionContext,
    store: &CacheStore,
    config: &CacheConfig,
) -> StepResult {
    let prefix = substitute_matrix(&config.key, &run.assignment);
    let lockfile = workspace
        .root
        .join(substitute_matrix(&config.lockfile, &run.assignment));
    let key = match CacheKey::derive(&prefix, &lockfile) {
        Ok(key) => key,
        Err(e) => {
            warn!(run = %run.id, error = %e, "cache key unavailable, running step uncached");
            return run_step(step, run, workspace, ctx).await;
        }
    };
    let dir = workspace
        .root
        .join(substitute_matrix(&config.path, &run.assignment));

    let outcome = store
        .get_or_populate(&key, &dir, move || async move {
            let result = run_step(step, run, workspace, ctx).await;
            (result.is_success(), result)
        })
        .await;

    match outcome {
        Ok(CacheOutcome::Hit) => StepResult::skipped(&step.name, SkipReason::CacheHit),
        Ok(CacheOutcome::Populated(result)) | Ok(CacheOutcome::NotStored(result)) => result,
        Err(e) => {
            warn!(run = %run.id, error = %e, "cache restore failed, running step uncached");
            run_step(step, run, workspace, ctx).await
        }
    }
}

/// Executes one step's external command and records its outcome.
async fn run_step(
    step: &Step,
    run: &JobRun,
    workspace: &Workspace,
    ctx: &ExecutionContext,
) -> StepResult {
    let started = Instant::now();
    let command_line = substitute_matrix(&step.run, &run.assignment);
    let working_dir = match &step.working_directory {
        Some(dir) => workspace.root.join(substitute_matrix(dir, &run.assignment)),
        None => workspace.root.clone(),
    };
    let env = step_environment(step, run, ctx);
    let withheld: Vec<String> = ctx
        .secrets
        .declared()
        .iter()
        .filter(|name| !step.secrets.contains(name))
        .cloned()
        .collect();

    let invocation = CommandSpec {
        command_line: &command_line,
        shell: step.shell.as_deref(),
        working_dir: &working_dir,
        env: &env,
        env_remove: &withheld,
    };
    let header = format!("$ {command_line}\n");

    let cmd = match command::build_command(&invocation) {
        Ok(cmd) => cmd,
        Err(e) => {
            let output = ctx.secrets.redact(&format!("{header}{e:#}\n"));
            return StepResult::failed(&step.name, None, output, started.elapsed());
        }
    };

    debug!(run = %run.id, step = %step.name, dir = %working_dir.display(), "starting step");
    let (status, output) = command::spawn_and_capture(cmd).await;
    let duration = started.elapsed();

    match status {
        Ok(status) if status.success() => StepResult::succeeded(
            &step.name,
            ctx.secrets.redact(&format!("{header}{output}")),
            duration,
        ),
        Ok(status) => StepResult::failed(
            &step.name,
            status.code(),
            ctx.secrets.redact(&format!("{header}{output}")),
            duration,
        ),
        Err(e) => StepResult::failed(
            &step.name,
            None,
            ctx.secrets
                .redact(&format!("{header}{output}failed to start process: {e}\n")),
            duration,
        ),
    }
}

/// Environment for one step, in increasing precedence: workflow `env`,
/// `MATRIX_*` variables, step `env`, then the step's own secrets.
fn step_environment(step: &Step, run: &JobRun, ctx: &ExecutionContext) -> IndexMap<String, String> {
    let mut env = IndexMap::new();
    for (name, value) in &ctx.workflow.env {
        env.insert(name.clone(), substitute_matrix(value, &run.assignment));
    }
    for (dimension, value) in &run.assignment {
        env.insert(format!("MATRIX_{}", env_var_name(dimension)), value.clone());
    }
    env.insert("MATRIX_RUN_ID".to_string(), run.id.clone());
    for (name, value) in &step.env {
        env.insert(name.clone(), substitute_matrix(value, &run.assignment));
    }
    for name in &step.secrets {
        if let Some(value) = ctx.secrets.get(name) {
            env.insert(name.clone(), value.to_string());
        }
    }
    env
}

/// `python-version` -> `PYTHON_VERSION`.
pub fn env_var_name(dimension: &str) -> String {
    dimension
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// Collects the run's artifacts and writes its log. Never fails the run.
///
/// 收集运行的产物并写入日志。永远不会使运行失败。
fn finalize(run: &mut JobRun, workspace: Option<&Workspace>, ctx: &ExecutionContext) {
    if let Some(workspace) = workspace {
        let artifacts_root = ctx.output_dir.join("artifacts");
        for declared in &ctx.workflow.artifacts {
            let name = format!("{}-{}", declared.name, run.id);
            let relative = PathBuf::from(substitute_matrix(&declared.path, &run.assignment));
            let dest_dir = artifacts_root.join(fs::sanitize_component(&name));
            let stored = match fs::copy_artifact(&workspace.root.join(&relative), &dest_dir) {
                Ok(Some(path)) => Some(path),
                Ok(None) => {
                    warn!(run = %run.id, artifact = %declared.name, path = %relative.display(), "artifact was not produced");
                    None
                }
                Err(e) => {
                    warn!(run = %run.id, artifact = %declared.name, error = %e, "failed to collect artifact");
                    None
                }
            };
            run.artifacts.push(ArtifactRecord {
                name,
                source: relative,
                stored,
            });
        }
    }

    match write_run_log(run, ctx) {
        Ok(path) => run.log_path = Some(path),
        Err(e) => warn!(run = %run.id, error = %e, "failed to write run log"),
    }
}

fn write_run_log(run: &JobRun, ctx: &ExecutionContext) -> anyhow::Result<PathBuf> {
    let run_dir = fs::create_run_dir(&ctx.output_dir, &run.id)?;
    let path = run_dir.join("log.txt");
    std::fs::write(&path, render_log(run))?;
    Ok(path)
}

/// Plain-text log of a run: one section per step with its captured output.
pub fn render_log(run: &JobRun) -> String {
    let mut log = format!("run: {}\nmatrix: {}\n", run.id, run.label());
    if let Some(failure) = run.failure() {
        log.push_str(&format!("failure: {failure}\n"));
    }
    for step in &run.steps {
        log.push_str(&format!(
            "\n== {} [{}] ({:.2}s)\n",
            step.name,
            describe_outcome(&step.outcome),
            step.duration.as_secs_f64()
        ));
        log.push_str(&step.output);
    }
    log
}

fn describe_outcome(outcome: &StepOutcome) -> String {
    match outcome {
        StepOutcome::Succeeded => "succeeded".to_string(),
        StepOutcome::Failed {
            exit_code: Some(code),
        } => format!("failed, exit code {code}"),
        StepOutcome::Failed { exit_code: None } => "failed".to_string(),
        StepOutcome::Skipped { reason } => format!("skipped: {reason:?}"),
        StepOutcome::Interrupted => "interrupted".to_string(),
    }
}
