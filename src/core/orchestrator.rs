//! # Orchestrator Module / 编排器模块
//!
//! Drives a whole plan: every run becomes an independent task, at most
//! `jobs` of them execute at a time, and their terminal results are gathered
//! into a [`RunSummary`]. Runs share nothing mutable; progress flows to the
//! caller through the event channel of the [`ExecutionContext`].
//!
//! 驱动整个计划：每个运行都成为一个独立任务，同一时间最多执行 `jobs` 个，
//! 其最终结果被汇总为 [`RunSummary`]。运行之间不共享可变状态；
//! 进度通过 [`ExecutionContext`] 的事件通道传递给调用方。

use anyhow::Result;
use chrono::Utc;
use futures::{StreamExt, stream};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::core::config::Workflow;
use crate::core::execution::{self, ExecutionContext};
use crate::core::models::{JobRun, RunEvent, RunFailure, RunSummary};
use crate::core::planner;
use crate::core::secrets::SecretStore;

/// Default parallelism when neither `-j` nor `strategy.max_parallel` is set.
pub fn default_jobs() -> usize {
    num_cpus::get() / 2 + 1
}

#[derive(Debug, Clone)]
pub struct Orchestrator {
    ctx: ExecutionContext,
    jobs: usize,
}

impl Orchestrator {
    pub fn new(workflow: Workflow, project_root: PathBuf, output_dir: PathBuf) -> Self {
        let jobs = workflow.strategy.max_parallel.unwrap_or_else(default_jobs);
        let ctx = ExecutionContext::new(Arc::new(workflow), project_root, output_dir);
        Self { ctx, jobs }
    }

    /// Overrides the parallelism bound (values below one are treated as one).
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    pub fn with_secrets(mut self, secrets: SecretStore) -> Self {
        self.ctx = self.ctx.with_secrets(secrets);
        self
    }

    /// Cancelling this token cancels every in-flight and pending run.
    pub fn with_stop_token(mut self, stop: CancellationToken) -> Self {
        self.ctx = self.ctx.with_stop_token(stop);
        self
    }

    pub fn with_events(mut self, events: mpsc::UnboundedSender<RunEvent>) -> Self {
        self.ctx = self.ctx.with_events(events);
        self
    }

    pub fn workflow(&self) -> &Workflow {
        &self.ctx.workflow
    }

    pub fn jobs(&self) -> usize {
        self.jobs
    }

    /// Expands the whole matrix and executes every run.
    pub async fn run_all(&self) -> Result<RunSummary> {
        let runs = planner::expand(&self.ctx.workflow.matrix);
        self.run_plan(runs).await
    }

    /// Executes the given pending runs concurrently and aggregates the results.
    ///
    /// A failing run only fails itself, unless `strategy.fail_fast` is set, in
    /// which case the first failure cancels the remaining runs.
    ///
    /// 并发执行给定的待执行运行并汇总结果。
    /// 失败的运行只会使自身失败，除非设置了 `strategy.fail_fast`，
    /// 此时第一次失败会取消其余运行。
    pub async fn run_plan(&self, runs: Vec<JobRun>) -> Result<RunSummary> {
        let started_at = Utc::now();
        let fail_fast = self.ctx.workflow.strategy.fail_fast;
        let fast_fail_token = self.ctx.stop.child_token();
        let ctx = self.ctx.clone().with_stop_token(fast_fail_token.clone());

        info!(
            runs = runs.len(),
            jobs = self.jobs,
            fail_fast,
            "starting workflow '{}'",
            ctx.workflow.name
        );
        if !ctx.workflow.strategy.isolate && self.jobs > 1 {
            warn!(
                jobs = self.jobs,
                "isolate is off, concurrent runs share the project directory"
            );
        }

        let finished: Vec<JobRun> = stream::iter(runs.into_iter().map(|run| {
            let ctx = ctx.clone();
            let fast_fail_token = fast_fail_token.clone();
            let placeholder = JobRun::new(run.index, run.id.clone(), run.assignment.clone());

            async move {
                let handle = tokio::spawn(async move { execution::execute(run, &ctx).await });
                let run = match handle.await {
                    Ok(run) => run,
                    Err(e) => crashed(placeholder, &e.to_string()),
                };
                if fail_fast && run.is_failure() {
                    fast_fail_token.cancel();
                }
                run
            }
        }))
        .buffer_unordered(self.jobs)
        .collect()
        .await;

        let summary = RunSummary::from_runs(&ctx.workflow.name, started_at, finished);
        info!(
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "workflow finished"
        );
        Ok(summary)
    }
}

/// Terminal record for a run whose task panicked or was aborted.
fn crashed(mut run: JobRun, reason: &str) -> JobRun {
    error!(run = %run.id, reason, "run task did not complete");
    let _ = run.mark_running();
    let _ = run.record_failure(RunFailure::Internal {
        message: format!("run task did not complete: {reason}"),
    });
    let _ = run.finish();
    run
}
