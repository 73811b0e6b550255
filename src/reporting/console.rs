//! # Console Reporting Module / 控制台报告模块
//!
//! This module handles the display of plans, live progress and run summaries
//! in the console. Output is colorful and localized.
//!
//! 此模块处理计划、实时进度和运行摘要在控制台中的显示。输出带有颜色并支持本地化。

use colored::*;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::core::models::{JobRun, RunEvent, RunFailure, RunStatus, RunSummary, StepOutcome};
use crate::core::planner::ExecutionPlan;
use crate::infra::t;

/// Localized status label for a finished run.
pub fn status_label(status: RunStatus, failure: Option<&RunFailure>, locale: &str) -> String {
    match (status, failure) {
        (RunStatus::Succeeded, _) => t!("report.status_succeeded", locale = locale).to_string(),
        (RunStatus::Failed, Some(RunFailure::Timeout { .. })) => {
            t!("report.status_timeout", locale = locale).to_string()
        }
        (RunStatus::Failed, Some(RunFailure::Cancelled)) => {
            t!("report.status_cancelled", locale = locale).to_string()
        }
        (RunStatus::Failed, _) => t!("report.status_failed", locale = locale).to_string(),
        (RunStatus::Running, _) => t!("report.status_running", locale = locale).to_string(),
        (RunStatus::Pending, _) => t!("report.status_pending", locale = locale).to_string(),
    }
}

fn colorize(label: String, status: RunStatus, failure: Option<&RunFailure>) -> ColoredString {
    match (status, failure) {
        (RunStatus::Succeeded, _) => label.green(),
        (RunStatus::Failed, Some(RunFailure::Cancelled)) => label.yellow(),
        (RunStatus::Failed, _) => label.red(),
        _ => label.dimmed(),
    }
}

/// Prints the runs an invocation is about to execute.
///
/// ```text
/// --- Execution Plan (6 runs) ---
///   1. ubuntu-latest-3.8          os=ubuntu-latest, python-version=3.8
///   2. ubuntu-latest-3.9          os=ubuntu-latest, python-version=3.9
/// ```
pub fn print_plan(plan: &ExecutionPlan, locale: &str) {
    println!(
        "\n{}",
        t!("plan.banner", locale = locale, count = plan.runs.len()).bold()
    );
    for run in &plan.runs {
        println!("  {:>3}. {:<40} {}", run.index + 1, run.id.cyan(), run.label());
    }
    if plan.filtered_count > 0 {
        println!(
            "{}",
            t!(
                "plan.filtered",
                locale = locale,
                filtered = plan.filtered_count,
                total = plan.total_combinations
            )
            .yellow()
        );
    }
}

/// Consumes run events and prints one line per milestone until every sender is dropped.
///
/// 消费运行事件，并在所有发送端被丢弃之前为每个里程碑打印一行。
pub fn spawn_progress_printer(
    events: mpsc::UnboundedReceiver<RunEvent>,
    locale: String,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut events = UnboundedReceiverStream::new(events);
        while let Some(event) = events.next().await {
            print_event(&event, &locale);
        }
    })
}

fn print_event(event: &RunEvent, locale: &str) {
    match event {
        RunEvent::RunStarted { id, .. } => {
            println!("{}", t!("run.started", locale = locale, id = id).blue());
        }
        RunEvent::StepFinished {
            run_id,
            step,
            outcome,
            duration,
        } => {
            let secs = format!("{:.2}", duration.as_secs_f64());
            let line = match outcome {
                StepOutcome::Succeeded => {
                    t!("run.step_passed", locale = locale, id = run_id, step = step, duration = secs)
                        .green()
                }
                StepOutcome::Failed { .. } => {
                    t!("run.step_failed", locale = locale, id = run_id, step = step, duration = secs)
                        .red()
                }
                StepOutcome::Interrupted => {
                    t!("run.step_interrupted", locale = locale, id = run_id, step = step).red()
                }
                // Skips are reported in the log and the summary only.
                StepOutcome::Skipped { .. } => return,
            };
            println!("{line}");
        }
        RunEvent::RunFinished {
            id,
            status,
            failure,
            duration,
        } => {
            let label = status_label(*status, failure.as_ref(), locale);
            let line = t!(
                "run.finished",
                locale = locale,
                id = id,
                status = label,
                duration = format!("{:.2}", duration.as_secs_f64())
            );
            println!("{}", colorize(line.to_string(), *status, failure.as_ref()).bold());
        }
    }
}

/// Prints a formatted summary of all runs to the console.
///
/// 在控制台打印所有运行的格式化摘要。
///
/// # Output Format / 输出格式
/// ```text
/// --- Run Summary ---
///   - Succeeded  | ubuntu-latest-3.8                        |      12.31s
///   - Failed     | windows-latest-3.8                       |       4.02s  step 'Test' failed (exit code 1)
/// ```
pub fn print_summary(summary: &RunSummary, locale: &str) {
    println!("\n{}", t!("summary.banner", locale = locale).bold());

    for run in &summary.runs {
        let label = status_label(run.status(), run.failure(), locale);
        let cause = run.failure().map(|f| f.to_string()).unwrap_or_default();
        println!(
            "  - {:<12} | {:<40} | {:>10.2?}  {}",
            colorize(label, run.status(), run.failure()),
            run.id,
            run.duration,
            cause
        );
    }

    println!(
        "\n{}",
        t!(
            "summary.counts",
            locale = locale,
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed
        )
    );

    if !summary.artifacts.is_empty() {
        println!("\n{}", t!("summary.artifacts", locale = locale).bold());
        for artifact in &summary.artifacts {
            println!("  - {:<50} {}", artifact.name, artifact.path.display());
        }
    }
}

/// Prints the failing step's output for every failed run, with the log path.
///
/// 为每个失败的运行打印失败步骤的输出以及日志路径。
pub fn print_failure_details(summary: &RunSummary, locale: &str) {
    let failed: Vec<&JobRun> = summary.failed_runs().collect();
    if failed.is_empty() {
        return;
    }

    println!("\n{}", t!("summary.failure_banner", locale = locale).red().bold());
    println!("{}", "-".repeat(80));

    for (i, run) in failed.iter().enumerate() {
        let cause = run.failure().map(|f| f.to_string()).unwrap_or_default();
        println!(
            "[{}/{}] {} '{}': {}",
            i + 1,
            failed.len(),
            t!("summary.failure_header", locale = locale).red(),
            run.id.cyan(),
            cause
        );
        if let Some(step) = run.failed_step() {
            println!("\n--- {} ---\n", t!("summary.step_log", locale = locale, step = &step.name).yellow());
            println!("{}", step.output.trim_end());
        }
        if let Some(log) = &run.log_path {
            println!("\n{}", t!("summary.log_path", locale = locale, path = log.display()));
        }
        println!("{}", "-".repeat(80));
    }
}
