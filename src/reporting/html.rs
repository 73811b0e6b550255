//! # HTML Reporting Module / HTML 报告模块
//!
//! This module renders a self-contained HTML report of a [`RunSummary`]:
//! overall counts, one row per run with its assignment and cause, and the
//! output of every executed step behind a toggle.
//!
//! 此模块将 [`RunSummary`] 渲染为独立的 HTML 报告：总体计数、每个运行一行
//! （包含其矩阵取值和失败原因），以及可展开查看的每个已执行步骤的输出。

use anyhow::{Context, Result};
use maud::{DOCTYPE, Markup, PreEscaped, html};
use std::fs;
use std::path::Path;

use crate::core::models::{JobRun, RunStatus, RunSummary, StepOutcome, StepResult};
use crate::infra::t;
use crate::reporting::console::status_label;

/// Embedded CSS styles for HTML reports / HTML 报告的嵌入式 CSS 样式
const HTML_STYLE: &str = r#"
body { font-family: -apple-system, "Segoe UI", Helvetica, Arial, sans-serif; margin: 2em; color: #24292e; }
h1 { border-bottom: 1px solid #e1e4e8; padding-bottom: .3em; }
.summary-container { display: flex; gap: 2em; margin-bottom: 2em; }
.summary-item { display: flex; flex-direction: column; align-items: center; }
.summary-item .count { font-size: 2em; font-weight: bold; }
.succeeded-text { color: #22863a; }
.failed-text { color: #cb2431; }
table { border-collapse: collapse; width: 100%; }
th, td { border: 1px solid #e1e4e8; padding: 6px 10px; text-align: left; vertical-align: top; }
th { background: #f6f8fa; }
.status-cell { font-weight: bold; }
.status-succeeded { color: #22863a; }
.status-failed { color: #cb2431; }
.status-cancelled { color: #b08800; }
details { margin: 4px 0; }
pre.output-content { background: #f6f8fa; padding: 8px; overflow-x: auto; white-space: pre-wrap; }
"#;

/// Writes an HTML report of `summary` to `output_path`.
///
/// 将 `summary` 的 HTML 报告写入 `output_path`。
///
/// # Errors / 错误
/// Returns an error if the parent directory cannot be created or the file
/// cannot be written.
///
/// 如果无法创建父目录或无法写入文件，则返回错误。
pub fn generate_html_report(summary: &RunSummary, output_path: &Path, locale: &str) -> Result<()> {
    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let markup = render(summary, locale);
    fs::write(output_path, markup.into_string())
        .with_context(|| format!("Failed to write {}", output_path.display()))?;
    Ok(())
}

/// Renders the report without touching the file system.
pub fn render(summary: &RunSummary, locale: &str) -> Markup {
    let title = t!("html_report.title", locale = locale, workflow = &summary.workflow).to_string();
    html! {
        (DOCTYPE)
        html {
            head {
                meta charset="utf-8";
                title { (title) }
                style { (PreEscaped(HTML_STYLE)) }
            }
            body {
                h1 { (title) }
                p {
                    (t!("html_report.generated_at", locale = locale,
                        started = summary.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
                        finished = summary.finished_at.format("%Y-%m-%d %H:%M:%S UTC")))
                }
                div class="summary-container" {
                    (summary_item(summary.total, "", &t!("html_report.summary.total", locale = locale)))
                    (summary_item(summary.succeeded, "succeeded-text", &t!("html_report.summary.succeeded", locale = locale)))
                    (summary_item(summary.failed, "failed-text", &t!("html_report.summary.failed", locale = locale)))
                }
                table {
                    thead {
                        tr {
                            th { (t!("html_report.table.run", locale = locale)) }
                            th { (t!("html_report.table.assignment", locale = locale)) }
                            th { (t!("html_report.table.status", locale = locale)) }
                            th { (t!("html_report.table.duration", locale = locale)) }
                            th { (t!("html_report.table.steps", locale = locale)) }
                        }
                    }
                    tbody {
                        @for run in &summary.runs {
                            (run_row(run, locale))
                        }
                    }
                }
                @if !summary.artifacts.is_empty() {
                    h2 { (t!("html_report.artifacts", locale = locale)) }
                    ul {
                        @for artifact in &summary.artifacts {
                            li { code { (artifact.name) } " " (artifact.path.display().to_string()) }
                        }
                    }
                }
            }
        }
    }
}

fn summary_item(count: usize, class: &str, label: &str) -> Markup {
    html! {
        div class="summary-item" {
            span class={ "count " (class) } { (count) }
            span class="label" { (label) }
        }
    }
}

fn status_class(run: &JobRun) -> &'static str {
    match (run.status(), run.failure().map(|f| f.label())) {
        (RunStatus::Succeeded, _) => "status-succeeded",
        (RunStatus::Failed, Some("cancelled")) => "status-cancelled",
        _ => "status-failed",
    }
}

fn run_row(run: &JobRun, locale: &str) -> Markup {
    html! {
        tr {
            td { code { (run.id) } }
            td { (run.label()) }
            td {
                div class={ "status-cell " (status_class(run)) } {
                    (status_label(run.status(), run.failure(), locale))
                }
                @if let Some(failure) = run.failure() {
                    div { (failure.to_string()) }
                }
            }
            td { (format!("{:.2}s", run.duration.as_secs_f64())) }
            td {
                @for step in &run.steps {
                    (step_details(step, locale))
                }
            }
        }
    }
}

fn step_details(step: &StepResult, locale: &str) -> Markup {
    let outcome = match &step.outcome {
        StepOutcome::Succeeded => t!("html_report.step.succeeded", locale = locale).to_string(),
        StepOutcome::Failed { exit_code } => t!(
            "html_report.step.failed",
            locale = locale,
            code = exit_code.map(|c| c.to_string()).unwrap_or_else(|| "-".to_string())
        )
        .to_string(),
        StepOutcome::Skipped { reason } => {
            t!("html_report.step.skipped", locale = locale, reason = format!("{reason:?}")).to_string()
        }
        StepOutcome::Interrupted => t!("html_report.step.interrupted", locale = locale).to_string(),
    };
    html! {
        @if step.was_executed() {
            details open[!step.is_success()] {
                summary { (step.name) ": " (outcome) }
                pre class="output-content" { (step.output) }
            }
        } @else {
            div { (step.name) ": " (outcome) }
        }
    }
}
