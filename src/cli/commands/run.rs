//! # Run Command Module / 运行命令模块
//!
//! This module implements the `run` command, which expands the workflow's
//! matrix and executes every selected run.
//!
//! 此模块实现了 `run` 命令，展开工作流矩阵并执行每个选中的运行。

use anyhow::{Context, Result};
use colored::*;
use std::{env, fs, path::PathBuf};
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    cli::Selection,
    core::{
        config::{self, Workflow},
        orchestrator::Orchestrator,
        planner,
        secrets::SecretStore,
        trigger::TriggerEvent,
    },
    infra::{fs as infra_fs, t},
    reporting::{
        generate_html_report, print_failure_details, print_plan, print_summary,
        spawn_progress_printer,
    },
};

/// Arguments of the `run` command.
#[derive(Debug, Clone)]
pub struct RunArgs {
    pub config: PathBuf,
    pub project_dir: PathBuf,
    pub output_dir: PathBuf,
    pub jobs: Option<usize>,
    pub selection: Selection,
    pub event: Option<TriggerEvent>,
    pub html: Option<PathBuf>,
    /// `--lang`, which takes precedence over the workflow's `language`.
    pub lang_override: Option<String>,
}

/// Executes the run command with the provided arguments.
///
/// # Returns
/// `Ok(true)` if every selected run succeeded (or nothing had to run),
/// `Ok(false)` if at least one run failed.
pub async fn execute(args: RunArgs) -> Result<bool> {
    let (workflow, config_path) = setup_and_parse_config(&args.config)?;
    let locale = crate::resolve_locale(
        args.lang_override
            .as_deref()
            .unwrap_or(workflow.language.as_str()),
    );
    rust_i18n::set_locale(&locale);

    println!(
        "{}",
        t!("run.loading_workflow", locale = &locale, path = config_path.display())
    );

    if let Some(event) = &args.event {
        let triggered = workflow
            .trigger
            .as_ref()
            .is_none_or(|trigger| trigger.matches(event));
        if !triggered {
            println!(
                "{}",
                t!(
                    "run.not_triggered",
                    locale = &locale,
                    event = event.kind,
                    branch = &event.branch
                )
                .yellow()
            );
            return Ok(true);
        }
    }

    let project_root = infra_fs::absolute_path(&args.project_dir).with_context(|| {
        t!("run.project_dir_not_found", locale = &locale, path = args.project_dir.display())
            .to_string()
    })?;
    let output_dir = prepare_output_dir(&args.output_dir)?;
    println!(
        "{}",
        t!("run.project_root", locale = &locale, path = project_root.display())
    );

    let plan = planner::plan_execution(
        &workflow,
        &args.selection.filters,
        args.selection.total_runners,
        args.selection.runner_index,
    )?;

    if let (Some(total), Some(index)) = (args.selection.total_runners, args.selection.runner_index)
    {
        println!(
            "{}",
            t!(
                "run.split_runner",
                locale = &locale,
                index = index + 1,
                total = total,
                count = plan.runs.len()
            )
            .bold()
        );
    } else {
        println!("{}", t!("run.single_runner", locale = &locale).bold());
    }
    print_plan(&plan, &locale);

    if plan.runs.is_empty() {
        println!("{}", t!("run.no_runs", locale = &locale).green());
        return Ok(true);
    }

    let stop_token = setup_signal_handler(&locale);
    let secrets = SecretStore::from_env(&workflow.secret_names());
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let printer = spawn_progress_printer(events_rx, locale.clone());

    let mut orchestrator = Orchestrator::new(workflow, project_root, output_dir.clone())
        .with_secrets(secrets)
        .with_stop_token(stop_token)
        .with_events(events_tx);
    if let Some(jobs) = args.jobs {
        orchestrator = orchestrator.with_jobs(jobs);
    }
    info!(jobs = orchestrator.jobs(), "executing plan");

    let summary = orchestrator.run_plan(plan.runs).await?;
    // Dropping the last sender ends the progress printer.
    drop(orchestrator);
    if let Err(e) = printer.await {
        warn!(error = %e, "progress printer did not finish");
    }

    print_summary(&summary, &locale);

    let summary_path = output_dir.join("summary.json");
    summary.write_json(&summary_path)?;
    println!(
        "\n{}",
        t!("run.summary_written", locale = &locale, path = summary_path.display())
    );

    if let Some(report_path) = &args.html {
        println!(
            "{}",
            t!("run.generating_html", locale = &locale, path = report_path.display())
        );
        if let Err(e) = generate_html_report(&summary, report_path, &locale) {
            eprintln!("{} {:#}", t!("run.html_failed", locale = &locale).red(), e);
        }
    }

    if summary.is_success() {
        println!("\n{}", t!("run.all_succeeded", locale = &locale).green().bold());
        Ok(true)
    } else {
        print_failure_details(&summary, &locale);
        println!(
            "\n{}",
            t!("run.some_failed", locale = &locale, failed = summary.failed, total = summary.total)
                .red()
                .bold()
        );
        Ok(false)
    }
}

/// Sets up and parses the workflow file.
pub(crate) fn setup_and_parse_config(config_path_arg: &PathBuf) -> Result<(Workflow, PathBuf)> {
    // The workflow's own language is not known yet.
    let locale = rust_i18n::locale();
    let config_path = fs::canonicalize(config_path_arg).with_context(|| {
        t!("run.config_not_found", locale = &*locale, path = config_path_arg.display())
            .to_string()
    })?;

    let workflow = config::load_workflow(&config_path).with_context(|| {
        t!("run.config_invalid", locale = &*locale, path = config_path.display()).to_string()
    })?;

    Ok((workflow, config_path))
}

/// Creates the output directory and returns its absolute path.
fn prepare_output_dir(output_dir: &PathBuf) -> Result<PathBuf> {
    let resolved = infra_fs::resolve_against(&env::current_dir()?, output_dir);
    fs::create_dir_all(&resolved)
        .with_context(|| format!("Failed to create output directory: {}", resolved.display()))?;
    infra_fs::absolute_path(&resolved)
}

/// Sets up a signal handler for graceful shutdown.
fn setup_signal_handler(locale: &str) -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();
    let locale = locale.to_string();

    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                println!("\n{}", t!("run.shutdown_signal", locale = &locale).yellow());
                token_clone.cancel();
            }
            Err(e) => warn!(error = %e, "failed to listen for Ctrl-C"),
        }
    });

    token
}
