// src/cli.rs
use anyhow::Result;
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::{env, path::PathBuf};

use crate::core::planner::MatrixFilter;
use crate::core::trigger::EventKind;
use crate::infra::t;

pub mod commands;

/// Pre-parses the command line arguments to find the language setting.
/// This allows i18n to be initialized before the full CLI is built.
/// It looks for a `--lang <VALUE>` or `--lang=<VALUE>` argument.
fn pre_parse_language() -> Option<String> {
    let args: Vec<String> = env::args().collect();
    if let Some(pos) = args.iter().position(|arg| arg == "--lang") {
        return args.get(pos + 1).cloned();
    }
    args.iter()
        .find_map(|arg| arg.strip_prefix("--lang=").map(str::to_string))
}

fn config_arg(locale: &str) -> Arg {
    Arg::new("config")
        .short('c')
        .long("config")
        .help(t!("cli.arg_config", locale = locale).to_string())
        .value_name("CONFIG")
        .default_value("Workflow.toml")
        .value_parser(clap::value_parser!(PathBuf))
        .action(ArgAction::Set)
}

fn selection_args(locale: &str) -> [Arg; 3] {
    [
        Arg::new("filter")
            .long("filter")
            .help(t!("cli.arg_filter", locale = locale).to_string())
            .value_name("DIMENSION=VALUE")
            .value_parser(clap::value_parser!(MatrixFilter))
            .action(ArgAction::Append),
        Arg::new("total-runners")
            .long("total-runners")
            .help(t!("cli.arg_total_runners", locale = locale).to_string())
            .value_name("TOTAL_RUNNERS")
            .value_parser(clap::value_parser!(usize))
            .action(ArgAction::Set)
            .requires("runner-index"),
        Arg::new("runner-index")
            .long("runner-index")
            .help(t!("cli.arg_runner_index", locale = locale).to_string())
            .value_name("RUNNER_INDEX")
            .value_parser(clap::value_parser!(usize))
            .action(ArgAction::Set)
            .requires("total-runners"),
    ]
}

pub fn build_cli(locale: &str) -> Command {
    Command::new("matrix-orchestrator")
        .version(env!("CARGO_PKG_VERSION"))
        .about(t!("cli.about", locale = locale).to_string())
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("lang")
                .long("lang")
                .help(t!("cli.arg_lang", locale = locale).to_string())
                .value_name("LANGUAGE")
                .global(true)
                .action(ArgAction::Set),
        )
        .subcommand(
            Command::new("run")
                .about(t!("cli.cmd_run_about", locale = locale).to_string())
                .arg(config_arg(locale))
                .args(selection_args(locale))
                .arg(
                    Arg::new("jobs")
                        .short('j')
                        .long("jobs")
                        .help(t!("cli.arg_jobs", locale = locale).to_string())
                        .value_name("JOBS")
                        .value_parser(clap::value_parser!(usize))
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("project-dir")
                        .long("project-dir")
                        .help(t!("cli.arg_project_dir", locale = locale).to_string())
                        .value_name("PROJECT_DIR")
                        .default_value(".")
                        .value_parser(clap::value_parser!(PathBuf))
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("output-dir")
                        .long("output-dir")
                        .help(t!("cli.arg_output_dir", locale = locale).to_string())
                        .value_name("OUTPUT_DIR")
                        .default_value("matrix-results")
                        .value_parser(clap::value_parser!(PathBuf))
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("event")
                        .long("event")
                        .help(t!("cli.arg_event", locale = locale).to_string())
                        .value_name("EVENT")
                        .value_parser(clap::value_parser!(EventKind))
                        .action(ArgAction::Set)
                        .requires("branch"),
                )
                .arg(
                    Arg::new("branch")
                        .long("branch")
                        .help(t!("cli.arg_branch", locale = locale).to_string())
                        .value_name("BRANCH")
                        .action(ArgAction::Set)
                        .requires("event"),
                )
                .arg(
                    Arg::new("html")
                        .long("html")
                        .help(t!("cli.arg_html", locale = locale).to_string())
                        .value_name("HTML")
                        .value_parser(clap::value_parser!(PathBuf))
                        .action(ArgAction::Set),
                ),
        )
        .subcommand(
            Command::new("plan")
                .about(t!("cli.cmd_plan_about", locale = locale).to_string())
                .arg(config_arg(locale))
                .args(selection_args(locale))
                .arg(
                    Arg::new("json")
                        .long("json")
                        .help(t!("cli.arg_json", locale = locale).to_string())
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("init")
                .about(t!("cli.cmd_init_about", locale = locale).to_string())
                .arg(
                    Arg::new("non-interactive")
                        .long("non-interactive")
                        .help(t!("cli.arg_non_interactive", locale = locale).to_string())
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .help(t!("cli.arg_init_output", locale = locale).to_string())
                        .value_name("OUTPUT")
                        .default_value("Workflow.toml")
                        .value_parser(clap::value_parser!(PathBuf))
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("force")
                        .long("force")
                        .help(t!("cli.arg_force", locale = locale).to_string())
                        .action(ArgAction::SetTrue),
                ),
        )
}

/// Options shared by `run` and `plan` that select which runs to execute.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub filters: Vec<MatrixFilter>,
    pub total_runners: Option<usize>,
    pub runner_index: Option<usize>,
}

impl Selection {
    fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            filters: matches
                .get_many::<MatrixFilter>("filter")
                .map(|values| values.cloned().collect())
                .unwrap_or_default(),
            total_runners: matches.get_one::<usize>("total-runners").copied(),
            runner_index: matches.get_one::<usize>("runner-index").copied(),
        }
    }
}

fn path_arg(matches: &ArgMatches, name: &str) -> PathBuf {
    matches
        .get_one::<PathBuf>(name)
        .cloned()
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Parses the command line and dispatches to a subcommand.
///
/// # Returns
/// `Ok(false)` when the command completed but reported failed runs.
pub async fn run() -> Result<bool> {
    // Pre-parse language and initialize i18n first.
    let requested = pre_parse_language();
    let locale = crate::resolve_locale(
        &requested
            .clone()
            .or_else(sys_locale::get_locale)
            .unwrap_or_else(|| "en".to_string()),
    );
    rust_i18n::set_locale(&locale);

    let matches = build_cli(&locale).get_matches();

    match matches.subcommand() {
        Some(("run", run_matches)) => {
            let event = match (
                run_matches.get_one::<EventKind>("event").copied(),
                run_matches.get_one::<String>("branch"),
            ) {
                (Some(kind), Some(branch)) => Some(crate::core::trigger::TriggerEvent {
                    kind,
                    branch: branch.clone(),
                }),
                _ => None,
            };
            let args = commands::run::RunArgs {
                config: path_arg(run_matches, "config"),
                project_dir: path_arg(run_matches, "project-dir"),
                output_dir: path_arg(run_matches, "output-dir"),
                jobs: run_matches.get_one::<usize>("jobs").copied(),
                selection: Selection::from_matches(run_matches),
                event,
                html: run_matches.get_one::<PathBuf>("html").cloned(),
                lang_override: requested,
            };
            commands::run::execute(args).await
        }
        Some(("plan", plan_matches)) => {
            commands::plan::execute(
                path_arg(plan_matches, "config"),
                Selection::from_matches(plan_matches),
                plan_matches.get_flag("json"),
                requested,
            )?;
            Ok(true)
        }
        Some(("init", init_matches)) => {
            commands::init::execute(
                path_arg(init_matches, "output"),
                init_matches.get_flag("force"),
                init_matches.get_flag("non-interactive"),
                &locale,
            )?;
            Ok(true)
        }
        // `subcommand_required` makes clap print help and exit before this point.
        _ => Ok(true),
    }
}
