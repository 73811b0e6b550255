//! # Plan Command Module / 计划命令模块
//!
//! Prints the expanded, filtered and sharded plan without executing anything.
//!
//! 打印展开、过滤并分片后的计划，但不执行任何内容。

use anyhow::Result;
use serde_json::json;
use std::path::PathBuf;

use crate::cli::Selection;
use crate::cli::commands::run::setup_and_parse_config;
use crate::core::planner::{self, ExecutionPlan};
use crate::reporting::print_plan;

pub fn execute(
    config: PathBuf,
    selection: Selection,
    as_json: bool,
    lang_override: Option<String>,
) -> Result<()> {
    let (workflow, _) = setup_and_parse_config(&config)?;
    let locale = crate::resolve_locale(lang_override.as_deref().unwrap_or(&workflow.language));

    let plan = planner::plan_execution(
        &workflow,
        &selection.filters,
        selection.total_runners,
        selection.runner_index,
    )?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&plan_json(&workflow.name, &plan))?);
    } else {
        print_plan(&plan, &locale);
    }
    Ok(())
}

/// Machine-readable form of a plan, consumed by CI scripts.
pub fn plan_json(workflow: &str, plan: &ExecutionPlan) -> serde_json::Value {
    json!({
        "workflow": workflow,
        "total_combinations": plan.total_combinations,
        "filtered": plan.filtered_count,
        "distributed": plan.is_distributed,
        "runs": plan.runs.iter().map(|run| json!({
            "index": run.index,
            "id": run.id,
            "assignment": run.assignment,
        })).collect::<Vec<_>>(),
    })
}
