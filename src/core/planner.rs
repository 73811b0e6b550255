//! # Execution Planner Module / 执行计划模块
//!
//! This module expands a job matrix into its cross product of runs and selects
//! the runs a given invocation executes: dimension filters for machines that
//! only serve one platform, and round-robin sharding across CI runners.
//!
//! 此模块将作业矩阵展开为运行的笛卡尔积，并选择本次调用要执行的运行：
//! 针对只服务于单一平台的机器的维度过滤，以及跨 CI 运行器的轮询分片。

use anyhow::{Result, bail};
use std::collections::HashSet;
use std::str::FromStr;
use thiserror::Error;

use crate::core::config::{Matrix, Workflow};
use crate::core::models::{Assignment, JobRun};

/// Expands the matrix into one pending [`JobRun`] per combination.
///
/// The order is lexicographic over the declared dimension order: the first
/// dimension varies slowest, the last fastest. Combinations matching an
/// `exclude` entry are dropped. The same matrix always yields the same
/// ordered sequence.
///
/// 将矩阵展开为每个组合一个待执行的 [`JobRun`]。
/// 顺序按照声明的维度顺序进行字典序排列：第一个维度变化最慢，最后一个最快。
pub fn expand(matrix: &Matrix) -> Vec<JobRun> {
    let mut combinations: Vec<Assignment> = vec![Assignment::new()];

    for (dimension, values) in &matrix.dimensions {
        combinations = combinations
            .into_iter()
            .flat_map(|base| {
                values.iter().map(move |value| {
                    let mut next = base.clone();
                    next.insert(dimension.clone(), value.clone());
                    next
                })
            })
            .collect();
    }

    let mut used_ids = HashSet::new();
    combinations
        .into_iter()
        .filter(|assignment| !matrix.is_excluded(assignment))
        .enumerate()
        .map(|(index, assignment)| {
            let base = run_id(&assignment);
            let mut id = base.clone();
            let mut suffix = index;
            while !used_ids.insert(id.clone()) {
                id = format!("{base}-{suffix}");
                suffix += 1;
            }
            JobRun::new(index, id, assignment)
        })
        .collect()
}

/// Derives a filesystem-safe identifier from the assigned values.
pub fn run_id(assignment: &Assignment) -> String {
    if assignment.is_empty() {
        return "default".to_string();
    }
    assignment
        .values()
        .map(|value| crate::infra::fs::sanitize_component(value))
        .collect::<Vec<_>>()
        .join("-")
}

/// A `dimension=value` selector given on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatrixFilter {
    pub dimension: String,
    pub value: String,
}

#[derive(Debug, Error)]
#[error("invalid filter '{0}', expected <dimension>=<value>")]
pub struct FilterParseError(String);

impl FromStr for MatrixFilter {
    type Err = FilterParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('=') {
            Some((dimension, value)) if !dimension.trim().is_empty() => Ok(Self {
                dimension: dimension.trim().to_string(),
                value: value.trim().to_string(),
            }),
            _ => Err(FilterParseError(s.to_string())),
        }
    }
}

impl MatrixFilter {
    pub fn admits(&self, assignment: &Assignment) -> bool {
        assignment.get(&self.dimension) == Some(&self.value)
    }
}

/// Represents the complete execution plan for one invocation.
/// 表示一次调用的完整执行计划。
#[derive(Debug)]
pub struct ExecutionPlan {
    /// The runs this invocation executes, in plan order.
    /// 本次调用要执行的运行，按计划顺序排列。
    pub runs: Vec<JobRun>,
    /// Size of the expanded matrix after exclusions.
    /// 排除之后展开矩阵的大小。
    pub total_combinations: usize,
    /// Runs dropped by `--filter`.
    pub filtered_count: usize,
    /// Whether the runs are distributed across multiple runners (CI environment).
    /// 运行是否分布在多个运行器上（CI 环境）。
    pub is_distributed: bool,
}

/// Creates an execution plan for the workflow.
///
/// # Arguments
/// * `workflow` - The workflow whose matrix is expanded
/// * `filters` - `dimension=value` selectors; a run must match all of them
/// * `total_runners` - Optional total number of runners for distributed execution
/// * `runner_index` - Optional index of this runner (0-based)
pub fn plan_execution(
    workflow: &Workflow,
    filters: &[MatrixFilter],
    total_runners: Option<usize>,
    runner_index: Option<usize>,
) -> Result<ExecutionPlan> {
    for filter in filters {
        workflow
            .matrix
            .check_reference("--filter", &filter.dimension, Some(&filter.value))?;
    }

    let expanded = expand(&workflow.matrix);
    let total_combinations = expanded.len();

    let (selected, filtered): (Vec<_>, Vec<_>) = expanded
        .into_iter()
        .partition(|run| filters.iter().all(|filter| filter.admits(&run.assignment)));

    let (runs, is_distributed) = match (total_runners, runner_index) {
        (Some(total), Some(index)) => {
            if total == 0 {
                bail!("--total-runners must be greater than zero.");
            }
            if index >= total {
                bail!("Runner index must be less than total runners.");
            }
            let distributed = selected
                .into_iter()
                .enumerate()
                .filter(|(i, _)| i % total == index)
                .map(|(_, run)| run)
                .collect();
            (distributed, true)
        }
        (None, None) => (selected, false),
        _ => bail!("Both --total-runners and --runner-index must be provided."),
    };

    Ok(ExecutionPlan {
        runs,
        total_combinations,
        filtered_count: filtered.len(),
        is_distributed,
    })
}
