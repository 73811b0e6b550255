//! # Core Module / 核心模块
//!
//! This module contains the core functionality of the orchestrator:
//! the workflow configuration, data models, matrix planning, run execution,
//! the dependency cache, secrets and triggers.
//!
//! 此模块包含编排器的核心功能：
//! 工作流配置、数据模型、矩阵计划、运行执行、依赖缓存、密钥和触发器。

pub mod cache;
pub mod config;
pub mod execution;
pub mod models;
pub mod orchestrator;
pub mod planner;
pub mod secrets;
pub mod trigger;

// Re-exports
pub use config::Workflow;
pub use execution::execute;
pub use models::{JobRun, RunSummary};
pub use orchestrator::Orchestrator;
pub use planner::expand;
