//! # Matrix Orchestrator Library / Matrix Orchestrator 库
//!
//! This library provides the core functionality for the Matrix Orchestrator tool,
//! a configuration-driven build-matrix runner: it expands a job matrix into its
//! cross product, executes an ordered step list for every combination, and
//! aggregates the per-combination results.
//!
//! 此库为 Matrix Orchestrator 工具提供核心功能，
//! 这是一个配置驱动的构建矩阵运行器：它将作业矩阵展开为笛卡尔积，
//! 为每个组合执行有序的步骤列表，并汇总每个组合的结果。
//!
//! ## Modules / 模块
//!
//! - `core` - Workflow configuration, data models, planning and run execution
//! - `infra` - Infrastructure services like command execution and file system operations
//! - `reporting` - Progress output and result reports
//! - `cli` - Command-line interface and commands
//!
//! - `core` - 工作流配置、数据模型、计划和运行执行
//! - `infra` - 基础设施服务，如命令执行和文件系统操作
//! - `reporting` - 进度输出和结果报告
//! - `cli` - 命令行接口和命令

pub mod cli;
pub mod core;
pub mod infra;
pub mod reporting;

// Re-export commonly used items
pub use crate::core::config;
pub use crate::core::execution;
pub use crate::core::models;
pub use crate::core::planner;

/// Initializes the application's internationalization (i18n) based on the system locale.
///
/// This function detects the user's system locale and sets the appropriate
/// language for the application's user interface. It attempts to match the full
/// locale (e.g., "zh-CN"), then just the language code (e.g., "en"), and
/// finally falls back to the default language ("en").
pub fn init() {
    rust_i18n::set_locale(&resolve_locale(
        &sys_locale::get_locale().unwrap_or_else(|| "en".to_string()),
    ));
}

/// Maps a requested locale onto one that has translations.
pub fn resolve_locale(requested: &str) -> String {
    let available_locales = rust_i18n::available_locales!();

    // Try the full locale first (e.g., "zh-CN"), then the language part only
    // (e.g., "en" from "en-US"), finally fall back to "en".
    if available_locales.contains(&requested) {
        return requested.to_string();
    }
    requested
        .split(['-', '_'])
        .next()
        .and_then(|lang_code| {
            available_locales
                .iter()
                .find(|available| {
                    available
                        .split('-')
                        .next()
                        .is_some_and(|lang| lang.eq_ignore_ascii_case(lang_code))
                })
                .map(|available| available.to_string())
        })
        .unwrap_or_else(|| "en".to_string())
}

// Initialize i18n
rust_i18n::i18n!("locales", fallback = "en");
