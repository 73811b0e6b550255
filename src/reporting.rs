//! # Reporting Module / 报告模块
//!
//! This module handles live progress output and the final reports: a colorful
//! console summary with internationalization support and a styled HTML file.
//!
//! 此模块处理实时进度输出和最终报告：支持国际化的彩色控制台摘要以及样式化的 HTML 文件。

pub mod console;
pub mod html;

// Re-export common reporting functions
pub use console::{print_failure_details, print_plan, print_summary, spawn_progress_printer};
pub use html::generate_html_report;
