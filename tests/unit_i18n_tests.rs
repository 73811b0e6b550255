//! # I18n Unit Tests / I18n 单元测试
//!
//! Locale resolution and localized report labels.
//!
//! 语言环境解析和本地化报告标签。

use matrix_orchestrator::models::{RunFailure, RunStatus};
use matrix_orchestrator::reporting::console::status_label;
use matrix_orchestrator::resolve_locale;

#[cfg(test)]
mod locale_resolution_tests {
    use super::*;

    #[test]
    fn test_exact_locale_is_kept() {
        assert_eq!(resolve_locale("en"), "en");
        assert_eq!(resolve_locale("zh-CN"), "zh-CN");
    }

    #[test]
    fn test_language_part_is_matched() {
        assert_eq!(resolve_locale("en-US"), "en");
        assert_eq!(resolve_locale("zh_CN"), "zh-CN");
        assert_eq!(resolve_locale("zh"), "zh-CN");
    }

    #[test]
    fn test_unknown_locale_falls_back_to_english() {
        assert_eq!(resolve_locale("invalid-lang"), "en");
        assert_eq!(resolve_locale(""), "en");
    }
}

#[cfg(test)]
mod label_tests {
    use super::*;

    #[test]
    fn test_status_labels_in_english() {
        assert_eq!(status_label(RunStatus::Succeeded, None, "en"), "Succeeded");
        assert_eq!(
            status_label(RunStatus::Failed, Some(&RunFailure::Timeout { limit_secs: 5 }), "en"),
            "Timed out"
        );
        assert_eq!(
            status_label(RunStatus::Failed, Some(&RunFailure::Cancelled), "en"),
            "Cancelled"
        );
    }

    #[test]
    fn test_status_labels_in_chinese() {
        assert_eq!(status_label(RunStatus::Succeeded, None, "zh-CN"), "成功");
        assert_eq!(
            status_label(
                RunStatus::Failed,
                Some(&RunFailure::Step {
                    step: "Test".to_string(),
                    exit_code: Some(1)
                }),
                "zh-CN"
            ),
            "失败"
        );
    }
}
