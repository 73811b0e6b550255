//! # Workflow Initialization Module / 工作流初始化模块
//!
//! Creates a starter `Workflow.toml`, either from defaults or through an
//! interactive wizard that asks for the matrix values.
//!
//! 创建初始的 `Workflow.toml`，可以使用默认值，也可以通过交互式向导询问矩阵取值。
//!
//! ## Features / 功能特性
//!
//! - **Interactive Wizard**: pick operating systems, runtime versions and browser engines
//! - **Overwrite Protection**: confirmation before replacing an existing file
//!
//! - **交互式向导**: 选择操作系统、运行时版本和浏览器引擎
//! - **覆盖保护**: 替换现有文件前进行确认

use anyhow::{Context, Result};
use colored::*;
use dialoguer::{Confirm, Input, MultiSelect, theme::ColorfulTheme};
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::config::Workflow;
use crate::infra::t;

pub const DEFAULT_OS: &[&str] = &["ubuntu-latest", "windows-latest", "macos-latest"];
pub const DEFAULT_PYTHON_VERSIONS: &[&str] = &["3.7", "3.8"];
pub const DEFAULT_BROWSERS: &[&str] = &["chromium", "firefox", "webkit"];

/// Answers collected by the wizard.
#[derive(Debug, Clone)]
pub struct WorkflowTemplate {
    pub name: String,
    pub language: String,
    pub os: Vec<String>,
    pub python_versions: Vec<String>,
    pub browsers: Vec<String>,
    pub lint: bool,
}

impl WorkflowTemplate {
    /// The full matrix: three operating systems, two runtime versions, three engines.
    pub fn full(language: &str) -> Self {
        let owned = |values: &[&str]| values.iter().map(|v| v.to_string()).collect();
        Self {
            name: "tests".to_string(),
            language: language.to_string(),
            os: owned(DEFAULT_OS),
            python_versions: owned(DEFAULT_PYTHON_VERSIONS),
            browsers: owned(DEFAULT_BROWSERS),
            lint: true,
        }
    }

    /// Renders the workflow file.
    pub fn render(&self) -> String {
        let lint = if self.lint {
            format!(
                r#"
[[steps]]
name = "Lint"
run = "pre-commit run --show-diff-on-failure --all-files"
only = {{ os = [{}] }}
"#,
                toml_string(self.os.first().map(String::as_str).unwrap_or("ubuntu-latest"))
            )
        } else {
            String::new()
        };

        format!(
            r#"# Matrix Orchestrator workflow / Matrix Orchestrator 工作流
name = {name}
# Language for console output / 控制台输出语言
language = {language}

[on.push]
branches = ["main", "release-*"]

[on.pull_request]
branches = ["main", "release-*"]

[strategy]
fail_fast = false
timeout_secs = 1800
# Give every run a private copy of the project / 为每个运行提供项目的私有副本
isolate = true

# One run per combination, first dimension varies slowest
# 每个组合一次运行，第一个维度变化最慢
[matrix]
os = {os}
python-version = {versions}
browser = {browsers}

# Downloaded packages are shared by runs with the same lockfile
# 具有相同锁文件的运行共享已下载的包
[cache]
key = "pip"
lockfile = "local-requirements.txt"
path = ".pip-cache"
populate_step = "Download dependencies"

[[steps]]
name = "Download dependencies"
run = "python -m pip download -r local-requirements.txt -d .pip-cache"
setup = true

[[steps]]
name = "Install dependencies"
run = "python -m pip install --find-links .pip-cache -r local-requirements.txt"
setup = true

[[steps]]
name = "Build package"
run = "python -m pip install -e ."
setup = true

[[steps]]
name = "Install browsers"
run = "python -m playwright install --with-deps ${{{{ matrix.browser }}}}"
setup = true
{lint}
[[steps]]
name = "Test"
run = "pytest -vv --browser=${{{{ matrix.browser }}}} --junitxml=junit/test-results.xml"
env = {{ MATRIX_PYTHON = "${{{{ matrix.python-version }}}}" }}

[[artifacts]]
name = "test-results"
path = "junit"
"#,
            name = toml_string(&self.name),
            language = toml_string(&self.language),
            os = toml_array(&self.os),
            versions = toml_array(&self.python_versions),
            browsers = toml_array(&self.browsers),
            lint = lint,
        )
    }
}

fn toml_string(value: &str) -> String {
    toml::Value::String(value.to_string()).to_string()
}

fn toml_array(values: &[String]) -> String {
    let items: Vec<String> = values.iter().map(|v| toml_string(v)).collect();
    format!("[{}]", items.join(", "))
}

/// Executes the init command.
///
/// # Arguments
/// * `output` - Path for the new workflow file
/// * `force` - Overwrite an existing file without asking
/// * `non_interactive` - Write the full default workflow without prompting
/// * `locale` - Language for prompts and for the generated `language` field
pub fn execute(output: PathBuf, force: bool, non_interactive: bool, locale: &str) -> Result<()> {
    let theme = ColorfulTheme::default();

    if !non_interactive {
        println!("\n{}", t!("init.welcome", locale = locale).cyan().bold());
        println!("{}", t!("init.description", locale = locale));
    }

    if output.exists() && !force {
        if non_interactive {
            println!(
                "{}",
                t!("init.file_exists", locale = locale, path = output.display()).red()
            );
            println!("{}", t!("init.use_force", locale = locale).yellow());
            anyhow::bail!(t!("init.file_exists", locale = locale, path = output.display()).to_string());
        }
        let confirmation = Confirm::with_theme(&theme)
            .with_prompt(t!("init.overwrite_prompt", locale = locale, path = output.display()))
            .default(false)
            .interact()
            .context(t!("init.confirmation_failed", locale = locale).to_string())?;
        if !confirmation {
            println!("{}", t!("init.aborted", locale = locale));
            return Ok(());
        }
    }

    let template = if non_interactive {
        WorkflowTemplate::full(locale)
    } else {
        run_wizard(&theme, locale)?
    };

    write_workflow(&output, &template, locale)
}

fn run_wizard(theme: &ColorfulTheme, locale: &str) -> Result<WorkflowTemplate> {
    let mut template = WorkflowTemplate::full(locale);

    template.name = Input::with_theme(theme)
        .with_prompt(t!("init.name_prompt", locale = locale))
        .default(template.name.clone())
        .interact_text()
        .context(t!("init.confirmation_failed", locale = locale).to_string())?;

    template.os = select_values(theme, &t!("init.os_prompt", locale = locale), DEFAULT_OS, locale)?;

    let versions: String = Input::with_theme(theme)
        .with_prompt(t!("init.versions_prompt", locale = locale))
        .default(DEFAULT_PYTHON_VERSIONS.join(","))
        .interact_text()
        .context(t!("init.confirmation_failed", locale = locale).to_string())?;
    template.python_versions = versions
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect();

    template.browsers = select_values(
        theme,
        &t!("init.browsers_prompt", locale = locale),
        DEFAULT_BROWSERS,
        locale,
    )?;

    template.lint = Confirm::with_theme(theme)
        .with_prompt(t!("init.lint_prompt", locale = locale))
        .default(true)
        .interact()
        .context(t!("init.confirmation_failed", locale = locale).to_string())?;

    Ok(template)
}

/// Multi-select over `options`, all checked by default. An empty answer keeps every option.
fn select_values(
    theme: &ColorfulTheme,
    prompt: &str,
    options: &[&str],
    locale: &str,
) -> Result<Vec<String>> {
    let defaults = vec![true; options.len()];
    let selections = MultiSelect::with_theme(theme)
        .with_prompt(prompt)
        .items(options)
        .defaults(&defaults)
        .interact()
        .context(t!("init.confirmation_failed", locale = locale).to_string())?;

    if selections.is_empty() {
        println!("{}", t!("init.nothing_selected", locale = locale).yellow());
        return Ok(options.iter().map(|v| v.to_string()).collect());
    }
    Ok(selections.into_iter().map(|i| options[i].to_string()).collect())
}

/// Validates the rendered workflow, then writes it.
fn write_workflow(path: &Path, template: &WorkflowTemplate, locale: &str) -> Result<()> {
    let content = template.render();
    let workflow = Workflow::from_toml_str(&content)
        .context(t!("init.template_invalid", locale = locale).to_string())?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| {
            t!("init.create_parent_dir_failed", locale = locale, path = parent.display()).to_string()
        })?;
    }
    fs::write(path, content)
        .with_context(|| t!("init.write_failed", locale = locale, path = path.display()).to_string())?;

    println!(
        "{}",
        t!(
            "init.success",
            locale = locale,
            path = path.display(),
            count = workflow.matrix.combination_count()
        )
        .green()
    );
    println!("{}", t!("init.next_steps", locale = locale));
    Ok(())
}
