//! # Command Execution Module / 命令执行模块
//!
//! Builds the external processes behind steps and captures their output.
//!
//! 构建步骤背后的外部进程并捕获其输出。

use anyhow::{Result, anyhow};
use indexmap::IndexMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

/// Everything needed to launch one step's process.
#[derive(Debug, Clone)]
pub struct CommandSpec<'a> {
    /// The rendered command line.
    pub command_line: &'a str,
    /// Run through this shell instead of executing directly.
    pub shell: Option<&'a str>,
    pub working_dir: &'a Path,
    /// Variables added to the inherited environment.
    pub env: &'a IndexMap<String, String>,
    /// Variables removed from the inherited environment.
    pub env_remove: &'a [String],
}

const POWERSHELL_ARGS: &[&str] = &["-NoProfile", "-Command"];
const CMD_ARGS: &[&str] = &["/C"];
const POSIX_ARGS: &[&str] = &["-c"];

/// Arguments used to hand a command string to a shell.
/// 将命令字符串交给 shell 时使用的参数。
fn shell_args(shell: &str) -> &'static [&'static str] {
    let program = Path::new(shell)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(shell);
    match program {
        "pwsh" | "powershell" => POWERSHELL_ARGS,
        "cmd" => CMD_ARGS,
        _ => POSIX_ARGS,
    }
}

/// Builds the `tokio::process::Command` for a step.
///
/// Without a shell the command line is expanded (`~` and `$VAR`, with step
/// variables taking precedence over the process environment; unknown and
/// removed variables are left as written) and split with POSIX shell-word rules.
///
/// 不使用 shell 时，命令行会被展开（`~` 和 `$VAR`，步骤变量优先于进程环境；
/// 未知变量和被移除的变量保持原样），并按照 POSIX shell 词法规则拆分。
pub fn build_command(invocation: &CommandSpec<'_>) -> Result<tokio::process::Command> {
    let mut cmd = match invocation.shell {
        Some(shell) => {
            let mut cmd = tokio::process::Command::new(shell);
            cmd.args(shell_args(shell)).arg(invocation.command_line);
            cmd
        }
        None => {
            let expanded = shellexpand::full_with_context_no_errors(
                invocation.command_line,
                || std::env::var("HOME").ok(),
                |name: &str| {
                    if let Some(value) = invocation.env.get(name) {
                        return Some(value.clone());
                    }
                    // Removed variables never reach the child, not even through argv.
                    if invocation.env_remove.iter().any(|removed| removed == name) {
                        return None;
                    }
                    std::env::var(name).ok()
                },
            )
            .to_string();

            let parts = shlex::split(&expanded)
                .ok_or_else(|| anyhow!("Failed to parse command: {}", expanded))?;
            let (program, args) = parts
                .split_first()
                .ok_or_else(|| anyhow!("Empty command after parsing."))?;
            let mut cmd = tokio::process::Command::new(program);
            cmd.args(args);
            cmd
        }
    };

    for name in invocation.env_remove {
        cmd.env_remove(name);
    }
    cmd.envs(invocation.env)
        .current_dir(invocation.working_dir)
        .stdin(Stdio::null())
        .kill_on_drop(true);
    Ok(cmd)
}

/// Spawns a command, captures its stdout and stderr.
/// The output streams are read concurrently and combined into a single string.
///
/// # Arguments
/// * `cmd` - The `tokio::process::Command` to execute.
///
/// # Returns
/// A tuple containing:
/// - The `ExitStatus` of the process wrapped in an `io::Result`.
/// - The combined stdout and stderr as a `String`.
///
/// 派生一个命令，捕获其 stdout 和 stderr。
/// 输出流被并发读取并合并到一个字符串中。
pub async fn spawn_and_capture(
    mut cmd: tokio::process::Command,
) -> (std::io::Result<std::process::ExitStatus>, String) {
    // Configure the command to capture stdout and stderr.
    // 配置命令以捕获 stdout 和 stderr。
    let mut child = match cmd.stdout(Stdio::piped()).stderr(Stdio::piped()).spawn() {
        Ok(child) => child,
        Err(e) => return (Err(e), String::new()),
    };

    let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
        return (
            Err(std::io::Error::other("Failed to capture process output")),
            String::new(),
        );
    };

    // Both readers append to one buffer so the interleaving roughly follows the process.
    // 两个读取任务写入同一个缓冲区，使交错顺序大致与进程输出一致。
    let output = Arc::new(tokio::sync::Mutex::new(String::new()));

    let stdout_output = Arc::clone(&output);
    let stdout_handle = tokio::spawn(async move {
        let mut lines = BufReader::new(stdout).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let mut output = stdout_output.lock().await;
            output.push_str(&line);
            output.push('\n');
        }
    });

    let stderr_output = Arc::clone(&output);
    let stderr_handle = tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let mut output = stderr_output.lock().await;
            output.push_str(&line);
            output.push('\n');
        }
    });

    // Wait for the process to exit.
    // 等待进程退出。
    let status = child.wait().await;

    // Wait for the readers so no trailing output is lost.
    // 等待读取任务完成，以免丢失末尾的输出。
    if let Err(e) = stdout_handle.await {
        warn!(error = %e, "failed to join stdout reader");
    }
    if let Err(e) = stderr_handle.await {
        warn!(error = %e, "failed to join stderr reader");
    }

    let captured = output.lock().await.clone();
    (status, captured)
}
