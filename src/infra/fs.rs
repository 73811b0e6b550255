//! # File System Operations Module / 文件系统操作模块
//!
//! This module provides utilities for file system operations: private run
//! workspaces, per-run output directories and artifact copies.
//!
//! 此模块提供文件系统操作的实用功能：私有运行工作区、每次运行的输出目录以及产物复制。

use anyhow::{Context, Result};
use fs_extra::dir::CopyOptions;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Replaces every character that is unsafe in a path component with `_`.
pub fn sanitize_component(value: &str) -> String {
    let sanitized: String = value
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if sanitized.is_empty() {
        "_".to_string()
    } else {
        sanitized
    }
}

/// Creates a fresh directory for a run's outputs, removing leftovers of a
/// previous invocation.
pub fn create_run_dir(output_root: &Path, run_id: &str) -> Result<PathBuf> {
    let run_dir = output_root.join("runs").join(run_id);

    if run_dir.exists() {
        fs::remove_dir_all(&run_dir).with_context(|| {
            format!(
                "Failed to clean up old run directory: {}",
                run_dir.display()
            )
        })?;
    }
    fs::create_dir_all(&run_dir)
        .with_context(|| format!("Failed to create run directory: {}", run_dir.display()))?;
    Ok(run_dir)
}

/// Copies the project into a private temporary workspace for one run.
/// Top-level entries listed in `exclude` (output and cache directories) are skipped.
///
/// 将项目复制到单次运行专用的临时工作区。`exclude` 中列出的顶层条目（输出和缓存目录）会被跳过。
pub fn prepare_isolated_workspace(project_root: &Path, exclude: &[PathBuf]) -> Result<TempDir> {
    let workspace = tempfile::Builder::new()
        .prefix("matrix_orchestrator_")
        .tempdir()
        .context("Failed to create temporary run workspace")?;

    let entries: Vec<PathBuf> = fs::read_dir(project_root)
        .with_context(|| format!("Failed to read project directory: {}", project_root.display()))?
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| !exclude.iter().any(|excluded| excluded == path))
        .collect();

    if !entries.is_empty() {
        let mut options = CopyOptions::new();
        options.overwrite = true;
        fs_extra::copy_items(&entries, workspace.path(), &options).with_context(|| {
            format!(
                "Failed to copy {} into {}",
                project_root.display(),
                workspace.path().display()
            )
        })?;
    }
    Ok(workspace)
}

/// Copies the content of `from` into `to`, creating `to` if needed.
pub fn copy_dir_contents(from: &Path, to: &Path) -> Result<()> {
    fs::create_dir_all(to).with_context(|| format!("Failed to create {}", to.display()))?;
    let mut options = CopyOptions::new();
    options.overwrite = true;
    options.content_only = true;
    fs_extra::dir::copy(from, to, &options)
        .with_context(|| format!("Failed to copy {} to {}", from.display(), to.display()))?;
    Ok(())
}

/// Copies an artifact (file or directory) into `dest_dir`.
///
/// # Returns
/// The path of the preserved copy, or `None` if `source` does not exist.
pub fn copy_artifact(source: &Path, dest_dir: &Path) -> Result<Option<PathBuf>> {
    if !source.exists() {
        return Ok(None);
    }
    if dest_dir.exists() {
        fs::remove_dir_all(dest_dir)
            .with_context(|| format!("Failed to clean up {}", dest_dir.display()))?;
    }
    fs::create_dir_all(dest_dir)
        .with_context(|| format!("Failed to create {}", dest_dir.display()))?;

    if source.is_dir() {
        copy_dir_contents(source, dest_dir)?;
        return Ok(Some(dest_dir.to_path_buf()));
    }

    let file_name = source
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("artifact"));
    let dest = dest_dir.join(file_name);
    fs::copy(source, &dest).with_context(|| {
        format!("Failed to copy {} to {}", source.display(), dest.display())
    })?;
    Ok(Some(dest))
}

/// Gets the absolute path from a potentially relative path.
///
/// # Arguments
/// * `path` - Path to canonicalize
///
/// # Returns
/// Canonicalized absolute path, or an error if the path doesn't exist
pub fn absolute_path(path: &Path) -> Result<PathBuf> {
    fs::canonicalize(path).with_context(|| format!("Failed to resolve path: {}", path.display()))
}

/// Resolves `path` against `base` without requiring it to exist.
pub fn resolve_against(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
