//! # Dependency Cache Module / 依赖缓存模块
//!
//! A directory-backed store keyed by a content hash of a dependency lock file.
//! Entries are read-shared and written once per key: a populated directory is
//! staged next to the store and renamed into place, and an entry that already
//! exists is never overwritten.
//!
//! 以依赖锁文件内容哈希为键、基于目录的存储。条目可共享读取，每个键只写入一次：
//! 填充好的目录先暂存在存储旁边，再重命名到位，已存在的条目永远不会被覆盖。

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::infra::fs::{copy_dir_contents, sanitize_component};

/// Number of hex characters of the lockfile digest appended to the key.
const DIGEST_PREFIX_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derives `<prefix>-<sha256(lockfile)[..16]>`.
    pub fn derive(prefix: &str, lockfile: &Path) -> Result<Self> {
        let content = fs::read(lockfile)
            .with_context(|| format!("Failed to read cache lockfile {}", lockfile.display()))?;
        Ok(Self::from_content(prefix, &content))
    }

    pub fn from_content(prefix: &str, content: &[u8]) -> Self {
        let digest = format!("{:x}", Sha256::digest(content));
        Self(format!(
            "{}-{}",
            sanitize_component(prefix),
            &digest[..DIGEST_PREFIX_LEN]
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Result of [`CacheStore::get_or_populate`].
#[derive(Debug)]
pub enum CacheOutcome<T> {
    /// The key was present and its blob was restored; `populate` was not called.
    Hit,
    /// `populate` succeeded and its output is now stored under the key.
    Populated(T),
    /// `populate` ran but nothing was stored (it failed, or storing failed).
    NotStored(T),
}

#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.root.join(key.as_str())
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entry_path(key).is_dir()
    }

    /// Copies the entry for `key` into `target`. Returns `false` on a miss.
    pub fn restore(&self, key: &CacheKey, target: &Path) -> Result<bool> {
        let entry = self.entry_path(key);
        if !entry.is_dir() {
            return Ok(false);
        }
        copy_dir_contents(&entry, target).with_context(|| {
            format!(
                "Failed to restore cache entry {} into {}",
                key.as_str(),
                target.display()
            )
        })?;
        Ok(true)
    }

    /// Stores `source` under `key` unless an entry already exists.
    /// Returns `true` if this call created the entry.
    pub fn store(&self, key: &CacheKey, source: &Path) -> Result<bool> {
        let entry = self.entry_path(key);
        if entry.exists() {
            return Ok(false);
        }
        fs::create_dir_all(&self.root)
            .with_context(|| format!("Failed to create cache store {}", self.root.display()))?;

        let staging = tempfile::Builder::new()
            .prefix(".staging_")
            .tempdir_in(&self.root)
            .context("Failed to create cache staging directory")?;
        if source.is_dir() {
            copy_dir_contents(source, staging.path())?;
        }

        let staged = staging.keep();
        match fs::rename(&staged, &entry) {
            Ok(()) => Ok(true),
            Err(_) if entry.exists() => {
                // Another writer created the entry first; keep theirs.
                let _ = fs::remove_dir_all(&staged);
                Ok(false)
            }
            Err(e) => {
                let _ = fs::remove_dir_all(&staged);
                Err(e).with_context(|| format!("Failed to commit cache entry {}", key.as_str()))
            }
        }
    }

    /// Get-or-populate: on a hit the blob is restored into `dir` and `populate`
    /// is never called; on a miss `populate` runs and, if it reports success,
    /// `dir` is stored under `key`.
    ///
    /// 获取或填充：命中时将数据恢复到 `dir` 且不会调用 `populate`；
    /// 未命中时运行 `populate`，若其报告成功，则将 `dir` 存储到 `key` 之下。
    ///
    /// # Errors
    /// Only a failed restore is an error. Storing problems are logged and
    /// reported as [`CacheOutcome::NotStored`].
    pub async fn get_or_populate<T, F, Fut>(
        &self,
        key: &CacheKey,
        dir: &Path,
        populate: F,
    ) -> Result<CacheOutcome<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = (bool, T)>,
    {
        if self.restore(key, dir)? {
            info!(key = key.as_str(), "cache hit");
            return Ok(CacheOutcome::Hit);
        }

        debug!(key = key.as_str(), "cache miss, populating");
        let (succeeded, value) = populate().await;
        if !succeeded {
            return Ok(CacheOutcome::NotStored(value));
        }

        match self.store(key, dir) {
            Ok(created) => {
                debug!(key = key.as_str(), created, "cache entry committed");
                Ok(CacheOutcome::Populated(value))
            }
            Err(e) => {
                warn!(key = key.as_str(), error = %e, "failed to store cache entry");
                Ok(CacheOutcome::NotStored(value))
            }
        }
    }
}
