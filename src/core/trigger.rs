//! # Trigger Module / 触发器模块
//!
//! Decides whether a workflow should run for an incoming event
//! (a push to a branch, or a pull request targeting a branch).
//!
//! 判断工作流是否应针对传入事件（推送到分支，或以某分支为目标的拉取请求）运行。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The kind of event that may trigger a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Push,
    PullRequest,
}

#[derive(Debug, Error)]
#[error("unknown event '{0}', expected 'push' or 'pull_request'")]
pub struct UnknownEvent(String);

impl FromStr for EventKind {
    type Err = UnknownEvent;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "push" => Ok(EventKind::Push),
            "pull_request" | "pull-request" => Ok(EventKind::PullRequest),
            other => Err(UnknownEvent(other.to_string())),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Push => f.write_str("push"),
            EventKind::PullRequest => f.write_str("pull_request"),
        }
    }
}

/// An incoming event: its kind and the branch it pushes to or targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerEvent {
    pub kind: EventKind,
    pub branch: String,
}

/// Branch restriction for one event kind. An empty list admits every branch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BranchFilter {
    #[serde(default)]
    pub branches: Vec<String>,
}

impl BranchFilter {
    pub fn admits(&self, branch: &str) -> bool {
        self.branches.is_empty()
            || self
                .branches
                .iter()
                .any(|pattern| branch_matches(pattern, branch))
    }
}

/// The `[on]` table of a workflow.
/// 工作流的 `[on]` 表。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push: Option<BranchFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_request: Option<BranchFilter>,
}

impl Trigger {
    /// Returns `true` if the event kind is declared and its branch filter admits the branch.
    pub fn matches(&self, event: &TriggerEvent) -> bool {
        let filter = match event.kind {
            EventKind::Push => self.push.as_ref(),
            EventKind::PullRequest => self.pull_request.as_ref(),
        };
        filter.is_some_and(|filter| filter.admits(&event.branch))
    }
}

/// `*` matches anything, a trailing `*` matches a prefix, otherwise exact.
fn branch_matches(pattern: &str, branch: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => branch.starts_with(prefix),
        None => pattern == branch,
    }
}
