//! Agent capability and its subprocess backends.
//!
//! The scheduler only sees [`Agent`]: hand it a prompt and a cancellation
//! token, get back the structured [`AgentSummary`] the agent printed. How
//! the agent is launched lives in the backends below.

pub mod claude;
pub mod codex;
pub mod command;
pub mod parse;

pub use claude::ClaudeAgent;
pub use codex::CodexAgent;
pub use command::CommandAgent;

use crate::core::TaskStatus;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Terminal status an agent reports for one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Done,
    Blocked,
    Skipped,
}

impl ResultStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultStatus::Done => "done",
            ResultStatus::Blocked => "blocked",
            ResultStatus::Skipped => "skipped",
        }
    }

    /// Task status this result moves the task to. `Skipped` leaves the
    /// task alone.
    pub fn task_status(&self) -> Option<TaskStatus> {
        match self {
            ResultStatus::Done => Some(TaskStatus::Done),
            ResultStatus::Blocked => Some(TaskStatus::Blocked),
            ResultStatus::Skipped => None,
        }
    }
}

impl std::fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured result an agent prints at the end of its run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSummary {
    /// Task the agent worked on. May be absent when the agent did nothing.
    #[serde(default)]
    pub task_id: Option<String>,
    pub status: ResultStatus,
    #[serde(default)]
    pub summary: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blockers: Vec<String>,
}

impl AgentSummary {
    pub fn new(task_id: &str, status: ResultStatus) -> Self {
        Self {
            task_id: Some(task_id.to_string()),
            status,
            summary: String::new(),
            files: Vec::new(),
            blockers: Vec::new(),
        }
    }

    pub fn with_summary(mut self, summary: &str) -> Self {
        self.summary = summary.to_string();
        self
    }

    pub fn with_files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.files = files.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_blockers<I, S>(mut self, blockers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.blockers = blockers.into_iter().map(Into::into).collect();
        self
    }

    /// True when the summary names a task other than `task_id`.
    pub fn is_for_other_task(&self, task_id: &str) -> bool {
        matches!(&self.task_id, Some(id) if !id.is_empty() && id != task_id)
    }
}

/// An external worker that executes one prompt and reports a summary.
///
/// Implementations must return promptly with [`crate::Error::Cancelled`]
/// once `cancel` fires.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Agent type name, e.g. `claude`.
    fn name(&self) -> &str;

    async fn run(&self, cancel: &CancellationToken, prompt: &str) -> Result<AgentSummary>;
}
