//! Task data model for the task file.
//!
//! Tasks are the atomic units of work handed to agents. Each task tracks
//! its priority, status, and the identifiers of the tasks it depends on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Task status in its lifecycle.
///
/// Tasks are never deleted; finished work is marked `Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Not started yet.
    #[default]
    Todo,
    /// Picked up by an agent.
    Doing,
    /// Agent reported it cannot proceed.
    Blocked,
    /// Finished.
    Done,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::Doing => "doing",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Done => "done",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "todo" => Ok(TaskStatus::Todo),
            "doing" => Ok(TaskStatus::Doing),
            "blocked" => Ok(TaskStatus::Blocked),
            "done" => Ok(TaskStatus::Done),
            other => Err(crate::Error::Validation(format!(
                "invalid status {:?}, must be one of: todo, doing, blocked, done",
                other
            ))),
        }
    }
}

/// A single task in the task file.
///
/// Only `id`, `priority`, `status` and `depends_on` matter for scheduling.
/// The remaining fields are carried through untouched except when an
/// agent result is applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    /// 1 (highest) through 5 (lowest).
    pub priority: u8,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blockers: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a `todo` task with the given id, title and priority.
    pub fn new(id: &str, title: &str, priority: u8) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            description: None,
            reference: None,
            priority,
            status: TaskStatus::Todo,
            details: None,
            steps: Vec::new(),
            blockers: Vec::new(),
            tags: Vec::new(),
            files: Vec::new(),
            depends_on: Vec::new(),
            created_at: None,
            updated_at: None,
        }
    }

    /// Builder-style setter for the status.
    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    /// Builder-style setter for dependencies.
    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_done(&self) -> bool {
        self.status == TaskStatus::Done
    }

    /// Set the status and stamp `updated_at`.
    pub fn set_status(&mut self, status: TaskStatus) {
        self.status = status;
        self.touch();
    }

    pub fn touch(&mut self) {
        self.updated_at = Some(Utc::now());
    }
}

/// Extract the first contiguous run of ASCII digits as a number.
fn numeric_key(id: &str) -> Option<u64> {
    let start = id.find(|c: char| c.is_ascii_digit())?;
    let digits: &str = &id[start..];
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    // Runs too long for u64 fall back to lexical ordering.
    digits[..end].parse().ok()
}

/// Numeric-aware identifier ordering: "T2" sorts before "T10".
///
/// When both ids contain a digit run they compare by its numeric value,
/// with a lexical tiebreak so "T001" sorts before "T1". Otherwise plain
/// lexical comparison is used.
pub fn compare_ids(a: &str, b: &str) -> Ordering {
    match (numeric_key(a), numeric_key(b)) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        _ => a.cmp(b),
    }
}

/// Returns true if `a` orders strictly before `b`.
pub fn id_before(a: &str, b: &str) -> bool {
    compare_ids(a, b) == Ordering::Less
}

/// Order-preserving union: keeps `existing`, then appends unseen `added`.
pub fn merge_unique(existing: &[String], added: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    existing
        .iter()
        .chain(added.iter())
        .filter(|s| seen.insert(s.as_str()))
        .cloned()
        .collect()
}
