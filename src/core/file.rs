//! The task file: an ordered task list plus schema metadata.
//!
//! `TaskFile` is the in-memory task store. It owns dependency
//! satisfaction, deterministic single-task selection, and status
//! transitions. Only the coordinating scheduler mutates it.

use crate::core::dag::DependencyGraph;
use crate::core::task::{compare_ids, Task, TaskStatus};
use crate::error::{Error, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::debug;

/// The only schema version this crate reads and writes.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Project {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskFile {
    pub schema_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<Project>,
    #[serde(default)]
    pub source_files: Vec<String>,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

impl Default for TaskFile {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            project: None,
            source_files: Vec::new(),
            tasks: Vec::new(),
        }
    }
}

/// A single structural problem found by [`TaskFile::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// Location such as `tasks[2].priority`.
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }

    fn push(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.issues.push(ValidationIssue {
            path: path.into(),
            message: message.into(),
        });
    }

    /// Convert into an error listing every issue.
    pub fn into_result(self) -> Result<()> {
        if self.is_valid() {
            return Ok(());
        }
        let joined = self
            .issues
            .iter()
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        Err(Error::Validation(joined))
    }
}

impl TaskFile {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self {
            tasks,
            ..Self::default()
        }
    }

    /// Read and parse a task file.
    pub fn load(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "loading task file");
        let data = fs::read_to_string(path)?;
        let file: Self = serde_json::from_str(&data)?;
        debug!(tasks = file.tasks.len(), "task file loaded");
        Ok(file)
    }

    /// Write the task file with 2-space indentation and a trailing newline.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut data = serde_json::to_string_pretty(self)?;
        data.push('\n');
        fs::write(path, data)?;
        debug!(path = %path.display(), tasks = self.tasks.len(), "task file saved");
        Ok(())
    }

    /// Structural checks: schema version, required fields, priority range,
    /// and unique ids. Every problem is reported, not just the first.
    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::default();

        if self.schema_version != SCHEMA_VERSION {
            report.push(
                "schema_version",
                format!("expected {}, got {}", SCHEMA_VERSION, self.schema_version),
            );
        }

        let mut seen = HashSet::new();
        for (i, task) in self.tasks.iter().enumerate() {
            let path = format!("tasks[{}]", i);
            if task.id.trim().is_empty() {
                report.push(format!("{}.id", path), "missing required field");
            } else if !seen.insert(task.id.as_str()) {
                report.push(format!("{}.id", path), format!("duplicate id {:?}", task.id));
            }
            if task.title.trim().is_empty() {
                report.push(format!("{}.title", path), "missing required field");
            }
            if !(1..=5).contains(&task.priority) {
                report.push(
                    format!("{}.priority", path),
                    format!("must be between 1 and 5, got {}", task.priority),
                );
            }
        }

        report
    }

    pub fn get_task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn get_task_mut(&mut self, id: &str) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    /// First task in file order with the given status.
    pub fn find_task_by_status(&self, status: TaskStatus) -> Option<&Task> {
        self.tasks.iter().find(|t| t.status == status)
    }

    /// Update a task's status and stamp `updated_at`.
    pub fn set_task_status(&mut self, id: &str, status: TaskStatus) -> Result<()> {
        let task = self
            .get_task_mut(id)
            .ok_or_else(|| Error::TaskNotFound(id.to_string()))?;
        task.set_status(status);
        Ok(())
    }

    /// Append a task, stamping `created_at` if unset and `updated_at`.
    pub fn add_task(&mut self, mut task: Task) {
        let now = Utc::now();
        task.created_at.get_or_insert(now);
        task.updated_at = Some(now);
        self.tasks.push(task);
    }

    /// Mutate a task in place and stamp `updated_at`.
    pub fn update_task<F>(&mut self, id: &str, update: F) -> Result<()>
    where
        F: FnOnce(&mut Task),
    {
        let task = self
            .get_task_mut(id)
            .ok_or_else(|| Error::TaskNotFound(id.to_string()))?;
        update(task);
        task.touch();
        Ok(())
    }

    /// All dependencies resolve to `done` tasks. A missing dependency is
    /// never satisfied.
    pub fn dependencies_satisfied(&self, task: &Task) -> bool {
        task.depends_on.iter().all(|dep| {
            self.get_task(dep)
                .map(|d| d.status == TaskStatus::Done)
                .unwrap_or(false)
        })
    }

    /// Pick the next task to work on.
    ///
    /// Precedence, with dependency gating at every tier:
    /// 1. a `doing` task, lowest id
    /// 2. a `todo` task, lowest priority value then lowest id
    /// 3. a `blocked` task, same rule
    ///
    /// Returns `None` when nothing is eligible.
    pub fn select_task(&self) -> Option<&Task> {
        let eligible = |status: TaskStatus| {
            self.tasks
                .iter()
                .filter(move |t| t.status == status && self.dependencies_satisfied(t))
        };

        if let Some(task) = eligible(TaskStatus::Doing).min_by(|a, b| compare_ids(&a.id, &b.id)) {
            return Some(task);
        }

        [TaskStatus::Todo, TaskStatus::Blocked]
            .into_iter()
            .find_map(|status| eligible(status).min_by(by_priority_then_id))
    }

    /// Validate that every dependency exists and that there are no cycles.
    pub fn validate_dependencies(&self) -> Result<()> {
        DependencyGraph::build(self).validate()
    }

    pub fn count_by_status(&self, status: TaskStatus) -> usize {
        self.tasks.iter().filter(|t| t.status == status).count()
    }

    pub fn all_done(&self) -> bool {
        self.tasks.iter().all(Task::is_done)
    }
}

/// Ascending priority value, ties broken by numeric-aware id.
pub(crate) fn by_priority_then_id(a: &&Task, b: &&Task) -> Ordering {
    a.priority
        .cmp(&b.priority)
        .then_with(|| compare_ids(&a.id, &b.id))
}
