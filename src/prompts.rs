//! Iteration prompt rendering.
//!
//! Each task attempt gets a prompt rendered from a Handlebars template.
//! Projects can override the bundled template by placing `iteration.hbs`
//! in their prompt directory.

use crate::core::{Task, TaskStatus};
use crate::error::{Error, Result};
use chrono::{SecondsFormat, Utc};
use handlebars::Handlebars;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const ITERATION_TEMPLATE_FILE: &str = "iteration.hbs";

const ITERATION_TEMPLATE: &str = "iteration";

const DEFAULT_ITERATION_TEMPLATE: &str = r#"You are working through the task list in {{todo_path}} (working directory: {{work_dir}}).

Your task for iteration {{iteration}} is {{task.id}}: {{task.title}} (currently {{task.status}}).

Work only on this task. When you are finished, print exactly one JSON object on its own line:

{"task_id": "{{task.id}}", "status": "done" | "blocked" | "skipped", "summary": "...", "files": ["..."], "blockers": ["..."]}

Use "blocked" with a list of blockers if you cannot proceed. Current time: {{now}}.
"#;

/// The subset of a task exposed to templates.
#[derive(Debug, Clone, Serialize)]
pub struct TaskRef {
    pub id: String,
    pub title: String,
    pub status: TaskStatus,
}

impl From<&Task> for TaskRef {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id.clone(),
            title: task.title.clone(),
            status: task.status,
        }
    }
}

/// Values available to prompt templates.
#[derive(Debug, Clone, Serialize)]
pub struct PromptData {
    pub todo_path: PathBuf,
    pub work_dir: PathBuf,
    pub task: TaskRef,
    pub iteration: u32,
    /// Agent type the prompt is rendered for.
    pub agent: String,
    /// RFC 3339 UTC timestamp.
    pub now: String,
}

impl PromptData {
    pub fn new(todo_path: &Path, work_dir: &Path, task: &Task, iteration: u32, agent: &str) -> Self {
        Self {
            todo_path: todo_path.to_path_buf(),
            work_dir: work_dir.to_path_buf(),
            task: TaskRef::from(task),
            iteration,
            agent: agent.to_string(),
            now: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

/// Turns prompt data into prompt text.
pub trait PromptRenderer: Send + Sync {
    fn render(&self, data: &PromptData) -> Result<String>;
}

/// Handlebars renderer in strict mode: a template referencing a missing
/// value is an error rather than an empty string.
pub struct TemplateRenderer {
    handlebars: Handlebars<'static>,
}

impl TemplateRenderer {
    /// Load `iteration.hbs` from `prompt_dir`, falling back to the bundled
    /// template when the file does not exist.
    pub fn load(prompt_dir: &Path) -> Result<Self> {
        let path = prompt_dir.join(ITERATION_TEMPLATE_FILE);
        if path.exists() {
            debug!(path = %path.display(), "loading iteration template");
            Self::from_template(&std::fs::read_to_string(&path)?)
        } else {
            Self::bundled()
        }
    }

    pub fn bundled() -> Result<Self> {
        Self::from_template(DEFAULT_ITERATION_TEMPLATE)
    }

    pub fn from_template(template: &str) -> Result<Self> {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(true);
        // Prompts are plain text.
        handlebars.register_escape_fn(handlebars::no_escape);
        handlebars
            .register_template_string(ITERATION_TEMPLATE, template)
            .map_err(|e| Error::Prompt(format!("invalid template: {}", e)))?;
        Ok(Self { handlebars })
    }
}

impl PromptRenderer for TemplateRenderer {
    fn render(&self, data: &PromptData) -> Result<String> {
        self.handlebars
            .render(ITERATION_TEMPLATE, data)
            .map_err(|e| Error::Prompt(e.to_string()))
    }
}

impl std::fmt::Debug for TemplateRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateRenderer").finish_non_exhaustive()
    }
}
