use thiserror::Error;

use crate::orchestration::pool::TaskFailure;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("task {task_id:?} depends on non-existent task {dependency:?}")]
    MissingDependency { task_id: String, dependency: String },

    #[error("dependency cycle detected: {} (forms a loop)", cycle.join(" -> "))]
    DependencyCycle { cycle: Vec<String> },

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Unknown selection strategy: {0}")]
    UnknownStrategy(String),

    #[error("Agent not available: {0}")]
    AgentNotAvailable(String),

    #[error("Agent {agent} failed: {message}")]
    AgentFailed { agent: String, message: String },

    #[error("Agent did not produce a summary")]
    SummaryMissing,

    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Prompt error: {0}")]
    Prompt(String),

    #[error("all {agents} agents failed: {}", causes.join("; "))]
    ConsensusFailed { agents: usize, causes: Vec<String> },

    #[error("{} task(s) failed: {}", failures.len(), format_failures(failures))]
    BatchFailed { failures: Vec<TaskFailure> },

    #[error("task failed (fail_fast=true): {cause}; {not_run} task(s) did not run")]
    FailFast { cause: TaskFailure, not_run: usize },

    #[error("Task join error: {0}")]
    TaskJoin(String),
}

fn format_failures(failures: &[TaskFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::TaskJoin(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
