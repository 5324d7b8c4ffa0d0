//! Test fixtures for integration tests.
//!
//! Provides helpers for:
//! - Temporary project directories holding a task file
//! - Mock agents keyed by task id
//! - Predefined task sets

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use looper::agent::{Agent, AgentSummary, ResultStatus};
use looper::core::{Task, TaskFile};
use looper::orchestration::{
    Scheduler, SchedulerEvent, SchedulerSettings, StrategyRegistry, TaskExecutor,
};
use looper::prompts::TemplateRenderer;
use looper::{Error, Result};

/// Template that makes the prompt equal to the task id, so mock agents can
/// key their behavior on it.
pub const TASK_ID_TEMPLATE: &str = "{{task.id}}";

/// A temporary project directory with a task file in it.
pub struct TestProject {
    /// Keeps the directory alive for the test's duration.
    pub temp_dir: TempDir,
    pub todo_path: PathBuf,
}

impl TestProject {
    /// Create a project and save `tasks` as its task file.
    pub fn new(tasks: Vec<Task>) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let todo_path = temp_dir.path().join("to-do.json");
        TaskFile::new(tasks)
            .save(&todo_path)
            .expect("Failed to write task file");
        Self {
            temp_dir,
            todo_path,
        }
    }

    pub fn load(&self) -> TaskFile {
        TaskFile::load(&self.todo_path).expect("Failed to load task file")
    }

    pub fn raw(&self) -> String {
        std::fs::read_to_string(&self.todo_path).expect("Failed to read task file")
    }
}

/// What the mock agent does for one task id.
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Report this status with the given summary text.
    Report(ResultStatus, &'static str),
    /// Report a summary that names a different task.
    ReportFor(&'static str, ResultStatus),
    /// Fail without a summary.
    Fail,
    /// Wait until cancelled.
    Hang,
}

/// In-process agent whose result depends on the task id in the prompt.
///
/// Tracks how many runs overlap so tests can check concurrency limits.
pub struct MockAgent {
    behaviors: HashMap<String, Behavior>,
    files: HashMap<String, Vec<String>>,
    delay: Duration,
    running: AtomicUsize,
    pub max_running: AtomicUsize,
    pub calls: Mutex<Vec<String>>,
}

impl MockAgent {
    pub fn new() -> Self {
        Self {
            behaviors: HashMap::new(),
            files: HashMap::new(),
            delay: Duration::ZERO,
            running: AtomicUsize::new(0),
            max_running: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Every listed task reports `done`.
    pub fn all_done<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ids.into_iter().fold(Self::new(), |agent, id| {
            agent.on(id, Behavior::Report(ResultStatus::Done, "implemented"))
        })
    }

    pub fn on(mut self, id: impl Into<String>, behavior: Behavior) -> Self {
        self.behaviors.insert(id.into(), behavior);
        self
    }

    pub fn with_files(mut self, id: impl Into<String>, files: &[&str]) -> Self {
        self.files
            .insert(id.into(), files.iter().map(|f| f.to_string()).collect());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn call_count(&self, id: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.as_str() == id).count()
    }

    async fn respond(&self, cancel: &CancellationToken, task_id: &str) -> Result<AgentSummary> {
        if !self.delay.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(self.delay) => {}
            }
        }
        let files = self.files.get(task_id).cloned().unwrap_or_default();
        match self.behaviors.get(task_id) {
            Some(Behavior::Report(status, text)) => Ok(AgentSummary::new(task_id, *status)
                .with_summary(text)
                .with_files(files)),
            Some(Behavior::ReportFor(other, status)) => Ok(AgentSummary::new(other, *status)),
            Some(Behavior::Fail) | None => Err(Error::SummaryMissing),
            Some(Behavior::Hang) => {
                cancel.cancelled().await;
                Err(Error::Cancelled)
            }
        }
    }
}

#[async_trait]
impl Agent for MockAgent {
    fn name(&self) -> &str {
        "mock"
    }

    async fn run(&self, cancel: &CancellationToken, prompt: &str) -> Result<AgentSummary> {
        let task_id = prompt.trim().to_string();
        self.calls.lock().push(task_id.clone());

        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);
        let result = self.respond(cancel, &task_id).await;
        self.running.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// A scheduler wired to a mock agent, with its event stream.
pub struct SchedulerHarness {
    pub scheduler: Scheduler,
    pub agent: Arc<MockAgent>,
    pub event_rx: mpsc::Receiver<SchedulerEvent>,
}

impl SchedulerHarness {
    pub fn new(project: &TestProject, agent: MockAgent, settings: SchedulerSettings) -> Self {
        Self::with_strategy(project, agent, settings, "priority", 1)
    }

    pub fn with_strategy(
        project: &TestProject,
        agent: MockAgent,
        settings: SchedulerSettings,
        strategy: &str,
        agents_per_task: usize,
    ) -> Self {
        let agent = Arc::new(agent);
        let renderer = Arc::new(
            TemplateRenderer::from_template(TASK_ID_TEMPLATE).expect("Failed to build template"),
        );
        let executor = Arc::new(TaskExecutor::new(agent.clone(), renderer, agents_per_task));
        let strategy = StrategyRegistry::with_builtins().resolve(strategy);
        let (tx, event_rx) = mpsc::channel(256);

        let scheduler = Scheduler::new(
            project.load(),
            project.todo_path.clone(),
            SchedulerSettings {
                work_dir: project.temp_dir.path().to_path_buf(),
                ..settings
            },
            strategy,
            executor,
        )
        .with_events(tx);

        Self {
            scheduler,
            agent,
            event_rx,
        }
    }

    /// Drop the scheduler and collect every event it sent.
    pub fn into_events(self) -> Vec<SchedulerEvent> {
        let Self {
            scheduler,
            mut event_rx,
            ..
        } = self;
        drop(scheduler);
        let mut events = Vec::new();
        while let Ok(event) = event_rx.try_recv() {
            events.push(event);
        }
        events
    }
}

/// Create a `todo` task with priority 3.
pub fn test_task(id: &str) -> Task {
    Task::new(id, &format!("{} title", id), 3)
}

/// Independent tasks `T1..=Tn`.
pub fn independent_tasks(count: usize) -> Vec<Task> {
    (1..=count).map(|i| test_task(&format!("T{}", i))).collect()
}

/// `T1 <- T2 <- T3`.
pub fn chain_tasks() -> Vec<Task> {
    vec![
        test_task("T1"),
        test_task("T2").depends_on(["T1"]),
        test_task("T3").depends_on(["T2"]),
    ]
}

/// Diamond: `T4` depends on `T2` and `T3`, which both depend on `T1`.
///
/// ```text
///     T1
///    /  \
///   T2  T3
///    \  /
///     T4
/// ```
pub fn diamond_tasks() -> Vec<Task> {
    vec![
        test_task("T1"),
        test_task("T2").depends_on(["T1"]),
        test_task("T3").depends_on(["T1"]),
        test_task("T4").depends_on(["T2", "T3"]),
    ]
}
