//! Scheduler: the coordinating loop.
//!
//! The scheduler owns the task file. It selects work, dispatches it to a
//! [`WorkerPool`] (parallel mode) or runs it inline (sequential mode), and
//! applies every result itself after the worker has returned. Workers never
//! touch the task file.

use crate::agent::{AgentSummary, ResultStatus};
use crate::core::{merge_unique, TaskFile, TaskStatus};
use crate::error::{Error, Result};
use crate::orchestration::executor::{TaskContext, TaskExecutor};
use crate::orchestration::pool::{TaskFailure, WorkerPool};
use crate::orchestration::selector::{SelectionStrategy, TaskSelector};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Events emitted by the scheduler for task lifecycle changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerEvent {
    /// A task was marked `doing` and handed to the executor.
    TaskStarted {
        task_id: String,
        iteration: u32,
    },
    /// An agent reported the task done.
    TaskCompleted {
        task_id: String,
        summary: String,
    },
    /// An agent reported the task blocked.
    TaskBlocked {
        task_id: String,
        blockers: Vec<String>,
    },
    /// The attempt failed; the task was marked blocked.
    TaskFailed {
        task_id: String,
        error: String,
    },
    /// A parallel batch finished and its results were applied.
    BatchFinished {
        batch: u32,
        ran: usize,
        failed: usize,
        not_run: usize,
    },
    /// Every task in the file is done.
    AllTasksComplete,
}

/// Knobs the scheduler reads from configuration.
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub work_dir: PathBuf,
    /// Tasks per parallel batch; 0 means all ready tasks at once.
    pub max_tasks: usize,
    pub fail_fast: bool,
    /// Iteration cap for sequential mode.
    pub max_iterations: u32,
    /// Pause between sequential iterations.
    pub loop_delay: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("."),
            max_tasks: 3,
            fail_fast: false,
            max_iterations: 50,
            loop_delay: Duration::ZERO,
        }
    }
}

/// What a run did.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    /// Tasks now `done`.
    pub completed: Vec<String>,
    /// Tasks an agent reported blocked.
    pub blocked: Vec<String>,
    /// Tasks whose attempt changed nothing: skipped, or the summary was
    /// for another task.
    pub skipped: Vec<String>,
    /// Attempts that failed; those tasks are now `blocked`.
    pub failures: Vec<TaskFailure>,
    /// Dispatched tasks that never ran because of cancellation.
    pub not_run: usize,
    /// Batches (parallel) or iterations (sequential) executed.
    pub rounds: u32,
}

impl RunReport {
    fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            completed: Vec::new(),
            blocked: Vec::new(),
            skipped: Vec::new(),
            failures: Vec::new(),
            not_run: 0,
            rounds: 0,
        }
    }

    /// Turn per-task failures into one error naming every failed task.
    pub fn into_result(self) -> Result<Self> {
        if self.failures.is_empty() {
            Ok(self)
        } else {
            Err(Error::BatchFailed {
                failures: self.failures,
            })
        }
    }
}

/// Drives tasks from the task file through the executor.
///
/// # Example
///
/// ```ignore
/// let strategy = StrategyRegistry::with_builtins().resolve("priority");
/// let executor = Arc::new(TaskExecutor::new(agent, renderer, 1));
/// let mut scheduler = Scheduler::new(file, path, settings, strategy, executor);
/// let report = scheduler.run_parallel(&cancel).await?.into_result()?;
/// ```
pub struct Scheduler {
    file: TaskFile,
    path: PathBuf,
    settings: SchedulerSettings,
    strategy: Arc<dyn SelectionStrategy>,
    executor: Arc<TaskExecutor>,
    events: Option<mpsc::Sender<SchedulerEvent>>,
}

impl Scheduler {
    /// # Arguments
    ///
    /// * `file` - The loaded task file; the scheduler becomes its only writer
    /// * `path` - Where the task file is saved after every change
    /// * `settings` - Batch size, fail-fast and sequential loop settings
    /// * `strategy` - Ordering for parallel batches
    /// * `executor` - Runs one attempt of one task
    pub fn new(
        file: TaskFile,
        path: PathBuf,
        settings: SchedulerSettings,
        strategy: Arc<dyn SelectionStrategy>,
        executor: Arc<TaskExecutor>,
    ) -> Self {
        Self {
            file,
            path,
            settings,
            strategy,
            executor,
            events: None,
        }
    }

    /// Emit lifecycle events on `tx`.
    pub fn with_events(mut self, tx: mpsc::Sender<SchedulerEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn file(&self) -> &TaskFile {
        &self.file
    }

    pub fn into_file(self) -> TaskFile {
        self.file
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run ready tasks in parallel batches until nothing new is ready.
    ///
    /// Dependencies are validated before anything runs. Each task is
    /// attempted at most once per run. Per-task failures mark the task
    /// blocked and end up in the report unless fail-fast is set, in which
    /// case the first failure is returned once the batch has drained.
    ///
    /// # Errors
    ///
    /// - Missing-dependency or cycle errors before any execution.
    /// - [`Error::FailFast`] on the first failure with fail-fast enabled.
    /// - [`Error::Cancelled`] if `cancel` fires; results that arrived are
    ///   still applied and saved.
    pub async fn run_parallel(&mut self, cancel: &CancellationToken) -> Result<RunReport> {
        self.file.validate_dependencies()?;

        let mut report = RunReport::new();
        let mut attempted: HashSet<String> = HashSet::new();
        let limit = match self.settings.max_tasks {
            0 => usize::MAX,
            n => n,
        };
        info!(
            run_id = %report.run_id,
            strategy = %self.strategy.name(),
            max_tasks = self.settings.max_tasks,
            fail_fast = self.settings.fail_fast,
            agents_per_task = self.executor.max_agents(),
            "starting parallel run"
        );

        while !cancel.is_cancelled() {
            let batch: Vec<String> = TaskSelector::new(&self.file, Arc::clone(&self.strategy))
                .ready_tasks()
                .into_iter()
                .filter(|t| !attempted.contains(&t.id))
                .take(limit)
                .map(|t| t.id.clone())
                .collect();
            if batch.is_empty() {
                debug!("no unattempted ready tasks left");
                break;
            }

            report.rounds += 1;
            let round = report.rounds;
            info!(batch = round, tasks = ?batch, "dispatching batch");

            let mut previous = HashMap::new();
            for id in &batch {
                attempted.insert(id.clone());
                if let Some(task) = self.file.get_task(id) {
                    previous.insert(id.clone(), task.status);
                }
                self.file.set_task_status(id, TaskStatus::Doing)?;
            }
            self.persist().await?;

            let pool = WorkerPool::new(cancel, self.settings.max_tasks, self.settings.fail_fast);
            for id in &batch {
                let Some(task) = self.file.get_task(id).cloned() else {
                    continue;
                };
                let ctx = TaskContext {
                    todo_path: self.path.clone(),
                    work_dir: self.settings.work_dir.clone(),
                    task,
                };
                let executor = Arc::clone(&self.executor);
                self.emit(SchedulerEvent::TaskStarted {
                    task_id: id.clone(),
                    iteration: round,
                })
                .await;
                pool.submit(id.clone(), move |token| async move {
                    executor.execute(&token, &ctx, round).await
                });
            }

            let outcome = pool.wait().await;

            let mut finished: HashSet<String> = HashSet::new();
            let mut not_run = 0;
            let mut batch_failures = Vec::new();
            for result in outcome.results {
                finished.insert(result.task_id.clone());
                let prior = previous
                    .get(&result.task_id)
                    .copied()
                    .unwrap_or(TaskStatus::Todo);
                match result.outcome {
                    Ok(summary) => {
                        self.apply_summary(&result.task_id, prior, &summary, &mut report)
                            .await?
                    }
                    Err(error) if matches!(*error, Error::Cancelled) => {
                        self.file.set_task_status(&result.task_id, prior)?;
                        not_run += 1;
                    }
                    Err(error) => {
                        let failure = TaskFailure::new(&result.task_id, error);
                        self.apply_failure(&failure).await?;
                        batch_failures.push(failure);
                    }
                }
            }
            // Panicked workers leave an error but no result.
            for failure in outcome.errors {
                if finished.insert(failure.task_id.clone()) {
                    self.apply_failure(&failure).await?;
                    batch_failures.push(failure);
                }
            }
            for id in batch.iter().filter(|id| !finished.contains(*id)) {
                let prior = previous.get(id).copied().unwrap_or(TaskStatus::Todo);
                self.file.set_task_status(id, prior)?;
                not_run += 1;
            }
            self.persist().await?;

            report.not_run += not_run;
            let failed = batch_failures.len();
            report.failures.extend(batch_failures);
            info!(batch = round, failed, not_run, "batch finished");
            self.emit(SchedulerEvent::BatchFinished {
                batch: round,
                ran: finished.len(),
                failed,
                not_run,
            })
            .await;

            if self.settings.fail_fast && failed > 0 {
                let remaining = self.unattempted_pending(&attempted);
                let cause = report.failures[report.failures.len() - failed].clone();
                warn!(task_id = %cause.task_id, "fail-fast triggered, stopping run");
                return Err(Error::FailFast {
                    cause,
                    not_run: not_run + remaining,
                });
            }
        }

        if cancel.is_cancelled() {
            info!(run_id = %report.run_id, "run cancelled");
            return Err(Error::Cancelled);
        }
        self.finish(&report).await;
        Ok(report)
    }

    /// Work one task at a time using the task file's own selection order,
    /// up to `max_iterations` attempts.
    ///
    /// A failed attempt marks the task blocked and the loop moves on.
    ///
    /// # Errors
    ///
    /// Dependency validation errors before the first iteration, save
    /// errors, or [`Error::Cancelled`].
    pub async fn run_sequential(&mut self, cancel: &CancellationToken) -> Result<RunReport> {
        self.file.validate_dependencies()?;

        let mut report = RunReport::new();
        info!(
            run_id = %report.run_id,
            max_iterations = self.settings.max_iterations,
            "starting sequential run"
        );

        for iteration in 1..=self.settings.max_iterations {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let Some(task) = self.file.select_task().cloned() else {
                debug!("no eligible task");
                break;
            };
            report.rounds = iteration;
            info!(iteration, task_id = %task.id, title = %task.title, "iteration");

            let prior = task.status;
            self.file.set_task_status(&task.id, TaskStatus::Doing)?;
            self.persist().await?;
            self.emit(SchedulerEvent::TaskStarted {
                task_id: task.id.clone(),
                iteration,
            })
            .await;

            let ctx = TaskContext {
                todo_path: self.path.clone(),
                work_dir: self.settings.work_dir.clone(),
                task: self.file.get_task(&task.id).cloned().unwrap_or(task),
            };
            let task_id = ctx.task.id.clone();
            match self.executor.execute(cancel, &ctx, iteration).await {
                Ok(summary) => {
                    self.apply_summary(&task_id, prior, &summary, &mut report)
                        .await?
                }
                Err(Error::Cancelled) => {
                    self.file.set_task_status(&task_id, prior)?;
                    self.persist().await?;
                    report.not_run += 1;
                    return Err(Error::Cancelled);
                }
                Err(error) => {
                    let failure = TaskFailure::new(&task_id, Arc::new(error));
                    self.apply_failure(&failure).await?;
                    report.failures.push(failure);
                }
            }
            self.persist().await?;

            if !self.settings.loop_delay.is_zero() && iteration < self.settings.max_iterations {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(Error::Cancelled),
                    _ = tokio::time::sleep(self.settings.loop_delay) => {}
                }
            }
        }

        self.finish(&report).await;
        Ok(report)
    }

    /// Apply an agent summary to the dispatched task.
    async fn apply_summary(
        &mut self,
        task_id: &str,
        prior: TaskStatus,
        summary: &AgentSummary,
        report: &mut RunReport,
    ) -> Result<()> {
        if summary.is_for_other_task(task_id) {
            warn!(
                task_id,
                summary_task_id = ?summary.task_id,
                "summary is for a different task, not applying"
            );
            self.file.set_task_status(task_id, prior)?;
            report.skipped.push(task_id.to_string());
            return Ok(());
        }

        let Some(status) = summary.status.task_status() else {
            debug!(task_id, "agent skipped task");
            self.file.set_task_status(task_id, prior)?;
            report.skipped.push(task_id.to_string());
            return Ok(());
        };

        self.file.update_task(task_id, |task| {
            task.status = status;
            if !summary.summary.is_empty() {
                task.details = Some(summary.summary.clone());
            }
            task.files = merge_unique(&task.files, &summary.files);
            task.blockers = merge_unique(&task.blockers, &summary.blockers);
        })?;

        match summary.status {
            ResultStatus::Done => {
                info!(task_id, "task done");
                report.completed.push(task_id.to_string());
                self.emit(SchedulerEvent::TaskCompleted {
                    task_id: task_id.to_string(),
                    summary: summary.summary.clone(),
                })
                .await;
            }
            ResultStatus::Blocked => {
                info!(task_id, blockers = ?summary.blockers, "task blocked");
                report.blocked.push(task_id.to_string());
                self.emit(SchedulerEvent::TaskBlocked {
                    task_id: task_id.to_string(),
                    blockers: summary.blockers.clone(),
                })
                .await;
            }
            ResultStatus::Skipped => {}
        }
        Ok(())
    }

    /// Mark a failed task blocked and record the error as a blocker.
    async fn apply_failure(&mut self, failure: &TaskFailure) -> Result<()> {
        warn!(task_id = %failure.task_id, error = %failure.error, "task attempt failed");
        let blocker = failure.error.to_string();
        self.file.update_task(&failure.task_id, |task| {
            task.status = TaskStatus::Blocked;
            task.blockers = merge_unique(&task.blockers, std::slice::from_ref(&blocker));
        })?;
        self.emit(SchedulerEvent::TaskFailed {
            task_id: failure.task_id.clone(),
            error: blocker,
        })
        .await;
        Ok(())
    }

    /// Tasks not done and not attempted in this run.
    fn unattempted_pending(&self, attempted: &HashSet<String>) -> usize {
        self.file
            .tasks
            .iter()
            .filter(|t| !t.is_done() && !attempted.contains(&t.id))
            .count()
    }

    async fn finish(&self, report: &RunReport) {
        info!(
            run_id = %report.run_id,
            completed = report.completed.len(),
            blocked = report.blocked.len(),
            skipped = report.skipped.len(),
            failed = report.failures.len(),
            "run finished"
        );
        if self.file.all_done() {
            self.emit(SchedulerEvent::AllTasksComplete).await;
        }
    }

    /// Save a snapshot of the task file off the async runtime.
    async fn persist(&self) -> Result<()> {
        let snapshot = self.file.clone();
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || snapshot.save(&path)).await?
    }

    async fn emit(&self, event: SchedulerEvent) {
        if let Some(tx) = &self.events {
            // A dropped receiver only means nobody is listening.
            let _ = tx.send(event).await;
        }
    }
}
