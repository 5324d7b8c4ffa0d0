//! Bounded worker pool for task execution.
//!
//! The `WorkerPool` runs named units of work concurrently on the tokio
//! runtime, at most `max_workers` at a time (0 means unlimited). Results
//! and errors are collected behind a mutex and handed out as copies.
//!
//! Cancellation is cooperative. Units that have not started when the pool
//! token fires are skipped; running units receive the token and are
//! expected to stop on their own. The pool never aborts a running unit.

use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A failed unit of work, tagged with its identifier.
#[derive(Debug, Clone)]
pub struct TaskFailure {
    pub task_id: String,
    pub error: Arc<Error>,
}

impl TaskFailure {
    pub fn new(task_id: &str, error: Arc<Error>) -> Self {
        Self {
            task_id: task_id.to_string(),
            error,
        }
    }
}

impl std::fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.task_id, self.error)
    }
}

/// Outcome of one unit of work that actually ran.
#[derive(Debug, Clone)]
pub struct TaskResult<T> {
    pub task_id: String,
    pub outcome: std::result::Result<T, Arc<Error>>,
    /// Wall-clock time spent running the unit.
    pub duration: Duration,
}

impl<T> TaskResult<T> {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn value(&self) -> Option<&T> {
        self.outcome.as_ref().ok()
    }

    pub fn error(&self) -> Option<&Arc<Error>> {
        self.outcome.as_ref().err()
    }
}

/// Snapshot returned by [`WorkerPool::wait`].
#[derive(Debug, Clone)]
pub struct PoolOutcome<T> {
    pub results: Vec<TaskResult<T>>,
    pub errors: Vec<TaskFailure>,
    /// Units that never ran because the pool was cancelled first.
    pub skipped: usize,
    pub submitted: usize,
}

impl<T> PoolOutcome<T> {
    /// First error recorded, in completion order.
    pub fn first_error(&self) -> Option<&TaskFailure> {
        self.errors.first()
    }
}

struct Collected<T> {
    results: Vec<TaskResult<T>>,
    errors: Vec<TaskFailure>,
    skipped: usize,
}

/// Runs submitted units of work with bounded concurrency.
///
/// # Example
///
/// ```ignore
/// let root = CancellationToken::new();
/// let pool = WorkerPool::new(&root, 2, false);
/// for id in ["T1", "T2", "T3"] {
///     pool.submit(id, move |cancel| async move { run_task(id, cancel).await });
/// }
/// let outcome = pool.wait().await;
/// ```
pub struct WorkerPool<T> {
    max_workers: usize,
    fail_fast: bool,
    semaphore: Option<Arc<Semaphore>>,
    token: CancellationToken,
    collected: Arc<Mutex<Collected<T>>>,
    handles: Mutex<Vec<(String, JoinHandle<()>)>>,
    submitted: Mutex<usize>,
}

impl<T> WorkerPool<T>
where
    T: Clone + Send + 'static,
{
    /// Create a pool whose token is a child of `parent`: cancelling the
    /// parent cancels the pool, but not the other way round.
    pub fn new(parent: &CancellationToken, max_workers: usize, fail_fast: bool) -> Self {
        let semaphore = (max_workers > 0).then(|| Arc::new(Semaphore::new(max_workers)));
        Self {
            max_workers,
            fail_fast,
            semaphore,
            token: parent.child_token(),
            collected: Arc::new(Mutex::new(Collected {
                results: Vec::new(),
                errors: Vec::new(),
                skipped: 0,
            })),
            handles: Mutex::new(Vec::new()),
            submitted: Mutex::new(0),
        }
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    pub fn fail_fast(&self) -> bool {
        self.fail_fast
    }

    /// Dispatch a unit of work. Returns immediately; the unit waits for a
    /// free slot on its own.
    ///
    /// `work` receives the pool's cancellation token. A unit submitted after
    /// cancellation, or still waiting for a slot when cancellation fires,
    /// never runs and is counted as skipped.
    pub fn submit<F, Fut>(&self, task_id: impl Into<String>, work: F)
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let task_id = task_id.into();
        *self.submitted.lock() += 1;

        if self.token.is_cancelled() {
            debug!(task_id = %task_id, "pool cancelled, skipping submission");
            self.collected.lock().skipped += 1;
            return;
        }

        let token = self.token.clone();
        let semaphore = self.semaphore.clone();
        let collected = Arc::clone(&self.collected);
        let fail_fast = self.fail_fast;
        let id = task_id.clone();

        let handle = tokio::spawn(async move {
            let _permit = match semaphore {
                Some(semaphore) => tokio::select! {
                    biased;
                    _ = token.cancelled() => None,
                    permit = semaphore.acquire_owned() => permit.ok(),
                },
                None => None,
            };
            if token.is_cancelled() {
                debug!(task_id = %id, "pool cancelled before start, skipping");
                collected.lock().skipped += 1;
                return;
            }

            let start = Instant::now();
            let outcome = work(token.clone()).await.map_err(Arc::new);
            let duration = start.elapsed();

            let mut collected = collected.lock();
            if let Err(error) = &outcome {
                debug!(task_id = %id, error = %error, ?duration, "unit failed");
                collected
                    .errors
                    .push(TaskFailure::new(&id, Arc::clone(error)));
                if fail_fast {
                    token.cancel();
                }
            } else {
                debug!(task_id = %id, ?duration, "unit finished");
            }
            collected.results.push(TaskResult {
                task_id: id,
                outcome,
                duration,
            });
        });

        self.handles.lock().push((task_id, handle));
    }

    /// Wait until every submitted unit has finished or been skipped, then
    /// cancel the pool token and return a snapshot.
    ///
    /// A unit that panicked is reported as an error for its task.
    pub async fn wait(&self) -> PoolOutcome<T> {
        loop {
            let pending: Vec<_> = self.handles.lock().drain(..).collect();
            if pending.is_empty() {
                break;
            }
            for (task_id, handle) in pending {
                if let Err(join_err) = handle.await {
                    warn!(task_id = %task_id, error = %join_err, "worker panicked");
                    let error = Arc::new(Error::from(join_err));
                    let mut collected = self.collected.lock();
                    collected
                        .errors
                        .push(TaskFailure::new(&task_id, Arc::clone(&error)));
                    if self.fail_fast {
                        self.token.cancel();
                    }
                }
            }
        }

        self.token.cancel();

        let collected = self.collected.lock();
        PoolOutcome {
            results: collected.results.clone(),
            errors: collected.errors.clone(),
            skipped: collected.skipped,
            submitted: *self.submitted.lock(),
        }
    }

    /// Copy of the results recorded so far.
    pub fn results(&self) -> Vec<TaskResult<T>> {
        self.collected.lock().results.clone()
    }

    /// Copy of the errors recorded so far.
    pub fn errors(&self) -> Vec<TaskFailure> {
        self.collected.lock().errors.clone()
    }

    pub fn skipped_count(&self) -> usize {
        self.collected.lock().skipped
    }

    /// Stop any work that has not started yet. Safe to call repeatedly.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The token handed to units of work.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}
