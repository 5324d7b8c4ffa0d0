//! Parallel execution correctness tests.
//!
//! These tests verify batch sizing, the worker pool's concurrency ceiling,
//! multi-agent consensus and fail-fast behavior.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use looper::agent::{Agent, AgentSummary, ResultStatus};
use looper::core::{Task, TaskStatus};
use looper::orchestration::{SchedulerSettings, TaskContext, TaskExecutor, WorkerPool};
use looper::prompts::TemplateRenderer;
use looper::{Error, Result};

use crate::fixtures::{
    independent_tasks, test_task, Behavior, MockAgent, SchedulerHarness, TestProject,
    TASK_ID_TEMPLATE,
};

/// Test: Batch size caps concurrency
/// Given 5 independent tasks and max_tasks = 2
/// When the parallel scheduler runs
/// Then at most 2 agents run at once, over 3 batches
#[tokio::test]
async fn test_parallel_respects_max_tasks() {
    let project = TestProject::new(independent_tasks(5));
    let agent = MockAgent::all_done(["T1", "T2", "T3", "T4", "T5"])
        .with_delay(Duration::from_millis(20));
    let mut harness = SchedulerHarness::new(
        &project,
        agent,
        SchedulerSettings {
            max_tasks: 2,
            ..Default::default()
        },
    );

    let report = harness
        .scheduler
        .run_parallel(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.rounds, 3);
    assert_eq!(report.completed.len(), 5);
    assert!(harness.agent.max_running.load(Ordering::SeqCst) <= 2);
}

/// Test: max_tasks = 0 dispatches every ready task in one batch
#[tokio::test]
async fn test_parallel_unlimited_batch() {
    let project = TestProject::new(independent_tasks(6));
    let agent = MockAgent::all_done(["T1", "T2", "T3", "T4", "T5", "T6"])
        .with_delay(Duration::from_millis(50));
    let mut harness = SchedulerHarness::new(
        &project,
        agent,
        SchedulerSettings {
            max_tasks: 0,
            ..Default::default()
        },
    );

    let report = harness
        .scheduler
        .run_parallel(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.rounds, 1);
    assert_eq!(harness.agent.max_running.load(Ordering::SeqCst), 6);
}

/// Test: Dependency strategy ranks only among ready tasks
/// Given T1 (priority 2) and T2 (priority 1) ready, and T3 waiting on T1
/// When max_tasks = 1
/// Then T2 runs first, since T3 is not ready and does not lift T1
#[tokio::test]
async fn test_dependency_strategy_orders_batches() {
    let project = TestProject::new(vec![
        Task::new("T1", "a", 2),
        Task::new("T2", "b", 1),
        Task::new("T3", "c", 1).depends_on(["T1"]),
    ]);
    let agent = MockAgent::all_done(["T1", "T2", "T3"]);
    let mut harness = SchedulerHarness::with_strategy(
        &project,
        agent,
        SchedulerSettings {
            max_tasks: 1,
            ..Default::default()
        },
        "dependency",
        1,
    );

    let report = harness
        .scheduler
        .run_parallel(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.rounds, 3);
    assert_eq!(*harness.agent.calls.lock(), vec!["T2", "T1", "T3"]);
    assert!(project.load().all_done());
}

/// Test: Fail-fast stops the run and counts what never ran
/// Given T1 fails, T2 is still running, and T3 waits on T1
/// When fail-fast is enabled
/// Then the error names T1 and two tasks did not run
#[tokio::test]
async fn test_fail_fast_reports_cause_and_not_run() {
    let project = TestProject::new(vec![
        test_task("T1"),
        test_task("T2"),
        test_task("T3").depends_on(["T1"]),
    ]);
    let agent = MockAgent::new()
        .on("T1", Behavior::Fail)
        .on("T2", Behavior::Hang);
    let mut harness = SchedulerHarness::new(
        &project,
        agent,
        SchedulerSettings {
            fail_fast: true,
            ..Default::default()
        },
    );

    let err = harness
        .scheduler
        .run_parallel(&CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        Error::FailFast { cause, not_run } => {
            assert_eq!(cause.task_id, "T1");
            assert!(matches!(*cause.error, Error::SummaryMissing));
            assert_eq!(not_run, 2);
        }
        other => panic!("expected FailFast, got {:?}", other),
    }

    let saved = project.load();
    assert_eq!(saved.get_task("T1").unwrap().status, TaskStatus::Blocked);
    assert_eq!(saved.get_task("T2").unwrap().status, TaskStatus::Todo);
    assert_eq!(saved.get_task("T3").unwrap().status, TaskStatus::Todo);
}

/// Test: Without fail-fast every failure is collected
#[tokio::test]
async fn test_failures_aggregate_without_fail_fast() {
    let project = TestProject::new(independent_tasks(3));
    let agent = MockAgent::new()
        .on("T1", Behavior::Fail)
        .on("T2", Behavior::Report(ResultStatus::Done, "ok"))
        .on("T3", Behavior::Fail);
    let mut harness = SchedulerHarness::new(&project, agent, SchedulerSettings::default());

    let report = harness
        .scheduler
        .run_parallel(&CancellationToken::new())
        .await
        .unwrap();

    match report.into_result() {
        Err(Error::BatchFailed { failures }) => {
            let mut ids: Vec<_> = failures.iter().map(|f| f.task_id.as_str()).collect();
            ids.sort();
            assert_eq!(ids, vec!["T1", "T3"]);
        }
        Err(other) => panic!("expected BatchFailed, got {:?}", other),
        Ok(_) => panic!("expected BatchFailed, got success"),
    }
}

/// Agent that answers with the next scripted status on every call.
struct Voter {
    votes: Mutex<Vec<(ResultStatus, &'static str, Vec<&'static str>)>>,
}

#[async_trait]
impl Agent for Voter {
    fn name(&self) -> &str {
        "voter"
    }

    async fn run(&self, _cancel: &CancellationToken, prompt: &str) -> Result<AgentSummary> {
        let (status, text, files) = self.votes.lock().remove(0);
        Ok(AgentSummary::new(prompt, status)
            .with_summary(text)
            .with_files(files))
    }
}

/// Test: Three agents on one task reach consensus
/// Given votes done, blocked, done
/// When the executor runs with three agents per task
/// Then the status is done and files are a sorted union
#[tokio::test]
async fn test_consensus_through_executor() {
    let voter = Arc::new(Voter {
        votes: Mutex::new(vec![
            (ResultStatus::Done, "added parser", vec!["src/parse.rs"]),
            (ResultStatus::Blocked, "", vec!["src/lib.rs"]),
            (ResultStatus::Done, "added tests", vec!["src/parse.rs", "tests/parse.rs"]),
        ]),
    });
    let renderer = Arc::new(TemplateRenderer::from_template(TASK_ID_TEMPLATE).unwrap());
    let executor = TaskExecutor::new(voter, renderer, 3);
    let ctx = TaskContext {
        todo_path: "to-do.json".into(),
        work_dir: ".".into(),
        task: Task::new("T1", "Parser", 1),
    };

    let summary = executor
        .execute(&CancellationToken::new(), &ctx, 1)
        .await
        .unwrap();

    assert_eq!(summary.status, ResultStatus::Done);
    assert_eq!(summary.files, vec!["src/lib.rs", "src/parse.rs", "tests/parse.rs"]);
    assert!(summary
        .summary
        .starts_with("Multi-agent consensus (3 agents):\n"));
    assert_eq!(summary.task_id.as_deref(), Some("T1"));
}

/// Test: Consensus runs end to end through the scheduler
#[tokio::test]
async fn test_scheduler_with_agents_per_task() {
    let project = TestProject::new(independent_tasks(2));
    let agent = MockAgent::all_done(["T1", "T2"]);
    let mut harness = SchedulerHarness::with_strategy(
        &project,
        agent,
        SchedulerSettings::default(),
        "mixed",
        3,
    );

    let report = harness
        .scheduler
        .run_parallel(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.completed.len(), 2);
    assert_eq!(harness.agent.call_count("T1"), 3);
    assert_eq!(harness.agent.call_count("T2"), 3);
    // Identical texts from three agents are attributed, not collapsed.
    let saved = project.load();
    let details = saved.get_task("T1").unwrap().details.clone().unwrap();
    assert!(details.contains("[Agent 2] implemented"));
}

/// Test: Pool keeps every unit's outcome when nothing is fail-fast
#[tokio::test]
async fn test_pool_snapshot_after_wait() {
    let pool: WorkerPool<u32> = WorkerPool::new(&CancellationToken::new(), 2, false);
    for i in 0..4u32 {
        pool.submit(format!("T{}", i), move |_cancel| async move {
            if i == 2 {
                Err(Error::SummaryMissing)
            } else {
                Ok(i * 10)
            }
        });
    }

    let outcome = pool.wait().await;
    assert_eq!(outcome.submitted, 4);
    assert_eq!(outcome.results.len(), 4);
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(outcome.first_error().map(|f| f.task_id.as_str()), Some("T2"));
    assert!(pool.is_cancelled());
    // Later submissions are skipped.
    pool.submit("T9", |_cancel| async { Ok(0) });
    assert_eq!(pool.skipped_count(), 1);
}
