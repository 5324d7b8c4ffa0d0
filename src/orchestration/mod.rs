//! Orchestration layer.
//!
//! Selection strategies and the explicit registries, the bounded worker
//! pool, the task executor with multi-agent consensus, and the scheduler
//! that ties them to the task file.

pub mod consensus;
pub mod executor;
pub mod pool;
pub mod registry;
pub mod scheduler;
pub mod selector;

pub use executor::{TaskContext, TaskExecutor};
pub use pool::{PoolOutcome, TaskFailure, TaskResult, WorkerPool};
pub use registry::{AgentFactory, AgentRegistry, StrategyRegistry};
pub use scheduler::{RunReport, Scheduler, SchedulerEvent, SchedulerSettings};
pub use selector::{
    DependencyStrategy, MixedStrategy, PriorityStrategy, SelectionStrategy, TaskSelector,
};
