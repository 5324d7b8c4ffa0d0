//! Strategy-driven selection of ready tasks for parallel mode.
//!
//! The ready set is every task that is not `done` and whose dependencies
//! are all `done`. A `blocked` status does not remove a task from the
//! ready set. Strategies only decide the order.

use crate::config::Strategy;
use crate::core::file::by_priority_then_id;
use crate::core::{compare_ids, Task, TaskFile, TaskStatus};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// An ordering over the ready set.
pub trait SelectionStrategy: Send + Sync {
    /// Name used in configuration, e.g. `priority`.
    fn name(&self) -> &str;

    /// Sort `ready` in place.
    fn order(&self, ready: &mut Vec<&Task>);
}

/// Ascending priority, id tiebreak.
#[derive(Debug, Clone, Copy, Default)]
pub struct PriorityStrategy;

impl SelectionStrategy for PriorityStrategy {
    fn name(&self) -> &str {
        Strategy::Priority.as_str()
    }

    fn order(&self, ready: &mut Vec<&Task>) {
        ready.sort_by(by_priority_then_id);
    }
}

/// Tasks that more of the other ready tasks wait on go first, then
/// priority, then id.
#[derive(Debug, Clone, Copy, Default)]
pub struct DependencyStrategy;

impl SelectionStrategy for DependencyStrategy {
    fn name(&self) -> &str {
        Strategy::Dependency.as_str()
    }

    fn order(&self, ready: &mut Vec<&Task>) {
        sort_by_dependents(ready);
    }
}

/// Priority groups in ascending order, dependency ordering inside each.
#[derive(Debug, Clone, Copy, Default)]
pub struct MixedStrategy;

impl SelectionStrategy for MixedStrategy {
    fn name(&self) -> &str {
        Strategy::Mixed.as_str()
    }

    fn order(&self, ready: &mut Vec<&Task>) {
        let mut groups: BTreeMap<u8, Vec<&Task>> = BTreeMap::new();
        for task in ready.drain(..) {
            groups.entry(task.priority).or_default().push(task);
        }
        for (_, mut group) in groups {
            sort_by_dependents(&mut group);
            ready.extend(group);
        }
    }
}

/// Sort `tasks` by how many entries of the same slice depend on each
/// one, descending, then priority, then id.
fn sort_by_dependents(tasks: &mut [&Task]) {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for task in tasks.iter() {
        for dep in &task.depends_on {
            *counts.entry(dep.clone()).or_insert(0) += 1;
        }
    }
    let count = |t: &Task| counts.get(&t.id).copied().unwrap_or(0);
    tasks.sort_by(|a, b| {
        count(*b)
            .cmp(&count(*a))
            .then_with(|| a.priority.cmp(&b.priority))
            .then_with(|| compare_ids(&a.id, &b.id))
    });
}

/// Built-in strategy object for a configured strategy.
pub fn builtin(strategy: Strategy) -> Arc<dyn SelectionStrategy> {
    match strategy {
        Strategy::Priority => Arc::new(PriorityStrategy),
        Strategy::Dependency => Arc::new(DependencyStrategy),
        Strategy::Mixed => Arc::new(MixedStrategy),
    }
}

/// Picks batches of ready tasks from a task file.
pub struct TaskSelector<'a> {
    file: &'a TaskFile,
    strategy: Arc<dyn SelectionStrategy>,
}

impl<'a> TaskSelector<'a> {
    pub fn new(file: &'a TaskFile, strategy: Arc<dyn SelectionStrategy>) -> Self {
        Self { file, strategy }
    }

    pub fn strategy_name(&self) -> &str {
        self.strategy.name()
    }

    /// Ready tasks in file order.
    fn ready(&self) -> Vec<&'a Task> {
        self.file
            .tasks
            .iter()
            .filter(|t| t.status != TaskStatus::Done && self.file.dependencies_satisfied(t))
            .collect()
    }

    /// Ready tasks in strategy order.
    pub fn ready_tasks(&self) -> Vec<&'a Task> {
        let mut ready = self.ready();
        self.strategy.order(&mut ready);
        ready
    }

    /// The first `n` ready tasks in strategy order. `n <= 0` or `n` larger
    /// than the ready set returns all of them.
    pub fn select_tasks(&self, n: i64) -> Vec<&'a Task> {
        let mut ready = self.ready_tasks();
        if let Ok(n) = usize::try_from(n) {
            if n > 0 {
                ready.truncate(n);
            }
        }
        ready
    }

    pub fn count_ready(&self) -> usize {
        self.ready().len()
    }
}
