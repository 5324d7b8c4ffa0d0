//! Task dependency graph.
//!
//! Builds a petgraph `DiGraph` from the tasks in a [`TaskFile`] and checks
//! it before any scheduling happens: every `depends_on` entry must name an
//! existing task, and the relation must be acyclic.

use crate::core::file::TaskFile;
use crate::core::task::Task;
use crate::error::{Error, Result};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{HashMap, HashSet};

/// Dependency graph over the tasks of a task file.
///
/// Nodes carry task ids. An edge `a -> b` means `b` depends on `a`, so
/// incoming neighbors are dependencies and outgoing neighbors are
/// dependents. Dependencies that name a missing task have no edge; they
/// are remembered separately so [`DependencyGraph::validate`] can report
/// them.
pub struct DependencyGraph {
    graph: DiGraph<String, ()>,
    index: HashMap<String, NodeIndex>,
    /// Task ids in file order.
    order: Vec<String>,
    /// Declared dependencies per task, in declaration order.
    declared: HashMap<String, Vec<String>>,
}

impl DependencyGraph {
    /// Build the graph from a task file.
    pub fn build(file: &TaskFile) -> Self {
        Self::from_tasks(&file.tasks)
    }

    pub fn from_tasks(tasks: &[Task]) -> Self {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();
        let mut order = Vec::with_capacity(tasks.len());
        let mut declared = HashMap::new();

        for task in tasks {
            if index.contains_key(&task.id) {
                continue;
            }
            let node = graph.add_node(task.id.clone());
            index.insert(task.id.clone(), node);
            order.push(task.id.clone());
            declared.insert(task.id.clone(), task.depends_on.clone());
        }

        for task in tasks {
            let Some(&to) = index.get(&task.id) else {
                continue;
            };
            for dep in &task.depends_on {
                if let Some(&from) = index.get(dep) {
                    if graph.find_edge(from, to).is_none() {
                        graph.add_edge(from, to, ());
                    }
                }
            }
        }

        Self {
            graph,
            index,
            order,
            declared,
        }
    }

    pub fn task_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Validate that every dependency exists and there are no cycles.
    ///
    /// The missing-dependency pass runs first, in file order, and stops at
    /// the first violation. Cycle detection is a depth-first search over an
    /// explicit work stack, so chain depth is bounded by the heap rather
    /// than the thread stack. The reported path runs from the first
    /// occurrence of the repeated node through the back-edge, so its first
    /// and last elements are equal.
    pub fn validate(&self) -> Result<()> {
        for id in &self.order {
            for dep in self.declared.get(id).into_iter().flatten() {
                if !self.index.contains_key(dep) {
                    return Err(Error::MissingDependency {
                        task_id: id.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        let mut visited: HashSet<&str> = HashSet::with_capacity(self.order.len());
        let mut on_stack: HashSet<&str> = HashSet::new();
        let mut path: Vec<&str> = Vec::new();
        // (task id, index of the next declared dependency to visit)
        let mut stack: Vec<(&str, usize)> = Vec::new();

        for root in &self.order {
            let root = root.as_str();
            if !visited.insert(root) {
                continue;
            }
            on_stack.insert(root);
            path.push(root);
            stack.push((root, 0));

            while let Some(top) = stack.last_mut() {
                let (id, next) = *top;
                let deps = self.declared.get(id).map(Vec::as_slice).unwrap_or(&[]);
                let Some(dep) = deps.get(next) else {
                    stack.pop();
                    path.pop();
                    on_stack.remove(id);
                    continue;
                };
                top.1 += 1;

                let dep = dep.as_str();
                if visited.insert(dep) {
                    on_stack.insert(dep);
                    path.push(dep);
                    stack.push((dep, 0));
                } else if on_stack.contains(dep) {
                    let start = path.iter().position(|p| *p == dep).unwrap_or(0);
                    let mut cycle: Vec<String> = path[start..].iter().map(|s| s.to_string()).collect();
                    cycle.push(dep.to_string());
                    return Err(Error::DependencyCycle { cycle });
                }
            }
        }
        Ok(())
    }

    /// Ids of the tasks that directly depend on `id`.
    pub fn dependents_of(&self, id: &str) -> Vec<&str> {
        self.neighbors(id, Direction::Outgoing)
    }

    /// Ids of the existing tasks that `id` directly depends on.
    pub fn dependencies_of(&self, id: &str) -> Vec<&str> {
        self.neighbors(id, Direction::Incoming)
    }

    fn neighbors(&self, id: &str, direction: Direction) -> Vec<&str> {
        let Some(&node) = self.index.get(id) else {
            return Vec::new();
        };
        let mut ids: Vec<&str> = self
            .graph
            .neighbors_directed(node, direction)
            .filter_map(|n| self.graph.node_weight(n).map(String::as_str))
            .collect();
        ids.sort_by(|a, b| crate::core::task::compare_ids(a, b));
        ids
    }

    /// Task ids in an order where every task follows its dependencies.
    ///
    /// # Errors
    /// Returns a cycle error if the graph is not acyclic.
    pub fn topological_order(&self) -> Result<Vec<&str>> {
        let sorted = toposort(&self.graph, None).map_err(|cycle| {
            let at = self
                .graph
                .node_weight(cycle.node_id())
                .cloned()
                .unwrap_or_else(|| "unknown".to_string());
            Error::DependencyCycle {
                cycle: vec![at.clone(), at],
            }
        })?;
        Ok(sorted
            .into_iter()
            .filter_map(|n| self.graph.node_weight(n).map(String::as_str))
            .collect())
    }
}

impl std::fmt::Debug for DependencyGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyGraph")
            .field("tasks", &self.graph.node_count())
            .field("dependencies", &self.graph.edge_count())
            .finish()
    }
}
