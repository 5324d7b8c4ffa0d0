//! Task executor: one task attempt through one or more agents.
//!
//! With one agent per task the agent's summary is final. With more, every
//! agent runs the same prompt concurrently, the executor waits for all of
//! them, and the successful summaries are fused by [`consensus::reduce`].

use crate::agent::{Agent, AgentSummary};
use crate::core::Task;
use crate::error::{Error, Result};
use crate::orchestration::consensus;
use crate::prompts::{PromptData, PromptRenderer};
use futures::future::join_all;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Everything the executor needs to know about one dispatched task.
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub todo_path: PathBuf,
    pub work_dir: PathBuf,
    /// Snapshot of the task taken when it was dispatched.
    pub task: Task,
}

pub struct TaskExecutor {
    agent: Arc<dyn Agent>,
    renderer: Arc<dyn PromptRenderer>,
    max_agents: usize,
}

impl TaskExecutor {
    /// # Arguments
    ///
    /// * `agent` - Backend every invocation goes through
    /// * `renderer` - Produces the iteration prompt
    /// * `max_agents` - Agents per task; values above 1 enable consensus
    pub fn new(agent: Arc<dyn Agent>, renderer: Arc<dyn PromptRenderer>, max_agents: usize) -> Self {
        Self {
            agent,
            renderer,
            max_agents: max_agents.max(1),
        }
    }

    pub fn agent_name(&self) -> &str {
        self.agent.name()
    }

    pub fn max_agents(&self) -> usize {
        self.max_agents
    }

    /// Run one attempt of `ctx.task`.
    ///
    /// # Errors
    ///
    /// - [`Error::Prompt`] if the prompt cannot be rendered; no agent runs.
    /// - [`Error::Cancelled`] if `cancel` fires.
    /// - The agent's own error when a single agent fails.
    /// - [`Error::ConsensusFailed`] when every one of several agents fails.
    pub async fn execute(
        &self,
        cancel: &CancellationToken,
        ctx: &TaskContext,
        iteration: u32,
    ) -> Result<AgentSummary> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let data = PromptData::new(
            &ctx.todo_path,
            &ctx.work_dir,
            &ctx.task,
            iteration,
            self.agent.name(),
        );
        let prompt = self.renderer.render(&data)?;

        if self.max_agents == 1 {
            debug!(task_id = %ctx.task.id, agent = %self.agent.name(), iteration, "running agent");
            return self.agent.run(cancel, &prompt).await;
        }

        info!(
            task_id = %ctx.task.id,
            agents = self.max_agents,
            iteration,
            "running agents for consensus"
        );
        let runs = (0..self.max_agents).map(|_| self.agent.run(cancel, &prompt));
        let outcomes = join_all(runs).await;

        let mut summaries = Vec::new();
        let mut causes = Vec::new();
        for (i, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                Ok(summary) => summaries.push(summary),
                Err(err) => {
                    warn!(task_id = %ctx.task.id, agent_index = i, error = %err, "agent failed");
                    causes.push(format!("agent {}: {}", i, err));
                }
            }
        }

        if summaries.is_empty() {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            return Err(Error::ConsensusFailed {
                agents: self.max_agents,
                causes,
            });
        }
        Ok(consensus::reduce(&summaries))
    }
}

impl std::fmt::Debug for TaskExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskExecutor")
            .field("agent", &self.agent.name())
            .field("max_agents", &self.max_agents)
            .finish()
    }
}
