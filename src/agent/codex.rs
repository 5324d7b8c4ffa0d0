//! Codex CLI backend: `codex exec [--model m] -` with the prompt on stdin.

use super::{Agent, AgentSummary, CommandAgent};
use crate::config::{AgentSettings, PromptFormat};
use crate::error::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

pub const AGENT_TYPE: &str = "codex";

#[derive(Debug, Clone)]
pub struct CodexAgent {
    inner: CommandAgent,
}

impl CodexAgent {
    pub fn new(settings: &AgentSettings) -> Result<Self> {
        let base = CommandAgent::from_settings(AGENT_TYPE, AGENT_TYPE, settings)?;
        Ok(Self::from_command(base, settings.model.as_deref()))
    }

    pub fn with_binary(binary: PathBuf, model: Option<&str>) -> Self {
        Self::from_command(CommandAgent::new(AGENT_TYPE, binary), model)
    }

    fn from_command(base: CommandAgent, model: Option<&str>) -> Self {
        let mut args = vec!["exec".to_string()];
        if let Some(model) = model {
            args.push("--model".to_string());
            args.push(model.to_string());
        }
        args.extend(base.args().iter().cloned());
        // "-" reads the prompt from stdin.
        args.push("-".to_string());

        let mut inner = CommandAgent::new(AGENT_TYPE, base.binary())
            .with_args(args)
            .with_prompt_format(PromptFormat::Stdin)
            .with_timeout(base.timeout());
        if let Some(dir) = base.work_dir() {
            inner = inner.with_work_dir(dir);
        }
        Self { inner }
    }

    pub fn command(&self) -> &CommandAgent {
        &self.inner
    }
}

#[async_trait]
impl Agent for CodexAgent {
    fn name(&self) -> &str {
        AGENT_TYPE
    }

    async fn run(&self, cancel: &CancellationToken, prompt: &str) -> Result<AgentSummary> {
        self.inner.run(cancel, prompt).await
    }
}
