//! Generic subprocess agent.
//!
//! Runs a binary with a fixed argument list, feeds it the prompt, and
//! parses the summary from stdout. The child is killed when cancellation
//! fires or the timeout elapses.

use super::{parse, Agent, AgentSummary};
use crate::config::{AgentSettings, PromptFormat};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct CommandAgent {
    name: String,
    binary: PathBuf,
    args: Vec<String>,
    prompt_format: PromptFormat,
    work_dir: Option<PathBuf>,
    timeout: Option<Duration>,
}

impl CommandAgent {
    /// Create an agent that runs `binary` with no extra arguments, the
    /// prompt on stdin and no timeout.
    pub fn new(name: &str, binary: impl Into<PathBuf>) -> Self {
        Self {
            name: name.to_string(),
            binary: binary.into(),
            args: Vec::new(),
            prompt_format: PromptFormat::Stdin,
            work_dir: None,
            timeout: None,
        }
    }

    /// Build from configured settings, resolving the binary on PATH.
    ///
    /// # Errors
    /// Returns [`Error::AgentNotAvailable`] if the binary cannot be found.
    pub fn from_settings(name: &str, default_binary: &str, settings: &AgentSettings) -> Result<Self> {
        let wanted = settings.binary.as_deref().unwrap_or(default_binary);
        let binary = which::which(wanted).map_err(|_| {
            Error::AgentNotAvailable(format!("{}: binary {:?} not found", name, wanted))
        })?;
        let mut agent = Self::new(name, binary)
            .with_args(settings.args.iter().cloned())
            .with_prompt_format(settings.prompt_format)
            .with_timeout(settings.timeout());
        agent.work_dir = settings.work_dir.clone();
        Ok(agent)
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn with_prompt_format(mut self, format: PromptFormat) -> Self {
        self.prompt_format = format;
        self
    }

    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = Some(dir.into());
        self
    }

    /// `None` disables the timeout.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn prompt_format(&self) -> PromptFormat {
        self.prompt_format
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn work_dir(&self) -> Option<&Path> {
        self.work_dir.as_deref()
    }

    fn command(&self, prompt: &str) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(&self.args);
        match self.prompt_format {
            PromptFormat::Arg => {
                cmd.arg(prompt).stdin(Stdio::null());
            }
            PromptFormat::Stdin => {
                cmd.stdin(Stdio::piped());
            }
        }
        if let Some(dir) = &self.work_dir {
            cmd.current_dir(dir);
        }
        cmd.stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    /// Run the process to completion and return its captured output.
    ///
    /// # Errors
    /// [`Error::Cancelled`] if `cancel` fires first, [`Error::Timeout`] if
    /// the timeout elapses. The child is killed in both cases.
    pub async fn exec(&self, cancel: &CancellationToken, prompt: &str) -> Result<Output> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        debug!(agent = %self.name, binary = %self.binary.display(), "spawning agent");
        let mut child = self.command(prompt).spawn().map_err(|e| Error::AgentFailed {
            agent: self.name.clone(),
            message: format!("failed to start {}: {}", self.binary.display(), e),
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            let mut input = prompt.to_string();
            if !input.ends_with('\n') {
                input.push('\n');
            }
            let name = self.name.clone();
            tokio::spawn(async move {
                // Dropping stdin afterwards signals EOF.
                if let Err(e) = stdin.write_all(input.as_bytes()).await {
                    debug!(agent = %name, error = %e, "agent closed stdin early");
                }
            });
        }

        let timeout = self.timeout;
        let wait = async move {
            let run = child.wait_with_output();
            match timeout {
                Some(limit) => match tokio::time::timeout(limit, run).await {
                    Ok(output) => output.map_err(Error::from),
                    Err(_) => Err(Error::Timeout(limit)),
                },
                None => run.await.map_err(Error::from),
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(agent = %self.name, "agent cancelled");
                Err(Error::Cancelled)
            }
            output = wait => output,
        }
    }
}

#[async_trait]
impl Agent for CommandAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, cancel: &CancellationToken, prompt: &str) -> Result<AgentSummary> {
        let output = self.exec(cancel, prompt).await?;
        let stdout = String::from_utf8_lossy(&output.stdout);

        match parse::parse_summary(&stdout) {
            Ok(summary) => {
                if !output.status.success() {
                    warn!(agent = %self.name, code = ?output.status.code(), "agent exited non-zero but printed a summary");
                }
                Ok(summary)
            }
            Err(err) if output.status.success() => Err(err),
            Err(_) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let message = if stderr.trim().is_empty() {
                    format!(
                        "exited with code {}",
                        output.status.code().unwrap_or(-1)
                    )
                } else {
                    stderr.trim().to_string()
                };
                Err(Error::AgentFailed {
                    agent: self.name.clone(),
                    message,
                })
            }
        }
    }
}
