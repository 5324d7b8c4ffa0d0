use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::{Error, Result};

/// Default timeout for a single agent invocation (30 minutes).
pub const DEFAULT_AGENT_TIMEOUT_SECS: u64 = 30 * 60;

/// Name of the per-project config file looked up in the work dir.
pub const PROJECT_CONFIG_FILE: &str = "looper.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Task file path, relative to the work dir unless absolute.
    pub todo_file: PathBuf,
    /// Directory holding prompt templates; defaults to `<work_dir>/prompts`.
    pub prompt_dir: Option<PathBuf>,
    /// Iteration cap for sequential mode.
    pub max_iterations: u32,
    /// Pause between sequential iterations.
    pub loop_delay_secs: u64,
    /// Agent type used for task iterations.
    pub agent: String,
    pub agents: BTreeMap<String, AgentSettings>,
    pub parallel: ParallelConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            todo_file: PathBuf::from("to-do.json"),
            prompt_dir: None,
            max_iterations: 50,
            loop_delay_secs: 0,
            agent: "claude".to_string(),
            agents: BTreeMap::new(),
            parallel: ParallelConfig::default(),
        }
    }
}

/// How the prompt reaches the agent process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PromptFormat {
    #[default]
    Stdin,
    Arg,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    /// Binary name or path. Looked up on PATH when unset.
    pub binary: Option<String>,
    pub model: Option<String>,
    /// Extra arguments placed before the prompt.
    pub args: Vec<String>,
    pub prompt_format: PromptFormat,
    /// Seconds; 0 disables the timeout. Unset means the 30 minute default.
    pub timeout_secs: Option<u64>,
    /// Working directory for the agent process.
    #[serde(skip)]
    pub work_dir: Option<PathBuf>,
}

impl AgentSettings {
    pub fn timeout(&self) -> Option<Duration> {
        match self.timeout_secs {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => Some(Duration::from_secs(DEFAULT_AGENT_TIMEOUT_SECS)),
        }
    }
}

/// Built-in task selection strategies for parallel mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    #[default]
    Priority,
    Dependency,
    Mixed,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Priority => "priority",
            Strategy::Dependency => "dependency",
            Strategy::Mixed => "mixed",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Strategy {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "priority" => Ok(Strategy::Priority),
            "dependency" => Ok(Strategy::Dependency),
            "mixed" => Ok(Strategy::Mixed),
            other => Err(Error::UnknownStrategy(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParallelConfig {
    pub enabled: bool,
    /// Concurrency ceiling; 0 means unlimited.
    pub max_tasks: usize,
    /// 1 runs a single agent; more enables consensus.
    pub max_agents_per_task: usize,
    /// Selection strategy name, resolved through the strategy registry.
    pub strategy: String,
    pub fail_fast: bool,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_tasks: 3,
            max_agents_per_task: 1,
            strategy: Strategy::Priority.to_string(),
            fail_fast: false,
        }
    }
}

impl Config {
    pub fn looper_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".looper"))
    }

    pub fn user_config_path() -> Result<PathBuf> {
        Ok(Self::looper_dir()?.join("config.toml"))
    }

    /// Load `looper.toml` from the work dir, then `~/.looper/config.toml`,
    /// then fall back to defaults.
    pub fn load(work_dir: &Path) -> Result<Self> {
        let project = work_dir.join(PROJECT_CONFIG_FILE);
        if project.exists() {
            return Self::load_from(&project);
        }
        match Self::user_config_path() {
            Ok(path) if path.exists() => Self::load_from(&path),
            _ => {
                debug!("Config file not found, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "Config::load");
        let config: Self = toml::from_str(&fs::read_to_string(path)?)?;
        debug!(
            agent = %config.agent,
            parallel = config.parallel.enabled,
            max_tasks = config.parallel.max_tasks,
            strategy = %config.parallel.strategy,
            "Config loaded"
        );
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        debug!(path = %path.display(), "Config saved");
        Ok(())
    }

    /// Task file location resolved against the work dir.
    pub fn todo_path(&self, work_dir: &Path) -> PathBuf {
        resolve(work_dir, &self.todo_file)
    }

    pub fn prompt_dir(&self, work_dir: &Path) -> PathBuf {
        match &self.prompt_dir {
            Some(dir) => resolve(work_dir, &expand_tilde(dir)),
            None => work_dir.join("prompts"),
        }
    }

    /// Settings for an agent type, with the work dir filled in.
    pub fn agent_settings(&self, agent: &str, work_dir: &Path) -> AgentSettings {
        let mut settings = self.agents.get(agent).cloned().unwrap_or_default();
        settings.work_dir = Some(work_dir.to_path_buf());
        settings
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}
