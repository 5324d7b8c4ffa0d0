//! Explicit registries for selection strategies and agent backends.
//!
//! Both are built once at startup and handed to whoever needs them, so
//! there is no process-wide mutable state.

use crate::agent::{Agent, ClaudeAgent, CodexAgent, CommandAgent};
use crate::config::{AgentSettings, Strategy};
use crate::error::{Error, Result};
use crate::orchestration::selector::{self, SelectionStrategy};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

/// Strategies keyed by name.
#[derive(Clone, Default)]
pub struct StrategyRegistry {
    strategies: BTreeMap<String, Arc<dyn SelectionStrategy>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding `priority`, `dependency` and `mixed`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for strategy in [Strategy::Priority, Strategy::Dependency, Strategy::Mixed] {
            registry.register(selector::builtin(strategy));
        }
        registry
    }

    /// Add a strategy under its own name, replacing any previous entry.
    pub fn register(&mut self, strategy: Arc<dyn SelectionStrategy>) {
        self.strategies.insert(strategy.name().to_string(), strategy);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn SelectionStrategy>> {
        self.strategies.get(name).cloned()
    }

    /// Look up `name`, falling back to priority ordering for unknown names.
    pub fn resolve(&self, name: &str) -> Arc<dyn SelectionStrategy> {
        if let Some(strategy) = self.get(name) {
            return strategy;
        }
        warn!(strategy = %name, "unknown selection strategy, using priority");
        self.get(Strategy::Priority.as_str())
            .unwrap_or_else(|| selector::builtin(Strategy::Priority))
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.strategies.keys().map(String::as_str).collect()
    }
}

impl std::fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyRegistry")
            .field("strategies", &self.names())
            .finish()
    }
}

/// Builds an agent from its settings.
pub type AgentFactory = Arc<dyn Fn(&AgentSettings) -> Result<Arc<dyn Agent>> + Send + Sync>;

/// Agent factories keyed by agent type.
#[derive(Clone, Default)]
pub struct AgentRegistry {
    factories: BTreeMap<String, AgentFactory>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the `claude` and `codex` backends.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(crate::agent::claude::AGENT_TYPE, |settings| {
            Ok(Arc::new(ClaudeAgent::new(settings)?) as Arc<dyn Agent>)
        });
        registry.register(crate::agent::codex::AGENT_TYPE, |settings| {
            Ok(Arc::new(CodexAgent::new(settings)?) as Arc<dyn Agent>)
        });
        registry
    }

    pub fn register<F>(&mut self, agent_type: &str, factory: F)
    where
        F: Fn(&AgentSettings) -> Result<Arc<dyn Agent>> + Send + Sync + 'static,
    {
        self.factories
            .insert(agent_type.to_string(), Arc::new(factory));
    }

    pub fn contains(&self, agent_type: &str) -> bool {
        self.factories.contains_key(agent_type)
    }

    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Build an agent of `agent_type`.
    ///
    /// Unregistered types run as a generic [`CommandAgent`] when a binary
    /// is configured for them.
    ///
    /// # Errors
    /// [`Error::AgentNotAvailable`] when the type is unknown and has no
    /// binary, or when the factory cannot find its binary.
    pub fn create(&self, agent_type: &str, settings: &AgentSettings) -> Result<Arc<dyn Agent>> {
        if let Some(factory) = self.factories.get(agent_type) {
            return factory(settings);
        }
        match settings.binary.as_deref() {
            Some(binary) => {
                let agent = CommandAgent::from_settings(agent_type, binary, settings)?;
                Ok(Arc::new(agent))
            }
            None => Err(Error::AgentNotAvailable(format!(
                "unknown agent type {:?} (registered: {}) and no binary configured",
                agent_type,
                self.names().join(", ")
            ))),
        }
    }
}

impl std::fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRegistry")
            .field("agents", &self.names())
            .finish()
    }
}
