//! Executor registry: agent type to implementation lookup.

use neonhub_core::agent::AgentType;
use neonhub_core::ports::AgentExecutor;
use neonhub_core::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Maps each agent type to its executor. Built once at the composition
/// root; an agent whose type has no registration is a configuration
/// error, not a retryable failure.
#[derive(Default)]
pub struct ExecutorRegistry {
    executors: HashMap<AgentType, Arc<dyn AgentExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, agent_type: AgentType, executor: Arc<dyn AgentExecutor>) {
        self.executors.insert(agent_type, executor);
    }

    pub fn with(mut self, agent_type: AgentType, executor: Arc<dyn AgentExecutor>) -> Self {
        self.register(agent_type, executor);
        self
    }

    pub fn get(&self, agent_type: AgentType) -> Result<Arc<dyn AgentExecutor>> {
        self.executors
            .get(&agent_type)
            .cloned()
            .ok_or(Error::ExecutorNotRegistered(agent_type))
    }

    pub fn registered_types(&self) -> Vec<AgentType> {
        self.executors.keys().copied().collect()
    }
}
