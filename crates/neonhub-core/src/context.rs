//! Execution context handed to agent executors.

use crate::ids::AgentId;
use tokio_util::sync::CancellationToken;

/// Per-run context passed to an executor's `execute` call.
///
/// Cancellation is cooperative: executors are expected to poll
/// [`ExecutionContext::is_stop_requested`] at safe points (between items,
/// between provider calls) and return [`crate::Error::Stopped`] when it
/// fires. Nothing forcibly interrupts an in-flight call.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    agent_id: AgentId,
    config: serde_json::Value,
    cancel: CancellationToken,
}

impl ExecutionContext {
    pub fn new(agent_id: AgentId, config: serde_json::Value, cancel: CancellationToken) -> Self {
        Self {
            agent_id,
            config,
            cancel,
        }
    }

    pub fn agent_id(&self) -> AgentId {
        self.agent_id
    }

    pub fn config(&self) -> &serde_json::Value {
        &self.config
    }

    pub fn is_stop_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }
}
