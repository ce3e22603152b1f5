//! Error types for the NeonHub agent core.

use crate::agent::AgentType;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // Agent errors
    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Agent {0} already has an open execution session")]
    SessionAlreadyOpen(String),

    #[error("No executor registered for agent type: {0}")]
    ExecutorNotRegistered(AgentType),

    // Session errors
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    // Execution errors
    #[error("Execution failed: {0}")]
    Execution(String),

    #[error("Execution stopped by user")]
    Stopped,

    // Scheduling errors
    #[error("Invalid schedule expression '{expression}': {reason}")]
    InvalidSchedule { expression: String, reason: String },

    // Collaborator errors
    #[error("Completion provider error: {0}")]
    Completion(String),

    // Infrastructure errors
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl Error {
    /// Whether the runtime's inner retry loop may retry after this error.
    /// A cooperative stop and a missing executor registration are terminal
    /// for the attempt loop; everything an executor raises is transient.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Error::Stopped | Error::ExecutorNotRegistered(_) | Error::AgentNotFound(_)
        )
    }
}
