//! In-memory execution events.
//!
//! Events are buffered by the runtime for the duration of one `execute`
//! call and flushed into the session's `logs` field at completion. They
//! are never persisted on their own.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AgentEventKind {
    ExecutionStarted,
    ExecutionCompleted,
    ExecutionFailed,
    RetryAttempt,
    StopRequested,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AgentEvent {
    pub kind: AgentEventKind,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub payload: Option<serde_json::Value>,
    pub severity: Severity,
}

impl AgentEvent {
    pub fn new(kind: AgentEventKind, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
            message: message.into(),
            payload: None,
            severity,
        }
    }

    pub fn info(kind: AgentEventKind, message: impl Into<String>) -> Self {
        Self::new(kind, Severity::Info, message)
    }

    pub fn warning(kind: AgentEventKind, message: impl Into<String>) -> Self {
        Self::new(kind, Severity::Warning, message)
    }

    pub fn error(kind: AgentEventKind, message: impl Into<String>) -> Self {
        Self::new(kind, Severity::Error, message)
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }
}
