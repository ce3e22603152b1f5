//! Agent descriptor types.

use crate::ids::AgentId;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Persistent record describing an agent's identity, configuration,
/// schedule, and current status.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AgentDescriptor {
    pub id: AgentId,
    pub agent_type: AgentType,
    pub name: String,
    /// Free-form configuration handed to the executor as-is.
    pub config: serde_json::Value,
    pub status: AgentStatus,
    pub schedule_enabled: bool,
    /// Cron expression. Five-field expressions are accepted and normalized.
    pub schedule_expression: Option<String>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl AgentDescriptor {
    pub fn new(agent_type: AgentType, name: impl Into<String>, config: serde_json::Value) -> Self {
        Self {
            id: AgentId::new(),
            agent_type,
            name: name.into(),
            config,
            status: AgentStatus::Idle,
            schedule_enabled: false,
            schedule_expression: None,
            last_run_at: None,
            next_run_at: None,
            created_at: Utc::now(),
        }
    }
}

/// The fixed set of agent kinds. Each maps to one registered executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    ContentGeneration,
    TrendAnalysis,
    Outreach,
    EmailMarketing,
}

impl AgentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentType::ContentGeneration => "content_generation",
            AgentType::TrendAnalysis => "trend_analysis",
            AgentType::Outreach => "outreach",
            AgentType::EmailMarketing => "email_marketing",
        }
    }
}

impl std::fmt::Display for AgentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Idle,
    Running,
    Completed,
    Error,
    Paused,
}

impl AgentStatus {
    /// Whether the scheduler may pick this agent up in a due scan.
    /// `Error` is deliberately excluded to avoid infinite failure loops;
    /// clearing it requires an explicit operator action.
    pub fn is_schedulable(&self) -> bool {
        !matches!(self, AgentStatus::Running | AgentStatus::Error)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AgentStatus::Completed | AgentStatus::Error | AgentStatus::Paused
        )
    }
}
