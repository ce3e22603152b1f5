//! Execution session types.

use crate::event::AgentEvent;
use crate::ids::{AgentId, CampaignId, SessionId};
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Maximum length of the serialized output stored on a session row.
pub const OUTPUT_SUMMARY_MAX_CHARS: usize = 1000;

/// Persistent record of one run attempt of an agent, from start to
/// terminal outcome. Created at run start, completed exactly once,
/// immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ExecutionSession {
    pub id: SessionId,
    pub agent_id: AgentId,
    pub campaign_id: Option<CampaignId>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub success: Option<bool>,
    pub duration_ms: Option<u64>,
    /// Serialized result, truncated to [`OUTPUT_SUMMARY_MAX_CHARS`].
    pub output_summary: Option<String>,
    pub error_message: Option<String>,
    pub logs: Vec<AgentEvent>,
    pub metrics: Option<serde_json::Value>,
}

impl ExecutionSession {
    /// Open a new session for an agent run.
    pub fn open(agent_id: AgentId, campaign_id: Option<CampaignId>) -> Self {
        Self {
            id: SessionId::new(),
            agent_id,
            campaign_id,
            started_at: Utc::now(),
            completed_at: None,
            success: None,
            duration_ms: None,
            output_summary: None,
            error_message: None,
            logs: Vec::new(),
            metrics: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.completed_at.is_none()
    }
}

/// Truncate a serialized output value for storage on the session row.
pub fn truncate_summary(serialized: &str) -> String {
    if serialized.chars().count() <= OUTPUT_SUMMARY_MAX_CHARS {
        serialized.to_string()
    } else {
        serialized.chars().take(OUTPUT_SUMMARY_MAX_CHARS).collect()
    }
}
