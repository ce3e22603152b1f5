//! Port traits (hexagonal architecture).
//!
//! These traits define the interfaces between the core domain and external
//! adapters: persistence, metrics, agent implementations, and the hosted
//! completion provider.

use crate::agent::AgentDescriptor;
use crate::context::ExecutionContext;
use crate::ids::{AgentId, SessionId};
use crate::session::ExecutionSession;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Repository for agent descriptors.
#[async_trait]
pub trait AgentRepository: Send + Sync {
    /// Create a new agent descriptor.
    async fn create(&self, agent: &AgentDescriptor) -> Result<AgentId>;

    /// Get a descriptor by ID.
    async fn get(&self, id: AgentId) -> Result<Option<AgentDescriptor>>;

    /// Descriptors due for scheduling: `schedule_enabled`, `next_run_at`
    /// has elapsed, and status permits pickup (not Running, not Error).
    async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<AgentDescriptor>>;

    /// Update a descriptor.
    async fn update(&self, agent: &AgentDescriptor) -> Result<()>;
}

/// Repository for execution sessions.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Create a new session row.
    async fn create(&self, session: &ExecutionSession) -> Result<SessionId>;

    /// Get a session by ID.
    async fn get(&self, id: SessionId) -> Result<Option<ExecutionSession>>;

    /// The open session (`completed_at` null) for an agent, if any.
    /// At most one exists at any time.
    async fn find_open(&self, agent_id: AgentId) -> Result<Option<ExecutionSession>>;

    /// Update a session row.
    async fn update(&self, session: &ExecutionSession) -> Result<()>;

    /// Most recent sessions for an agent, newest first.
    async fn list_for_agent(&self, agent_id: AgentId, limit: u32) -> Result<Vec<ExecutionSession>>;
}

/// Fire-and-forget metrics collaborator. The signature is infallible on
/// purpose: a failure to record a data point must never fail the
/// surrounding execution, so implementations swallow their own errors.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn record(&self, name: &str, value: f64, tags: &[(&str, &str)]);
}

/// One agent implementation: given a configuration, produce an output
/// value or fail. Implementations are opaque to the core and may call a
/// third-party LLM provider.
#[async_trait]
pub trait AgentExecutor: Send + Sync {
    async fn execute(&self, ctx: &ExecutionContext) -> Result<serde_json::Value>;
}

impl std::fmt::Debug for dyn AgentExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn AgentExecutor")
    }
}

/// Request to the hosted completion provider.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub prompt: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            max_tokens: None,
            temperature: None,
        }
    }
}

/// Completion returned by the provider.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub tokens_used: u64,
}

/// The external LLM provider, treated as an opaque collaborator that
/// returns text and token-usage counts, may fail, and may be slow.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion>;
}
