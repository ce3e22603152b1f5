//! Start/stop operations over the running-agent registry.

use crate::registry::ExecutorRegistry;
use chrono::{DateTime, Utc};
use neonhub_core::agent::{AgentDescriptor, AgentStatus, AgentType};
use neonhub_core::ids::AgentId;
use neonhub_core::ports::{AgentRepository, MetricsSink, SessionRepository};
use neonhub_core::session::ExecutionSession;
use neonhub_core::{Error, Result};
use neonhub_runtime::{AgentRuntime, ExecuteOptions, RuntimeStatus};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Outcome of a start request. Starting an agent that is already running
/// is an idempotent no-op, not a failure.
#[derive(Debug)]
pub enum StartOutcome {
    Started(serde_json::Value),
    AlreadyRunning,
}

struct RunningHandle {
    runtime: Arc<AgentRuntime>,
    started_at: DateTime<Utc>,
}

/// Point-in-time view of one running agent.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RunningAgentSnapshot {
    pub agent_id: AgentId,
    pub agent_type: AgentType,
    pub name: String,
    pub started_at: DateTime<Utc>,
    pub runtime: RuntimeStatus,
}

/// Persisted descriptor merged with the live runtime view.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AgentStatusReport {
    pub agent: AgentDescriptor,
    pub runtime: Option<RuntimeStatus>,
    pub last_session: Option<ExecutionSession>,
}

/// Tracks which agents are currently running and owns their runtime
/// instances. The handle map is the only shared mutable state touched by
/// both scheduler dispatch and manual start/stop calls; all access goes
/// through one `RwLock` so two concurrent starts for the same agent
/// cannot both proceed.
pub struct AgentManager {
    agents: Arc<dyn AgentRepository>,
    sessions: Arc<dyn SessionRepository>,
    metrics: Arc<dyn MetricsSink>,
    registry: ExecutorRegistry,
    running: RwLock<HashMap<AgentId, RunningHandle>>,
}

impl AgentManager {
    pub fn new(
        agents: Arc<dyn AgentRepository>,
        sessions: Arc<dyn SessionRepository>,
        metrics: Arc<dyn MetricsSink>,
        registry: ExecutorRegistry,
    ) -> Self {
        Self {
            agents,
            sessions,
            metrics,
            registry,
            running: RwLock::new(HashMap::new()),
        }
    }

    /// Start an agent and drive it to a terminal outcome.
    ///
    /// The already-running check and the handle insertion happen under a
    /// single write-lock acquisition; the descriptor moves to `Running`
    /// before the handle becomes visible. The call resolves when the run
    /// finishes — callers that must not block (the scheduler tick) spawn
    /// it onto its own task.
    pub async fn start_agent(
        &self,
        agent_id: AgentId,
        options: ExecuteOptions,
    ) -> Result<StartOutcome> {
        let runtime = {
            let mut running = self.running.write().await;
            if running.contains_key(&agent_id) {
                info!(agent_id = %agent_id, "Agent already running, skipping start");
                return Ok(StartOutcome::AlreadyRunning);
            }

            let mut descriptor = self
                .agents
                .get(agent_id)
                .await?
                .ok_or_else(|| Error::AgentNotFound(agent_id.to_string()))?;
            let executor = self.registry.get(descriptor.agent_type)?;

            descriptor.status = AgentStatus::Running;
            descriptor.last_run_at = Some(Utc::now());
            self.agents.update(&descriptor).await?;

            info!(
                agent_id = %agent_id,
                agent_type = %descriptor.agent_type,
                name = %descriptor.name,
                "Starting agent"
            );

            let runtime = Arc::new(AgentRuntime::new(
                descriptor,
                executor,
                Arc::clone(&self.sessions),
                Arc::clone(&self.metrics),
            ));
            running.insert(
                agent_id,
                RunningHandle {
                    runtime: Arc::clone(&runtime),
                    started_at: Utc::now(),
                },
            );
            runtime
        };

        let result = runtime.execute(options).await;

        // The handle is removed unconditionally, whatever the outcome.
        self.running.write().await.remove(&agent_id);

        match result {
            Ok(output) => {
                self.set_status(agent_id, AgentStatus::Completed).await?;
                info!(agent_id = %agent_id, "Agent completed");
                Ok(StartOutcome::Started(output))
            }
            Err(Error::Stopped) => {
                // A cooperative stop is a pause, not a failure.
                self.set_status(agent_id, AgentStatus::Paused).await?;
                Err(Error::Stopped)
            }
            Err(e) => {
                warn!(agent_id = %agent_id, error = %e, "Agent failed");
                self.set_status(agent_id, AgentStatus::Error).await?;
                Err(e)
            }
        }
    }

    /// Manual trigger. Bypasses the scheduler's due-time check but still
    /// goes through the running-handle guard.
    pub async fn run_now(&self, agent_id: AgentId, options: ExecuteOptions) -> Result<StartOutcome> {
        info!(agent_id = %agent_id, "Manual run requested");
        self.start_agent(agent_id, options).await
    }

    /// Request a cooperative stop. A no-op with a log line when the agent
    /// is not running. The open session is force-closed here so a slow
    /// implementation cannot leave a permanently-open row.
    pub async fn stop_agent(&self, agent_id: AgentId) -> Result<()> {
        let runtime = {
            let running = self.running.read().await;
            match running.get(&agent_id) {
                Some(handle) => Arc::clone(&handle.runtime),
                None => {
                    info!(agent_id = %agent_id, "Stop requested for agent that is not running");
                    return Ok(());
                }
            }
        };

        runtime.stop();
        self.set_status(agent_id, AgentStatus::Paused).await?;

        if let Some(mut open) = self.sessions.find_open(agent_id).await? {
            open.completed_at = Some(Utc::now());
            open.success = Some(false);
            open.error_message = Some("Stopped by operator before completion".to_string());
            open.duration_ms =
                Some((Utc::now() - open.started_at).num_milliseconds().max(0) as u64);
            self.sessions.update(&open).await?;
            info!(agent_id = %agent_id, session_id = %open.id, "Force-closed open session");
        }

        Ok(())
    }

    /// Persisted descriptor merged with the live runtime snapshot when
    /// running. Succeeds for idle agents too.
    pub async fn get_agent_status(&self, agent_id: AgentId) -> Result<AgentStatusReport> {
        let agent = self
            .agents
            .get(agent_id)
            .await?
            .ok_or_else(|| Error::AgentNotFound(agent_id.to_string()))?;

        let runtime = {
            let running = self.running.read().await;
            running.get(&agent_id).map(|h| h.runtime.status())
        };

        let last_session = self
            .sessions
            .list_for_agent(agent_id, 1)
            .await?
            .into_iter()
            .next();

        Ok(AgentStatusReport {
            agent,
            runtime,
            last_session,
        })
    }

    /// Point-in-time list of running agents. Observability only; the
    /// scheduler keeps its own due-list.
    pub async fn get_running_agents(&self) -> Vec<RunningAgentSnapshot> {
        let running = self.running.read().await;
        running
            .values()
            .map(|handle| {
                let agent = handle.runtime.agent();
                RunningAgentSnapshot {
                    agent_id: agent.id,
                    agent_type: agent.agent_type,
                    name: agent.name.clone(),
                    started_at: handle.started_at,
                    runtime: handle.runtime.status(),
                }
            })
            .collect()
    }

    /// Number of currently running agents.
    pub async fn running_count(&self) -> usize {
        self.running.read().await.len()
    }

    /// Explicit unstick operation: reset an `Error` descriptor to `Idle`
    /// so the scheduler may pick it up again. A no-op for any other
    /// status. `Error` agents are never re-included in the due scan
    /// without this call.
    pub async fn clear_error(&self, agent_id: AgentId) -> Result<()> {
        let mut descriptor = self
            .agents
            .get(agent_id)
            .await?
            .ok_or_else(|| Error::AgentNotFound(agent_id.to_string()))?;

        if descriptor.status != AgentStatus::Error {
            info!(agent_id = %agent_id, status = ?descriptor.status, "Nothing to clear");
            return Ok(());
        }

        descriptor.status = AgentStatus::Idle;
        if descriptor.schedule_enabled && descriptor.next_run_at.is_none() {
            descriptor.next_run_at = Some(Utc::now());
        }
        self.agents.update(&descriptor).await?;
        info!(agent_id = %agent_id, "Cleared error status");
        Ok(())
    }

    async fn set_status(&self, agent_id: AgentId, status: AgentStatus) -> Result<()> {
        // Re-read so scheduler writes to next_run_at are not clobbered.
        if let Some(mut descriptor) = self.agents.get(agent_id).await? {
            descriptor.status = status;
            self.agents.update(&descriptor).await?;
        }
        Ok(())
    }
}
