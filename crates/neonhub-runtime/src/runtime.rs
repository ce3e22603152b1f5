//! The agent runtime: one run, uniform bookkeeping.

use crate::options::ExecuteOptions;
use neonhub_core::agent::AgentDescriptor;
use neonhub_core::context::ExecutionContext;
use neonhub_core::event::{AgentEvent, AgentEventKind};
use neonhub_core::ids::SessionId;
use neonhub_core::ports::{AgentExecutor, MetricsSink, SessionRepository};
use neonhub_core::session::{truncate_summary, ExecutionSession};
use neonhub_core::{Error, Result};
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Executes one agent implementation with inner retry, event logging,
/// session bookkeeping, and metrics emission.
///
/// A runtime instance belongs to exactly one run: the manager constructs
/// it at `start_agent`, holds it in the running-handle map while the run
/// is in flight, and drops it when the run reaches a terminal outcome.
pub struct AgentRuntime {
    agent: AgentDescriptor,
    executor: Arc<dyn AgentExecutor>,
    sessions: Arc<dyn SessionRepository>,
    metrics: Arc<dyn MetricsSink>,
    cancel: CancellationToken,
    state: Mutex<RuntimeState>,
}

#[derive(Default)]
struct RuntimeState {
    is_running: bool,
    session_id: Option<SessionId>,
    event_count: usize,
    started_at: Option<Instant>,
}

/// Side-effect-free snapshot of a runtime's live state.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RuntimeStatus {
    pub is_running: bool,
    pub stop_requested: bool,
    pub session_id: Option<SessionId>,
    pub event_count: usize,
    pub execution_time_ms: u64,
}

impl AgentRuntime {
    pub fn new(
        agent: AgentDescriptor,
        executor: Arc<dyn AgentExecutor>,
        sessions: Arc<dyn SessionRepository>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            agent,
            executor,
            sessions,
            metrics,
            cancel: CancellationToken::new(),
            state: Mutex::new(RuntimeState::default()),
        }
    }

    pub fn agent(&self) -> &AgentDescriptor {
        &self.agent
    }

    /// Execute the agent once, with inner retry for transient failures.
    ///
    /// Creates the execution session at entry and completes it exactly
    /// once at the terminal outcome. The final error (exhausted retries,
    /// cooperative stop, or configuration problem) is re-raised to the
    /// caller after bookkeeping.
    pub async fn execute(&self, options: ExecuteOptions) -> Result<serde_json::Value> {
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if state.is_running {
                return Err(Error::SessionAlreadyOpen(self.agent.id.to_string()));
            }
            state.is_running = true;
        }

        let outcome = self.run(&options).await;
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.is_running = false;
            state.session_id = None;
            state.started_at = None;
        }
        outcome
    }

    async fn run(&self, options: &ExecuteOptions) -> Result<serde_json::Value> {
        // Exactly one open session per agent: refuse before creating a row.
        if let Some(open) = self.sessions.find_open(self.agent.id).await? {
            debug!(agent_id = %self.agent.id, session_id = %open.id, "Open session found");
            return Err(Error::SessionAlreadyOpen(self.agent.id.to_string()));
        }

        let mut session = ExecutionSession::open(self.agent.id, options.campaign_id);
        self.sessions.create(&session).await?;

        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.session_id = Some(session.id);
            state.started_at = Some(Instant::now());
            state.event_count = 0;
        }

        info!(
            agent_id = %self.agent.id,
            agent_type = %self.agent.agent_type,
            session_id = %session.id,
            "Starting agent execution"
        );

        let mut events = Vec::new();
        self.push_event(
            &mut events,
            AgentEvent::info(AgentEventKind::ExecutionStarted, "Execution started"),
        );

        let ctx = ExecutionContext::new(
            self.agent.id,
            self.agent.config.clone(),
            self.cancel.clone(),
        );

        let outcome = self.attempt_loop(&ctx, options, &mut events).await;

        self.complete_session(&mut session, &outcome, events, options)
            .await?;

        if options.track_metrics {
            self.emit_metrics(&session).await;
        }

        outcome
    }

    /// Attempts `0..=max_retries`. Retry *n* (counted from 1) waits
    /// `retry_delay_ms * 2^(n-1)` before running. A cooperative stop
    /// observed at an attempt boundary is terminal and never retried.
    async fn attempt_loop(
        &self,
        ctx: &ExecutionContext,
        options: &ExecuteOptions,
        events: &mut Vec<AgentEvent>,
    ) -> Result<serde_json::Value> {
        let mut last_err = Error::Internal("no attempt executed".to_string());

        for attempt in 0..=options.max_retries {
            if self.cancel.is_cancelled() {
                warn!(agent_id = %self.agent.id, "Stop requested, aborting before attempt");
                self.push_event(
                    events,
                    AgentEvent::warning(AgentEventKind::StopRequested, "Stopped by user"),
                );
                return Err(Error::Stopped);
            }

            match self.executor.execute(ctx).await {
                Ok(output) => {
                    self.push_event(
                        events,
                        AgentEvent::info(AgentEventKind::ExecutionCompleted, "Execution completed"),
                    );
                    return Ok(output);
                }
                Err(Error::Stopped) => {
                    self.push_event(
                        events,
                        AgentEvent::warning(AgentEventKind::StopRequested, "Stopped by user"),
                    );
                    return Err(Error::Stopped);
                }
                Err(e) if !e.is_retryable() => {
                    self.push_event(
                        events,
                        AgentEvent::error(AgentEventKind::ExecutionFailed, e.to_string()),
                    );
                    return Err(e);
                }
                Err(e) => {
                    if attempt < options.max_retries {
                        let retry_number = attempt + 1;
                        let delay_ms = options.retry_delay_ms << attempt;
                        warn!(
                            agent_id = %self.agent.id,
                            attempt = retry_number,
                            delay_ms,
                            error = %e,
                            "Attempt failed, retrying"
                        );
                        self.push_event(
                            events,
                            AgentEvent::warning(
                                AgentEventKind::RetryAttempt,
                                format!("Attempt {retry_number} failed: {e}"),
                            )
                            .with_payload(serde_json::json!({
                                "attempt": retry_number,
                                "delay_ms": delay_ms,
                            })),
                        );
                        last_err = e;
                        // A stop during the backoff wait shortens it; the
                        // check at the top of the loop turns it terminal.
                        tokio::select! {
                            _ = sleep(Duration::from_millis(delay_ms)) => {}
                            _ = self.cancel.cancelled() => {}
                        }
                    } else {
                        error!(agent_id = %self.agent.id, error = %e, "All attempts exhausted");
                        self.push_event(
                            events,
                            AgentEvent::error(AgentEventKind::ExecutionFailed, e.to_string()),
                        );
                        return Err(e);
                    }
                }
            }
        }

        Err(last_err)
    }

    /// Complete the session row exactly once. If a force-close (operator
    /// stop) already completed it, the row stays as the force-close wrote
    /// it and this write is skipped.
    async fn complete_session(
        &self,
        session: &mut ExecutionSession,
        outcome: &Result<serde_json::Value>,
        events: Vec<AgentEvent>,
        options: &ExecuteOptions,
    ) -> Result<()> {
        let completed_at = chrono::Utc::now();
        let duration_ms = (completed_at - session.started_at).num_milliseconds().max(0) as u64;
        let tokens_used = options.tokens_used.or_else(|| {
            outcome
                .as_ref()
                .ok()
                .and_then(|v| v.get("tokens_used"))
                .and_then(|t| t.as_u64())
        });

        session.completed_at = Some(completed_at);
        session.duration_ms = Some(duration_ms);
        session.logs = events;
        session.metrics = Some(serde_json::json!({
            "execution_time_ms": duration_ms,
            "tokens_used": tokens_used,
            "success": outcome.is_ok(),
        }));

        match outcome {
            Ok(output) => {
                session.success = Some(true);
                session.output_summary = Some(truncate_summary(&serde_json::to_string(output)?));
            }
            Err(e) => {
                session.success = Some(false);
                session.error_message = Some(e.to_string());
            }
        }

        if let Some(existing) = self.sessions.get(session.id).await? {
            if !existing.is_open() {
                debug!(session_id = %session.id, "Session already closed, skipping update");
                return Ok(());
            }
        }

        self.sessions.update(session).await
    }

    async fn emit_metrics(&self, session: &ExecutionSession) {
        let agent_id = self.agent.id.to_string();
        let tags = [
            ("agent_id", agent_id.as_str()),
            ("agent_type", self.agent.agent_type.as_str()),
        ];

        let duration_ms = session.duration_ms.unwrap_or(0) as f64;
        self.metrics
            .record("agent.execution_time_ms", duration_ms, &tags)
            .await;

        let success = if session.success == Some(true) { 1.0 } else { 0.0 };
        self.metrics
            .record("agent.execution_success", success, &tags)
            .await;

        if let Some(tokens) = session
            .metrics
            .as_ref()
            .and_then(|m| m.get("tokens_used"))
            .and_then(|t| t.as_u64())
        {
            self.metrics
                .record("agent.tokens_used", tokens as f64, &tags)
                .await;
        }
    }

    /// Request a cooperative stop. The implementation observes the token
    /// at its own safe points; nothing is forcibly interrupted. A no-op
    /// while idle.
    pub fn stop(&self) {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if !state.is_running {
            debug!(agent_id = %self.agent.id, "Stop requested while idle, ignoring");
            return;
        }
        info!(agent_id = %self.agent.id, "Stop requested");
        self.cancel.cancel();
    }

    /// Live snapshot of this runtime. Side-effect free.
    pub fn status(&self) -> RuntimeStatus {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        RuntimeStatus {
            is_running: state.is_running,
            stop_requested: self.cancel.is_cancelled(),
            session_id: state.session_id,
            event_count: state.event_count,
            execution_time_ms: state
                .started_at
                .map(|s| s.elapsed().as_millis() as u64)
                .unwrap_or(0),
        }
    }

    fn push_event(&self, events: &mut Vec<AgentEvent>, event: AgentEvent) {
        events.push(event);
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.event_count = events.len();
    }
}
