//! The scheduling control loop.

use crate::config::SchedulerConfig;
use crate::schedule;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use neonhub_core::agent::{AgentDescriptor, AgentStatus};
use neonhub_core::ids::AgentId;
use neonhub_core::ports::AgentRepository;
use neonhub_core::{Error, Result};
use neonhub_manager::{AgentManager, StartOutcome};
use neonhub_runtime::ExecuteOptions;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};
use tracing::{debug, info, warn};

/// Per-agent scheduling metadata. Owned exclusively by the scheduler;
/// reset on success, incremented on dispatch failure.
#[derive(Debug, Clone, Default)]
struct TaskState {
    retry_count: u32,
    last_failure: Option<String>,
    next_run_at: Option<DateTime<Utc>>,
}

/// Read-only per-agent view for introspection.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TaskDetails {
    pub agent_id: AgentId,
    pub retry_count: u32,
    pub last_failure: Option<String>,
    pub next_run_at: Option<DateTime<Utc>>,
}

/// Read-only scheduler view.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SchedulerStats {
    pub is_running: bool,
    pub tracked_agents: usize,
    pub running_agents: usize,
}

struct SchedulerInner {
    config: SchedulerConfig,
    agents: Arc<dyn AgentRepository>,
    manager: Arc<AgentManager>,
    tasks: Mutex<HashMap<AgentId, TaskState>>,
}

/// The periodic control loop deciding which due agents to dispatch.
///
/// One instance per process; running two schedulers against the same
/// descriptor store would double-dispatch, as there is no distributed
/// coordination. State machine is `Stopped -> Running -> Stopped`, and
/// both transitions are idempotent.
pub struct AgentScheduler {
    inner: Arc<SchedulerInner>,
    shutdown_tx: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl AgentScheduler {
    pub fn new(
        config: SchedulerConfig,
        agents: Arc<dyn AgentRepository>,
        manager: Arc<AgentManager>,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(SchedulerInner {
                config,
                agents,
                manager,
                tasks: Mutex::new(HashMap::new()),
            }),
            shutdown_tx,
            handle: Mutex::new(None),
        }
    }

    /// Start the tick loop. A no-op when already running.
    pub async fn start(&self) {
        let mut handle = self.handle.lock().await;
        if handle.is_some() {
            info!("Scheduler already running, ignoring start");
            return;
        }

        let _ = self.shutdown_tx.send(false);
        let inner = Arc::clone(&self.inner);
        let mut shutdown = self.shutdown_tx.subscribe();

        info!(
            check_interval_secs = inner.config.check_interval_secs,
            max_concurrent_agents = inner.config.max_concurrent_agents,
            run_missed_on_startup = inner.config.run_missed_on_startup,
            "Starting agent scheduler"
        );

        *handle = Some(tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(inner.config.check_interval_secs));
            if !inner.config.run_missed_on_startup {
                // The first interval tick fires immediately; consume it so
                // the first scan waits a full period.
                ticker.tick().await;
            }
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = Arc::clone(&inner).tick().await {
                            warn!(error = %e, "Scheduler tick failed");
                        }
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            info!("Scheduler shutting down");
                            break;
                        }
                    }
                }
            }
        }));
    }

    /// Stop the tick loop and wait for the current tick to finish.
    /// A no-op when already stopped.
    pub async fn stop(&self) {
        let handle = {
            let mut handle = self.handle.lock().await;
            handle.take()
        };
        match handle {
            Some(handle) => {
                let _ = self.shutdown_tx.send(true);
                let _ = handle.await;
                info!("Scheduler stopped");
            }
            None => {
                info!("Scheduler already stopped, ignoring stop");
            }
        }
    }

    pub async fn is_running(&self) -> bool {
        self.handle.lock().await.is_some()
    }

    /// Read-only snapshot. Does not mutate scheduler state.
    pub async fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            is_running: self.is_running().await,
            tracked_agents: self.inner.tasks.lock().await.len(),
            running_agents: self.inner.manager.running_count().await,
        }
    }

    /// Read-only per-agent retry counters and next-run estimates.
    pub async fn task_details(&self) -> Vec<TaskDetails> {
        self.inner
            .tasks
            .lock()
            .await
            .iter()
            .map(|(agent_id, state)| TaskDetails {
                agent_id: *agent_id,
                retry_count: state.retry_count,
                last_failure: state.last_failure.clone(),
                next_run_at: state.next_run_at,
            })
            .collect()
    }

    /// Run one scan outside the periodic cadence. Used by tests and by
    /// operators forcing an immediate re-evaluation.
    pub async fn tick_now(&self) -> Result<()> {
        Arc::clone(&self.inner).tick().await
    }
}

impl SchedulerInner {
    /// One scan: find due agents, honor the concurrency ceiling, dispatch
    /// the accepted ones. One agent's failure never prevents the rest of
    /// the tick from being evaluated.
    async fn tick(self: Arc<Self>) -> Result<()> {
        let now = Utc::now();
        let due = self.agents.list_due(now).await?;
        if due.is_empty() {
            return Ok(());
        }

        let running = self.manager.running_count().await;
        debug!(due = due.len(), running, "Evaluating due agents");

        let mut dispatched = 0usize;
        for agent in due {
            if running + dispatched >= self.config.max_concurrent_agents {
                // No internal queue: a deferred agent stays due and is
                // re-evaluated on the next scan.
                debug!(agent_id = %agent.id, "Concurrency ceiling reached, deferring");
                continue;
            }
            match Arc::clone(&self).dispatch(agent).await {
                Ok(true) => dispatched += 1,
                Ok(false) => {}
                Err(e) => warn!(error = %e, "Dispatch failed"),
            }
        }

        Ok(())
    }

    /// Persist the recomputed `next_run_at` *before* handing the agent to
    /// the manager, so a crash mid-run cannot cause the same due slot to
    /// be picked up twice. Returns whether a run was actually dispatched.
    async fn dispatch(self: Arc<Self>, mut agent: AgentDescriptor) -> Result<bool> {
        let now = Utc::now();
        match agent.schedule_expression.as_deref() {
            Some(expression) => match schedule::next_run(expression, now) {
                Ok(next) => agent.next_run_at = Some(next),
                Err(e) => {
                    // A broken expression would otherwise stay due and
                    // spam every tick; disable it and let an operator fix
                    // the descriptor.
                    warn!(agent_id = %agent.id, error = %e, "Disabling unschedulable agent");
                    agent.schedule_enabled = false;
                    agent.next_run_at = None;
                    self.agents.update(&agent).await?;
                    return Ok(false);
                }
            },
            None => {
                // One-shot: clear the slot so it cannot fire twice.
                agent.next_run_at = None;
                agent.schedule_enabled = false;
            }
        }
        self.agents.update(&agent).await?;

        {
            let mut tasks = self.tasks.lock().await;
            tasks.entry(agent.id).or_default().next_run_at = agent.next_run_at;
        }

        info!(agent_id = %agent.id, name = %agent.name, "Dispatching agent");
        let inner = Arc::clone(&self);
        let agent_id = agent.id;
        tokio::spawn(async move {
            let result = inner
                .manager
                .start_agent(agent_id, ExecuteOptions::default())
                .await;
            inner.handle_outcome(agent_id, result).await;
        });

        Ok(true)
    }

    async fn handle_outcome(&self, agent_id: AgentId, result: Result<StartOutcome>) {
        match result {
            Ok(StartOutcome::Started(_)) => {
                let mut tasks = self.tasks.lock().await;
                if let Some(state) = tasks.get_mut(&agent_id) {
                    state.retry_count = 0;
                    state.last_failure = None;
                }
                debug!(agent_id = %agent_id, "Dispatched run succeeded");
            }
            Ok(StartOutcome::AlreadyRunning) => {
                debug!(agent_id = %agent_id, "Dispatched agent was already running");
            }
            Err(Error::Stopped) => {
                // An operator paused it mid-run; not a failure to back off.
                info!(agent_id = %agent_id, "Dispatched run stopped by operator");
            }
            Err(e) => {
                self.apply_backoff(agent_id, &e).await;
            }
        }
    }

    /// Outer backoff: retry *n* (counted from 1) is re-armed for
    /// `base * 2^(n-1)` milliseconds from now, capped at the configured
    /// maximum. Once outer retries are exhausted the descriptor stays in
    /// `Error` and is not rescheduled.
    async fn apply_backoff(&self, agent_id: AgentId, error: &Error) {
        let retry_count = {
            let mut tasks = self.tasks.lock().await;
            let state = tasks.entry(agent_id).or_default();
            state.retry_count += 1;
            state.last_failure = Some(error.to_string());
            state.retry_count
        };

        if retry_count > self.config.max_retries {
            warn!(
                agent_id = %agent_id,
                retry_count,
                "Outer retries exhausted, leaving agent in error status"
            );
            return;
        }

        let delay_ms = self
            .config
            .base_backoff_ms
            .saturating_mul(2u64.saturating_pow(retry_count - 1))
            .min(self.config.max_backoff_ms);
        let next = Utc::now() + ChronoDuration::milliseconds(delay_ms as i64);

        warn!(
            agent_id = %agent_id,
            retry_count,
            delay_ms,
            error = %error,
            "Dispatched run failed, rescheduling with backoff"
        );

        // Re-arm the descriptor so the next tick naturally retries it.
        // The manager left it in `Error`, which the due scan excludes, so
        // the status must move back to `Idle` alongside the new slot.
        match self.agents.get(agent_id).await {
            Ok(Some(mut descriptor)) => {
                descriptor.status = AgentStatus::Idle;
                descriptor.schedule_enabled = true;
                descriptor.next_run_at = Some(next);
                if let Err(e) = self.agents.update(&descriptor).await {
                    warn!(agent_id = %agent_id, error = %e, "Failed to persist backoff slot");
                }
            }
            Ok(None) => warn!(agent_id = %agent_id, "Descriptor vanished during backoff"),
            Err(e) => warn!(agent_id = %agent_id, error = %e, "Failed to load descriptor"),
        }

        let mut tasks = self.tasks.lock().await;
        if let Some(state) = tasks.get_mut(&agent_id) {
            state.next_run_at = Some(next);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use neonhub_core::agent::AgentType;
    use neonhub_core::context::ExecutionContext;
    use neonhub_core::ids::SessionId;
    use neonhub_core::metrics::NoopMetricsSink;
    use neonhub_core::ports::{AgentExecutor, SessionRepository};
    use neonhub_core::session::ExecutionSession;
    use neonhub_manager::ExecutorRegistry;
    use std::sync::Mutex as StdMutex;
    use tokio::sync::Notify;
    use tokio::time::sleep;

    struct MemoryAgentRepository {
        agents: StdMutex<HashMap<AgentId, AgentDescriptor>>,
    }

    impl MemoryAgentRepository {
        fn new() -> Self {
            Self {
                agents: StdMutex::new(HashMap::new()),
            }
        }
    }

    #[async_trait]
    impl AgentRepository for MemoryAgentRepository {
        async fn create(&self, agent: &AgentDescriptor) -> Result<AgentId> {
            self.agents.lock().unwrap().insert(agent.id, agent.clone());
            Ok(agent.id)
        }

        async fn get(&self, id: AgentId) -> Result<Option<AgentDescriptor>> {
            Ok(self.agents.lock().unwrap().get(&id).cloned())
        }

        async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<AgentDescriptor>> {
            let mut due: Vec<_> = self
                .agents
                .lock()
                .unwrap()
                .values()
                .filter(|a| {
                    a.schedule_enabled
                        && a.status.is_schedulable()
                        && a.next_run_at.is_some_and(|t| t <= now)
                })
                .cloned()
                .collect();
            due.sort_by_key(|a| a.next_run_at);
            Ok(due)
        }

        async fn update(&self, agent: &AgentDescriptor) -> Result<()> {
            self.agents.lock().unwrap().insert(agent.id, agent.clone());
            Ok(())
        }
    }

    struct MemorySessionRepository {
        sessions: StdMutex<HashMap<SessionId, ExecutionSession>>,
    }

    impl MemorySessionRepository {
        fn new() -> Self {
            Self {
                sessions: StdMutex::new(HashMap::new()),
            }
        }
    }

    #[async_trait]
    impl SessionRepository for MemorySessionRepository {
        async fn create(&self, session: &ExecutionSession) -> Result<SessionId> {
            self.sessions
                .lock()
                .unwrap()
                .insert(session.id, session.clone());
            Ok(session.id)
        }

        async fn get(&self, id: SessionId) -> Result<Option<ExecutionSession>> {
            Ok(self.sessions.lock().unwrap().get(&id).cloned())
        }

        async fn find_open(&self, agent_id: AgentId) -> Result<Option<ExecutionSession>> {
            Ok(self
                .sessions
                .lock()
                .unwrap()
                .values()
                .find(|s| s.agent_id == agent_id && s.is_open())
                .cloned())
        }

        async fn update(&self, session: &ExecutionSession) -> Result<()> {
            self.sessions
                .lock()
                .unwrap()
                .insert(session.id, session.clone());
            Ok(())
        }

        async fn list_for_agent(
            &self,
            agent_id: AgentId,
            limit: u32,
        ) -> Result<Vec<ExecutionSession>> {
            let mut sessions: Vec<_> = self
                .sessions
                .lock()
                .unwrap()
                .values()
                .filter(|s| s.agent_id == agent_id)
                .cloned()
                .collect();
            sessions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
            sessions.truncate(limit as usize);
            Ok(sessions)
        }
    }

    struct OkExecutor;

    #[async_trait]
    impl AgentExecutor for OkExecutor {
        async fn execute(&self, _ctx: &ExecutionContext) -> Result<serde_json::Value> {
            Ok(serde_json::json!({ "ok": true }))
        }
    }

    struct FailExecutor;

    #[async_trait]
    impl AgentExecutor for FailExecutor {
        async fn execute(&self, _ctx: &ExecutionContext) -> Result<serde_json::Value> {
            Err(Error::Execution("provider down".into()))
        }
    }

    /// Blocks until released so tests can hold agents in the running state.
    struct GatedExecutor {
        release: Arc<Notify>,
    }

    #[async_trait]
    impl AgentExecutor for GatedExecutor {
        async fn execute(&self, _ctx: &ExecutionContext) -> Result<serde_json::Value> {
            self.release.notified().await;
            Ok(serde_json::json!({}))
        }
    }

    struct Harness {
        agents: Arc<MemoryAgentRepository>,
        sessions: Arc<MemorySessionRepository>,
        manager: Arc<AgentManager>,
        scheduler: AgentScheduler,
    }

    fn harness(config: SchedulerConfig, executor: Arc<dyn AgentExecutor>) -> Harness {
        let agents = Arc::new(MemoryAgentRepository::new());
        let sessions = Arc::new(MemorySessionRepository::new());
        let registry = ExecutorRegistry::new().with(AgentType::ContentGeneration, executor);
        let manager = Arc::new(AgentManager::new(
            agents.clone(),
            sessions.clone(),
            Arc::new(NoopMetricsSink),
            registry,
        ));
        let scheduler = AgentScheduler::new(config, agents.clone(), manager.clone());
        Harness {
            agents,
            sessions,
            manager,
            scheduler,
        }
    }

    async fn seed_due_agent(h: &Harness, name: &str, expression: Option<&str>) -> AgentId {
        let mut descriptor = AgentDescriptor::new(
            AgentType::ContentGeneration,
            name,
            serde_json::json!({}),
        );
        descriptor.schedule_enabled = true;
        descriptor.schedule_expression = expression.map(str::to_string);
        descriptor.next_run_at = Some(Utc::now() - ChronoDuration::seconds(1));
        let id = descriptor.id;
        h.agents.create(&descriptor).await.unwrap();
        id
    }

    /// Wait for all dispatched runs and their outcome handlers to settle.
    async fn settle(h: &Harness) {
        // A failing dispatch spends up to 7s of (paused) virtual time in
        // the runtime's inner retry backoff before it settles.
        for _ in 0..1000 {
            sleep(Duration::from_millis(10)).await;
            if h.manager.running_count().await == 0 {
                break;
            }
        }
        // Outcome handlers run after the manager drops the handle.
        for _ in 0..10 {
            tokio::task::yield_now().await;
            sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_due_agent_runs_to_completion() {
        let h = harness(SchedulerConfig::default(), Arc::new(OkExecutor));
        let agent_id = seed_due_agent(&h, "blog-drafter", Some("0 * * * *")).await;

        h.scheduler.tick_now().await.unwrap();
        settle(&h).await;

        let descriptor = h.agents.get(agent_id).await.unwrap().unwrap();
        assert_eq!(descriptor.status, AgentStatus::Completed);
        assert!(descriptor.next_run_at.unwrap() > Utc::now());

        let sessions = h.sessions.list_for_agent(agent_id, 10).await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].success, Some(true));
        assert!(sessions[0].duration_ms.is_some());
    }

    #[tokio::test]
    async fn test_running_agent_not_picked_up() {
        let h = harness(SchedulerConfig::default(), Arc::new(OkExecutor));
        let agent_id = seed_due_agent(&h, "busy", Some("0 * * * *")).await;

        let mut descriptor = h.agents.get(agent_id).await.unwrap().unwrap();
        descriptor.status = AgentStatus::Running;
        h.agents.update(&descriptor).await.unwrap();

        h.scheduler.tick_now().await.unwrap();
        settle(&h).await;

        // Not dispatched: no session, slot untouched.
        assert!(h.sessions.list_for_agent(agent_id, 10).await.unwrap().is_empty());
        let descriptor = h.agents.get(agent_id).await.unwrap().unwrap();
        assert!(descriptor.next_run_at.unwrap() < Utc::now());
    }

    #[tokio::test]
    async fn test_error_agent_not_picked_up() {
        let h = harness(SchedulerConfig::default(), Arc::new(OkExecutor));
        let agent_id = seed_due_agent(&h, "stuck", Some("0 * * * *")).await;

        let mut descriptor = h.agents.get(agent_id).await.unwrap().unwrap();
        descriptor.status = AgentStatus::Error;
        h.agents.update(&descriptor).await.unwrap();

        h.scheduler.tick_now().await.unwrap();
        settle(&h).await;

        assert!(h.sessions.list_for_agent(agent_id, 10).await.unwrap().is_empty());
        let descriptor = h.agents.get(agent_id).await.unwrap().unwrap();
        assert_eq!(descriptor.status, AgentStatus::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_ceiling_defers_excess_agents() {
        let release = Arc::new(Notify::new());
        let config = SchedulerConfig {
            max_concurrent_agents: 2,
            ..Default::default()
        };
        let h = harness(
            config,
            Arc::new(GatedExecutor {
                release: release.clone(),
            }),
        );

        let mut ids = Vec::new();
        for i in 0..5 {
            ids.push(seed_due_agent(&h, &format!("agent-{i}"), Some("0 * * * *")).await);
        }

        h.scheduler.tick_now().await.unwrap();
        // Let the two dispatched runs reach their executor.
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }

        assert_eq!(h.manager.running_count().await, 2);

        // The deferred three keep their past-due slot for the next tick.
        let now = Utc::now();
        let still_due = h.agents.list_due(now).await.unwrap();
        assert_eq!(still_due.len(), 3);
        for agent in &still_due {
            assert!(agent.next_run_at.unwrap() <= now);
        }

        release.notify_waiters();
        settle(&h).await;
        assert_eq!(h.manager.running_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_next_run_persisted_before_dispatch() {
        let release = Arc::new(Notify::new());
        let h = harness(
            SchedulerConfig::default(),
            Arc::new(GatedExecutor {
                release: release.clone(),
            }),
        );
        let agent_id = seed_due_agent(&h, "once-per-hour", Some("0 * * * *")).await;

        h.scheduler.tick_now().await.unwrap();
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }

        // The run is still in flight, but the slot has already advanced:
        // a second tick must not dispatch the same due run twice.
        assert_eq!(h.manager.running_count().await, 1);
        let descriptor = h.agents.get(agent_id).await.unwrap().unwrap();
        assert!(descriptor.next_run_at.unwrap() > Utc::now());

        h.scheduler.tick_now().await.unwrap();
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        assert_eq!(h.manager.running_count().await, 1);

        release.notify_waiters();
        settle(&h).await;
        let sessions = h.sessions.list_for_agent(agent_id, 10).await.unwrap();
        assert_eq!(sessions.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_shot_agent_runs_once() {
        let h = harness(SchedulerConfig::default(), Arc::new(OkExecutor));
        let agent_id = seed_due_agent(&h, "one-shot", None).await;

        h.scheduler.tick_now().await.unwrap();
        settle(&h).await;

        let descriptor = h.agents.get(agent_id).await.unwrap().unwrap();
        assert!(!descriptor.schedule_enabled);
        assert!(descriptor.next_run_at.is_none());
        assert_eq!(descriptor.status, AgentStatus::Completed);

        h.scheduler.tick_now().await.unwrap();
        settle(&h).await;
        let sessions = h.sessions.list_for_agent(agent_id, 10).await.unwrap();
        assert_eq!(sessions.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_outer_backoff_rearms_with_exponential_delay() {
        let h = harness(SchedulerConfig::default(), Arc::new(FailExecutor));
        let agent_id = seed_due_agent(&h, "flaky", Some("0 * * * *")).await;

        h.scheduler.tick_now().await.unwrap();
        settle(&h).await;

        // First failure: re-armed roughly base_backoff from now, Idle again.
        let descriptor = h.agents.get(agent_id).await.unwrap().unwrap();
        assert_eq!(descriptor.status, AgentStatus::Idle);
        let slot = descriptor.next_run_at.unwrap();
        let delta = (slot - Utc::now()).num_milliseconds();
        assert!((500..=1500).contains(&delta), "delta was {delta}");

        let details = h.scheduler.task_details().await;
        assert_eq!(details.len(), 1);
        assert_eq!(details[0].retry_count, 1);
        assert!(details[0].last_failure.is_some());

        // Second failure doubles the delay.
        let mut descriptor = h.agents.get(agent_id).await.unwrap().unwrap();
        descriptor.next_run_at = Some(Utc::now() - ChronoDuration::seconds(1));
        h.agents.update(&descriptor).await.unwrap();

        h.scheduler.tick_now().await.unwrap();
        settle(&h).await;

        let descriptor = h.agents.get(agent_id).await.unwrap().unwrap();
        let delta = (descriptor.next_run_at.unwrap() - Utc::now()).num_milliseconds();
        assert!((1500..=2500).contains(&delta), "delta was {delta}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_delay_is_capped() {
        let config = SchedulerConfig {
            base_backoff_ms: 1000,
            max_backoff_ms: 1500,
            max_retries: 5,
            ..Default::default()
        };
        let h = harness(config, Arc::new(FailExecutor));
        let agent_id = seed_due_agent(&h, "capped", Some("0 * * * *")).await;

        for _ in 0..3 {
            let mut descriptor = h.agents.get(agent_id).await.unwrap().unwrap();
            descriptor.next_run_at = Some(Utc::now() - ChronoDuration::seconds(1));
            descriptor.status = AgentStatus::Idle;
            h.agents.update(&descriptor).await.unwrap();
            h.scheduler.tick_now().await.unwrap();
            settle(&h).await;
        }

        // Third retry would be 4000ms uncapped.
        let descriptor = h.agents.get(agent_id).await.unwrap().unwrap();
        let delta = (descriptor.next_run_at.unwrap() - Utc::now()).num_milliseconds();
        assert!(delta <= 1500, "delta was {delta}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_outer_retries_leave_error() {
        let h = harness(SchedulerConfig::default(), Arc::new(FailExecutor));
        let agent_id = seed_due_agent(&h, "doomed", Some("0 * * * *")).await;

        // Initial run plus three outer retries all fail.
        for _ in 0..4 {
            let mut descriptor = h.agents.get(agent_id).await.unwrap().unwrap();
            descriptor.next_run_at = Some(Utc::now() - ChronoDuration::seconds(1));
            if descriptor.status != AgentStatus::Error {
                // Only re-arm what the backoff already re-armed.
                h.agents.update(&descriptor).await.unwrap();
            }
            h.scheduler.tick_now().await.unwrap();
            settle(&h).await;
        }

        let descriptor = h.agents.get(agent_id).await.unwrap().unwrap();
        assert_eq!(descriptor.status, AgentStatus::Error);
        let slot_after_exhaustion = descriptor.next_run_at;

        let details = h.scheduler.task_details().await;
        assert_eq!(details[0].retry_count, 4);

        // No further pickup, no further slot changes.
        h.scheduler.tick_now().await.unwrap();
        settle(&h).await;
        let descriptor = h.agents.get(agent_id).await.unwrap().unwrap();
        assert_eq!(descriptor.status, AgentStatus::Error);
        assert_eq!(descriptor.next_run_at, slot_after_exhaustion);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_expression_disables_agent() {
        let h = harness(SchedulerConfig::default(), Arc::new(OkExecutor));
        let agent_id = seed_due_agent(&h, "typo", Some("every five minutes")).await;

        h.scheduler.tick_now().await.unwrap();
        settle(&h).await;

        let descriptor = h.agents.get(agent_id).await.unwrap().unwrap();
        assert!(!descriptor.schedule_enabled);
        assert!(h.sessions.list_for_agent(agent_id, 10).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_and_stop_are_idempotent() {
        let h = harness(
            SchedulerConfig {
                run_missed_on_startup: true,
                ..Default::default()
            },
            Arc::new(OkExecutor),
        );
        let agent_id = seed_due_agent(&h, "startup-catchup", Some("0 * * * *")).await;

        h.scheduler.start().await;
        h.scheduler.start().await;
        assert!(h.scheduler.is_running().await);

        // The startup scan picks the due agent up without waiting a period.
        settle(&h).await;
        let sessions = h.sessions.list_for_agent(agent_id, 10).await.unwrap();
        assert_eq!(sessions.len(), 1);

        let stats = h.scheduler.stats().await;
        assert!(stats.is_running);
        assert_eq!(stats.tracked_agents, 1);

        h.scheduler.stop().await;
        h.scheduler.stop().await;
        assert!(!h.scheduler.is_running().await);
        assert!(!h.scheduler.stats().await.is_running);
    }
}
