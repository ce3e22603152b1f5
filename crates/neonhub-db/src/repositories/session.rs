//! PostgreSQL implementation of SessionRepository.

use async_trait::async_trait;
use neonhub_core::event::AgentEvent;
use neonhub_core::ids::{AgentId, CampaignId, SessionId};
use neonhub_core::ports::SessionRepository;
use neonhub_core::session::ExecutionSession;
use neonhub_core::{Error, Result};
use sqlx::{PgPool, Row};

pub struct PgSessionRepository {
    pool: PgPool,
}

impl PgSessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_session(&self, r: &sqlx::postgres::PgRow) -> Result<ExecutionSession> {
        let logs: Vec<AgentEvent> = serde_json::from_value(r.get("logs"))
            .map_err(|e| Error::Serialization(e.to_string()))?;
        Ok(ExecutionSession {
            id: SessionId::from_uuid(r.get::<uuid::Uuid, _>("id")),
            agent_id: AgentId::from_uuid(r.get::<uuid::Uuid, _>("agent_id")),
            campaign_id: r
                .get::<Option<uuid::Uuid>, _>("campaign_id")
                .map(CampaignId::from_uuid),
            started_at: r.get("started_at"),
            completed_at: r.get("completed_at"),
            success: r.get("success"),
            duration_ms: r.get::<Option<i64>, _>("duration_ms").map(|ms| ms as u64),
            output_summary: r.get("output_summary"),
            error_message: r.get("error_message"),
            logs,
            metrics: r.get("metrics"),
        })
    }
}

#[async_trait]
impl SessionRepository for PgSessionRepository {
    async fn create(&self, session: &ExecutionSession) -> Result<SessionId> {
        let logs_json = serde_json::to_value(&session.logs)
            .map_err(|e| Error::Serialization(e.to_string()))?;
        sqlx::query("INSERT INTO execution_sessions (id, agent_id, campaign_id, started_at, completed_at, success, duration_ms, output_summary, error_message, logs, metrics) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)")
            .bind(session.id.as_uuid())
            .bind(session.agent_id.as_uuid())
            .bind(session.campaign_id.map(|id| *id.as_uuid()))
            .bind(session.started_at)
            .bind(session.completed_at)
            .bind(session.success)
            .bind(session.duration_ms.map(|ms| ms as i64))
            .bind(&session.output_summary)
            .bind(&session.error_message)
            .bind(&logs_json)
            .bind(&session.metrics)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(session.id)
    }

    async fn get(&self, id: SessionId) -> Result<Option<ExecutionSession>> {
        let row = sqlx::query("SELECT id, agent_id, campaign_id, started_at, completed_at, success, duration_ms, output_summary, error_message, logs, metrics FROM execution_sessions WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        match row {
            Some(r) => Ok(Some(self.row_to_session(&r)?)),
            None => Ok(None),
        }
    }

    async fn find_open(&self, agent_id: AgentId) -> Result<Option<ExecutionSession>> {
        let row = sqlx::query("SELECT id, agent_id, campaign_id, started_at, completed_at, success, duration_ms, output_summary, error_message, logs, metrics FROM execution_sessions WHERE agent_id = $1 AND completed_at IS NULL ORDER BY started_at DESC LIMIT 1")
            .bind(agent_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        match row {
            Some(r) => Ok(Some(self.row_to_session(&r)?)),
            None => Ok(None),
        }
    }

    async fn update(&self, session: &ExecutionSession) -> Result<()> {
        let logs_json = serde_json::to_value(&session.logs)
            .map_err(|e| Error::Serialization(e.to_string()))?;
        sqlx::query("UPDATE execution_sessions SET completed_at = $2, success = $3, duration_ms = $4, output_summary = $5, error_message = $6, logs = $7, metrics = $8 WHERE id = $1")
            .bind(session.id.as_uuid())
            .bind(session.completed_at)
            .bind(session.success)
            .bind(session.duration_ms.map(|ms| ms as i64))
            .bind(&session.output_summary)
            .bind(&session.error_message)
            .bind(&logs_json)
            .bind(&session.metrics)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    async fn list_for_agent(&self, agent_id: AgentId, limit: u32) -> Result<Vec<ExecutionSession>> {
        let rows = sqlx::query("SELECT id, agent_id, campaign_id, started_at, completed_at, success, duration_ms, output_summary, error_message, logs, metrics FROM execution_sessions WHERE agent_id = $1 ORDER BY started_at DESC LIMIT $2")
            .bind(agent_id.as_uuid())
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        rows.iter().map(|r| self.row_to_session(r)).collect()
    }
}
