//! PostgreSQL implementation of AgentRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use neonhub_core::agent::{AgentDescriptor, AgentStatus, AgentType};
use neonhub_core::ids::AgentId;
use neonhub_core::ports::AgentRepository;
use neonhub_core::{Error, Result};
use sqlx::{PgPool, Row};

pub struct PgAgentRepository {
    pool: PgPool,
}

impl PgAgentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn status_to_str(status: &AgentStatus) -> &'static str {
        match status {
            AgentStatus::Idle => "idle",
            AgentStatus::Running => "running",
            AgentStatus::Completed => "completed",
            AgentStatus::Error => "error",
            AgentStatus::Paused => "paused",
        }
    }

    fn str_to_status(s: &str) -> AgentStatus {
        match s {
            "running" => AgentStatus::Running,
            "completed" => AgentStatus::Completed,
            "error" => AgentStatus::Error,
            "paused" => AgentStatus::Paused,
            _ => AgentStatus::Idle,
        }
    }

    fn type_to_str(agent_type: &AgentType) -> &'static str {
        agent_type.as_str()
    }

    fn str_to_type(s: &str) -> Result<AgentType> {
        match s {
            "content_generation" => Ok(AgentType::ContentGeneration),
            "trend_analysis" => Ok(AgentType::TrendAnalysis),
            "outreach" => Ok(AgentType::Outreach),
            "email_marketing" => Ok(AgentType::EmailMarketing),
            other => Err(Error::Serialization(format!(
                "unknown agent type in database: {other}"
            ))),
        }
    }

    fn row_to_descriptor(&self, r: &sqlx::postgres::PgRow) -> Result<AgentDescriptor> {
        let type_str: String = r.get("agent_type");
        let status_str: String = r.get("status");
        Ok(AgentDescriptor {
            id: AgentId::from_uuid(r.get::<uuid::Uuid, _>("id")),
            agent_type: Self::str_to_type(&type_str)?,
            name: r.get("name"),
            config: r.get("config"),
            status: Self::str_to_status(&status_str),
            schedule_enabled: r.get("schedule_enabled"),
            schedule_expression: r.get("schedule_expression"),
            last_run_at: r.get("last_run_at"),
            next_run_at: r.get("next_run_at"),
            created_at: r.get("created_at"),
        })
    }
}

#[async_trait]
impl AgentRepository for PgAgentRepository {
    async fn create(&self, agent: &AgentDescriptor) -> Result<AgentId> {
        sqlx::query("INSERT INTO agents (id, agent_type, name, config, status, schedule_enabled, schedule_expression, last_run_at, next_run_at, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)")
            .bind(agent.id.as_uuid())
            .bind(Self::type_to_str(&agent.agent_type))
            .bind(&agent.name)
            .bind(&agent.config)
            .bind(Self::status_to_str(&agent.status))
            .bind(agent.schedule_enabled)
            .bind(&agent.schedule_expression)
            .bind(agent.last_run_at)
            .bind(agent.next_run_at)
            .bind(agent.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(agent.id)
    }

    async fn get(&self, id: AgentId) -> Result<Option<AgentDescriptor>> {
        let row = sqlx::query("SELECT id, agent_type, name, config, status, schedule_enabled, schedule_expression, last_run_at, next_run_at, created_at FROM agents WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        match row {
            Some(r) => Ok(Some(self.row_to_descriptor(&r)?)),
            None => Ok(None),
        }
    }

    async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<AgentDescriptor>> {
        let rows = sqlx::query("SELECT id, agent_type, name, config, status, schedule_enabled, schedule_expression, last_run_at, next_run_at, created_at FROM agents WHERE schedule_enabled = TRUE AND next_run_at IS NOT NULL AND next_run_at <= $1 AND status NOT IN ('running', 'error') ORDER BY next_run_at ASC")
            .bind(now)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        rows.iter().map(|r| self.row_to_descriptor(r)).collect()
    }

    async fn update(&self, agent: &AgentDescriptor) -> Result<()> {
        sqlx::query("UPDATE agents SET config = $2, status = $3, schedule_enabled = $4, schedule_expression = $5, last_run_at = $6, next_run_at = $7, updated_at = NOW() WHERE id = $1")
            .bind(agent.id.as_uuid())
            .bind(&agent.config)
            .bind(Self::status_to_str(&agent.status))
            .bind(agent.schedule_enabled)
            .bind(&agent.schedule_expression)
            .bind(agent.last_run_at)
            .bind(agent.next_run_at)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }
}
