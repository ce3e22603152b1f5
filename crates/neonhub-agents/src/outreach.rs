//! Outreach agent: drafts a personalized message per configured lead.

use async_trait::async_trait;
use neonhub_core::context::ExecutionContext;
use neonhub_core::ports::{AgentExecutor, CompletionClient, CompletionRequest};
use neonhub_core::{Error, Result};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Deserialize)]
struct Lead {
    name: String,
    company: String,
    #[serde(default)]
    role: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OutreachConfig {
    #[serde(default)]
    leads: Vec<Lead>,
    #[serde(default)]
    value_proposition: Option<String>,
}

pub struct OutreachExecutor {
    client: Arc<dyn CompletionClient>,
}

impl OutreachExecutor {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self { client }
    }

    fn prompt(config: &OutreachConfig, lead: &Lead) -> String {
        let mut prompt = format!(
            "Draft a short, personable outreach message to {} at {}.",
            lead.name, lead.company
        );
        if let Some(role) = &lead.role {
            prompt.push_str(&format!(" They work as {role}."));
        }
        if let Some(value) = &config.value_proposition {
            prompt.push_str(&format!(" Lead with this value proposition: {value}"));
        }
        prompt
    }
}

#[async_trait]
impl AgentExecutor for OutreachExecutor {
    async fn execute(&self, ctx: &ExecutionContext) -> Result<serde_json::Value> {
        let config: OutreachConfig = serde_json::from_value(ctx.config().clone())?;
        if config.leads.is_empty() {
            return Err(Error::Execution(
                "outreach config has no leads".to_string(),
            ));
        }

        let mut messages = Vec::with_capacity(config.leads.len());
        let mut tokens_used = 0u64;

        for (index, lead) in config.leads.iter().enumerate() {
            if ctx.is_stop_requested() {
                info!(
                    agent_id = %ctx.agent_id(),
                    completed = index,
                    total = config.leads.len(),
                    "Stop requested, abandoning remaining leads"
                );
                return Err(Error::Stopped);
            }

            let request = CompletionRequest::new(Self::prompt(&config, lead));
            let completion = self.client.complete(request).await?;
            tokens_used += completion.tokens_used;
            messages.push(serde_json::json!({
                "lead": lead.name,
                "company": lead.company,
                "message": completion.text,
            }));
        }

        Ok(serde_json::json!({
            "messages": messages,
            "tokens_used": tokens_used,
        }))
    }
}
