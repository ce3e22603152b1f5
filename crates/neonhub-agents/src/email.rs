//! Email marketing agent: drafts one campaign email per audience segment.

use async_trait::async_trait;
use neonhub_core::context::ExecutionContext;
use neonhub_core::ports::{AgentExecutor, CompletionClient, CompletionRequest};
use neonhub_core::{Error, Result};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

fn default_segments() -> Vec<String> {
    vec!["all-subscribers".to_string()]
}

#[derive(Debug, Deserialize)]
struct EmailConfig {
    campaign_name: String,
    #[serde(default = "default_segments")]
    segments: Vec<String>,
    #[serde(default)]
    subject_theme: Option<String>,
}

pub struct EmailMarketingExecutor {
    client: Arc<dyn CompletionClient>,
}

impl EmailMarketingExecutor {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self { client }
    }

    fn prompt(config: &EmailConfig, segment: &str) -> String {
        let mut prompt = format!(
            "Write a marketing email for the \"{}\" campaign, addressed to the \
             \"{}\" audience segment. Start with a subject line on its own line.",
            config.campaign_name, segment
        );
        if let Some(theme) = &config.subject_theme {
            prompt.push_str(&format!(" Theme the subject around: {theme}"));
        }
        prompt
    }
}

#[async_trait]
impl AgentExecutor for EmailMarketingExecutor {
    async fn execute(&self, ctx: &ExecutionContext) -> Result<serde_json::Value> {
        let config: EmailConfig = serde_json::from_value(ctx.config().clone())?;
        if config.segments.is_empty() {
            return Err(Error::Execution(
                "email marketing config has no segments".to_string(),
            ));
        }

        let mut emails = Vec::with_capacity(config.segments.len());
        let mut tokens_used = 0u64;

        for (index, segment) in config.segments.iter().enumerate() {
            if ctx.is_stop_requested() {
                info!(
                    agent_id = %ctx.agent_id(),
                    completed = index,
                    total = config.segments.len(),
                    "Stop requested, abandoning remaining segments"
                );
                return Err(Error::Stopped);
            }

            let request = CompletionRequest::new(Self::prompt(&config, segment));
            let completion = self.client.complete(request).await?;
            tokens_used += completion.tokens_used;
            emails.push(serde_json::json!({
                "segment": segment,
                "content": completion.text,
            }));
        }

        Ok(serde_json::json!({
            "campaign_name": config.campaign_name,
            "emails": emails,
            "tokens_used": tokens_used,
        }))
    }
}
