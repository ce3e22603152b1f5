//! Content generation agent: drafts one post per configured topic.

use async_trait::async_trait;
use neonhub_core::context::ExecutionContext;
use neonhub_core::ports::{AgentExecutor, CompletionClient, CompletionRequest};
use neonhub_core::{Error, Result};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

fn default_tone() -> String {
    "professional".to_string()
}

fn default_word_count() -> u32 {
    600
}

#[derive(Debug, Deserialize)]
struct ContentConfig {
    #[serde(default)]
    topics: Vec<String>,
    #[serde(default = "default_tone")]
    tone: String,
    #[serde(default = "default_word_count")]
    word_count: u32,
}

pub struct ContentGenerationExecutor {
    client: Arc<dyn CompletionClient>,
}

impl ContentGenerationExecutor {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self { client }
    }

    fn prompt(config: &ContentConfig, topic: &str) -> String {
        format!(
            "Write a {} marketing post of roughly {} words about \"{}\". \
             Return only the post body.",
            config.tone, config.word_count, topic
        )
    }
}

#[async_trait]
impl AgentExecutor for ContentGenerationExecutor {
    async fn execute(&self, ctx: &ExecutionContext) -> Result<serde_json::Value> {
        let config: ContentConfig = serde_json::from_value(ctx.config().clone())?;
        if config.topics.is_empty() {
            return Err(Error::Execution(
                "content generation config has no topics".to_string(),
            ));
        }

        let mut posts = Vec::with_capacity(config.topics.len());
        let mut tokens_used = 0u64;

        for (index, topic) in config.topics.iter().enumerate() {
            if ctx.is_stop_requested() {
                info!(
                    agent_id = %ctx.agent_id(),
                    completed = index,
                    total = config.topics.len(),
                    "Stop requested, abandoning remaining topics"
                );
                return Err(Error::Stopped);
            }

            let mut request = CompletionRequest::new(Self::prompt(&config, topic));
            // Rough ceiling so a runaway completion cannot dwarf the
            // requested length.
            request.max_tokens = Some(config.word_count * 2);
            request.temperature = Some(0.7);

            let completion = self.client.complete(request).await?;
            tokens_used += completion.tokens_used;
            posts.push(serde_json::json!({
                "topic": topic,
                "body": completion.text,
            }));
        }

        Ok(serde_json::json!({
            "posts": posts,
            "tokens_used": tokens_used,
        }))
    }
}
