//! Trend analysis agent: summarizes current activity per keyword.

use async_trait::async_trait;
use neonhub_core::context::ExecutionContext;
use neonhub_core::ports::{AgentExecutor, CompletionClient, CompletionRequest};
use neonhub_core::{Error, Result};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

fn default_platform() -> String {
    "twitter".to_string()
}

#[derive(Debug, Deserialize)]
struct TrendConfig {
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default = "default_platform")]
    platform: String,
}

pub struct TrendAnalysisExecutor {
    client: Arc<dyn CompletionClient>,
}

impl TrendAnalysisExecutor {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self { client }
    }

    fn prompt(config: &TrendConfig, keyword: &str) -> String {
        format!(
            "Summarize the current discussion around \"{}\" on {}. \
             Highlight emerging themes and overall sentiment in a short paragraph.",
            keyword, config.platform
        )
    }
}

#[async_trait]
impl AgentExecutor for TrendAnalysisExecutor {
    async fn execute(&self, ctx: &ExecutionContext) -> Result<serde_json::Value> {
        let config: TrendConfig = serde_json::from_value(ctx.config().clone())?;
        if config.keywords.is_empty() {
            return Err(Error::Execution(
                "trend analysis config has no keywords".to_string(),
            ));
        }

        let mut analyses = Vec::with_capacity(config.keywords.len());
        let mut tokens_used = 0u64;

        for (index, keyword) in config.keywords.iter().enumerate() {
            if ctx.is_stop_requested() {
                info!(
                    agent_id = %ctx.agent_id(),
                    completed = index,
                    total = config.keywords.len(),
                    "Stop requested, abandoning remaining keywords"
                );
                return Err(Error::Stopped);
            }

            let mut request = CompletionRequest::new(Self::prompt(&config, keyword));
            request.temperature = Some(0.2);

            let completion = self.client.complete(request).await?;
            tokens_used += completion.tokens_used;
            analyses.push(serde_json::json!({
                "keyword": keyword,
                "summary": completion.text,
            }));
        }

        Ok(serde_json::json!({
            "platform": config.platform,
            "analyses": analyses,
            "tokens_used": tokens_used,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedClient;
    use neonhub_core::ids::AgentId;
    use tokio_util::sync::CancellationToken;

    struct CancellingClient {
        inner: ScriptedClient,
        token: CancellationToken,
    }

    #[async_trait]
    impl CompletionClient for CancellingClient {
        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> Result<neonhub_core::ports::Completion> {
            // Simulates an operator stop landing while the first item is
            // still in flight.
            self.token.cancel();
            self.inner.complete(request).await
        }
    }

    #[tokio::test]
    async fn test_keyword_prompts_name_the_platform() {
        let client = Arc::new(ScriptedClient::new("trending up", 80));
        let executor = TrendAnalysisExecutor::new(client.clone());
        let ctx = ExecutionContext::new(
            AgentId::new(),
            serde_json::json!({ "keywords": ["rustlang"], "platform": "linkedin" }),
            CancellationToken::new(),
        );

        let output = executor.execute(&ctx).await.unwrap();
        assert_eq!(output["platform"], "linkedin");
        assert_eq!(output["analyses"][0]["keyword"], "rustlang");
        assert_eq!(output["tokens_used"], 80);
        assert!(client.prompts()[0].contains("linkedin"));
    }

    #[tokio::test]
    async fn test_stop_mid_list_abandons_remaining_keywords() {
        let token = CancellationToken::new();
        let client = Arc::new(CancellingClient {
            inner: ScriptedClient::new("partial", 10),
            token: token.clone(),
        });
        let executor = TrendAnalysisExecutor::new(client.clone());
        let ctx = ExecutionContext::new(
            AgentId::new(),
            serde_json::json!({ "keywords": ["one", "two", "three"] }),
            token,
        );

        let err = executor.execute(&ctx).await.unwrap_err();
        assert!(matches!(err, Error::Stopped));
        // First keyword completed; the stop was observed before the second.
        assert_eq!(client.inner.prompts().len(), 1);
    }
}
