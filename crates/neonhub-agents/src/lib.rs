//! Built-in agent executors.
//!
//! Each executor turns a descriptor's JSON config into prompts for the
//! hosted completion provider and returns a JSON output value with a
//! top-level `tokens_used` count. Multi-item executors check for a
//! cooperative stop between items, so an operator stop takes effect at
//! the next item boundary rather than mid-call.

pub mod content;
pub mod email;
pub mod outreach;
pub mod trends;

pub use content::ContentGenerationExecutor;
pub use email::EmailMarketingExecutor;
pub use outreach::OutreachExecutor;
pub use trends::TrendAnalysisExecutor;

use neonhub_core::agent::AgentType;
use neonhub_core::ports::CompletionClient;
use neonhub_manager::ExecutorRegistry;
use std::sync::Arc;

/// Registry with all four built-in agent types wired to the given
/// completion provider.
pub fn builtin_registry(client: Arc<dyn CompletionClient>) -> ExecutorRegistry {
    ExecutorRegistry::new()
        .with(
            AgentType::ContentGeneration,
            Arc::new(ContentGenerationExecutor::new(client.clone())),
        )
        .with(
            AgentType::TrendAnalysis,
            Arc::new(TrendAnalysisExecutor::new(client.clone())),
        )
        .with(
            AgentType::Outreach,
            Arc::new(OutreachExecutor::new(client.clone())),
        )
        .with(
            AgentType::EmailMarketing,
            Arc::new(EmailMarketingExecutor::new(client)),
        )
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedClient;

    #[test]
    fn test_builtin_registry_covers_all_agent_types() {
        let registry = builtin_registry(Arc::new(ScriptedClient::new("ok", 1)));
        for agent_type in [
            AgentType::ContentGeneration,
            AgentType::TrendAnalysis,
            AgentType::Outreach,
            AgentType::EmailMarketing,
        ] {
            assert!(registry.get(agent_type).is_ok());
        }
    }
}
