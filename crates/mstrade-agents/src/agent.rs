use std::time::Duration;

use async_trait::async_trait;
use mstrade_models::research::{ResearchContext, ResearchReport, ResearchTask, Specialty};
use tokio_util::sync::CancellationToken;

use crate::claude_cli::{invoke_claude, ClaudeCliConfig};
use crate::error::AgentError;
use crate::parser::parse_research_output;
use crate::prompts::specialist_prompt;

/// A slave: researches one instrument for one specialty. Mockable for testing.
///
/// Implementations are stateless with respect to the portfolio; everything
/// they need arrives in the task and the pre-fetched context.
#[async_trait]
pub trait ResearchAgent: Send + Sync {
    fn name(&self) -> &str;
    fn specialty(&self) -> Specialty;

    /// `cancel` fires when the orchestrator's deadline expires or it shuts
    /// down. Long-running implementations should stop promptly.
    async fn research(
        &self,
        task: &ResearchTask,
        context: &ResearchContext,
        cancel: CancellationToken,
    ) -> Result<ResearchReport, AgentError>;
}

/// A slave that invokes the Claude CLI.
pub struct LlmResearchAgent {
    pub name: String,
    pub specialty: Specialty,
    pub cli_config: ClaudeCliConfig,
}

impl LlmResearchAgent {
    pub fn new(specialty: Specialty, model: String, timeout: Duration) -> Self {
        Self {
            name: format!("{specialty}_llm"),
            specialty,
            cli_config: ClaudeCliConfig::new(model, timeout),
        }
    }
}

#[async_trait]
impl ResearchAgent for LlmResearchAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn specialty(&self) -> Specialty {
        self.specialty
    }

    async fn research(
        &self,
        task: &ResearchTask,
        context: &ResearchContext,
        cancel: CancellationToken,
    ) -> Result<ResearchReport, AgentError> {
        let system_prompt = specialist_prompt(self.specialty);
        let user_prompt = serde_json::to_string(&serde_json::json!({
            "task": task,
            "context": context,
        }))?;

        // The orchestrator's deadline is the outer bound; never wait longer.
        let mut cli_config = self.cli_config.clone();
        cli_config.timeout = cli_config.timeout.min(task.deadline);

        let raw_output = invoke_claude(&system_prompt, &user_prompt, &cli_config, &cancel).await?;
        parse_research_output(&raw_output, task, &self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn llm_agent_naming() {
        let agent = LlmResearchAgent::new(
            Specialty::Sentiment,
            "claude-3-5-haiku-latest".to_string(),
            Duration::from_secs(20),
        );
        assert_eq!(agent.name(), "sentiment_llm");
        assert_eq!(agent.specialty(), Specialty::Sentiment);
        assert_eq!(agent.cli_config.timeout, Duration::from_secs(20));
    }
}
