pub mod agent;
pub mod claude_cli;
pub mod error;
pub mod heuristic;
pub mod orchestrator;
pub mod parser;
pub mod prompts;

pub use agent::{LlmResearchAgent, ResearchAgent};
pub use error::AgentError;
pub use heuristic::{HeuristicAgent, HeuristicThresholds};
pub use orchestrator::{ResearchBatch, ResearchOrchestrator};
