pub mod cache_schema;
pub mod config;
pub mod cycle;
pub mod decision;
pub mod market;
pub mod order_book;
pub mod performance;
pub mod portfolio;
pub mod research;

pub use cache_schema::{CacheCategory, CacheRow};
pub use config::{
    AgentBackend, AgentsConfig, CacheConfig, DataConfig, DataSource, MasterConfig, MonitorConfig,
    MstradeConfig, OrderBookConfig, ResearchConfig, RiskConfig, SpecialistConfig,
    SpecialtyDeadlines,
};
pub use cycle::{CycleOutcome, CycleState, CycleSummary, RejectedDecision, TaskFailure};
pub use decision::{RiskAssessment, TradingDecision};
pub use market::{MarketSnapshot, NewsItem};
pub use order_book::{ExecutionResult, OrderBookState, PriceLevel, ReplenishPolicy, SlippageStats};
pub use performance::{MarketRegime, PortfolioPerformance, SlaveStats};
pub use portfolio::{PortfolioSnapshot, Position};
pub use research::{Action, ResearchContext, ResearchReport, ResearchTask, Specialty};
