pub mod error;
pub mod interpreter;
pub mod master;
pub mod monitor;
pub mod order_book;
pub mod risk;
pub mod telemetry;

pub use error::{EngineError, Rejection};
pub use interpreter::DecisionInterpreter;
pub use master::MasterCoordinator;
pub use monitor::PortfolioMonitor;
pub use order_book::{BookStats, OrderBookManager};
pub use risk::{Policy, RiskContext, RiskDecision, RiskGuard};
pub use telemetry::{ChannelSink, CycleSink, TracingSink};
