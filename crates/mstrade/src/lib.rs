//! mstrade - master/slave trading coordination engine
//!
//! A single master cycles through monitoring, concurrent specialist research,
//! consensus interpretation, risk validation and simulated execution against
//! synthetic order books.
//!
//! # Library Usage
//!
//! ```rust,no_run
//! use mstrade::models::config::MstradeConfig;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = MstradeConfig::default();
//! let mut master = mstrade::build_master(&config, CancellationToken::new())?;
//! let summary = master.run_cycle().await;
//! println!("{}", summary.executed_count());
//! # Ok(())
//! # }
//! ```

pub use mstrade_agents as agents;
pub use mstrade_engine as engine;
pub use mstrade_market as market;
pub use mstrade_models as models;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{ensure, Context, Result};
use async_trait::async_trait;
use mstrade_agents::{
    HeuristicAgent, HeuristicThresholds, LlmResearchAgent, ResearchAgent, ResearchOrchestrator,
};
use mstrade_engine::{
    CycleSink, DecisionInterpreter, MasterCoordinator, OrderBookManager, PortfolioMonitor,
};
use mstrade_market::{CacheProvider, MarketDataProvider, SqliteStore, StaticProvider};
use mstrade_models::config::{AgentBackend, DataSource, MstradeConfig};
use mstrade_models::cycle::CycleSummary;
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Read and parse a TOML config file. Missing sections take their defaults.
pub fn load_config(path: &str) -> Result<MstradeConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {path}"))?;
    let config: MstradeConfig =
        toml::from_str(&raw).with_context(|| format!("Failed to parse config: {path}"))?;
    validate_config(&config)?;
    Ok(config)
}

/// Reject configurations the engine cannot run with.
pub fn validate_config(config: &MstradeConfig) -> Result<()> {
    let risk = &config.risk;
    for (name, value) in [
        ("min_confidence_threshold", risk.min_confidence_threshold),
        ("report_confidence_floor", risk.report_confidence_floor),
        ("max_risk_per_trade", risk.max_risk_per_trade),
        ("max_position_size", risk.max_position_size),
        ("daily_loss_limit", risk.daily_loss_limit),
        ("stop_loss_fraction", risk.stop_loss_fraction),
    ] {
        ensure!(
            value >= Decimal::ZERO && value <= Decimal::ONE,
            "risk.{name} must be within [0, 1], got {value}"
        );
    }

    ensure!(
        !config.monitor.universe.is_empty(),
        "monitor.universe must name at least one instrument"
    );
    ensure!(
        config.monitor.starting_cash > Decimal::ZERO,
        "monitor.starting_cash must be positive"
    );
    ensure!(
        config.monitor.low_volatility_threshold <= config.monitor.volatility_threshold,
        "monitor.low_volatility_threshold must not exceed monitor.volatility_threshold"
    );
    ensure!(config.order_book.levels > 0, "order_book.levels must be positive");

    if config.data.source == DataSource::Static {
        let missing: Vec<&str> = config
            .monitor
            .universe
            .iter()
            .filter(|symbol| !config.data.instruments.iter().any(|i| &i.symbol == *symbol))
            .map(String::as_str)
            .collect();
        ensure!(
            missing.is_empty(),
            "static data source has no quote for: {}",
            missing.join(", ")
        );
    }
    Ok(())
}

/// Build the market data provider selected by `data.source`.
pub fn build_provider(config: &MstradeConfig) -> Result<Arc<dyn MarketDataProvider>> {
    match config.data.source {
        DataSource::Static => {
            info!(instruments = config.data.instruments.len(), "Using static market data");
            Ok(Arc::new(StaticProvider::with_snapshots(
                config.data.instruments.iter().cloned(),
            )))
        }
        DataSource::Cache => {
            let cache = &config.data.cache;
            let store = SqliteStore::open(&cache.sqlite_path)
                .with_context(|| format!("Failed to open cache: {}", cache.sqlite_path))?;
            info!(path = %cache.sqlite_path, "Using SQLite market data cache");
            Ok(Arc::new(CacheProvider::new(
                store,
                cache.memory_max_capacity,
                Duration::from_secs(cache.memory_ttl_seconds),
            )))
        }
    }
}

/// Build one slave per enabled specialist for the configured backend.
pub fn build_agents(config: &MstradeConfig) -> Vec<Arc<dyn ResearchAgent>> {
    let thresholds = HeuristicThresholds {
        high_volatility: config.monitor.volatility_threshold,
        losing_position: config.monitor.losing_position_threshold,
        ..HeuristicThresholds::default()
    };

    config
        .agents
        .specialists
        .iter()
        .filter(|s| s.enabled)
        .map(|s| match config.agents.backend {
            AgentBackend::Heuristic => {
                Arc::new(HeuristicAgent::with_thresholds(s.specialty, thresholds.clone()))
                    as Arc<dyn ResearchAgent>
            }
            AgentBackend::Claude => {
                let model = s.model.clone().unwrap_or_else(|| config.agents.model.clone());
                let timeout = config.research.deadlines.for_specialty(s.specialty);
                Arc::new(LlmResearchAgent::new(s.specialty, model, timeout))
                    as Arc<dyn ResearchAgent>
            }
        })
        .collect()
}

/// Wire a master coordinator from configuration. Slaves are cancelled when
/// `cancel` fires.
pub fn build_master(config: &MstradeConfig, cancel: CancellationToken) -> Result<MasterCoordinator> {
    validate_config(config)?;
    let provider = build_provider(config)?;

    let mut orchestrator =
        ResearchOrchestrator::new(Arc::clone(&provider)).with_cancellation(cancel);
    for agent in build_agents(config) {
        orchestrator.register(agent);
    }
    if orchestrator.specialties().is_empty() {
        warn!("No specialists enabled; every cycle will produce no reports");
    }

    let monitor = PortfolioMonitor::new(
        provider,
        config.monitor.clone(),
        config.research.staleness_window(),
    );

    Ok(MasterCoordinator::new(
        monitor,
        orchestrator,
        DecisionInterpreter::new(config.risk.clone())
            .with_short_limit(config.monitor.max_short_exposure),
        OrderBookManager::new(config.order_book.clone()),
        config.research.deadlines.clone(),
    ))
}

/// Writes each cycle summary as one JSON document on stdout.
pub struct StdoutSink {
    pretty: bool,
}

impl StdoutSink {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    pub fn render(&self, summary: &CycleSummary) -> serde_json::Result<String> {
        if self.pretty {
            serde_json::to_string_pretty(summary)
        } else {
            serde_json::to_string(summary)
        }
    }
}

#[async_trait]
impl CycleSink for StdoutSink {
    async fn emit(&self, summary: &CycleSummary) {
        match self.render(summary) {
            Ok(output) => println!("{output}"),
            Err(e) => warn!(cycle = summary.cycle, error = %e, "Failed to serialize cycle summary"),
        }
    }
}
