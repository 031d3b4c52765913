use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::market::MarketSnapshot;
use crate::research::Specialty;

/// Top-level configuration for mstrade. Every section is optional in TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MstradeConfig {
    pub risk: RiskConfig,
    pub research: ResearchConfig,
    pub monitor: MonitorConfig,
    pub order_book: OrderBookConfig,
    pub agents: AgentsConfig,
    pub data: DataConfig,
    pub master: MasterConfig,
}

/// Consensus, sizing and validation limits. Fractions are of portfolio value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RiskConfig {
    /// Decisions below this aggregate confidence are never executed.
    pub min_confidence_threshold: Decimal,
    /// Reports below this confidence are excluded from the vote.
    pub report_confidence_floor: Decimal,
    pub max_risk_per_trade: Decimal,
    pub max_position_size: Decimal,
    pub daily_loss_limit: Decimal,
    /// Adverse move assumed when converting notional into expected loss.
    pub stop_loss_fraction: Decimal,
    /// Decimal places quantities are truncated to.
    pub quantity_scale: u32,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            min_confidence_threshold: Decimal::new(65, 2),
            report_confidence_floor: Decimal::new(5, 1),
            max_risk_per_trade: Decimal::new(2, 2),
            max_position_size: Decimal::new(15, 2),
            daily_loss_limit: Decimal::new(3, 2),
            stop_loss_fraction: Decimal::new(5, 2),
            quantity_scale: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ResearchConfig {
    /// How long a sentiment read stays fresh.
    pub staleness_window_seconds: u64,
    pub deadlines: SpecialtyDeadlines,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            staleness_window_seconds: 7200,
            deadlines: SpecialtyDeadlines::default(),
        }
    }
}

impl ResearchConfig {
    pub fn staleness_window(&self) -> Duration {
        Duration::from_secs(self.staleness_window_seconds)
    }
}

/// Per-specialty research deadline in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SpecialtyDeadlines {
    pub technical_ms: u64,
    pub fundamental_ms: u64,
    pub sentiment_ms: u64,
    pub risk_ms: u64,
}

impl Default for SpecialtyDeadlines {
    fn default() -> Self {
        Self {
            technical_ms: 30_000,
            fundamental_ms: 30_000,
            sentiment_ms: 30_000,
            risk_ms: 30_000,
        }
    }
}

impl SpecialtyDeadlines {
    pub fn uniform(ms: u64) -> Self {
        Self {
            technical_ms: ms,
            fundamental_ms: ms,
            sentiment_ms: ms,
            risk_ms: ms,
        }
    }

    pub fn for_specialty(&self, specialty: Specialty) -> Duration {
        let ms = match specialty {
            Specialty::Technical => self.technical_ms,
            Specialty::Fundamental => self.fundamental_ms,
            Specialty::Sentiment => self.sentiment_ms,
            Specialty::Risk => self.risk_ms,
        };
        Duration::from_millis(ms)
    }

    pub fn max(&self) -> Duration {
        Specialty::ALL
            .iter()
            .map(|s| self.for_specialty(*s))
            .max()
            .unwrap_or_default()
    }
}

/// Portfolio monitor settings and research triggers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MonitorConfig {
    pub starting_cash: Decimal,
    /// Instruments of interest in addition to whatever is held.
    pub universe: Vec<String>,
    /// Volatility above which `risk` research triggers.
    pub volatility_threshold: Decimal,
    /// Free-cash fraction above which `technical` + `fundamental` trigger.
    pub free_cash_threshold: Decimal,
    /// Unrealized loss fraction above which `risk` + `technical` trigger.
    pub losing_position_threshold: Decimal,
    /// Largest short a fill may open, as a fraction of portfolio value.
    pub max_short_exposure: Decimal,
    /// Below this many open positions `fundamental` research triggers to
    /// look for new candidates. Capped at the universe size; 0 disables.
    pub min_positions: usize,
    /// Volatility below which the market is classed as calm.
    pub low_volatility_threshold: Decimal,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            starting_cash: Decimal::from(100_000),
            universe: vec!["BTC-USD".to_string(), "ETH-USD".to_string()],
            volatility_threshold: Decimal::new(7, 1),
            free_cash_threshold: Decimal::new(15, 2),
            losing_position_threshold: Decimal::new(8, 2),
            max_short_exposure: Decimal::ZERO,
            min_positions: 0,
            low_volatility_threshold: Decimal::new(4, 1),
        }
    }
}

/// Shape of the synthetic books and the execution simulation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OrderBookConfig {
    pub levels: u32,
    /// Quantity per level, in units of the instrument.
    pub level_quantity: Decimal,
    /// Distance between consecutive levels in basis points of mid.
    pub spread_bps: Decimal,
    /// Maximum quantity restored per level per cycle.
    pub replenish_per_level: Decimal,
    /// Simulated execution latency.
    pub latency_ms: u64,
}

impl Default for OrderBookConfig {
    fn default() -> Self {
        Self {
            levels: 5,
            level_quantity: Decimal::from(10),
            spread_bps: Decimal::from(10),
            replenish_per_level: Decimal::from(2),
            latency_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AgentBackend {
    /// Deterministic rule-based slaves. Works offline.
    #[default]
    Heuristic,
    /// Slaves backed by the `claude` CLI.
    Claude,
}

/// Configuration for the slave layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentsConfig {
    pub backend: AgentBackend,
    /// Default model for LLM-backed slaves.
    pub model: String,
    pub specialists: Vec<SpecialistConfig>,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            backend: AgentBackend::Heuristic,
            model: "claude-3-5-haiku-latest".to_string(),
            specialists: Specialty::ALL
                .iter()
                .map(|s| SpecialistConfig {
                    specialty: *s,
                    model: None,
                    enabled: true,
                })
                .collect(),
        }
    }
}

/// Configuration for a single slave.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpecialistConfig {
    pub specialty: Specialty,
    /// Override model for this slave. Falls back to `AgentsConfig::model`.
    pub model: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    /// Quotes seeded from `DataConfig::instruments`.
    #[default]
    Static,
    /// Shared SQLite cache written by an external pipeline.
    Cache,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DataConfig {
    pub source: DataSource,
    pub cache: CacheConfig,
    pub instruments: Vec<MarketSnapshot>,
}

/// Configuration for the cache-backed data provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    /// Path to the shared SQLite cache file (written by a data pipeline, read here).
    pub sqlite_path: String,
    /// Maximum number of entries in the in-memory moka cache.
    pub memory_max_capacity: u64,
    /// How long a read stays in memory, in seconds.
    pub memory_ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            sqlite_path: "data/mstrade_cache.db".to_string(),
            memory_max_capacity: 10_000,
            memory_ttl_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MasterConfig {
    pub cycle_interval_seconds: u64,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            cycle_interval_seconds: 60,
        }
    }
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn defaults_match_documented_limits() {
        let risk = RiskConfig::default();
        assert_eq!(risk.min_confidence_threshold, dec!(0.65));
        assert_eq!(risk.report_confidence_floor, dec!(0.5));
        assert_eq!(risk.max_risk_per_trade, dec!(0.02));
        assert_eq!(risk.max_position_size, dec!(0.15));
        assert_eq!(risk.daily_loss_limit, dec!(0.03));
    }

    #[test]
    fn default_config_has_four_specialists() {
        let agents = AgentsConfig::default();
        assert_eq!(agents.specialists.len(), 4);
        assert!(agents.specialists.iter().all(|s| s.enabled));
        assert_eq!(agents.backend, AgentBackend::Heuristic);
    }

    #[test]
    fn deadlines_per_specialty() {
        let deadlines = SpecialtyDeadlines {
            technical_ms: 100,
            fundamental_ms: 250,
            sentiment_ms: 50,
            risk_ms: 75,
        };
        assert_eq!(
            deadlines.for_specialty(Specialty::Fundamental),
            Duration::from_millis(250)
        );
        assert_eq!(deadlines.max(), Duration::from_millis(250));
    }

    #[test]
    fn roundtrip_config() {
        let config = MstradeConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: MstradeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn empty_toml_uses_defaults() {
        let config: MstradeConfig = toml::from_str("").unwrap();
        assert_eq!(config, MstradeConfig::default());
    }

    #[test]
    fn config_from_toml() {
        let toml_str = r#"
[risk]
min_confidence_threshold = "0.70"
max_position_size = "0.10"

[research]
staleness_window_seconds = 600

[research.deadlines]
technical_ms = 5000
risk_ms = 2000

[monitor]
starting_cash = "50000"
universe = ["SOL-USD"]

[agents]
backend = "claude"
model = "claude-3-5-haiku-latest"

[[agents.specialists]]
specialty = "technical"

[[agents.specialists]]
specialty = "sentiment"
enabled = false

[data]
source = "cache"

[data.cache]
sqlite_path = "/tmp/test_cache.db"

[master]
cycle_interval_seconds = 15
"#;

        let config: MstradeConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.risk.min_confidence_threshold, dec!(0.70));
        assert_eq!(config.risk.max_position_size, dec!(0.10));
        // Unset fields keep their defaults.
        assert_eq!(config.risk.daily_loss_limit, dec!(0.03));
        assert_eq!(
            config.research.deadlines.for_specialty(Specialty::Technical),
            Duration::from_millis(5000)
        );
        assert_eq!(
            config.research.deadlines.for_specialty(Specialty::Sentiment),
            Duration::from_millis(30_000)
        );
        assert_eq!(config.monitor.universe, vec!["SOL-USD"]);
        assert_eq!(config.agents.backend, AgentBackend::Claude);
        assert_eq!(config.agents.specialists.len(), 2);
        assert!(config.agents.specialists[0].enabled);
        assert!(!config.agents.specialists[1].enabled);
        assert_eq!(config.data.source, DataSource::Cache);
        assert_eq!(config.data.cache.sqlite_path, "/tmp/test_cache.db");
        assert_eq!(config.master.cycle_interval_seconds, 15);
    }

    #[test]
    fn static_instruments_from_toml() {
        let toml_str = r#"
[[data.instruments]]
symbol = "BTC-USD"
price = "50000"
volume = "30000000"
volatility = "0.45"
change_24h = "0.03"
timestamp = "2026-01-01T00:00:00Z"
"#;
        let config: MstradeConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.data.instruments.len(), 1);
        assert_eq!(config.data.instruments[0].price, dec!(50000));
        assert!(config.data.instruments[0].fair_value.is_none());
    }
}
