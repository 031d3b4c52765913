use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Typed market data for one instrument, as returned by a data provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarketSnapshot {
    pub symbol: String,
    pub price: Decimal,
    pub volume: Decimal,
    /// Annualised volatility as a fraction (0.45 = 45%).
    pub volatility: Decimal,
    /// Fractional 24h change (0.02 = +2%).
    #[serde(default)]
    pub change_24h: Decimal,
    /// Provider valuation estimate, when one exists.
    #[serde(default)]
    pub fair_value: Option<Decimal>,
    pub timestamp: DateTime<Utc>,
}

/// A news item attached to an instrument.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewsItem {
    pub headline: String,
    pub source: String,
    /// -1.0 (very negative) to 1.0 (very positive).
    pub sentiment: Decimal,
    pub published_at: DateTime<Utc>,
}
