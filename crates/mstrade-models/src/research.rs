use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::market::{MarketSnapshot, NewsItem};
use crate::portfolio::PortfolioSnapshot;

/// The analytical domain a slave covers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Specialty {
    Technical,
    Fundamental,
    Sentiment,
    Risk,
}

impl Specialty {
    pub const ALL: [Specialty; 4] = [
        Specialty::Technical,
        Specialty::Fundamental,
        Specialty::Sentiment,
        Specialty::Risk,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Specialty::Technical => "technical",
            Specialty::Fundamental => "fundamental",
            Specialty::Sentiment => "sentiment",
            Specialty::Risk => "risk",
        }
    }
}

impl fmt::Display for Specialty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Directional call made by a report or a decision.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

impl Action {
    /// Vote sign used by consensus: BUY = +1, SELL = -1, HOLD = 0.
    pub fn sign(&self) -> Decimal {
        match self {
            Action::Buy => Decimal::ONE,
            Action::Sell => Decimal::NEGATIVE_ONE,
            Action::Hold => Decimal::ZERO,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Buy => f.write_str("BUY"),
            Action::Sell => f.write_str("SELL"),
            Action::Hold => f.write_str("HOLD"),
        }
    }
}

/// A request for one slave to research one instrument.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResearchTask {
    pub id: Uuid,
    pub specialty: Specialty,
    pub symbol: String,
    /// The snapshot that triggered this research.
    pub snapshot: PortfolioSnapshot,
    /// Time budget for the slave invocation.
    pub deadline: Duration,
    pub created_at: DateTime<Utc>,
}

impl ResearchTask {
    pub fn new(
        specialty: Specialty,
        symbol: impl Into<String>,
        snapshot: PortfolioSnapshot,
        deadline: Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            specialty,
            symbol: symbol.into(),
            snapshot,
            deadline,
            created_at: Utc::now(),
        }
    }
}

/// Market data pre-fetched by the orchestrator for one symbol.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ResearchContext {
    pub market: Option<MarketSnapshot>,
    pub news: Vec<NewsItem>,
    /// Set when the data provider failed for this symbol.
    pub unavailable: Option<String>,
}

impl ResearchContext {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            market: None,
            news: Vec::new(),
            unavailable: Some(reason.into()),
        }
    }

    pub fn is_available(&self) -> bool {
        self.unavailable.is_none()
    }
}

/// Structured output of a single slave invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResearchReport {
    pub task_id: Uuid,
    pub specialty: Specialty,
    pub symbol: String,
    pub agent_name: String,
    /// The slave's directional call for `symbol`.
    pub action: Action,
    /// Named findings, free-form.
    pub findings: serde_json::Map<String, serde_json::Value>,
    /// Ordered, most important first.
    pub recommendations: Vec<String>,
    /// 0.0 to 1.0.
    pub confidence: Decimal,
    pub created_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

impl ResearchReport {
    pub fn is_confidence_valid(&self) -> bool {
        self.confidence >= Decimal::ZERO && self.confidence <= Decimal::ONE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn specialty_serialization() {
        assert_eq!(
            serde_json::to_string(&Specialty::Fundamental).unwrap(),
            "\"fundamental\""
        );
        let parsed: Specialty = serde_json::from_str("\"risk\"").unwrap();
        assert_eq!(parsed, Specialty::Risk);
        assert_eq!(Specialty::Sentiment.to_string(), "sentiment");
    }

    #[test]
    fn action_serialization_and_sign() {
        assert_eq!(serde_json::to_string(&Action::Buy).unwrap(), "\"BUY\"");
        assert_eq!(serde_json::to_string(&Action::Hold).unwrap(), "\"HOLD\"");
        assert_eq!(Action::Buy.sign(), dec!(1));
        assert_eq!(Action::Sell.sign(), dec!(-1));
        assert_eq!(Action::Hold.sign(), dec!(0));
    }

    #[test]
    fn report_confidence_bounds() {
        let mut report = ResearchReport {
            task_id: Uuid::new_v4(),
            specialty: Specialty::Technical,
            symbol: "BTC-USD".to_string(),
            agent_name: "technical".to_string(),
            action: Action::Buy,
            findings: serde_json::Map::new(),
            recommendations: vec!["Accumulate below resistance".to_string()],
            confidence: dec!(0.80),
            created_at: Utc::now(),
            elapsed_ms: 12,
        };
        assert!(report.is_confidence_valid());
        report.confidence = dec!(1.2);
        assert!(!report.is_confidence_valid());
        report.confidence = dec!(-0.1);
        assert!(!report.is_confidence_valid());
    }

    #[test]
    fn unavailable_context() {
        let ctx = ResearchContext::unavailable("quote missing");
        assert!(!ctx.is_available());
        assert!(ResearchContext::default().is_available());
    }
}
