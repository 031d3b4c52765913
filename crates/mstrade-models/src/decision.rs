use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::research::Action;

/// Risk attached to a sized decision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskAssessment {
    /// Loss if the stop is hit, in cash.
    pub expected_loss: Decimal,
    /// Notional as a fraction of portfolio value.
    pub position_fraction: Decimal,
    /// `expected_loss` as a fraction of portfolio value.
    pub risk_fraction: Decimal,
}

/// A consensus trade produced by the interpreter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradingDecision {
    pub id: Uuid,
    pub symbol: String,
    pub action: Action,
    /// Non-negative. HOLD implies zero.
    pub quantity: Decimal,
    pub target_price: Decimal,
    /// Aggregate confidence, 0.0 to 1.0.
    pub confidence: Decimal,
    pub reasoning: String,
    pub risk: RiskAssessment,
    /// Reports that contributed to the consensus.
    pub source_reports: Vec<Uuid>,
    pub decided_at: DateTime<Utc>,
}

impl TradingDecision {
    pub fn notional(&self) -> Decimal {
        self.quantity * self.target_price
    }

    /// Position change this decision implies, signed.
    pub fn signed_quantity(&self) -> Decimal {
        self.quantity * self.action.sign()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_decision(action: Action) -> TradingDecision {
        TradingDecision {
            id: Uuid::new_v4(),
            symbol: "BTC-USD".to_string(),
            action,
            quantity: dec!(0.25),
            target_price: dec!(50000),
            confidence: dec!(0.74),
            reasoning: "technical+fundamental agree".to_string(),
            risk: RiskAssessment {
                expected_loss: dec!(625),
                position_fraction: dec!(0.125),
                risk_fraction: dec!(0.00625),
            },
            source_reports: vec![Uuid::new_v4()],
            decided_at: Utc::now(),
        }
    }

    #[test]
    fn notional_and_sign() {
        let buy = sample_decision(Action::Buy);
        assert_eq!(buy.notional(), dec!(12500));
        assert_eq!(buy.signed_quantity(), dec!(0.25));
        let sell = sample_decision(Action::Sell);
        assert_eq!(sell.signed_quantity(), dec!(-0.25));
    }

    #[test]
    fn roundtrip_decision() {
        let decision = sample_decision(Action::Sell);
        let json = serde_json::to_string(&decision).unwrap();
        assert!(json.contains("\"SELL\""));
        let parsed: TradingDecision = serde_json::from_str(&json).unwrap();
        assert_eq!(decision, parsed);
    }
}
