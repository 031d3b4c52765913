//! Confidence-weighted consensus over slave reports.
//!
//! Per symbol, reports at or above the confidence floor vote with
//! `sign(action) × confidence`. The sign of the net score picks the side and
//! the aggregate confidence is `Σc² / Σc`, which favours the most confident
//! voices. Position size scales the tighter of the position and per-trade
//! risk caps by that confidence. A SELL never exceeds what is held plus
//! the allowed short.

use std::collections::BTreeMap;

use mstrade_models::config::RiskConfig;
use mstrade_models::decision::{RiskAssessment, TradingDecision};
use mstrade_models::portfolio::PortfolioSnapshot;
use mstrade_models::research::{Action, ResearchReport};
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::EngineError;

pub struct DecisionInterpreter {
    config: RiskConfig,
    max_short_exposure: Decimal,
}

impl DecisionInterpreter {
    pub fn new(config: RiskConfig) -> Self {
        Self {
            config,
            max_short_exposure: Decimal::ZERO,
        }
    }

    /// Allow SELLs to open shorts up to this fraction of portfolio value.
    pub fn with_short_limit(mut self, max_short_exposure: Decimal) -> Self {
        self.max_short_exposure = max_short_exposure;
        self
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Turn reports into sized decisions, most confident first.
    ///
    /// HOLD outcomes and decisions below `min_confidence_threshold` are not
    /// emitted. The output depends only on the inputs and the config, apart
    /// from decision ids.
    pub fn interpret(
        &self,
        reports: &[ResearchReport],
        snapshot: &PortfolioSnapshot,
    ) -> Result<Vec<TradingDecision>, EngineError> {
        if let Some(bad) = reports.iter().find(|r| !r.is_confidence_valid()) {
            return Err(EngineError::Interpret(format!(
                "report {} has confidence {} outside [0, 1]",
                bad.task_id, bad.confidence
            )));
        }

        let value = snapshot.portfolio_value();
        if value <= Decimal::ZERO {
            return Err(EngineError::Interpret(format!(
                "portfolio value {value} is not positive"
            )));
        }

        let mut by_symbol: BTreeMap<&str, Vec<&ResearchReport>> = BTreeMap::new();
        for report in reports
            .iter()
            .filter(|r| r.confidence >= self.config.report_confidence_floor)
        {
            by_symbol.entry(report.symbol.as_str()).or_default().push(report);
        }

        let mut decisions: Vec<TradingDecision> = by_symbol
            .into_iter()
            .filter_map(|(symbol, group)| self.decide(symbol, &group, snapshot, value))
            .collect();

        decisions.sort_by(|a, b| {
            b.confidence
                .cmp(&a.confidence)
                .then_with(|| a.symbol.cmp(&b.symbol))
        });
        Ok(decisions)
    }

    fn decide(
        &self,
        symbol: &str,
        group: &[&ResearchReport],
        snapshot: &PortfolioSnapshot,
        value: Decimal,
    ) -> Option<TradingDecision> {
        let net: Decimal = group.iter().map(|r| r.action.sign() * r.confidence).sum();
        let action = if net > Decimal::ZERO {
            Action::Buy
        } else if net < Decimal::ZERO {
            Action::Sell
        } else {
            debug!(symbol, "Consensus is HOLD");
            return None;
        };

        let sum: Decimal = group.iter().map(|r| r.confidence).sum();
        let sum_sq: Decimal = group.iter().map(|r| r.confidence * r.confidence).sum();
        let confidence = sum_sq / sum;

        if confidence < self.config.min_confidence_threshold {
            debug!(
                symbol,
                confidence = %confidence,
                threshold = %self.config.min_confidence_threshold,
                "Consensus below threshold"
            );
            return None;
        }

        let Some(price) = snapshot.mark(symbol).filter(|p| *p > Decimal::ZERO) else {
            warn!(symbol, "No mark for sizing");
            return None;
        };

        let position_cap = self.config.max_position_size * value;
        let cap = if self.config.stop_loss_fraction > Decimal::ZERO {
            position_cap.min(self.config.max_risk_per_trade * value / self.config.stop_loss_fraction)
        } else {
            position_cap
        };
        let notional = confidence * cap;
        let mut quantity = notional / price;
        if action == Action::Sell {
            let held = snapshot.position_quantity(symbol).max(Decimal::ZERO);
            let sellable = held + self.max_short_exposure * value / price;
            if quantity > sellable {
                debug!(symbol, sized = %quantity, sellable = %sellable, "Capping SELL at holding");
                quantity = sellable;
            }
        }
        let quantity =
            quantity.round_dp_with_strategy(self.config.quantity_scale, RoundingStrategy::ToZero);
        if quantity.is_zero() {
            debug!(symbol, notional = %notional, price = %price, "Quantity truncates to zero");
            return None;
        }

        let expected_loss = quantity * price * self.config.stop_loss_fraction;
        let reasoning = format!(
            "{} {} from {} report(s): net score {}, aggregate confidence {}",
            action,
            symbol,
            group.len(),
            net.round_dp(4),
            confidence.round_dp(4)
        );

        Some(TradingDecision {
            id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            action,
            quantity,
            target_price: price,
            confidence,
            reasoning,
            risk: RiskAssessment {
                expected_loss,
                position_fraction: quantity * price / value,
                risk_fraction: expected_loss / value,
            },
            source_reports: group.iter().map(|r| r.task_id).collect(),
            decided_at: snapshot.taken_at,
        })
    }
}
