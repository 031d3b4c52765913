use mstrade_models::config::RiskConfig;
use mstrade_models::decision::TradingDecision;
use mstrade_models::portfolio::PortfolioSnapshot;
use mstrade_models::research::Action;
use rust_decimal::Decimal;
use tracing::warn;

use crate::error::Rejection;

#[derive(Debug, Clone, PartialEq)]
pub enum RiskDecision {
    Approved,
    Rejected(Rejection),
}

/// Context passed to policies. Always the latest snapshot: earlier fills in
/// the same batch are already applied.
pub struct RiskContext<'a> {
    pub snapshot: &'a PortfolioSnapshot,
    /// Expected loss already committed by executions this cycle.
    pub committed_risk: Decimal,
    pub config: &'a RiskConfig,
    /// Largest allowed short, as a fraction of portfolio value.
    pub max_short_exposure: Decimal,
    /// Cash the decision would spend walking the current book, when a book
    /// exists. Falls back to quantity × target price.
    pub estimated_cost: Option<Decimal>,
}

impl RiskContext<'_> {
    pub fn portfolio_value(&self) -> Decimal {
        self.snapshot.portfolio_value()
    }

    /// Loss still allowed today: the configured fraction of the day-start
    /// value, less any loss already taken.
    pub fn remaining_daily_budget(&self) -> Decimal {
        let budget = self.config.daily_loss_limit * self.snapshot.day_start_value;
        budget + self.snapshot.daily_pnl().min(Decimal::ZERO)
    }

    fn resulting_quantity(&self, decision: &TradingDecision) -> Decimal {
        self.snapshot.position_quantity(&decision.symbol) + decision.signed_quantity()
    }
}

pub trait Policy: Send + Sync {
    fn name(&self) -> &str;
    fn check(&self, decision: &TradingDecision, ctx: &RiskContext) -> RiskDecision;
}

pub struct ConfidenceThreshold;

impl Policy for ConfidenceThreshold {
    fn name(&self) -> &str {
        "ConfidenceThreshold"
    }

    fn check(&self, decision: &TradingDecision, ctx: &RiskContext) -> RiskDecision {
        if decision.confidence < ctx.config.min_confidence_threshold {
            return RiskDecision::Rejected(Rejection::validation(
                self.name(),
                format!(
                    "confidence {} below threshold {}",
                    decision.confidence.round_dp(4),
                    ctx.config.min_confidence_threshold
                ),
            ));
        }
        RiskDecision::Approved
    }
}

pub struct TradableQuantity;

impl Policy for TradableQuantity {
    fn name(&self) -> &str {
        "TradableQuantity"
    }

    fn check(&self, decision: &TradingDecision, _ctx: &RiskContext) -> RiskDecision {
        if decision.action == Action::Hold {
            return RiskDecision::Rejected(Rejection::validation(self.name(), "HOLD is not tradable"));
        }
        if decision.quantity <= Decimal::ZERO {
            return RiskDecision::Rejected(Rejection::validation(
                self.name(),
                format!("quantity {} is not positive", decision.quantity),
            ));
        }
        if decision.target_price <= Decimal::ZERO {
            return RiskDecision::Rejected(Rejection::validation(
                self.name(),
                format!("target price {} is not positive", decision.target_price),
            ));
        }
        RiskDecision::Approved
    }
}

/// No single position may exceed `max_position_size` of portfolio value.
pub struct MaxPositionSize;

impl Policy for MaxPositionSize {
    fn name(&self) -> &str {
        "MaxPositionSize"
    }

    fn check(&self, decision: &TradingDecision, ctx: &RiskContext) -> RiskDecision {
        let exposure = ctx.resulting_quantity(decision).abs() * decision.target_price;
        let limit = ctx.config.max_position_size * ctx.portfolio_value();

        if exposure > limit {
            return RiskDecision::Rejected(Rejection::risk_limit(
                self.name(),
                format!(
                    "resulting exposure {} exceeds limit {} ({}%)",
                    exposure.round_dp(2),
                    limit.round_dp(2),
                    ctx.config.max_position_size * Decimal::ONE_HUNDRED
                ),
            ));
        }
        RiskDecision::Approved
    }
}

pub struct CashAvailable;

impl Policy for CashAvailable {
    fn name(&self) -> &str {
        "CashAvailable"
    }

    fn check(&self, decision: &TradingDecision, ctx: &RiskContext) -> RiskDecision {
        if decision.action != Action::Buy {
            return RiskDecision::Approved;
        }
        let cost = ctx
            .estimated_cost
            .map_or(decision.notional(), |estimate| estimate.max(decision.notional()));
        if cost > ctx.snapshot.cash {
            return RiskDecision::Rejected(Rejection::validation(
                self.name(),
                format!(
                    "estimated cost {} exceeds cash {}",
                    cost.round_dp(2),
                    ctx.snapshot.cash.round_dp(2)
                ),
            ));
        }
        RiskDecision::Approved
    }
}

pub struct ShortExposure;

impl Policy for ShortExposure {
    fn name(&self) -> &str {
        "ShortExposure"
    }

    fn check(&self, decision: &TradingDecision, ctx: &RiskContext) -> RiskDecision {
        if decision.action != Action::Sell {
            return RiskDecision::Approved;
        }
        let resulting = ctx.resulting_quantity(decision);
        if resulting >= Decimal::ZERO {
            return RiskDecision::Approved;
        }

        let exposure = resulting.abs() * decision.target_price;
        let limit = ctx.max_short_exposure * ctx.portfolio_value();
        if exposure > limit {
            return RiskDecision::Rejected(Rejection::risk_limit(
                self.name(),
                format!(
                    "short exposure {} exceeds limit {}",
                    exposure.round_dp(2),
                    limit.round_dp(2)
                ),
            ));
        }
        RiskDecision::Approved
    }
}

/// Committed plus expected loss must fit in what is left of the daily budget.
pub struct DailyLossBudget;

impl Policy for DailyLossBudget {
    fn name(&self) -> &str {
        "DailyLossBudget"
    }

    fn check(&self, decision: &TradingDecision, ctx: &RiskContext) -> RiskDecision {
        let remaining = ctx.remaining_daily_budget();
        let total = ctx.committed_risk + decision.risk.expected_loss;
        if total > remaining {
            return RiskDecision::Rejected(Rejection::risk_limit(
                self.name(),
                format!(
                    "committed {} + expected {} exceeds remaining daily budget {}",
                    ctx.committed_risk.round_dp(2),
                    decision.risk.expected_loss.round_dp(2),
                    remaining.round_dp(2)
                ),
            ));
        }
        RiskDecision::Approved
    }
}

/// Ordered policy chain. The first rejection wins.
pub struct RiskGuard {
    policies: Vec<Box<dyn Policy>>,
}

impl Default for RiskGuard {
    fn default() -> Self {
        Self::standard()
    }
}

impl RiskGuard {
    pub fn empty() -> Self {
        Self {
            policies: Vec::new(),
        }
    }

    /// The validation chain the master applies before every execution.
    pub fn standard() -> Self {
        let mut guard = Self::empty();
        guard.add_policy(Box::new(ConfidenceThreshold));
        guard.add_policy(Box::new(TradableQuantity));
        guard.add_policy(Box::new(MaxPositionSize));
        guard.add_policy(Box::new(CashAvailable));
        guard.add_policy(Box::new(ShortExposure));
        guard.add_policy(Box::new(DailyLossBudget));
        guard
    }

    pub fn add_policy(&mut self, policy: Box<dyn Policy>) {
        self.policies.push(policy);
    }

    pub fn policy_names(&self) -> Vec<&str> {
        self.policies.iter().map(|p| p.name()).collect()
    }

    pub fn validate(&self, decision: &TradingDecision, ctx: &RiskContext) -> Result<(), Rejection> {
        for policy in &self.policies {
            if let RiskDecision::Rejected(rejection) = policy.check(decision, ctx) {
                warn!(
                    decision = %decision.id,
                    symbol = %decision.symbol,
                    policy = policy.name(),
                    kind = rejection.kind(),
                    reason = rejection.reason(),
                    "Decision rejected"
                );
                return Err(rejection);
            }
        }
        Ok(())
    }
}
