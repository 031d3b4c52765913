//! Deterministic rule-based slaves.
//!
//! Each agent applies the same interpretation rules its LLM prompt documents
//! (see `prompts`), so offline runs and tests behave like a well-behaved model
//! without invoking the Claude CLI.

use async_trait::async_trait;
use chrono::Utc;
use mstrade_models::market::{MarketSnapshot, NewsItem};
use mstrade_models::portfolio::PortfolioSnapshot;
use mstrade_models::research::{Action, ResearchContext, ResearchReport, ResearchTask, Specialty};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;

use crate::agent::ResearchAgent;
use crate::error::AgentError;

/// Rule thresholds shared by the heuristic slaves.
#[derive(Debug, Clone, PartialEq)]
pub struct HeuristicThresholds {
    /// Fractional 24h move that counts as momentum.
    pub momentum: Decimal,
    /// Fractional valuation gap that counts as mispricing.
    pub valuation_gap: Decimal,
    /// Mean sentiment beyond which news is directional.
    pub sentiment: Decimal,
    pub high_volatility: Decimal,
    pub low_volatility: Decimal,
    /// Unrealized loss fraction at which the risk slave recommends cutting.
    pub losing_position: Decimal,
}

impl Default for HeuristicThresholds {
    fn default() -> Self {
        Self {
            momentum: dec!(0.02),
            valuation_gap: dec!(0.05),
            sentiment: dec!(0.2),
            high_volatility: dec!(0.7),
            low_volatility: dec!(0.3),
            losing_position: dec!(0.08),
        }
    }
}

/// A directional call before it is stamped onto a report.
struct Call {
    action: Action,
    confidence: Decimal,
    recommendations: Vec<String>,
    findings: Map<String, Value>,
}

impl Call {
    fn hold(confidence: Decimal, note: &str) -> Self {
        let mut findings = Map::new();
        findings.insert("note".to_string(), json!(note));
        Self {
            action: Action::Hold,
            confidence,
            recommendations: vec![note.to_string()],
            findings,
        }
    }
}

fn clamp_unit(value: Decimal) -> Decimal {
    value.max(Decimal::ZERO).min(Decimal::ONE)
}

fn directional(value: Decimal, threshold: Decimal) -> Option<Action> {
    if value > threshold {
        Some(Action::Buy)
    } else if value < -threshold {
        Some(Action::Sell)
    } else {
        None
    }
}

fn evaluate_technical(market: &MarketSnapshot, t: &HeuristicThresholds) -> Call {
    let change = market.change_24h;
    let Some(action) = directional(change, t.momentum) else {
        return Call::hold(dec!(0.40), "No clear 24h momentum");
    };

    let mut confidence = dec!(0.50) + (change.abs() * dec!(5)).min(dec!(0.40));
    let high_vol = market.volatility > t.high_volatility;
    if high_vol {
        confidence -= dec!(0.10);
    }

    let mut findings = Map::new();
    findings.insert("change_24h".to_string(), json!(change.to_string()));
    findings.insert(
        "momentum".to_string(),
        json!(if action == Action::Buy { "positive" } else { "negative" }),
    );
    findings.insert(
        "volatility_regime".to_string(),
        json!(if high_vol { "elevated" } else { "normal" }),
    );

    let mut recommendations = vec![match action {
        Action::Buy => format!("Momentum entry on {}", market.symbol),
        _ => format!("Reduce {} exposure on weakness", market.symbol),
    }];
    if high_vol {
        recommendations.push("Size down: volatility elevated".to_string());
    }

    Call {
        action,
        confidence: clamp_unit(confidence),
        recommendations,
        findings,
    }
}

fn evaluate_fundamental(market: &MarketSnapshot, t: &HeuristicThresholds) -> Call {
    let Some(fair_value) = market.fair_value else {
        return Call::hold(dec!(0.30), "No fair value estimate available");
    };
    if market.price <= Decimal::ZERO {
        return Call::hold(dec!(0.30), "Non-positive price");
    }

    let gap = (fair_value - market.price) / market.price;
    let Some(action) = directional(gap, t.valuation_gap) else {
        return Call::hold(dec!(0.40), "Trading near fair value");
    };

    let confidence = dec!(0.55) + (gap.abs() * dec!(2)).min(dec!(0.35));
    let mut findings = Map::new();
    findings.insert("valuation_gap".to_string(), json!(gap.round_dp(4).to_string()));
    findings.insert("fair_value".to_string(), json!(fair_value.to_string()));
    findings.insert("price".to_string(), json!(market.price.to_string()));

    let recommendation = match action {
        Action::Buy => format!("{} undervalued versus fair value {fair_value}", market.symbol),
        _ => format!("{} overvalued versus fair value {fair_value}", market.symbol),
    };

    Call {
        action,
        confidence: clamp_unit(confidence),
        recommendations: vec![recommendation],
        findings,
    }
}

fn evaluate_sentiment(news: &[NewsItem], t: &HeuristicThresholds) -> Call {
    if news.is_empty() {
        return Call::hold(dec!(0.30), "No recent news");
    }

    let count = Decimal::from(news.len() as u64);
    let avg = news.iter().map(|n| n.sentiment).sum::<Decimal>() / count;
    let Some(action) = directional(avg, t.sentiment) else {
        return Call::hold(dec!(0.40), "News flow is neutral");
    };

    let weight = count.min(dec!(5)) / dec!(5);
    let confidence = dec!(0.50) + avg.abs() * dec!(0.40) * weight;

    let mut findings = Map::new();
    findings.insert(
        "average_sentiment".to_string(),
        json!(avg.round_dp(4).to_string()),
    );
    findings.insert("item_count".to_string(), json!(news.len()));
    findings.insert(
        "headlines".to_string(),
        json!(news.iter().take(3).map(|n| n.headline.clone()).collect::<Vec<_>>()),
    );

    let recommendation = match action {
        Action::Buy => "Sentiment supportive: favour entries".to_string(),
        _ => "Sentiment negative: avoid new longs".to_string(),
    };

    Call {
        action,
        confidence: clamp_unit(confidence),
        recommendations: vec![recommendation],
        findings,
    }
}

fn evaluate_risk(
    symbol: &str,
    market: &MarketSnapshot,
    snapshot: &PortfolioSnapshot,
    t: &HeuristicThresholds,
) -> Call {
    let mut findings = Map::new();
    findings.insert(
        "volatility".to_string(),
        json!(market.volatility.to_string()),
    );

    if let Some(position) = snapshot.positions.get(symbol) {
        let pnl = position.pnl_fraction();
        findings.insert(
            "position_pnl_fraction".to_string(),
            json!(pnl.round_dp(4).to_string()),
        );
        if position.quantity > Decimal::ZERO && pnl < -t.losing_position {
            findings.insert("regime".to_string(), json!("losing_position"));
            return Call {
                action: Action::Sell,
                confidence: dec!(0.75),
                recommendations: vec![format!("Cut losing {symbol} position")],
                findings,
            };
        }
    }

    if market.volatility > t.high_volatility {
        findings.insert("regime".to_string(), json!("high_volatility"));
        let excess = (market.volatility - t.high_volatility).min(dec!(0.30));
        return Call {
            action: Action::Sell,
            confidence: clamp_unit(dec!(0.60) + excess),
            recommendations: vec![format!("De-risk {symbol}: volatility above limit")],
            findings,
        };
    }

    if market.volatility < t.low_volatility {
        findings.insert("regime".to_string(), json!("calm"));
        return Call {
            action: Action::Buy,
            confidence: dec!(0.55),
            recommendations: vec![format!("Risk budget available for {symbol}")],
            findings,
        };
    }

    findings.insert("regime".to_string(), json!("normal"));
    Call {
        action: Action::Hold,
        confidence: dec!(0.40),
        recommendations: vec!["Risk within normal bounds".to_string()],
        findings,
    }
}

/// Rule-based slave for one specialty.
pub struct HeuristicAgent {
    name: String,
    specialty: Specialty,
    thresholds: HeuristicThresholds,
}

impl HeuristicAgent {
    pub fn new(specialty: Specialty) -> Self {
        Self::with_thresholds(specialty, HeuristicThresholds::default())
    }

    pub fn with_thresholds(specialty: Specialty, thresholds: HeuristicThresholds) -> Self {
        Self {
            name: format!("{specialty}_heuristic"),
            specialty,
            thresholds,
        }
    }

    /// One agent per specialty.
    pub fn full_set(thresholds: &HeuristicThresholds) -> Vec<HeuristicAgent> {
        Specialty::ALL
            .iter()
            .map(|s| Self::with_thresholds(*s, thresholds.clone()))
            .collect()
    }

    fn evaluate(&self, task: &ResearchTask, context: &ResearchContext) -> Call {
        let t = &self.thresholds;
        match (self.specialty, &context.market) {
            (Specialty::Sentiment, _) => evaluate_sentiment(&context.news, t),
            (_, None) => Call::hold(dec!(0.0), "No market data"),
            (Specialty::Technical, Some(market)) => evaluate_technical(market, t),
            (Specialty::Fundamental, Some(market)) => evaluate_fundamental(market, t),
            (Specialty::Risk, Some(market)) => evaluate_risk(&task.symbol, market, &task.snapshot, t),
        }
    }
}

#[async_trait]
impl ResearchAgent for HeuristicAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn specialty(&self) -> Specialty {
        self.specialty
    }

    async fn research(
        &self,
        task: &ResearchTask,
        context: &ResearchContext,
        cancel: CancellationToken,
    ) -> Result<ResearchReport, AgentError> {
        if cancel.is_cancelled() {
            return Err(AgentError::Cancelled);
        }

        let call = self.evaluate(task, context);
        Ok(ResearchReport {
            task_id: task.id,
            specialty: self.specialty,
            symbol: task.symbol.clone(),
            agent_name: self.name.clone(),
            action: call.action,
            findings: call.findings,
            recommendations: call.recommendations,
            confidence: call.confidence,
            created_at: Utc::now(),
            elapsed_ms: 0,
        })
    }
}
