use std::collections::BTreeMap;
use std::time::Duration;

use chrono::Utc;
use mstrade_models::config::OrderBookConfig;
use mstrade_models::decision::TradingDecision;
use mstrade_models::order_book::{ExecutionResult, OrderBookState, ReplenishPolicy, SlippageStats};
use mstrade_models::research::Action;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Walk the taker side of `book` and fill `decision` level by level.
///
/// Consumed levels are depleted. A fill smaller than requested because the
/// book ran dry is still a success; a fill of nothing is not.
pub fn execute(decision: &TradingDecision, book: &mut OrderBookState) -> ExecutionResult {
    let mut result = ExecutionResult {
        id: Uuid::new_v4(),
        decision_id: decision.id,
        symbol: decision.symbol.clone(),
        action: decision.action,
        requested_quantity: decision.quantity,
        filled_quantity: Decimal::ZERO,
        average_price: Decimal::ZERO,
        reference_price: Decimal::ZERO,
        slippage: Decimal::ZERO,
        slippage_cost: Decimal::ZERO,
        executed_at: Utc::now(),
        success: false,
        reason: None,
    };

    if decision.action == Action::Hold || decision.quantity <= Decimal::ZERO {
        result.reason = Some("nothing to execute".to_string());
        return result;
    }

    let Some(best) = book.best_price(decision.action) else {
        result.reason = Some(format!("no {} liquidity for {}", side_name(decision.action), book.symbol));
        return result;
    };
    result.reference_price = best;

    let levels = match decision.action {
        Action::Sell => &mut book.bids,
        _ => &mut book.asks,
    };

    let mut remaining = decision.quantity;
    let mut cost = Decimal::ZERO;
    for level in levels.iter_mut() {
        if remaining.is_zero() {
            break;
        }
        if level.quantity <= Decimal::ZERO {
            continue;
        }
        let take = remaining.min(level.quantity);
        level.quantity -= take;
        remaining -= take;
        cost += take * level.price;
        debug!(symbol = %book.symbol, price = %level.price, quantity = %take, "Level consumed");
    }

    let filled = decision.quantity - remaining;
    let average = cost / filled;
    let slippage = (average - best).abs() / best;

    result.filled_quantity = filled;
    result.average_price = average;
    result.slippage = slippage;
    result.slippage_cost = (average - best).abs() * filled;
    result.success = true;
    if !remaining.is_zero() {
        result.reason = Some(format!(
            "partial fill: {filled} of {} (book exhausted)",
            decision.quantity
        ));
    }

    book.executed_volume += filled;
    book.slippage.record(slippage);
    book.last_price = Some(average);
    book.updated_at = result.executed_at;

    result
}

/// Cash a decision would move if executed now: the cost of the quantity
/// the taker side can fill, without touching the book. `None` when nothing
/// would fill.
pub fn estimate_cost(decision: &TradingDecision, book: &OrderBookState) -> Option<Decimal> {
    if decision.action == Action::Hold || decision.quantity <= Decimal::ZERO {
        return None;
    }
    let levels = match decision.action {
        Action::Sell => &book.bids,
        _ => &book.asks,
    };

    let mut remaining = decision.quantity;
    let mut cost = Decimal::ZERO;
    for level in levels.iter().filter(|l| l.quantity > Decimal::ZERO) {
        if remaining.is_zero() {
            break;
        }
        let take = remaining.min(level.quantity);
        remaining -= take;
        cost += take * level.price;
    }

    (remaining < decision.quantity).then_some(cost)
}

fn side_name(action: Action) -> &'static str {
    match action {
        Action::Sell => "bid",
        _ => "ask",
    }
}

/// Restore each level toward its baseline by at most `policy.per_level`.
pub fn replenish(book: &mut OrderBookState) {
    let step = book.replenish.per_level;
    for level in book.bids.iter_mut().chain(book.asks.iter_mut()) {
        if level.quantity < level.baseline {
            level.quantity = (level.quantity + step).min(level.baseline);
        }
    }
    book.updated_at = Utc::now();
}

/// Per-book execution statistics.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BookStats {
    pub symbol: String,
    pub executed_volume: Decimal,
    pub slippage: SlippageStats,
    pub average_slippage: Decimal,
    pub last_price: Option<Decimal>,
}

/// Owns one synthetic book per instrument.
pub struct OrderBookManager {
    books: BTreeMap<String, OrderBookState>,
    config: OrderBookConfig,
}

impl OrderBookManager {
    pub fn new(config: OrderBookConfig) -> Self {
        Self {
            books: BTreeMap::new(),
            config,
        }
    }

    /// Install an explicit book, replacing any existing one for the symbol.
    pub fn insert_book(&mut self, book: OrderBookState) {
        self.books.insert(book.symbol.clone(), book);
    }

    /// Build a synthetic book around `mid` unless one already exists.
    pub fn ensure_book(&mut self, symbol: &str, mid: Decimal) -> &OrderBookState {
        let config = &self.config;
        self.books.entry(symbol.to_string()).or_insert_with(|| {
            info!(symbol, mid = %mid, levels = config.levels, "Creating synthetic order book");
            OrderBookState::synthetic(
                symbol,
                mid,
                config.levels,
                config.level_quantity,
                config.spread_bps,
                ReplenishPolicy {
                    per_level: config.replenish_per_level,
                },
            )
        })
    }

    pub fn book(&self, symbol: &str) -> Option<&OrderBookState> {
        self.books.get(symbol)
    }

    /// Walk-the-book cost of `decision` against its symbol's current book.
    pub fn estimate(&self, decision: &TradingDecision) -> Option<Decimal> {
        self.books
            .get(&decision.symbol)
            .and_then(|book| estimate_cost(decision, book))
    }

    /// Execute a validated decision against its symbol's book.
    pub async fn submit(&mut self, decision: &TradingDecision) -> ExecutionResult {
        if self.config.latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.latency_ms)).await;
        }

        if !self.books.contains_key(&decision.symbol) && decision.target_price > Decimal::ZERO {
            self.ensure_book(&decision.symbol, decision.target_price);
        }

        let Some(book) = self.books.get_mut(&decision.symbol) else {
            warn!(symbol = %decision.symbol, "No order book");
            return ExecutionResult {
                id: Uuid::new_v4(),
                decision_id: decision.id,
                symbol: decision.symbol.clone(),
                action: decision.action,
                requested_quantity: decision.quantity,
                filled_quantity: Decimal::ZERO,
                average_price: Decimal::ZERO,
                reference_price: Decimal::ZERO,
                slippage: Decimal::ZERO,
                slippage_cost: Decimal::ZERO,
                executed_at: Utc::now(),
                success: false,
                reason: Some(format!("no order book for {}", decision.symbol)),
            };
        };

        let result = execute(decision, book);
        if result.success {
            info!(
                symbol = %result.symbol,
                action = %result.action,
                requested = %result.requested_quantity,
                filled = %result.filled_quantity,
                average_price = %result.average_price,
                slippage = %result.slippage,
                "Order executed"
            );
        } else {
            warn!(
                symbol = %result.symbol,
                reason = result.reason.as_deref().unwrap_or(""),
                "Order not filled"
            );
        }
        result
    }

    pub fn replenish_all(&mut self) {
        for book in self.books.values_mut() {
            replenish(book);
        }
    }

    pub fn execution_stats(&self) -> Vec<BookStats> {
        self.books
            .values()
            .map(|book| BookStats {
                symbol: book.symbol.clone(),
                executed_volume: book.executed_volume,
                slippage: book.slippage.clone(),
                average_slippage: book.slippage.average(),
                last_price: book.last_price,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mstrade_models::decision::RiskAssessment;
    use rust_decimal_macros::dec;

    fn decision(action: Action, quantity: Decimal) -> TradingDecision {
        TradingDecision {
            id: Uuid::new_v4(),
            symbol: "BTC-USD".to_string(),
            action,
            quantity,
            target_price: dec!(100),
            confidence: dec!(0.8),
            reasoning: "test".to_string(),
            risk: RiskAssessment {
                expected_loss: Decimal::ZERO,
                position_fraction: Decimal::ZERO,
                risk_fraction: Decimal::ZERO,
            },
            source_reports: vec![],
            decided_at: Utc::now(),
        }
    }

    fn book() -> OrderBookState {
        OrderBookState::from_levels(
            "BTC-USD",
            vec![(dec!(99), dec!(4)), (dec!(98), dec!(4))],
            vec![(dec!(100), dec!(5)), (dec!(101), dec!(3))],
            ReplenishPolicy { per_level: dec!(2) },
        )
    }

    #[test]
    fn buy_walks_asks_with_vwap() {
        let mut book = book();
        let result = execute(&decision(Action::Buy, dec!(6)), &mut book);

        assert!(result.success);
        assert_eq!(result.filled_quantity, dec!(6));
        // (5 × 100 + 1 × 101) / 6
        assert_eq!(result.average_price.round_dp(4), dec!(100.1667));
        assert_eq!(result.reference_price, dec!(100));
        assert_eq!(result.slippage.round_dp(6), dec!(0.001667));
        assert_eq!(book.asks[0].quantity, dec!(0));
        assert_eq!(book.asks[1].quantity, dec!(2));
        assert!(!result.is_partial());
    }

    #[test]
    fn sell_walks_bids_and_reports_positive_slippage() {
        let mut book = book();
        let result = execute(&decision(Action::Sell, dec!(6)), &mut book);

        assert!(result.success);
        // (4 × 99 + 2 × 98) / 6
        assert_eq!(result.average_price.round_dp(4), dec!(98.6667));
        assert!(result.slippage > Decimal::ZERO);
        assert_eq!(book.bids[0].quantity, dec!(0));
    }

    #[test]
    fn over_liquidity_is_partial_success() {
        let mut book = book();
        let result = execute(&decision(Action::Buy, dec!(10)), &mut book);

        assert!(result.success);
        assert!(result.is_partial());
        assert_eq!(result.filled_quantity, dec!(8));
        assert!(result.reason.unwrap().contains("partial"));
        assert_eq!(book.available(Action::Buy), Decimal::ZERO);
    }

    #[test]
    fn empty_side_fails() {
        let mut book = book();
        execute(&decision(Action::Buy, dec!(8)), &mut book);
        let result = execute(&decision(Action::Buy, dec!(1)), &mut book);
        assert!(!result.success);
        assert_eq!(result.filled_quantity, Decimal::ZERO);
        assert!(result.reason.is_some());
    }

    #[test]
    fn hold_is_not_executed() {
        let mut book = book();
        let before = book.clone();
        let result = execute(&decision(Action::Hold, dec!(1)), &mut book);
        assert!(!result.success);
        assert_eq!(book, before);
    }

    #[test]
    fn estimate_matches_execution_without_consuming() {
        let mut book = book();
        let before = book.clone();
        let d = decision(Action::Buy, dec!(6));

        let estimate = estimate_cost(&d, &book).unwrap();
        assert_eq!(book, before);
        // 5 × 100 + 1 × 101
        assert_eq!(estimate, dec!(601));

        let result = execute(&d, &mut book);
        assert_eq!(estimate, result.average_price * result.filled_quantity);
    }

    #[test]
    fn estimate_caps_at_available_liquidity() {
        let mut book = book();
        // Only the 8 asks can fill.
        assert_eq!(estimate_cost(&decision(Action::Buy, dec!(10)), &book), Some(dec!(803)));
        execute(&decision(Action::Buy, dec!(8)), &mut book);
        assert_eq!(estimate_cost(&decision(Action::Buy, dec!(1)), &book), None);
        assert_eq!(estimate_cost(&decision(Action::Hold, dec!(1)), &book), None);
    }

    #[test]
    fn replenish_is_bounded_per_level() {
        let mut book = book();
        execute(&decision(Action::Buy, dec!(8)), &mut book);
        replenish(&mut book);
        assert_eq!(book.asks[0].quantity, dec!(2));
        assert_eq!(book.asks[1].quantity, dec!(2));
        replenish(&mut book);
        replenish(&mut book);
        assert_eq!(book.asks[0].quantity, dec!(5));
        assert_eq!(book.asks[1].quantity, dec!(3));
    }

    #[tokio::test]
    async fn manager_builds_synthetic_books_on_demand() {
        let mut manager = OrderBookManager::new(OrderBookConfig::default());
        let result = manager.submit(&decision(Action::Buy, dec!(12))).await;

        assert!(result.success);
        // First level 100.1, second 100.2 with 10 per level.
        assert_eq!(result.reference_price, dec!(100.1));
        assert!(result.average_price > dec!(100.1));

        let stats = manager.execution_stats();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].executed_volume, dec!(12));
        assert_eq!(stats[0].slippage.fills, 1);

        manager.replenish_all();
        let book = manager.book("BTC-USD").unwrap();
        assert_eq!(book.asks[0].quantity, dec!(2));
    }
}
