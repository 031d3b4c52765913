use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::research::Action;

/// One price level of synthetic liquidity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceLevel {
    pub price: Decimal,
    /// Quantity currently resting at this level.
    pub quantity: Decimal,
    /// Quantity the level replenishes toward.
    pub baseline: Decimal,
}

impl PriceLevel {
    pub fn new(price: Decimal, quantity: Decimal) -> Self {
        Self {
            price,
            quantity,
            baseline: quantity,
        }
    }
}

/// How depleted levels regain liquidity between cycles.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReplenishPolicy {
    /// Maximum quantity restored per level per cycle.
    pub per_level: Decimal,
}

impl Default for ReplenishPolicy {
    fn default() -> Self {
        Self {
            per_level: Decimal::ONE,
        }
    }
}

/// Running slippage statistics for a book.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SlippageStats {
    pub fills: u64,
    pub total: Decimal,
    pub max: Decimal,
    pub min: Option<Decimal>,
}

impl SlippageStats {
    pub fn record(&mut self, slippage: Decimal) {
        self.fills += 1;
        self.total += slippage;
        self.max = self.max.max(slippage);
        self.min = Some(self.min.map_or(slippage, |m| m.min(slippage)));
    }

    pub fn average(&self) -> Decimal {
        if self.fills == 0 {
            Decimal::ZERO
        } else {
            self.total / Decimal::from(self.fills)
        }
    }
}

/// Synthetic liquidity for one instrument.
///
/// Bids are kept in descending price order and asks in ascending price order,
/// so index 0 of either side is the most favourable level for a taker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderBookState {
    pub symbol: String,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
    pub replenish: ReplenishPolicy,
    pub executed_volume: Decimal,
    pub slippage: SlippageStats,
    pub last_price: Option<Decimal>,
    pub updated_at: DateTime<Utc>,
}

impl OrderBookState {
    /// Build a book from explicit levels. Levels are sorted into taker order.
    pub fn from_levels(
        symbol: impl Into<String>,
        bids: Vec<(Decimal, Decimal)>,
        asks: Vec<(Decimal, Decimal)>,
        replenish: ReplenishPolicy,
    ) -> Self {
        let mut bids: Vec<PriceLevel> = bids
            .into_iter()
            .map(|(price, quantity)| PriceLevel::new(price, quantity))
            .collect();
        let mut asks: Vec<PriceLevel> = asks
            .into_iter()
            .map(|(price, quantity)| PriceLevel::new(price, quantity))
            .collect();
        bids.sort_by(|a, b| b.price.cmp(&a.price));
        asks.sort_by(|a, b| a.price.cmp(&b.price));

        Self {
            symbol: symbol.into(),
            bids,
            asks,
            replenish,
            executed_volume: Decimal::ZERO,
            slippage: SlippageStats::default(),
            last_price: None,
            updated_at: Utc::now(),
        }
    }

    /// Symmetric book around `mid`: level `i` (1-based) sits `i × spread_bps`
    /// basis points away from mid on each side.
    pub fn synthetic(
        symbol: impl Into<String>,
        mid: Decimal,
        levels: u32,
        level_quantity: Decimal,
        spread_bps: Decimal,
        replenish: ReplenishPolicy,
    ) -> Self {
        let step = mid * spread_bps / Decimal::from(10_000);
        let (bids, asks): (Vec<_>, Vec<_>) = (1..=levels)
            .map(|i| {
                let offset = step * Decimal::from(i);
                ((mid - offset, level_quantity), (mid + offset, level_quantity))
            })
            .unzip();
        Self::from_levels(symbol, bids, asks, replenish)
    }

    /// The side a taker consumes for `action`: asks for BUY, bids for SELL.
    pub fn taker_side(&self, action: Action) -> &[PriceLevel] {
        match action {
            Action::Sell => &self.bids,
            _ => &self.asks,
        }
    }

    pub fn best_price(&self, action: Action) -> Option<Decimal> {
        self.taker_side(action)
            .iter()
            .find(|level| level.quantity > Decimal::ZERO)
            .map(|level| level.price)
    }

    pub fn available(&self, action: Action) -> Decimal {
        self.taker_side(action).iter().map(|l| l.quantity).sum()
    }
}

/// Outcome of submitting a decision to the order book manager.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionResult {
    pub id: Uuid,
    pub decision_id: Uuid,
    pub symbol: String,
    pub action: Action,
    pub requested_quantity: Decimal,
    /// May be less than requested on a partial fill.
    pub filled_quantity: Decimal,
    /// Volume-weighted, slippage included.
    pub average_price: Decimal,
    /// Best available price before the fill.
    pub reference_price: Decimal,
    /// |average - reference| / reference. Always >= 0.
    pub slippage: Decimal,
    /// Cash cost of slippage across the filled quantity.
    pub slippage_cost: Decimal,
    pub executed_at: DateTime<Utc>,
    pub success: bool,
    pub reason: Option<String>,
}

impl ExecutionResult {
    pub fn is_partial(&self) -> bool {
        self.success && self.filled_quantity < self.requested_quantity
    }

    pub fn fill_fraction(&self) -> Decimal {
        if self.requested_quantity.is_zero() {
            Decimal::ZERO
        } else {
            self.filled_quantity / self.requested_quantity
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn from_levels_sorts_into_taker_order() {
        let book = OrderBookState::from_levels(
            "BTC-USD",
            vec![(dec!(98), dec!(1)), (dec!(99), dec!(2))],
            vec![(dec!(101), dec!(3)), (dec!(100), dec!(5))],
            ReplenishPolicy::default(),
        );
        assert_eq!(book.best_price(Action::Buy), Some(dec!(100)));
        assert_eq!(book.best_price(Action::Sell), Some(dec!(99)));
        assert_eq!(book.available(Action::Buy), dec!(8));
        assert_eq!(book.available(Action::Sell), dec!(3));
    }

    #[test]
    fn synthetic_book_is_symmetric() {
        let book = OrderBookState::synthetic(
            "ETH-USD",
            dec!(1000),
            3,
            dec!(10),
            dec!(10),
            ReplenishPolicy::default(),
        );
        assert_eq!(book.asks.len(), 3);
        assert_eq!(book.bids.len(), 3);
        assert_eq!(book.asks[0].price, dec!(1001));
        assert_eq!(book.bids[0].price, dec!(999));
        assert_eq!(book.asks[2].price, dec!(1003));
        assert_eq!(book.bids[2].baseline, dec!(10));
    }

    #[test]
    fn best_price_skips_empty_levels() {
        let mut book = OrderBookState::from_levels(
            "X",
            vec![],
            vec![(dec!(100), dec!(0)), (dec!(101), dec!(3))],
            ReplenishPolicy::default(),
        );
        assert_eq!(book.best_price(Action::Buy), Some(dec!(101)));
        book.asks[1].quantity = dec!(0);
        assert_eq!(book.best_price(Action::Buy), None);
        assert_eq!(book.best_price(Action::Sell), None);
    }

    #[test]
    fn slippage_stats_track_extremes() {
        let mut stats = SlippageStats::default();
        assert_eq!(stats.average(), dec!(0));
        stats.record(dec!(0.002));
        stats.record(dec!(0.004));
        assert_eq!(stats.fills, 2);
        assert_eq!(stats.max, dec!(0.004));
        assert_eq!(stats.min, Some(dec!(0.002)));
        assert_eq!(stats.average(), dec!(0.003));
    }
}
