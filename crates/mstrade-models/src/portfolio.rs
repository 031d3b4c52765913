use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An open position in a single instrument.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Position {
    /// Signed quantity. Negative = short.
    pub quantity: Decimal,
    pub avg_entry_price: Decimal,
    pub mark_price: Decimal,
    pub unrealized_pnl: Decimal,
}

impl Position {
    pub fn new(quantity: Decimal, avg_entry_price: Decimal, mark_price: Decimal) -> Self {
        let mut position = Self {
            quantity,
            avg_entry_price,
            mark_price,
            unrealized_pnl: Decimal::ZERO,
        };
        position.remark(mark_price);
        position
    }

    /// Revalue the position at a new mark price.
    pub fn remark(&mut self, mark_price: Decimal) {
        self.mark_price = mark_price;
        self.unrealized_pnl = (mark_price - self.avg_entry_price) * self.quantity;
    }

    pub fn market_value(&self) -> Decimal {
        self.quantity * self.mark_price
    }

    /// Unrealized P&L as a fraction of the cost basis. Zero for a flat position.
    pub fn pnl_fraction(&self) -> Decimal {
        let basis = (self.avg_entry_price * self.quantity).abs();
        if basis.is_zero() {
            Decimal::ZERO
        } else {
            self.unrealized_pnl / basis
        }
    }

    /// Apply a signed fill (positive = bought, negative = sold) at `price`.
    ///
    /// Returns the P&L realized by the part of the fill that reduced exposure.
    /// The average entry price only moves when exposure grows; a fill that
    /// flips the sign opens the remainder at `price`.
    pub fn apply_fill(&mut self, signed_quantity: Decimal, price: Decimal) -> Decimal {
        if signed_quantity.is_zero() {
            return Decimal::ZERO;
        }
        let old = self.quantity;
        let new = old + signed_quantity;
        let mut realized = Decimal::ZERO;

        let same_direction =
            old.is_zero() || old.is_sign_positive() == signed_quantity.is_sign_positive();
        if same_direction {
            let cost = self.avg_entry_price * old.abs() + price * signed_quantity.abs();
            self.avg_entry_price = cost / new.abs();
        } else {
            let closed = signed_quantity.abs().min(old.abs());
            let direction = if old.is_sign_positive() {
                Decimal::ONE
            } else {
                Decimal::NEGATIVE_ONE
            };
            realized = (price - self.avg_entry_price) * closed * direction;
            if new.is_zero() {
                self.avg_entry_price = Decimal::ZERO;
            } else if new.is_sign_positive() != old.is_sign_positive() {
                self.avg_entry_price = price;
            }
        }

        self.quantity = new;
        self.remark(price);
        realized
    }
}

/// Point-in-time portfolio state. Never mutated after construction: the
/// monitor produces a fresh snapshot after every refresh or fill.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PortfolioSnapshot {
    /// Monotonic per-monitor sequence number.
    pub sequence: u64,
    pub taken_at: DateTime<Utc>,
    pub cash: Decimal,
    pub positions: BTreeMap<String, Position>,
    /// Last known price per instrument, including instruments not held.
    pub marks: BTreeMap<String, Decimal>,
    pub realized_pnl: Decimal,
    /// Portfolio value at the start of the current UTC day.
    pub day_start_value: Decimal,
    /// Highest portfolio value observed so far.
    pub peak_value: Decimal,
    /// Highest volatility reported across the refreshed instruments.
    pub volatility: Decimal,
    /// Fractional drop from `peak_value`.
    pub drawdown: Decimal,
}

impl PortfolioSnapshot {
    /// A flat, all-cash portfolio.
    pub fn with_cash(cash: Decimal, taken_at: DateTime<Utc>) -> Self {
        Self {
            sequence: 0,
            taken_at,
            cash,
            positions: BTreeMap::new(),
            marks: BTreeMap::new(),
            realized_pnl: Decimal::ZERO,
            day_start_value: cash,
            peak_value: cash,
            volatility: Decimal::ZERO,
            drawdown: Decimal::ZERO,
        }
    }

    pub fn positions_value(&self) -> Decimal {
        self.positions.values().map(Position::market_value).sum()
    }

    pub fn portfolio_value(&self) -> Decimal {
        self.cash + self.positions_value()
    }

    pub fn unrealized_pnl(&self) -> Decimal {
        self.positions.values().map(|p| p.unrealized_pnl).sum()
    }

    pub fn position_quantity(&self, symbol: &str) -> Decimal {
        self.positions
            .get(symbol)
            .map(|p| p.quantity)
            .unwrap_or(Decimal::ZERO)
    }

    /// Last known price: the position mark if held, otherwise the market mark.
    pub fn mark(&self, symbol: &str) -> Option<Decimal> {
        self.positions
            .get(symbol)
            .map(|p| p.mark_price)
            .or_else(|| self.marks.get(symbol).copied())
    }

    pub fn free_cash_fraction(&self) -> Decimal {
        let value = self.portfolio_value();
        if value <= Decimal::ZERO {
            Decimal::ZERO
        } else {
            self.cash / value
        }
    }

    /// Change in portfolio value since the start of the day (realized and unrealized).
    pub fn daily_pnl(&self) -> Decimal {
        self.portfolio_value() - self.day_start_value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn buy_then_add_averages_entry() {
        let mut pos = Position::new(dec!(0), dec!(0), dec!(100));
        pos.apply_fill(dec!(10), dec!(100));
        pos.apply_fill(dec!(10), dec!(110));
        assert_eq!(pos.quantity, dec!(20));
        assert_eq!(pos.avg_entry_price, dec!(105));
    }

    #[test]
    fn partial_sell_realizes_pnl_and_keeps_entry() {
        let mut pos = Position::new(dec!(10), dec!(100), dec!(100));
        let realized = pos.apply_fill(dec!(-4), dec!(120));
        assert_eq!(realized, dec!(80));
        assert_eq!(pos.quantity, dec!(6));
        assert_eq!(pos.avg_entry_price, dec!(100));
        assert_eq!(pos.unrealized_pnl, dec!(120));
    }

    #[test]
    fn flip_long_to_short_reopens_at_fill_price() {
        let mut pos = Position::new(dec!(5), dec!(100), dec!(100));
        let realized = pos.apply_fill(dec!(-8), dec!(90));
        assert_eq!(realized, dec!(-50));
        assert_eq!(pos.quantity, dec!(-3));
        assert_eq!(pos.avg_entry_price, dec!(90));
    }

    #[test]
    fn covering_short_realizes_gain_when_price_falls() {
        let mut pos = Position::new(dec!(-5), dec!(100), dec!(100));
        let realized = pos.apply_fill(dec!(5), dec!(80));
        assert_eq!(realized, dec!(100));
        assert!(pos.quantity.is_zero());
    }

    #[test]
    fn snapshot_value_and_marks() {
        let mut snapshot = PortfolioSnapshot::with_cash(dec!(1000), Utc::now());
        snapshot
            .positions
            .insert("BTC-USD".to_string(), Position::new(dec!(2), dec!(100), dec!(150)));
        snapshot.marks.insert("ETH-USD".to_string(), dec!(30));

        assert_eq!(snapshot.portfolio_value(), dec!(1300));
        assert_eq!(snapshot.unrealized_pnl(), dec!(100));
        assert_eq!(snapshot.mark("BTC-USD"), Some(dec!(150)));
        assert_eq!(snapshot.mark("ETH-USD"), Some(dec!(30)));
        assert_eq!(snapshot.mark("SOL-USD"), None);
        assert_eq!(snapshot.position_quantity("ETH-USD"), dec!(0));
        assert_eq!(snapshot.daily_pnl(), dec!(300));
    }

    #[test]
    fn roundtrip_snapshot() {
        let snapshot = PortfolioSnapshot::with_cash(dec!(25000), Utc::now());
        let json = serde_json::to_string(&snapshot).unwrap();
        let parsed: PortfolioSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(snapshot, parsed);
    }
}
