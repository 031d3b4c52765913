use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::portfolio::PortfolioSnapshot;
use crate::research::Specialty;

/// Coarse market regime derived from the highest instrument volatility.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MarketRegime {
    LowVolatility,
    Normal,
    HighVolatility,
}

impl MarketRegime {
    /// `low` and `high` are exclusive upper bounds of the first two regimes.
    pub fn classify(volatility: Decimal, low: Decimal, high: Decimal) -> Self {
        if volatility < low {
            MarketRegime::LowVolatility
        } else if volatility < high {
            MarketRegime::Normal
        } else {
            MarketRegime::HighVolatility
        }
    }
}

impl fmt::Display for MarketRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MarketRegime::LowVolatility => "low_volatility",
            MarketRegime::Normal => "normal",
            MarketRegime::HighVolatility => "high_volatility",
        };
        f.write_str(s)
    }
}

/// Portfolio results relative to the starting capital.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PortfolioPerformance {
    pub portfolio_value: Decimal,
    /// Value change since inception, realized and unrealized.
    pub total_pnl: Decimal,
    /// `total_pnl` as a fraction of starting capital.
    pub total_pnl_fraction: Decimal,
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
    pub total_positions: usize,
    pub winning_positions: usize,
    /// Winning over total open positions; zero when flat.
    pub win_rate: Decimal,
    pub drawdown: Decimal,
}

impl PortfolioPerformance {
    pub fn of(snapshot: &PortfolioSnapshot, starting_value: Decimal) -> Self {
        let value = snapshot.portfolio_value();
        let total_pnl = value - starting_value;
        let total_positions = snapshot.positions.len();
        let winning_positions = snapshot
            .positions
            .values()
            .filter(|p| p.unrealized_pnl > Decimal::ZERO)
            .count();

        Self {
            portfolio_value: value,
            total_pnl,
            total_pnl_fraction: if starting_value > Decimal::ZERO {
                total_pnl / starting_value
            } else {
                Decimal::ZERO
            },
            realized_pnl: snapshot.realized_pnl,
            unrealized_pnl: snapshot.unrealized_pnl(),
            total_positions,
            winning_positions,
            win_rate: if total_positions == 0 {
                Decimal::ZERO
            } else {
                Decimal::from(winning_positions as u64) / Decimal::from(total_positions as u64)
            },
            drawdown: snapshot.drawdown,
        }
    }
}

/// Running record of one specialty's slave across all dispatches.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SlaveStats {
    pub specialty: Specialty,
    pub runs: u64,
    pub reports: u64,
    pub failures: u64,
    /// Failures that were deadline expiries. Also counted in `failures`.
    pub timeouts: u64,
    pub total_confidence: Decimal,
    pub total_latency_ms: u64,
}

impl SlaveStats {
    pub fn new(specialty: Specialty) -> Self {
        Self {
            specialty,
            runs: 0,
            reports: 0,
            failures: 0,
            timeouts: 0,
            total_confidence: Decimal::ZERO,
            total_latency_ms: 0,
        }
    }

    pub fn record_report(&mut self, confidence: Decimal, elapsed_ms: u64) {
        self.runs += 1;
        self.reports += 1;
        self.total_confidence += confidence;
        self.total_latency_ms += elapsed_ms;
    }

    pub fn record_failure(&mut self, timed_out: bool, elapsed_ms: u64) {
        self.runs += 1;
        self.failures += 1;
        if timed_out {
            self.timeouts += 1;
        }
        self.total_latency_ms += elapsed_ms;
    }

    /// Mean confidence over delivered reports.
    pub fn mean_confidence(&self) -> Decimal {
        if self.reports == 0 {
            Decimal::ZERO
        } else {
            self.total_confidence / Decimal::from(self.reports)
        }
    }

    pub fn mean_latency_ms(&self) -> u64 {
        self.total_latency_ms.checked_div(self.runs).unwrap_or(0)
    }

    pub fn success_rate(&self) -> Decimal {
        if self.runs == 0 {
            Decimal::ZERO
        } else {
            Decimal::from(self.reports) / Decimal::from(self.runs)
        }
    }

    /// Success rate weighted by mean confidence.
    pub fn score(&self) -> Decimal {
        self.success_rate() * self.mean_confidence()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portfolio::Position;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    #[test]
    fn regime_boundaries() {
        let classify = |v| MarketRegime::classify(v, dec!(0.4), dec!(0.7));
        assert_eq!(classify(dec!(0.2)), MarketRegime::LowVolatility);
        assert_eq!(classify(dec!(0.4)), MarketRegime::Normal);
        assert_eq!(classify(dec!(0.69)), MarketRegime::Normal);
        assert_eq!(classify(dec!(0.7)), MarketRegime::HighVolatility);
    }

    #[test]
    fn performance_counts_winners() {
        let mut snapshot = PortfolioSnapshot::with_cash(dec!(50000), Utc::now());
        snapshot
            .positions
            .insert("BTC-USD".to_string(), Position::new(dec!(1), dec!(40000), dec!(44000)));
        snapshot
            .positions
            .insert("ETH-USD".to_string(), Position::new(dec!(2), dec!(3000), dec!(2500)));
        snapshot.realized_pnl = dec!(100);

        let perf = PortfolioPerformance::of(&snapshot, dec!(100000));
        assert_eq!(perf.portfolio_value, dec!(99000));
        assert_eq!(perf.total_pnl, dec!(-1000));
        assert_eq!(perf.total_pnl_fraction, dec!(-0.01));
        assert_eq!(perf.unrealized_pnl, dec!(3000));
        assert_eq!(perf.winning_positions, 1);
        assert_eq!(perf.win_rate, dec!(0.5));
    }

    #[test]
    fn flat_portfolio_has_zero_win_rate() {
        let snapshot = PortfolioSnapshot::with_cash(dec!(100000), Utc::now());
        let perf = PortfolioPerformance::of(&snapshot, dec!(100000));
        assert_eq!(perf.win_rate, Decimal::ZERO);
        assert_eq!(perf.total_pnl, Decimal::ZERO);
    }

    #[test]
    fn slave_stats_means() {
        let mut stats = SlaveStats::new(Specialty::Technical);
        assert_eq!(stats.score(), Decimal::ZERO);

        stats.record_report(dec!(0.8), 100);
        stats.record_report(dec!(0.6), 200);
        stats.record_failure(true, 300);

        assert_eq!(stats.runs, 3);
        assert_eq!(stats.timeouts, 1);
        assert_eq!(stats.mean_confidence(), dec!(0.7));
        assert_eq!(stats.mean_latency_ms(), 200);
        assert_eq!(stats.success_rate().round_dp(4), dec!(0.6667));
    }
}
