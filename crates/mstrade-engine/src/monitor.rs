use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use mstrade_market::{DataError, MarketDataProvider};
use mstrade_models::config::MonitorConfig;
use mstrade_models::order_book::ExecutionResult;
use mstrade_models::performance::{MarketRegime, PortfolioPerformance};
use mstrade_models::portfolio::{PortfolioSnapshot, Position};
use mstrade_models::research::{Action, Specialty};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::error::EngineError;

/// Owns the portfolio and decides when research is needed.
///
/// Every refresh or fill produces a new immutable snapshot. A rejected fill
/// leaves the current snapshot untouched.
pub struct PortfolioMonitor {
    provider: Arc<dyn MarketDataProvider>,
    config: MonitorConfig,
    staleness_window: Duration,
    current: Arc<PortfolioSnapshot>,
    last_researched: HashMap<Specialty, DateTime<Utc>>,
}

impl PortfolioMonitor {
    pub fn new(
        provider: Arc<dyn MarketDataProvider>,
        config: MonitorConfig,
        staleness_window: Duration,
    ) -> Self {
        let initial = PortfolioSnapshot::with_cash(config.starting_cash, Utc::now());
        Self {
            provider,
            config,
            staleness_window,
            current: Arc::new(initial),
            last_researched: HashMap::new(),
        }
    }

    /// Replace the starting portfolio, e.g. to resume from stored state.
    pub fn with_snapshot(mut self, snapshot: PortfolioSnapshot) -> Self {
        self.current = Arc::new(snapshot);
        self
    }

    pub fn current(&self) -> Arc<PortfolioSnapshot> {
        Arc::clone(&self.current)
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Instruments of interest: the configured universe plus everything held.
    pub fn universe(&self) -> Vec<String> {
        self.config
            .universe
            .iter()
            .cloned()
            .chain(self.current.positions.keys().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub async fn get_current_status(&mut self) -> Result<Arc<PortfolioSnapshot>, EngineError> {
        self.refresh_at(Utc::now()).await
    }

    /// Refresh marks as of `now`. Symbols whose data is unavailable keep their
    /// last mark; if nothing could be refreshed the call fails.
    pub async fn refresh_at(
        &mut self,
        now: DateTime<Utc>,
    ) -> Result<Arc<PortfolioSnapshot>, EngineError> {
        let universe = self.universe();
        let mut next = (*self.current).clone();
        let mut refreshed = 0usize;
        let mut volatility: Option<Decimal> = None;
        let mut last_error: Option<DataError> = None;

        for symbol in &universe {
            match self.provider.get_market_snapshot(symbol).await {
                Ok(market) => {
                    refreshed += 1;
                    next.marks.insert(symbol.clone(), market.price);
                    if let Some(position) = next.positions.get_mut(symbol) {
                        position.remark(market.price);
                    }
                    volatility = Some(volatility.map_or(market.volatility, |v| v.max(market.volatility)));
                }
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "Keeping last mark");
                    last_error = Some(e);
                }
            }
        }

        if refreshed == 0 {
            if let Some(e) = last_error {
                return Err(EngineError::Data(e));
            }
        }

        if let Some(v) = volatility {
            next.volatility = v;
        }

        let value = next.portfolio_value();
        if now.date_naive() != self.current.taken_at.date_naive() {
            info!(day_start_value = %value, "Rolling start-of-day value");
            next.day_start_value = value;
        }
        finish(&mut next, now);

        debug!(
            sequence = next.sequence,
            value = %next.portfolio_value(),
            volatility = %next.volatility,
            refreshed,
            "Portfolio refreshed"
        );
        self.current = Arc::new(next);
        Ok(self.current())
    }

    /// Apply an execution to cash and positions.
    ///
    /// Unsuccessful or empty executions return the current snapshot unchanged.
    pub fn apply_execution(
        &mut self,
        execution: &ExecutionResult,
    ) -> Result<Arc<PortfolioSnapshot>, EngineError> {
        if !execution.success || execution.filled_quantity.is_zero() {
            return Ok(self.current());
        }

        let symbol = execution.symbol.as_str();
        let inconsistent = |reason: String| {
            warn!(symbol, execution = %execution.id, reason = %reason, "Rejecting fill");
            Err(EngineError::InconsistentFill(reason))
        };

        if execution.action == Action::Hold {
            return inconsistent(format!("HOLD execution for {symbol}"));
        }
        if execution.filled_quantity < Decimal::ZERO
            || execution.filled_quantity > execution.requested_quantity
        {
            return inconsistent(format!(
                "filled {} of requested {}",
                execution.filled_quantity, execution.requested_quantity
            ));
        }
        if execution.average_price <= Decimal::ZERO {
            return inconsistent(format!("non-positive fill price {}", execution.average_price));
        }
        if self.current.mark(symbol).is_none() && !self.config.universe.iter().any(|s| s == symbol)
        {
            return inconsistent(format!("unknown instrument {symbol}"));
        }

        let mut next = (*self.current).clone();
        let signed = execution.filled_quantity * execution.action.sign();
        let price = execution.average_price;

        next.cash -= signed * price;
        if next.cash < Decimal::ZERO {
            return inconsistent(format!("cash would go negative ({})", next.cash));
        }

        let position = next
            .positions
            .entry(symbol.to_string())
            .or_insert_with(|| Position::new(Decimal::ZERO, Decimal::ZERO, price));
        let realized = position.apply_fill(signed, price);
        let quantity = position.quantity;
        if quantity.is_zero() {
            next.positions.remove(symbol);
        }
        next.realized_pnl += realized;
        next.marks.insert(symbol.to_string(), price);

        if quantity < Decimal::ZERO {
            let limit = self.config.max_short_exposure * next.portfolio_value();
            let exposure = quantity.abs() * price;
            if exposure > limit {
                return inconsistent(format!(
                    "short exposure {exposure} exceeds limit {limit}"
                ));
            }
        }

        finish(&mut next, Utc::now().max(self.current.taken_at));
        info!(
            symbol,
            action = %execution.action,
            quantity = %execution.filled_quantity,
            price = %price,
            realized = %realized,
            cash = %next.cash,
            "Fill applied"
        );
        self.current = Arc::new(next);
        Ok(self.current())
    }

    /// Which specialties the snapshot calls for. Uses `snapshot.taken_at` as
    /// the current time.
    pub fn needs_research(&self, snapshot: &PortfolioSnapshot) -> BTreeSet<Specialty> {
        let mut needed = BTreeSet::new();

        if snapshot.volatility > self.config.volatility_threshold {
            needed.insert(Specialty::Risk);
        }

        if snapshot.free_cash_fraction() > self.config.free_cash_threshold {
            needed.insert(Specialty::Technical);
            needed.insert(Specialty::Fundamental);
        }

        let stale = match self.last_researched.get(&Specialty::Sentiment) {
            None => true,
            Some(at) => snapshot
                .taken_at
                .signed_duration_since(*at)
                .to_std()
                .map(|age| age >= self.staleness_window)
                .unwrap_or(false),
        };
        if stale {
            needed.insert(Specialty::Sentiment);
        }

        let losing = snapshot
            .positions
            .values()
            .any(|p| p.pnl_fraction() < -self.config.losing_position_threshold);
        if losing {
            needed.insert(Specialty::Risk);
            needed.insert(Specialty::Technical);
        }

        let wanted = self.config.min_positions.min(self.config.universe.len());
        if snapshot.positions.len() < wanted {
            needed.insert(Specialty::Fundamental);
        }

        needed
    }

    pub fn regime(&self, snapshot: &PortfolioSnapshot) -> MarketRegime {
        MarketRegime::classify(
            snapshot.volatility,
            self.config.low_volatility_threshold,
            self.config.volatility_threshold,
        )
    }

    /// Results of the current portfolio against the configured starting cash.
    pub fn performance_summary(&self) -> PortfolioPerformance {
        PortfolioPerformance::of(&self.current, self.config.starting_cash)
    }

    pub fn mark_researched(
        &mut self,
        specialties: impl IntoIterator<Item = Specialty>,
        at: DateTime<Utc>,
    ) {
        for specialty in specialties {
            self.last_researched.insert(specialty, at);
        }
    }

    pub fn last_researched(&self, specialty: Specialty) -> Option<DateTime<Utc>> {
        self.last_researched.get(&specialty).copied()
    }
}

/// Bump the sequence and recompute peak and drawdown.
fn finish(next: &mut PortfolioSnapshot, now: DateTime<Utc>) {
    next.sequence += 1;
    next.taken_at = now;
    let value = next.portfolio_value();
    next.peak_value = next.peak_value.max(value);
    next.drawdown = if next.peak_value > Decimal::ZERO {
        (next.peak_value - value) / next.peak_value
    } else {
        Decimal::ZERO
    };
}
