use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use mstrade_models::market::{MarketSnapshot, NewsItem};
use rust_decimal::Decimal;

use crate::error::DataError;
use crate::provider::MarketDataProvider;

/// In-memory provider for simulations and tests.
///
/// Quotes and news are set explicitly; `fail` makes every request for a
/// symbol return `DataError::Unavailable` until `recover` is called.
#[derive(Default)]
pub struct StaticProvider {
    quotes: RwLock<HashMap<String, MarketSnapshot>>,
    news: RwLock<HashMap<String, Vec<NewsItem>>>,
    failing: RwLock<HashSet<String>>,
}

impl StaticProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshots(snapshots: impl IntoIterator<Item = MarketSnapshot>) -> Self {
        let provider = Self::new();
        for snapshot in snapshots {
            provider.set_snapshot(snapshot);
        }
        provider
    }

    pub fn set_snapshot(&self, snapshot: MarketSnapshot) {
        if let Ok(mut quotes) = self.quotes.write() {
            quotes.insert(snapshot.symbol.clone(), snapshot);
        }
    }

    /// Convenience for tests: price and volatility only.
    pub fn set_price(&self, symbol: &str, price: Decimal, volatility: Decimal) {
        self.set_snapshot(MarketSnapshot {
            symbol: symbol.to_string(),
            price,
            volume: Decimal::ZERO,
            volatility,
            change_24h: Decimal::ZERO,
            fair_value: None,
            timestamp: Utc::now(),
        });
    }

    pub fn set_news(&self, symbol: &str, items: Vec<NewsItem>) {
        if let Ok(mut news) = self.news.write() {
            news.insert(symbol.to_string(), items);
        }
    }

    pub fn fail(&self, symbol: &str) {
        if let Ok(mut failing) = self.failing.write() {
            failing.insert(symbol.to_string());
        }
    }

    pub fn recover(&self, symbol: &str) {
        if let Ok(mut failing) = self.failing.write() {
            failing.remove(symbol);
        }
    }

    fn check(&self, symbol: &str) -> Result<(), DataError> {
        let failing = self
            .failing
            .read()
            .map_err(|e| DataError::unavailable(format!("provider lock poisoned: {e}")))?;
        if failing.contains(symbol) {
            return Err(DataError::unavailable(format!("{symbol}: feed down")));
        }
        Ok(())
    }
}

#[async_trait]
impl MarketDataProvider for StaticProvider {
    async fn get_market_snapshot(&self, symbol: &str) -> Result<MarketSnapshot, DataError> {
        self.check(symbol)?;
        let quotes = self
            .quotes
            .read()
            .map_err(|e| DataError::unavailable(format!("provider lock poisoned: {e}")))?;
        quotes
            .get(symbol)
            .cloned()
            .ok_or_else(|| DataError::unavailable(format!("no quote for {symbol}")))
    }

    async fn get_news(&self, symbol: &str) -> Result<Vec<NewsItem>, DataError> {
        self.check(symbol)?;
        let news = self
            .news
            .read()
            .map_err(|e| DataError::unavailable(format!("provider lock poisoned: {e}")))?;
        Ok(news.get(symbol).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn serves_configured_quotes() {
        let provider = StaticProvider::new();
        provider.set_price("ETH-USD", dec!(2850), dec!(0.5));

        let snapshot = provider.get_market_snapshot("ETH-USD").await.unwrap();
        assert_eq!(snapshot.price, dec!(2850));
        assert!(provider.get_news("ETH-USD").await.unwrap().is_empty());
        assert!(provider.get_market_snapshot("BTC-USD").await.is_err());
    }

    #[tokio::test]
    async fn failure_injection_and_recovery() {
        let provider = StaticProvider::new();
        provider.set_price("ETH-USD", dec!(2850), dec!(0.5));
        provider.fail("ETH-USD");

        let err = provider.get_market_snapshot("ETH-USD").await.unwrap_err();
        assert!(matches!(err, DataError::Unavailable(_)));
        assert!(provider.get_news("ETH-USD").await.is_err());

        provider.recover("ETH-USD");
        assert!(provider.get_market_snapshot("ETH-USD").await.is_ok());
    }
}
