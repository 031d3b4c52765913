use async_trait::async_trait;
use mstrade_models::market::{MarketSnapshot, NewsItem};

use crate::error::DataError;

/// Source of typed market data. Mockable for testing.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn get_market_snapshot(&self, symbol: &str) -> Result<MarketSnapshot, DataError>;

    async fn get_news(&self, symbol: &str) -> Result<Vec<NewsItem>, DataError>;
}
