use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use mstrade_models::cache_schema::key_patterns;
use mstrade_models::market::{MarketSnapshot, NewsItem};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::DataError;
use crate::provider::MarketDataProvider;
use crate::sqlite::SqliteStore;

/// Read-through data provider: moka (hot) → SQLite (shared) → unavailable.
///
/// SQLite hits are promoted to moka so repeated reads inside one cycle stay
/// in memory. SQLite access goes through a `Mutex` since
/// `rusqlite::Connection` is not `Sync`.
pub struct CacheProvider {
    hot: Cache<String, String>,
    store: Mutex<SqliteStore>,
}

impl CacheProvider {
    pub fn new(store: SqliteStore, max_capacity: u64, memory_ttl: Duration) -> Self {
        Self {
            hot: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(memory_ttl)
                .build(),
            store: Mutex::new(store),
        }
    }

    /// Raw JSON for a key, or `None` when neither layer has a live entry.
    pub async fn get_json(&self, key: &str) -> Result<Option<String>, DataError> {
        if let Some(json) = self.hot.get(key).await {
            return Ok(Some(json));
        }

        let row = {
            let store = self
                .store
                .lock()
                .map_err(|e| DataError::unavailable(format!("SQLite mutex poisoned: {e}")))?;
            store.get(key)?
        };

        match row {
            Some(row) => {
                debug!(key, "Promoting cache entry to memory");
                self.hot.insert(key.to_string(), row.value_json.clone()).await;
                Ok(Some(row.value_json))
            }
            None => Ok(None),
        }
    }

    async fn get_typed<T: DeserializeOwned>(&self, key: &str) -> Result<T, DataError> {
        let json = self
            .get_json(key)
            .await?
            .ok_or_else(|| DataError::unavailable(format!("no live cache entry for {key}")))?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Drop a key from the hot layer so the next read goes to SQLite.
    pub async fn invalidate(&self, key: &str) {
        self.hot.invalidate(key).await;
    }

    pub fn hot_entry_count(&self) -> u64 {
        self.hot.entry_count()
    }
}

#[async_trait]
impl MarketDataProvider for CacheProvider {
    async fn get_market_snapshot(&self, symbol: &str) -> Result<MarketSnapshot, DataError> {
        self.get_typed(&key_patterns::quote(symbol)).await
    }

    /// Missing news is an empty list, not an error.
    async fn get_news(&self, symbol: &str) -> Result<Vec<NewsItem>, DataError> {
        match self.get_json(&key_patterns::news(symbol)).await? {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(Vec::new()),
        }
    }
}
