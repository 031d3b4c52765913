use serde::{Deserialize, Serialize};

/// Categories for organizing cache keys.
/// The data pipeline uses these when writing to the shared SQLite cache.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CacheCategory {
    Quote,
    News,
}

impl CacheCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheCategory::Quote => "quote",
            CacheCategory::News => "news",
        }
    }
}

/// The SQLite table an external data pipeline writes and the cache provider reads.
pub const CACHE_TABLE_DDL: &str = "\
CREATE TABLE IF NOT EXISTS cache_entries (
    key         TEXT PRIMARY KEY,
    category    TEXT NOT NULL,
    value_json  TEXT NOT NULL,
    source      TEXT NOT NULL,
    symbol      TEXT,
    created_at  TEXT NOT NULL,
    expires_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_cache_category ON cache_entries(category);
CREATE INDEX IF NOT EXISTS idx_cache_symbol ON cache_entries(symbol);
CREATE INDEX IF NOT EXISTS idx_cache_expires ON cache_entries(expires_at);
";

/// Key patterns for the cache.
///
/// - Quotes: `quote:{symbol}` holding a `MarketSnapshot` as JSON
/// - News: `news:{symbol}` holding a JSON array of `NewsItem`
pub mod key_patterns {
    pub fn quote(symbol: &str) -> String {
        format!("quote:{symbol}")
    }

    pub fn news(symbol: &str) -> String {
        format!("news:{symbol}")
    }
}

/// A raw cache row as read from SQLite.
#[derive(Debug, Clone)]
pub struct CacheRow {
    pub key: String,
    pub category: String,
    pub value_json: String,
    pub source: String,
    pub symbol: Option<String>,
    pub created_at: String,
    pub expires_at: String,
    pub updated_at: String,
}
