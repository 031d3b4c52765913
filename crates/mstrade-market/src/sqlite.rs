use chrono::{Duration, Utc};
use mstrade_models::cache_schema::{CacheCategory, CacheRow, CACHE_TABLE_DDL};
use rusqlite::{Connection, OpenFlags, Row};
use serde::Serialize;

use crate::error::DataError;

const SELECT_COLUMNS: &str =
    "SELECT key, category, value_json, source, symbol, created_at, expires_at, updated_at \
     FROM cache_entries";

/// SQLite accessor for the shared market data cache.
///
/// In production the database is written by an external pipeline and opened
/// read-only. The in-memory variant is writable so tests and simulations can
/// seed quotes and news.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open a read-only connection to the shared cache database.
    pub fn open(path: &str) -> Result<Self, DataError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self { conn })
    }

    /// Open (creating if needed) a writable database with the schema applied.
    pub fn open_writable(path: &str) -> Result<Self, DataError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(CACHE_TABLE_DDL)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, DataError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(CACHE_TABLE_DDL)?;
        Ok(Self { conn })
    }

    /// Get a single live entry by key. Expired entries are invisible.
    pub fn get(&self, key: &str) -> Result<Option<CacheRow>, DataError> {
        let now = Utc::now().to_rfc3339();
        let mut stmt = self.conn.prepare_cached(&format!(
            "{SELECT_COLUMNS} WHERE key = ?1 AND expires_at > ?2"
        ))?;

        match stmt.query_row(rusqlite::params![key, now], map_row) {
            Ok(row) => Ok(Some(row)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(DataError::Sqlite(e)),
        }
    }

    /// All live entries for a symbol.
    pub fn get_by_symbol(&self, symbol: &str) -> Result<Vec<CacheRow>, DataError> {
        let now = Utc::now().to_rfc3339();
        let mut stmt = self.conn.prepare_cached(&format!(
            "{SELECT_COLUMNS} WHERE symbol = ?1 AND expires_at > ?2"
        ))?;

        let rows = stmt
            .query_map(rusqlite::params![symbol, now], map_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn insert(&self, row: &CacheRow) -> Result<(), DataError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO cache_entries \
             (key, category, value_json, source, symbol, created_at, expires_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                row.key,
                row.category,
                row.value_json,
                row.source,
                row.symbol,
                row.created_at,
                row.expires_at,
                row.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Serialize `value` and store it under `key` with a TTL.
    pub fn put<T: Serialize>(
        &self,
        key: &str,
        category: CacheCategory,
        symbol: &str,
        value: &T,
        ttl_seconds: i64,
    ) -> Result<(), DataError> {
        let now = Utc::now();
        self.insert(&CacheRow {
            key: key.to_string(),
            category: category.as_str().to_string(),
            value_json: serde_json::to_string(value)?,
            source: "mstrade".to_string(),
            symbol: Some(symbol.to_string()),
            created_at: now.to_rfc3339(),
            expires_at: (now + Duration::seconds(ttl_seconds)).to_rfc3339(),
            updated_at: now.to_rfc3339(),
        })
    }
}

fn map_row(row: &Row<'_>) -> rusqlite::Result<CacheRow> {
    Ok(CacheRow {
        key: row.get(0)?,
        category: row.get(1)?,
        value_json: row.get(2)?,
        source: row.get(3)?,
        symbol: row.get(4)?,
        created_at: row.get(5)?,
        expires_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mstrade_models::cache_schema::key_patterns;

    fn quote_json(price: f64) -> serde_json::Value {
        serde_json::json!({
            "symbol": "BTC-USD",
            "price": price.to_string(),
            "volume": "1000",
            "volatility": "0.4",
            "timestamp": "2026-01-01T00:00:00Z"
        })
    }

    #[test]
    fn put_and_get() {
        let store = SqliteStore::open_in_memory().unwrap();
        let key = key_patterns::quote("BTC-USD");
        store
            .put(&key, CacheCategory::Quote, "BTC-USD", &quote_json(50000.0), 300)
            .unwrap();

        let row = store.get(&key).unwrap().unwrap();
        assert_eq!(row.category, "quote");
        assert!(row.value_json.contains("50000"));
    }

    #[test]
    fn get_missing_key() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.get("quote:NOPE").unwrap().is_none());
    }

    #[test]
    fn expired_entries_are_invisible() {
        let store = SqliteStore::open_in_memory().unwrap();
        let key = key_patterns::quote("BTC-USD");
        store
            .put(&key, CacheCategory::Quote, "BTC-USD", &quote_json(1.0), -10)
            .unwrap();
        assert!(store.get(&key).unwrap().is_none());
        assert!(store.get_by_symbol("BTC-USD").unwrap().is_empty());
    }

    #[test]
    fn get_by_symbol_filters() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .put(
                &key_patterns::quote("BTC-USD"),
                CacheCategory::Quote,
                "BTC-USD",
                &quote_json(1.0),
                300,
            )
            .unwrap();
        store
            .put(
                &key_patterns::news("BTC-USD"),
                CacheCategory::News,
                "BTC-USD",
                &serde_json::json!([]),
                300,
            )
            .unwrap();
        store
            .put(
                &key_patterns::quote("ETH-USD"),
                CacheCategory::Quote,
                "ETH-USD",
                &quote_json(2.0),
                300,
            )
            .unwrap();

        assert_eq!(store.get_by_symbol("BTC-USD").unwrap().len(), 2);
        assert_eq!(store.get_by_symbol("ETH-USD").unwrap().len(), 1);
    }

    #[test]
    fn read_only_open_sees_pipeline_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        let path = path.to_str().unwrap();

        let writer = SqliteStore::open_writable(path).unwrap();
        writer
            .put(
                &key_patterns::quote("BTC-USD"),
                CacheCategory::Quote,
                "BTC-USD",
                &quote_json(42.0),
                300,
            )
            .unwrap();

        let reader = SqliteStore::open(path).unwrap();
        assert!(reader.get("quote:BTC-USD").unwrap().is_some());
    }
}
