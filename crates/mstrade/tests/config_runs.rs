//! Wiring from TOML config to running cycles.

use std::io::Write;

use chrono::Utc;
use mstrade::models::cache_schema::{key_patterns, CacheCategory};
use mstrade::models::config::DataSource;
use mstrade::models::market::MarketSnapshot;
use mstrade::market::SqliteStore;
use rust_decimal_macros::dec;
use tokio_util::sync::CancellationToken;

fn shipped_config_path() -> String {
    format!("{}/../../config/mstrade.toml", env!("CARGO_MANIFEST_DIR"))
}

#[test]
fn shipped_config_loads() {
    let config = mstrade::load_config(&shipped_config_path()).unwrap();
    assert_eq!(config.monitor.universe.len(), 3);
    assert_eq!(config.data.instruments.len(), 3);
    assert_eq!(config.risk.min_confidence_threshold, dec!(0.65));
    assert_eq!(config.order_book.latency_ms, 50);
    assert_eq!(config.monitor.min_positions, 3);
}

#[tokio::test]
async fn shipped_config_runs_two_cycles() {
    let mut config = mstrade::load_config(&shipped_config_path()).unwrap();
    config.order_book.latency_ms = 0;

    let mut master = mstrade::build_master(&config, CancellationToken::new()).unwrap();
    let ran = master
        .run(CancellationToken::new(), std::time::Duration::from_millis(1), 2)
        .await;
    assert_eq!(ran, 2);

    let snapshot = master.monitor().current();
    // Cash plus positions never exceeds what was paid in, minus slippage.
    assert!(snapshot.portfolio_value() <= dec!(100000));
    assert!(snapshot.cash >= dec!(0));
}

#[test]
fn partial_config_takes_defaults() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[monitor]
universe = ["BTC-USD"]

[[data.instruments]]
symbol = "BTC-USD"
price = "50000"
volume = "10"
volatility = "0.4"
timestamp = "2026-01-05T14:00:00Z"
"#
    )
    .unwrap();

    let config = mstrade::load_config(file.path().to_str().unwrap()).unwrap();
    assert_eq!(config.monitor.starting_cash, dec!(100000));
    assert_eq!(config.risk.max_position_size, dec!(0.15));
    assert_eq!(config.agents.specialists.len(), 4);
}

#[test]
fn missing_file_is_reported() {
    let err = mstrade::load_config("/nonexistent/mstrade.toml").unwrap_err();
    assert!(err.to_string().contains("Failed to read config"));
}

#[tokio::test]
async fn cache_source_reads_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.db");
    let path = path.to_str().unwrap();

    let store = SqliteStore::open_writable(path).unwrap();
    let quote = MarketSnapshot {
        symbol: "BTC-USD".to_string(),
        price: dec!(50000),
        volume: dec!(100),
        volatility: dec!(0.4),
        change_24h: dec!(0.03),
        fair_value: None,
        timestamp: Utc::now(),
    };
    store
        .put(&key_patterns::quote("BTC-USD"), CacheCategory::Quote, "BTC-USD", &quote, 3600)
        .unwrap();
    drop(store);

    let mut config = mstrade::models::config::MstradeConfig::default();
    config.monitor.universe = vec!["BTC-USD".to_string()];
    config.data.source = DataSource::Cache;
    config.data.cache.sqlite_path = path.to_string();

    let mut master = mstrade::build_master(&config, CancellationToken::new()).unwrap();
    let summary = master.run_cycle().await;

    assert!(!summary.is_aborted());
    let before = summary.snapshot_before.unwrap();
    assert_eq!(before.mark("BTC-USD"), Some(dec!(50000)));
}
