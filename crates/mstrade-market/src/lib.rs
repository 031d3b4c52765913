//! Market data collaborators: the `MarketDataProvider` seam plus a
//! read-through SQLite/moka provider and an in-memory provider.

pub mod cache_provider;
pub mod error;
pub mod provider;
pub mod sqlite;
pub mod static_provider;

pub use cache_provider::CacheProvider;
pub use error::DataError;
pub use provider::MarketDataProvider;
pub use sqlite::SqliteStore;
pub use static_provider::StaticProvider;
