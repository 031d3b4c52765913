use thiserror::Error;

#[derive(Error, Debug)]
pub enum DataError {
    /// No usable data for the request. Slaves degrade instead of failing the cycle.
    #[error("Market data unavailable: {0}")]
    Unavailable(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON deserialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DataError {
    pub fn unavailable(what: impl Into<String>) -> Self {
        DataError::Unavailable(what.into())
    }
}
