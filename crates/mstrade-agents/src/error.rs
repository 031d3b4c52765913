use mstrade_models::Specialty;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Claude CLI error: {0}")]
    Cli(String),

    #[error("Agent response parse error: {0}")]
    Parse(String),

    #[error("Slave timed out after {0} ms")]
    Timeout(u64),

    #[error("Slave invocation cancelled")]
    Cancelled,

    #[error("Market data unavailable: {0}")]
    DataUnavailable(String),

    #[error("No slave registered for specialty {0}")]
    UnknownSpecialty(Specialty),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<mstrade_market::DataError> for AgentError {
    fn from(e: mstrade_market::DataError) -> Self {
        AgentError::DataUnavailable(e.to_string())
    }
}
