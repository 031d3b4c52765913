use mstrade_market::DataError;
use mstrade_models::cycle::RejectedDecision;
use mstrade_models::decision::TradingDecision;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    /// A fill that cannot be applied to the portfolio. The monitor keeps its
    /// last consistent snapshot.
    #[error("Inconsistent fill: {0}")]
    InconsistentFill(String),

    #[error("Interpretation failed: {0}")]
    Interpret(String),

    #[error("Market data error: {0}")]
    Data(#[from] DataError),
}

/// Why a decision was not executed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Rejection {
    #[error("{policy}: {reason}")]
    Validation { policy: String, reason: String },

    #[error("{policy}: risk limit exceeded: {reason}")]
    RiskLimitExceeded { policy: String, reason: String },
}

impl Rejection {
    pub fn validation(policy: &str, reason: impl Into<String>) -> Self {
        Rejection::Validation {
            policy: policy.to_string(),
            reason: reason.into(),
        }
    }

    pub fn risk_limit(policy: &str, reason: impl Into<String>) -> Self {
        Rejection::RiskLimitExceeded {
            policy: policy.to_string(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Rejection::Validation { .. } => "validation",
            Rejection::RiskLimitExceeded { .. } => "risk_limit_exceeded",
        }
    }

    pub fn policy(&self) -> &str {
        match self {
            Rejection::Validation { policy, .. } | Rejection::RiskLimitExceeded { policy, .. } => {
                policy
            }
        }
    }

    pub fn reason(&self) -> &str {
        match self {
            Rejection::Validation { reason, .. } | Rejection::RiskLimitExceeded { reason, .. } => {
                reason
            }
        }
    }

    pub fn record(&self, decision: TradingDecision) -> RejectedDecision {
        RejectedDecision {
            decision,
            kind: self.kind().to_string(),
            policy: self.policy().to_string(),
            reason: self.reason().to_string(),
        }
    }
}
