use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decision::TradingDecision;
use crate::order_book::ExecutionResult;
use crate::performance::{MarketRegime, PortfolioPerformance, SlaveStats};
use crate::portfolio::PortfolioSnapshot;
use crate::research::{ResearchReport, Specialty};

/// States of the master coordinator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CycleState {
    Idle,
    Monitoring,
    Researching,
    Interpreting,
    Validating,
    Executing,
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CycleState::Idle => "idle",
            CycleState::Monitoring => "monitoring",
            CycleState::Researching => "researching",
            CycleState::Interpreting => "interpreting",
            CycleState::Validating => "validating",
            CycleState::Executing => "executing",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CycleOutcome {
    /// No research trigger held; nothing was done.
    NoResearchNeeded,
    /// The cycle ran to the end. Zero executions is still a completed cycle.
    Completed,
    Aborted { reason: String },
}

/// A slave task that produced no report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskFailure {
    pub task_id: Uuid,
    pub specialty: Specialty,
    pub symbol: String,
    pub error: String,
    pub elapsed_ms: u64,
}

/// A decision that failed validation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RejectedDecision {
    pub decision: TradingDecision,
    /// `validation` or `risk_limit_exceeded`.
    pub kind: String,
    pub policy: String,
    pub reason: String,
}

/// Everything one master cycle saw and did, emitted for external storage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CycleSummary {
    pub cycle: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: CycleOutcome,
    pub triggered: Vec<Specialty>,
    pub snapshot_before: Option<PortfolioSnapshot>,
    pub snapshot_after: Option<PortfolioSnapshot>,
    pub reports: Vec<ResearchReport>,
    pub research_failures: Vec<TaskFailure>,
    pub decisions: Vec<TradingDecision>,
    pub rejected: Vec<RejectedDecision>,
    pub executions: Vec<ExecutionResult>,
    #[serde(default)]
    pub regime: Option<MarketRegime>,
    /// Portfolio results against starting capital, taken after execution.
    #[serde(default)]
    pub performance: Option<PortfolioPerformance>,
    /// Cumulative per-specialty slave record as of this cycle.
    #[serde(default)]
    pub slave_performance: Vec<SlaveStats>,
}

impl CycleSummary {
    pub fn new(cycle: u64, started_at: DateTime<Utc>) -> Self {
        Self {
            cycle,
            started_at,
            finished_at: started_at,
            outcome: CycleOutcome::Completed,
            triggered: Vec::new(),
            snapshot_before: None,
            snapshot_after: None,
            reports: Vec::new(),
            research_failures: Vec::new(),
            decisions: Vec::new(),
            rejected: Vec::new(),
            executions: Vec::new(),
            regime: None,
            performance: None,
            slave_performance: Vec::new(),
        }
    }

    pub fn executed_count(&self) -> usize {
        self.executions.iter().filter(|e| e.success).count()
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self.outcome, CycleOutcome::Aborted { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_serialization() {
        let json = serde_json::to_string(&CycleOutcome::Aborted {
            reason: "fill rejected".to_string(),
        })
        .unwrap();
        assert_eq!(json, r#"{"kind":"aborted","reason":"fill rejected"}"#);
        assert_eq!(
            serde_json::to_string(&CycleOutcome::NoResearchNeeded).unwrap(),
            r#"{"kind":"no_research_needed"}"#
        );
    }

    #[test]
    fn empty_summary_is_completed_with_no_executions() {
        let summary = CycleSummary::new(1, Utc::now());
        assert_eq!(summary.executed_count(), 0);
        assert!(!summary.is_aborted());
        let json = serde_json::to_string(&summary).unwrap();
        let parsed: CycleSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(summary, parsed);
    }
}
