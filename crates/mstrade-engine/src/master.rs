use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use mstrade_agents::ResearchOrchestrator;
use mstrade_models::config::SpecialtyDeadlines;
use mstrade_models::cycle::{CycleOutcome, CycleState, CycleSummary};
use mstrade_models::decision::TradingDecision;
use mstrade_models::portfolio::PortfolioSnapshot;
use mstrade_models::research::{ResearchTask, Specialty};
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{EngineError, Rejection};
use crate::interpreter::DecisionInterpreter;
use crate::monitor::PortfolioMonitor;
use crate::order_book::OrderBookManager;
use crate::risk::{RiskContext, RiskGuard};
use crate::telemetry::{CycleSink, TracingSink};

/// The single coordinating process.
///
/// Drives `Idle → Monitoring → Researching → Interpreting → Validating ⇄
/// Executing → Idle` once per `run_cycle`. All portfolio and order-book
/// mutation happens through `&mut self`, so only one cycle can be active.
pub struct MasterCoordinator {
    monitor: PortfolioMonitor,
    orchestrator: ResearchOrchestrator,
    interpreter: DecisionInterpreter,
    guard: RiskGuard,
    books: OrderBookManager,
    deadlines: SpecialtyDeadlines,
    sink: Arc<dyn CycleSink>,
    state: CycleState,
    cycle_count: u64,
    executed: HashSet<Uuid>,
}

impl MasterCoordinator {
    pub fn new(
        monitor: PortfolioMonitor,
        orchestrator: ResearchOrchestrator,
        interpreter: DecisionInterpreter,
        books: OrderBookManager,
        deadlines: SpecialtyDeadlines,
    ) -> Self {
        Self {
            monitor,
            orchestrator,
            interpreter,
            guard: RiskGuard::standard(),
            books,
            deadlines,
            sink: Arc::new(TracingSink),
            state: CycleState::Idle,
            cycle_count: 0,
            executed: HashSet::new(),
        }
    }

    pub fn with_guard(mut self, guard: RiskGuard) -> Self {
        self.guard = guard;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn CycleSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    pub fn cycle_count(&self) -> u64 {
        self.cycle_count
    }

    pub fn monitor(&self) -> &PortfolioMonitor {
        &self.monitor
    }

    pub fn books(&self) -> &OrderBookManager {
        &self.books
    }

    pub fn orchestrator(&self) -> &ResearchOrchestrator {
        &self.orchestrator
    }

    fn transition(&mut self, next: CycleState) {
        info!(cycle = self.cycle_count, from = %self.state, to = %next, "State transition");
        self.state = next;
    }

    /// Run one full cycle and emit its summary.
    pub async fn run_cycle(&mut self) -> CycleSummary {
        self.cycle_count += 1;
        let mut summary = CycleSummary::new(self.cycle_count, Utc::now());
        info!(cycle = self.cycle_count, "Cycle started");

        let completed = self.drive(&mut summary).await;

        self.books.replenish_all();
        if let Some(before) = &summary.snapshot_before {
            self.monitor.mark_researched(completed, before.taken_at);
        }
        summary.regime = summary
            .snapshot_before
            .as_ref()
            .map(|before| self.monitor.regime(before));
        summary.performance = Some(self.monitor.performance_summary());
        summary.slave_performance = self.orchestrator.slave_performance();
        summary.snapshot_after = Some((*self.monitor.current()).clone());
        summary.finished_at = Utc::now();
        self.transition(CycleState::Idle);

        if let CycleOutcome::Aborted { reason } = &summary.outcome {
            error!(cycle = summary.cycle, reason = %reason, "Cycle aborted");
        }
        self.sink.emit(&summary).await;
        summary
    }

    /// The body of a cycle. Returns the specialties that produced at least
    /// one report.
    async fn drive(&mut self, summary: &mut CycleSummary) -> BTreeSet<Specialty> {
        self.transition(CycleState::Monitoring);
        let snapshot = match self.monitor.get_current_status().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                summary.outcome = CycleOutcome::Aborted {
                    reason: format!("portfolio status unavailable: {e}"),
                };
                return BTreeSet::new();
            }
        };
        summary.snapshot_before = Some((*snapshot).clone());

        let needed = self.monitor.needs_research(&snapshot);
        info!(
            cycle = summary.cycle,
            regime = %self.monitor.regime(&snapshot),
            value = %snapshot.portfolio_value(),
            "Portfolio status"
        );
        summary.triggered = needed.iter().copied().collect();
        if needed.is_empty() {
            info!(cycle = summary.cycle, "No research needed");
            summary.outcome = CycleOutcome::NoResearchNeeded;
            return BTreeSet::new();
        }

        self.transition(CycleState::Researching);
        let tasks: Vec<ResearchTask> = self
            .monitor
            .universe()
            .into_iter()
            .flat_map(|symbol| {
                needed
                    .iter()
                    .map(|specialty| {
                        ResearchTask::new(
                            *specialty,
                            symbol.clone(),
                            (*snapshot).clone(),
                            self.deadlines.for_specialty(*specialty),
                        )
                    })
                    .collect::<Vec<_>>()
            })
            .collect();
        let batch = self.orchestrator.run_detailed(tasks).await;
        let completed: BTreeSet<Specialty> = batch.reports.iter().map(|r| r.specialty).collect();
        summary.reports = batch.reports;
        summary.research_failures = batch.failures;

        self.transition(CycleState::Interpreting);
        let decisions = match self.interpreter.interpret(&summary.reports, &snapshot) {
            Ok(decisions) => decisions,
            Err(e) => {
                summary.outcome = CycleOutcome::Aborted {
                    reason: e.to_string(),
                };
                return completed;
            }
        };
        info!(cycle = summary.cycle, decisions = decisions.len(), "Decisions interpreted");
        summary.decisions = decisions.clone();

        if let Err(e) = self.execute_batch(decisions, summary).await {
            summary.outcome = CycleOutcome::Aborted {
                reason: e.to_string(),
            };
        }
        completed
    }

    /// Validate and execute decisions in order against the latest snapshot.
    /// An inconsistent fill halts the rest of the batch.
    async fn execute_batch(
        &mut self,
        decisions: Vec<TradingDecision>,
        summary: &mut CycleSummary,
    ) -> Result<(), EngineError> {
        let mut committed = Decimal::ZERO;

        for decision in decisions {
            self.transition(CycleState::Validating);
            let latest = self.monitor.current();
            let mid = latest.mark(&decision.symbol).unwrap_or(decision.target_price);
            if mid > Decimal::ZERO {
                self.books.ensure_book(&decision.symbol, mid);
            }
            let estimated_cost = self.books.estimate(&decision);
            if let Err(rejection) = self.validate(&decision, &latest, committed, estimated_cost) {
                summary.rejected.push(rejection.record(decision));
                continue;
            }

            if !self.executed.insert(decision.id) {
                warn!(decision = %decision.id, "Decision already executed, skipping");
                continue;
            }

            self.transition(CycleState::Executing);
            let result = self.books.submit(&decision).await;

            let applied = self.monitor.apply_execution(&result);
            if result.success && applied.is_ok() {
                committed += decision.risk.expected_loss * result.fill_fraction();
            }
            summary.executions.push(result);
            applied?;
        }

        Ok(())
    }

    fn validate(
        &self,
        decision: &TradingDecision,
        snapshot: &PortfolioSnapshot,
        committed: Decimal,
        estimated_cost: Option<Decimal>,
    ) -> Result<(), Rejection> {
        let ctx = RiskContext {
            snapshot,
            committed_risk: committed,
            config: self.interpreter.config(),
            max_short_exposure: self.monitor.config().max_short_exposure,
            estimated_cost,
        };
        self.guard.validate(decision, &ctx)
    }

    /// Run cycles until `cancel` fires or `max_cycles` complete (0 = no limit),
    /// sleeping `interval` between cycles. Returns the number of cycles run.
    ///
    /// A cycle in progress always runs to the end; cancellation of in-flight
    /// slaves is the orchestrator's token's job.
    pub async fn run(
        &mut self,
        cancel: CancellationToken,
        interval: Duration,
        max_cycles: u64,
    ) -> u64 {
        let mut ran = 0u64;
        info!(interval_secs = interval.as_secs(), max_cycles, "Master loop started");

        loop {
            if cancel.is_cancelled() {
                break;
            }

            self.run_cycle().await;
            ran += 1;
            if max_cycles > 0 && ran >= max_cycles {
                break;
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        info!(cycles = ran, "Master loop stopped");
        ran
    }
}
