use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use mstrade_market::MarketDataProvider;
use mstrade_models::cycle::TaskFailure;
use mstrade_models::performance::SlaveStats;
use mstrade_models::research::{ResearchContext, ResearchReport, ResearchTask, Specialty};
use rust_decimal::Decimal;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::agent::ResearchAgent;
use crate::error::AgentError;

/// Reports and failures from one dispatch.
#[derive(Debug, Clone, Default)]
pub struct ResearchBatch {
    pub reports: Vec<ResearchReport>,
    pub failures: Vec<TaskFailure>,
}

/// Result of one spawned slave, tagged with its task identity.
struct SlaveOutcome {
    index: usize,
    task_id: Uuid,
    specialty: Specialty,
    symbol: String,
    elapsed_ms: u64,
    result: Result<ResearchReport, AgentError>,
}

/// A spawned slave that has not reported back yet.
struct Dispatched {
    task_id: Uuid,
    specialty: Specialty,
    symbol: String,
    started: Instant,
}

/// Fans research tasks out to registered slaves, one tokio task each.
///
/// Every slave runs under a child of the orchestrator's cancellation token
/// and is bounded by its task deadline. Failures, timeouts and panics are
/// recorded and never abort sibling tasks.
pub struct ResearchOrchestrator {
    agents: HashMap<Specialty, Arc<dyn ResearchAgent>>,
    provider: Arc<dyn MarketDataProvider>,
    cancel: CancellationToken,
    stats: Mutex<BTreeMap<Specialty, SlaveStats>>,
}

impl ResearchOrchestrator {
    pub fn new(provider: Arc<dyn MarketDataProvider>) -> Self {
        Self {
            agents: HashMap::new(),
            provider,
            cancel: CancellationToken::new(),
            stats: Mutex::new(BTreeMap::new()),
        }
    }

    /// Register `agent` for its specialty, returning the handler it replaced.
    pub fn register(&mut self, agent: Arc<dyn ResearchAgent>) -> Option<Arc<dyn ResearchAgent>> {
        info!(agent = agent.name(), specialty = %agent.specialty(), "Registering slave");
        self.agents.insert(agent.specialty(), agent)
    }

    /// Tie slave cancellation to an outer token, e.g. a process-wide shutdown.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_agent(mut self, agent: Arc<dyn ResearchAgent>) -> Self {
        self.register(agent);
        self
    }

    pub fn specialties(&self) -> BTreeSet<Specialty> {
        self.agents.keys().copied().collect()
    }

    /// Cancel every in-flight slave. Later runs fail their tasks immediately.
    pub fn shutdown(&self) {
        info!("Shutting down research orchestrator");
        self.cancel.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cumulative record per specialty that has been dispatched at least once.
    pub fn slave_performance(&self) -> Vec<SlaveStats> {
        self.stats
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .cloned()
            .collect()
    }

    fn record(&self, specialty: Specialty, update: impl FnOnce(&mut SlaveStats)) {
        let mut stats = self.stats.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        update(
            stats
                .entry(specialty)
                .or_insert_with(|| SlaveStats::new(specialty)),
        );
    }

    pub async fn run(&self, tasks: Vec<ResearchTask>) -> Vec<ResearchReport> {
        self.run_detailed(tasks).await.reports
    }

    /// Run every task to completion, failure or deadline.
    ///
    /// Reports come back in task order, at most one per task. Every spawned
    /// task ends up as either a report or a failure.
    pub async fn run_detailed(&self, tasks: Vec<ResearchTask>) -> ResearchBatch {
        let start = Instant::now();
        let mut batch = ResearchBatch::default();
        if tasks.is_empty() {
            return batch;
        }

        info!(tasks = tasks.len(), "Dispatching research tasks");
        let contexts = self.prefetch(&tasks).await;

        let mut join_set = JoinSet::new();
        let mut pending: BTreeMap<usize, Dispatched> = BTreeMap::new();
        for (index, task) in tasks.into_iter().enumerate() {
            let Some(agent) = self.agents.get(&task.specialty).cloned() else {
                warn!(specialty = %task.specialty, symbol = %task.symbol, "No slave registered");
                batch.failures.push(TaskFailure {
                    task_id: task.id,
                    specialty: task.specialty,
                    symbol: task.symbol.clone(),
                    error: AgentError::UnknownSpecialty(task.specialty).to_string(),
                    elapsed_ms: 0,
                });
                continue;
            };
            let context = contexts
                .get(&task.symbol)
                .cloned()
                .unwrap_or_else(|| Arc::new(ResearchContext::unavailable("not prefetched")));
            let token = self.cancel.child_token();
            pending.insert(
                index,
                Dispatched {
                    task_id: task.id,
                    specialty: task.specialty,
                    symbol: task.symbol.clone(),
                    started: Instant::now(),
                },
            );
            join_set.spawn(run_slave(index, agent, task, context, token));
        }

        let mut collected: Vec<(usize, ResearchReport)> = Vec::new();
        let mut supervisor_error: Option<String> = None;
        while let Some(joined) = join_set.join_next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(error = %e, "Slave supervisor task failed");
                    supervisor_error.get_or_insert_with(|| e.to_string());
                    continue;
                }
            };
            pending.remove(&outcome.index);

            match outcome.result {
                Ok(report) => {
                    info!(
                        agent = %report.agent_name,
                        specialty = %outcome.specialty,
                        symbol = %outcome.symbol,
                        action = %report.action,
                        confidence = %report.confidence,
                        elapsed_ms = outcome.elapsed_ms,
                        "Slave succeeded"
                    );
                    self.record(outcome.specialty, |stats| {
                        stats.record_report(report.confidence, outcome.elapsed_ms)
                    });
                    collected.push((outcome.index, report));
                }
                Err(e) => {
                    warn!(
                        specialty = %outcome.specialty,
                        symbol = %outcome.symbol,
                        error = %e,
                        elapsed_ms = outcome.elapsed_ms,
                        "Slave failed"
                    );
                    let timed_out = matches!(e, AgentError::Timeout(_));
                    self.record(outcome.specialty, |stats| {
                        stats.record_failure(timed_out, outcome.elapsed_ms)
                    });
                    batch.failures.push(TaskFailure {
                        task_id: outcome.task_id,
                        specialty: outcome.specialty,
                        symbol: outcome.symbol,
                        error: e.to_string(),
                        elapsed_ms: outcome.elapsed_ms,
                    });
                }
            }
        }

        let lost = unfinished(pending, supervisor_error.as_deref());
        for failure in &lost {
            self.record(failure.specialty, |stats| {
                stats.record_failure(false, failure.elapsed_ms)
            });
        }
        batch.failures.extend(lost);

        collected.sort_by_key(|(index, _)| *index);
        batch.reports = collected.into_iter().map(|(_, report)| report).collect();

        info!(
            reports = batch.reports.len(),
            failures = batch.failures.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Research complete"
        );
        batch
    }

    /// One context per distinct symbol, fetched concurrently. Each symbol is
    /// bounded by the longest deadline among its tasks. Provider failures and
    /// expiries mark the context unavailable instead of failing the batch.
    async fn prefetch(&self, tasks: &[ResearchTask]) -> HashMap<String, Arc<ResearchContext>> {
        let mut budgets: BTreeMap<&str, Duration> = BTreeMap::new();
        for task in tasks {
            let budget = budgets.entry(task.symbol.as_str()).or_insert(task.deadline);
            *budget = (*budget).max(task.deadline);
        }

        let mut fetches = JoinSet::new();
        for (symbol, budget) in budgets {
            let provider = Arc::clone(&self.provider);
            let symbol = symbol.to_string();
            fetches.spawn(async move {
                let context = fetch_context(provider.as_ref(), &symbol, budget).await;
                (symbol, context)
            });
        }

        let mut contexts = HashMap::new();
        while let Some(joined) = fetches.join_next().await {
            match joined {
                Ok((symbol, context)) => {
                    contexts.insert(symbol, Arc::new(context));
                }
                Err(e) => error!(error = %e, "Market data fetch task failed"),
            }
        }
        contexts
    }
}

async fn fetch_context(
    provider: &dyn MarketDataProvider,
    symbol: &str,
    budget: Duration,
) -> ResearchContext {
    let fetched = tokio::time::timeout(budget, async {
        tokio::join!(provider.get_market_snapshot(symbol), provider.get_news(symbol))
    })
    .await;

    match fetched {
        Ok((Ok(market), Ok(news))) => ResearchContext {
            market: Some(market),
            news,
            unavailable: None,
        },
        Ok((Err(e), _)) | Ok((_, Err(e))) => {
            warn!(symbol, error = %e, "Market data unavailable for research");
            ResearchContext::unavailable(e.to_string())
        }
        Err(_) => {
            let reason = format!("market data timed out after {}ms", budget.as_millis());
            warn!(symbol, reason = %reason, "Market data unavailable for research");
            ResearchContext::unavailable(reason)
        }
    }
}

/// Failures for spawned slaves whose supervisor never reported back.
fn unfinished(pending: BTreeMap<usize, Dispatched>, cause: Option<&str>) -> Vec<TaskFailure> {
    pending
        .into_values()
        .map(|task| TaskFailure {
            task_id: task.task_id,
            specialty: task.specialty,
            symbol: task.symbol,
            error: match cause {
                Some(cause) => format!("slave supervisor failed: {cause}"),
                None => "slave supervisor failed".to_string(),
            },
            elapsed_ms: task.started.elapsed().as_millis() as u64,
        })
        .collect()
}

/// Supervise one slave: deadline, cancellation, panic isolation and report
/// stamping all happen here so the collector only sees outcomes.
async fn run_slave(
    index: usize,
    agent: Arc<dyn ResearchAgent>,
    task: ResearchTask,
    context: Arc<ResearchContext>,
    token: CancellationToken,
) -> SlaveOutcome {
    let start = Instant::now();
    let task_id = task.id;
    let specialty = task.specialty;
    let symbol = task.symbol.clone();
    let deadline = task.deadline;

    let result = if token.is_cancelled() {
        Err(AgentError::Cancelled)
    } else {
        let slave_task = task.clone();
        let slave_context = Arc::clone(&context);
        let slave_token = token.clone();
        let mut handle = tokio::spawn(async move {
            agent
                .research(&slave_task, &slave_context, slave_token)
                .await
        });

        tokio::select! {
            joined = tokio::time::timeout(deadline, &mut handle) => match joined {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => Err(AgentError::Cli(format!("slave panicked: {e}"))),
                Err(_) => {
                    token.cancel();
                    handle.abort();
                    Err(AgentError::Timeout(deadline.as_millis() as u64))
                }
            },
            _ = token.cancelled() => {
                handle.abort();
                Err(AgentError::Cancelled)
            }
        }
    };

    let elapsed_ms = start.elapsed().as_millis() as u64;
    let result = result.and_then(|report| stamp_report(report, &task, &context, elapsed_ms));

    SlaveOutcome {
        index,
        task_id,
        specialty,
        symbol,
        elapsed_ms,
        result,
    }
}

/// Pin the report to its task and apply the data-availability degradation.
fn stamp_report(
    mut report: ResearchReport,
    task: &ResearchTask,
    context: &ResearchContext,
    elapsed_ms: u64,
) -> Result<ResearchReport, AgentError> {
    if !report.is_confidence_valid() {
        return Err(AgentError::Parse(format!(
            "confidence {} outside [0, 1]",
            report.confidence
        )));
    }

    report.task_id = task.id;
    report.specialty = task.specialty;
    report.symbol = task.symbol.clone();
    report.elapsed_ms = elapsed_ms;

    if let Some(reason) = &context.unavailable {
        report.confidence = Decimal::ZERO;
        report
            .findings
            .insert("data_unavailable".to_string(), serde_json::json!(reason));
    }

    Ok(report)
}
