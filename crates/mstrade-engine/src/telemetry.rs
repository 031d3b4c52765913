use async_trait::async_trait;
use mstrade_models::cycle::CycleSummary;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Destination for completed cycle summaries.
#[async_trait]
pub trait CycleSink: Send + Sync {
    async fn emit(&self, summary: &CycleSummary);
}

/// Logs a compact line per cycle plus the full summary as JSON at debug level.
pub struct TracingSink;

#[async_trait]
impl CycleSink for TracingSink {
    async fn emit(&self, summary: &CycleSummary) {
        info!(
            cycle = summary.cycle,
            outcome = ?summary.outcome,
            reports = summary.reports.len(),
            failures = summary.research_failures.len(),
            decisions = summary.decisions.len(),
            rejected = summary.rejected.len(),
            executed = summary.executed_count(),
            "Cycle summary"
        );
        match serde_json::to_string(summary) {
            Ok(json) => tracing::debug!(summary = %json, "Cycle summary JSON"),
            Err(e) => warn!(error = %e, "Failed to serialize cycle summary"),
        }
    }
}

/// Forwards summaries to an external consumer over a bounded channel.
///
/// A full or closed channel drops the summary with a warning; the cycle
/// never blocks on storage.
pub struct ChannelSink {
    tx: mpsc::Sender<CycleSummary>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<CycleSummary>) -> Self {
        Self { tx }
    }

    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<CycleSummary>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl CycleSink for ChannelSink {
    async fn emit(&self, summary: &CycleSummary) {
        if let Err(e) = self.tx.try_send(summary.clone()) {
            warn!(cycle = summary.cycle, error = %e, "Dropping cycle summary");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn channel_sink_forwards() {
        let (sink, mut rx) = ChannelSink::channel(4);
        sink.emit(&CycleSummary::new(7, Utc::now())).await;
        let received = rx.recv().await.unwrap();
        assert_eq!(received.cycle, 7);
    }

    #[tokio::test]
    async fn channel_sink_drops_when_closed() {
        let (sink, rx) = ChannelSink::channel(1);
        drop(rx);
        // Must not panic or block.
        sink.emit(&CycleSummary::new(1, Utc::now())).await;
    }
}
