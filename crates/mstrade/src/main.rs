use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use mstrade::agents::claude_cli::check_cli_available;
use mstrade::models::config::AgentBackend;
use mstrade::StdoutSink;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "mstrade", about = "Master/slave trading coordination engine")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/mstrade.toml")]
    config: String,

    /// Stop after this many cycles (0 runs until interrupted)
    #[arg(short = 'n', long, default_value_t = 1)]
    cycles: u64,

    /// Seconds between cycles; overrides master.cycle_interval_seconds
    #[arg(long)]
    interval_secs: Option<u64>,

    /// Pretty-print each cycle summary
    #[arg(long)]
    pretty: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr (respects RUST_LOG); stdout carries cycle summaries.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if cli.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    let config = mstrade::load_config(&cli.config)?;
    if config.agents.backend == AgentBackend::Claude && !check_cli_available("claude").await {
        warn!("claude CLI not found; LLM slaves will fail and cycles will see no reports");
    }
    let interval = Duration::from_secs(
        cli.interval_secs
            .unwrap_or(config.master.cycle_interval_seconds),
    );

    let cancel = CancellationToken::new();
    let mut master = mstrade::build_master(&config, cancel.clone())
        .context("Failed to build master")?
        .with_sink(Arc::new(StdoutSink::new(cli.pretty)));

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received, shutting down");
                shutdown.cancel();
            }
            Err(e) => warn!(error = %e, "Failed to listen for interrupt"),
        }
    });

    let ran = master.run(cancel, interval, cli.cycles).await;

    for stats in master.books().execution_stats() {
        info!(
            symbol = %stats.symbol,
            executed_volume = %stats.executed_volume,
            fills = stats.slippage.fills,
            average_slippage = %stats.average_slippage,
            "Order book totals"
        );
    }
    for stats in master.orchestrator().slave_performance() {
        info!(
            specialty = %stats.specialty,
            runs = stats.runs,
            timeouts = stats.timeouts,
            success_rate = %stats.success_rate().round_dp(4),
            mean_confidence = %stats.mean_confidence().round_dp(4),
            mean_latency_ms = stats.mean_latency_ms(),
            "Slave totals"
        );
    }
    let performance = master.monitor().performance_summary();
    info!(
        value = %performance.portfolio_value,
        total_pnl = %performance.total_pnl,
        total_pnl_fraction = %performance.total_pnl_fraction.round_dp(4),
        positions = performance.total_positions,
        win_rate = %performance.win_rate.round_dp(4),
        drawdown = %performance.drawdown.round_dp(4),
        "Portfolio performance"
    );
    info!(cycles = ran, "Done");

    Ok(())
}
