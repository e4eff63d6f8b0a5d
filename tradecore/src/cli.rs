use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Algorithmic-trading core: market data, prediction, risk, execution and
/// audit wired behind an administrative CLI (§6's "CLI surface").
#[derive(Debug, Parser)]
#[command(name = "tradecore", version, about)]
pub struct Cli {
    /// Path to a TOML configuration file; environment variables override it.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the trading core: market-data ingestion, signal dispatch, risk
    /// gating and order execution, until interrupted.
    Serve {
        /// Broker adapter to route orders through (`mock` or `http`).
        #[arg(long, default_value = "mock")]
        broker: String,
    },
    /// Apply any pending on-disk layout changes (predictor registry manifest,
    /// audit log file) and exit.
    Migrate,
    /// Poll `broker` for every order stuck `Submitted` without a confirmed
    /// broker order id, reconciling or failing each within the reconciliation
    /// window.
    Reconcile {
        #[arg(long)]
        broker: String,
    },
    /// Verify and print a portfolio's audit-log chain.
    ReplayAudit {
        #[arg(long)]
        portfolio: String,
    },
}
