//! # CLI Interface
//!
//! Defines the command-line argument structure for `tessera-node` using
//! `clap` derive. Supports three subcommands: `run`, `bench`, and
//! `version`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Tessera validator node.
///
/// Runs the trust-weighted BFT DAG ledger behind an HTTP submission and
/// query API, with Prometheus metrics on a separate port.
#[derive(Parser, Debug)]
#[command(
    name = "tessera-node",
    about = "Tessera validator node",
    version,
    propagate_version = true
)]
pub struct TesseraNodeCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the Tessera node binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the validator node and serve the HTTP API.
    Run(RunArgs),
    /// Pump synthetic transactions through the pipeline and report
    /// throughput.
    Bench(BenchArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Listen address for the HTTP submission and query API.
    #[arg(long, env = "TESSERA_RPC_ADDR", default_value = "127.0.0.1:7421")]
    pub rpc_addr: String,

    /// Listen address for the Prometheus metrics endpoint.
    #[arg(long, env = "TESSERA_METRICS_ADDR", default_value = "127.0.0.1:7422")]
    pub metrics_addr: String,

    /// Comma-separated validator identifiers.
    #[arg(
        long,
        env = "TESSERA_VALIDATORS",
        default_value = "NodeA,NodeB,NodeC,NodeD",
        value_delimiter = ','
    )]
    pub validators: Vec<String>,

    /// Byzantine fault bound f. The validator set must hold at least
    /// 3f + 1 members.
    #[arg(long, env = "TESSERA_FAULT_TOLERANCE", default_value_t = 1)]
    pub fault_tolerance: usize,

    /// Transactions per batch (one leader election per batch).
    #[arg(long, env = "TESSERA_BATCH_SIZE", default_value_t = 10)]
    pub batch_size: usize,

    /// Default log level when RUST_LOG is not set.
    #[arg(long, env = "TESSERA_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format: "pretty" or "json".
    #[arg(long, env = "TESSERA_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,
}

/// Arguments for the `bench` subcommand.
#[derive(Parser, Debug)]
pub struct BenchArgs {
    /// Number of synthetic transactions to submit.
    #[arg(long, short = 'n', default_value_t = 100)]
    pub transactions: usize,

    /// Transactions per batch.
    #[arg(long, default_value_t = 10)]
    pub batch_size: usize,

    /// Comma-separated validator identifiers.
    #[arg(
        long,
        default_value = "NodeA,NodeB,NodeC,NodeD",
        value_delimiter = ','
    )]
    pub validators: Vec<String>,

    /// Byzantine fault bound f.
    #[arg(long, default_value_t = 1)]
    pub fault_tolerance: usize,

    /// Probability in [0, 1] of marking each validator Byzantine before
    /// the run. Zero keeps the run honest.
    #[arg(long, default_value_t = 0.0)]
    pub byzantine_rate: f64,

    /// Optional path to write the JSON performance report to.
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,
}

/// Validates a log level string against the levels tracing understands.
pub fn validate_log_level(level: &str) -> bool {
    matches!(
        level.to_lowercase().as_str(),
        "trace" | "debug" | "info" | "warn" | "error"
    )
}
