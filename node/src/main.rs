// Copyright (c) 2026 Tessera Contributors. MIT License.
// See LICENSE for details.

//! # Tessera Validator Node
//!
//! Entry point for the `tessera-node` binary. Parses CLI arguments,
//! initializes logging and metrics, assembles the protocol pipeline, and
//! serves the HTTP API.
//!
//! The binary supports three subcommands:
//!
//! - `run`     — start the node and serve the submission/query API
//! - `bench`   — pump synthetic transactions through the pipeline and
//!               print a throughput report
//! - `version` — print build version information

mod api;
mod cli;
mod logging;
mod metrics;

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::signal;

use tessera_protocol::consensus::EngineConfig;
use tessera_protocol::ledger::LedgerConfig;
use tessera_protocol::pipeline::{Pipeline, PipelineConfig};

use cli::{Commands, TesseraNodeCli};
use logging::LogFormat;
use metrics::NodeMetrics;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = TesseraNodeCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Bench(args) => run_bench(args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// run — node startup sequence
// ---------------------------------------------------------------------------

/// Starts the node: protocol pipeline, HTTP API, and metrics endpoint.
///
/// Startup sequence:
/// 1. Initialize logging
/// 2. Validate the validator set against the fault bound
/// 3. Assemble the pipeline (trust model, keypair, ledger, engine)
/// 4. Run the one-shot malicious-node bootstrap
/// 5. Bind API and metrics listeners
/// 6. Print the startup banner
/// 7. Serve until SIGINT/SIGTERM
async fn run_node(args: cli::RunArgs) -> Result<()> {
    let log_filter = format!(
        "tessera_node={level},tessera_protocol={level},tower_http=warn",
        level = args.log_level
    );
    logging::init_logging(&log_filter, LogFormat::from_str_lossy(&args.log_format));

    if !cli::validate_log_level(&args.log_level) {
        tracing::warn!(level = %args.log_level, "unrecognized log level, tracing may filter everything out");
    }

    let quorum_floor = 3 * args.fault_tolerance + 1;
    if args.validators.len() < quorum_floor {
        anyhow::bail!(
            "validator set too small: {} members, fault bound f={} requires at least {}",
            args.validators.len(),
            args.fault_tolerance,
            quorum_floor
        );
    }

    tracing::info!(
        rpc_addr = %args.rpc_addr,
        metrics_addr = %args.metrics_addr,
        validators = args.validators.len(),
        f = args.fault_tolerance,
        batch_size = args.batch_size,
        "starting tessera-node"
    );

    let mut pipeline = Pipeline::bootstrap(
        args.validators.clone(),
        EngineConfig {
            fault_tolerance: args.fault_tolerance,
            ..EngineConfig::default()
        },
        LedgerConfig::default(),
        PipelineConfig {
            batch_size: args.batch_size,
        },
    );

    // One-shot bootstrap: drop validators whose seeded efficiency marks
    // them Byzantine before the first batch.
    let flagged = pipeline.engine_mut().detect_malicious();
    if !flagged.is_empty() {
        tracing::warn!(flagged = ?flagged, "validators removed by startup detection");
    }

    let node_metrics = Arc::new(NodeMetrics::new());
    node_metrics.ledger_blocks.set(1);

    let state = api::AppState {
        version: env!("CARGO_PKG_VERSION").to_string(),
        started_at: Instant::now(),
        pipeline: Arc::new(RwLock::new(pipeline)),
        metrics: Arc::clone(&node_metrics),
    };

    let api_router = api::create_router(state);
    let api_listener = tokio::net::TcpListener::bind(&args.rpc_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", args.rpc_addr))?;
    tracing::info!("API server listening on {}", args.rpc_addr);

    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(node_metrics);
    let metrics_listener = tokio::net::TcpListener::bind(&args.metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", args.metrics_addr))?;
    tracing::info!("Metrics server listening on {}", args.metrics_addr);

    print_startup_banner(
        &args.rpc_addr,
        &args.metrics_addr,
        args.validators.len(),
        args.fault_tolerance,
    );

    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining connections");
        }
    }

    tracing::info!("tessera-node stopped");
    Ok(())
}

// ---------------------------------------------------------------------------
// bench — offline throughput run
// ---------------------------------------------------------------------------

/// JSON report printed (and optionally written) by the bench subcommand.
#[derive(Debug, Serialize)]
struct BenchReport {
    transactions_submitted: usize,
    transactions_committed: usize,
    blocks_appended: usize,
    batches_skipped: usize,
    ledger_blocks: usize,
    byzantine_marked: usize,
    total_time_seconds: f64,
    tps: f64,
    avg_latency_seconds: f64,
    dag_valid: bool,
}

/// Pumps `n` synthetic transactions through the pipeline in batches and
/// prints a JSON performance report to stdout.
fn run_bench(args: cli::BenchArgs) -> Result<()> {
    logging::init_logging("tessera_node=info,tessera_protocol=warn", LogFormat::Pretty);

    let quorum_floor = 3 * args.fault_tolerance + 1;
    if args.validators.len() < quorum_floor {
        anyhow::bail!(
            "validator set too small: {} members, fault bound f={} requires at least {}",
            args.validators.len(),
            args.fault_tolerance,
            quorum_floor
        );
    }

    let mut pipeline = Pipeline::bootstrap(
        args.validators.clone(),
        EngineConfig {
            fault_tolerance: args.fault_tolerance,
            ..EngineConfig::default()
        },
        LedgerConfig::default(),
        PipelineConfig {
            batch_size: args.batch_size,
        },
    );
    pipeline.engine_mut().detect_malicious();

    let marked = if args.byzantine_rate > 0.0 {
        pipeline
            .engine_mut()
            .simulate_byzantine_failures(args.byzantine_rate)
    } else {
        Vec::new()
    };

    let transactions = synthetic_transactions(args.transactions);
    tracing::info!(
        transactions = transactions.len(),
        batch_size = args.batch_size,
        byzantine = marked.len(),
        "starting bench run"
    );

    let summary = pipeline.run(&transactions);
    let performance = pipeline.performance();
    let dag_valid = pipeline.ledger().audit().is_ok();

    let report = BenchReport {
        transactions_submitted: summary.submitted,
        transactions_committed: summary.committed,
        blocks_appended: summary.appended,
        batches_skipped: summary.skipped_batches,
        ledger_blocks: pipeline.ledger().len(),
        byzantine_marked: marked.len(),
        total_time_seconds: performance.total_time_seconds,
        tps: performance.tps,
        avg_latency_seconds: performance.avg_latency_seconds,
        dag_valid,
    };

    let json = serde_json::to_string_pretty(&report)?;
    println!("{json}");

    if let Some(path) = &args.output {
        std::fs::write(path, &json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        tracing::info!(path = %path.display(), "bench report written");
    }

    Ok(())
}

/// `Tx1..TxN`, the canonical synthetic stream.
fn synthetic_transactions(n: usize) -> Vec<String> {
    (1..=n).map(|i| format!("Tx{}", i)).collect()
}

// ---------------------------------------------------------------------------
// version
// ---------------------------------------------------------------------------

/// Prints version information to stdout.
fn print_version() {
    println!("tessera-node {}", env!("CARGO_PKG_VERSION"));
    if let Some(commit) = option_env!("GIT_COMMIT") {
        println!("commit    {}", commit);
    }
    if let Some(ts) = option_env!("BUILD_TIMESTAMP") {
        println!("built     {}", ts);
    }
}

// ---------------------------------------------------------------------------
// Startup banner
// ---------------------------------------------------------------------------

/// Prints the node startup banner with configuration summary.
fn print_startup_banner(rpc_addr: &str, metrics_addr: &str, validators: usize, f: usize) {
    let title = format!("  Tessera — Validator Node v{}", env!("CARGO_PKG_VERSION"));
    let lines = [
        format!("  API:        http://{}", rpc_addr),
        format!("  Metrics:    http://{}/metrics", metrics_addr),
        format!("  Validators: {}", validators),
        format!("  Fault bound: f = {} (quorum {})", f, 2 * f + 1),
    ];

    let max_width = lines
        .iter()
        .map(|l| l.len())
        .chain(std::iter::once(title.len()))
        .max()
        .unwrap_or(50)
        + 4;

    let border = "\u{2550}".repeat(max_width);

    println!();
    println!("\u{2554}{}\u{2557}", border);
    println!("\u{2551}  {:<width$}  \u{2551}", title.trim(), width = max_width - 4);
    println!("\u{2560}{}\u{2563}", border);
    for line in &lines {
        println!("\u{2551}  {:<width$}  \u{2551}", line.trim(), width = max_width - 4);
    }
    println!("\u{255A}{}\u{255D}", border);
    println!();
}

// ---------------------------------------------------------------------------
// Shutdown signal
// ---------------------------------------------------------------------------

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
