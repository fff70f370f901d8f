//! Interactive CLI demo of the full Tessera protocol lifecycle.
//!
//! Walks through validator bootstrap, leader election, the three-phase
//! commit, DAG growth, a double-spend attempt, Byzantine fault injection,
//! and the final ledger audit. The output uses ANSI escape codes for
//! colored, storytelling-style terminal rendering.
//!
//! Run with:
//!   cargo run --example demo --release

use std::time::Instant;

use tessera_protocol::consensus::EngineConfig;
use tessera_protocol::ledger::LedgerConfig;
use tessera_protocol::pipeline::{Pipeline, PipelineConfig, SubmitStatus};

// ---------------------------------------------------------------------------
// ANSI color constants
// ---------------------------------------------------------------------------

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";

const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const WHITE: &str = "\x1b[37m";
const RED: &str = "\x1b[31m";

const BG_BLUE: &str = "\x1b[44m";

// ---------------------------------------------------------------------------
// Display helpers
// ---------------------------------------------------------------------------

fn banner() {
    println!();
    println!(
        "{BG_BLUE}{BOLD}{WHITE}                                                                {RESET}"
    );
    println!(
        "{BG_BLUE}{BOLD}{WHITE}    TESSERA  --  Trust-Weighted BFT DAG Ledger Demo             {RESET}"
    );
    println!(
        "{BG_BLUE}{BOLD}{WHITE}    Version 0.1.0  |  U-PBFT + Ed25519 + SHA-256                {RESET}"
    );
    println!(
        "{BG_BLUE}{BOLD}{WHITE}                                                                {RESET}"
    );
    println!();
}

fn section(num: u32, title: &str) {
    println!();
    println!(
        "{BOLD}{CYAN}===[{YELLOW} Step {num} {CYAN}]========================================================{RESET}"
    );
    println!("{BOLD}{WHITE}  {title}{RESET}");
    println!(
        "{CYAN}------------------------------------------------------------------{RESET}"
    );
}

fn subsection(text: &str) {
    println!("{DIM}{CYAN}  >> {text}{RESET}");
}

fn success(text: &str) {
    println!("{GREEN}  [OK] {text}{RESET}");
}

fn failure(text: &str) {
    println!("{RED}  [REJECTED] {text}{RESET}");
}

fn info(label: &str, value: &str) {
    println!("{WHITE}  {BOLD}{label}:{RESET} {YELLOW}{value}{RESET}");
}

fn trust_row(name: &str, score: f64, blacklisted: bool) {
    let mark = if blacklisted {
        format!("{RED}[BLACKLISTED]{RESET}")
    } else {
        String::new()
    };
    println!("  {BOLD}{name:<8}{RESET} {WHITE}{score:>6.3}{RESET} {mark}");
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() {
    let demo_start = Instant::now();
    banner();

    // -----------------------------------------------------------------------
    // Step 1: Validator bootstrap
    // -----------------------------------------------------------------------

    section(1, "Validator Set Bootstrap");
    subsection("Assembling trust model, keypair, genesis ledger, and engine...");

    let validators: Vec<String> = ["NodeA", "NodeB", "NodeC", "NodeD"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    let mut pipeline = Pipeline::bootstrap(
        validators.clone(),
        EngineConfig::default(),
        LedgerConfig::default(),
        PipelineConfig { batch_size: 5 },
    );
    for v in &validators {
        pipeline.trust().write().set_score(v, 0.85);
    }

    let genesis_hash = pipeline.ledger().blocks()[0].hash_hex();
    info("Validators", "NodeA, NodeB, NodeC, NodeD (f = 1, quorum 3)");
    info("Genesis hash", &genesis_hash[..16]);
    success("Genesis block created and signed");

    // -----------------------------------------------------------------------
    // Step 2: Leader election
    // -----------------------------------------------------------------------

    section(2, "Trust-Weighted Leader Election");
    subsection("Decay, blacklist scan, candidacy filter, top-3 draw...");

    let t = Instant::now();
    let leader = pipeline.elect_leader().expect("healthy set must elect");
    info("Elected leader", &leader);
    info("Election time", &format!("{:.2?}", t.elapsed()));
    success("Leader holds tenure for up to three batches");

    // -----------------------------------------------------------------------
    // Step 3: Honest transaction stream
    // -----------------------------------------------------------------------

    section(3, "Ordering Ten Transactions in Batches of Five");
    subsection("pre-prepare -> prepare -> commit -> DAG admission, per transaction...");

    let txs: Vec<String> = (1..=10).map(|i| format!("Tx{}", i)).collect();
    let t = Instant::now();
    let summary = pipeline.run(&txs);

    info("Committed", &summary.committed.to_string());
    info("Blocks appended", &summary.appended.to_string());
    info("Ledger size", &pipeline.ledger().len().to_string());
    info("Run time", &format!("{:.2?}", t.elapsed()));
    success("Every committed transaction carries a quorum of 2f + 1 confirmations");

    // -----------------------------------------------------------------------
    // Step 4: Double-spend attempt
    // -----------------------------------------------------------------------

    section(4, "Double-Spend Attempt");
    subsection("Resubmitting Tx1, which is already stored...");

    let receipt = pipeline.submit("Tx1");
    match receipt.status {
        SubmitStatus::Committed => success("unexpected: duplicate accepted"),
        SubmitStatus::Rejected => {
            failure(receipt.error.as_deref().unwrap_or("rejected"));
        }
    }
    subsection("Inside the 5 s window this is a transient ordering collision;");
    subsection("outside it, a hard double-spend that costs the proposer trust.");

    // -----------------------------------------------------------------------
    // Step 5: Byzantine fault injection
    // -----------------------------------------------------------------------

    section(5, "Byzantine Fault Injection");
    subsection("Marking validators malicious at rate 0.5 (test hook)...");

    let marked = pipeline.engine_mut().simulate_byzantine_failures(0.5);
    info("Marked", &format!("{:?}", marked));
    info(
        "Active validators",
        &pipeline.engine().validators().len().to_string(),
    );

    let receipt = pipeline.submit("TxAfterAttack");
    match receipt.status {
        SubmitStatus::Committed => {
            success("Quorum still reachable, transaction committed")
        }
        SubmitStatus::Rejected => {
            failure(receipt.error.as_deref().unwrap_or("rejected"));
            subsection("Too many faults: the engine degrades safely instead of lying.");
        }
    }

    // -----------------------------------------------------------------------
    // Step 6: Trust scores and audit
    // -----------------------------------------------------------------------

    section(6, "Trust Scores & Ledger Audit");

    {
        let trust = pipeline.trust().read();
        println!();
        println!("  {BOLD}{WHITE}--- Trust Scores ---{RESET}");
        for v in &validators {
            trust_row(v, trust.score(v), trust.is_blacklisted(v));
        }
        println!();
    }

    subsection("Recomputing every digest and resolving every parent edge...");
    let t = Instant::now();
    match pipeline.ledger().audit() {
        Ok(()) => success("DAG audit passed"),
        Err(e) => failure(&e.to_string()),
    }
    info("Audit time", &format!("{:.2?}", t.elapsed()));

    // -----------------------------------------------------------------------
    // Final summary
    // -----------------------------------------------------------------------

    let perf = pipeline.performance();
    println!();
    println!("  {BOLD}{WHITE}Protocol Statistics:{RESET}");
    println!("  {DIM}----------------------------------------------{RESET}");
    info(
        "Total committed",
        &perf.total_transactions.to_string(),
    );
    info("TPS", &format!("{:.1}", perf.tps));
    info(
        "Avg latency",
        &format!("{:.4} s", perf.avg_latency_seconds),
    );
    info("Blocks stored", &pipeline.ledger().len().to_string());
    info("Signing algorithm", "Ed25519 (ed25519-dalek 2.1)");
    info("Digest", "SHA-256 over index || parents || txs || timestamp");
    println!();
    println!(
        "  {BOLD}{GREEN}Total demo time: {:.2}s{RESET}",
        demo_start.elapsed().as_secs_f64()
    );
    println!();
}
