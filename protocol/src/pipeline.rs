//! # Batch Driver
//!
//! Ties the three subsystems together: partitions the submitted
//! transaction stream into batches, elects a leader per batch, runs each
//! transaction through pre-prepare / prepare / commit, and hands committed
//! transactions to the ledger for block admission.
//!
//! ## Failure routing
//!
//! - **No eligible leader** — the whole batch is skipped and logged; the
//!   submitter retries at the next tick. Liveness, not safety.
//! - **Commit failure** — terminal for that transaction; nothing reaches
//!   the ledger.
//! - **Transient ledger verdicts** (near-miss weight, in-window conflict)
//!   — the transaction is dropped for this round and may be resubmitted;
//!   the ledger's retry counters carry the history.
//! - **Terminal ledger verdicts** — the ledger has already penalized the
//!   proposer; the driver just reports.
//!
//! The driver is the single writer for every shared structure underneath
//! it. Embedders that want concurrent submitters put the whole pipeline
//! behind one lock and keep it that way.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::DEFAULT_BATCH_SIZE;
use crate::consensus::{EngineConfig, PerformanceReport, UpbftEngine};
use crate::crypto::TesseraKeypair;
use crate::ledger::{DagLedger, LedgerConfig};
use crate::trust::TrustModel;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Driver tunables.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Transactions per batch; one leader election per batch.
    pub batch_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

// ---------------------------------------------------------------------------
// Submission contract
// ---------------------------------------------------------------------------

/// Outcome of a single-transaction submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmitStatus {
    /// The transaction committed and its block was appended.
    Committed,
    /// The transaction did not make it into the ledger this round.
    Rejected,
}

/// Receipt returned to submitters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitReceipt {
    /// Terminal status for this submission.
    pub status: SubmitStatus,
    /// Hex digest of the containing block, when committed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_hash: Option<String>,
    /// Human-readable failure description, when rejected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SubmitReceipt {
    fn committed(block_hash: String) -> Self {
        Self {
            status: SubmitStatus::Committed,
            block_hash: Some(block_hash),
            error: None,
        }
    }

    fn rejected(error: impl Into<String>) -> Self {
        Self {
            status: SubmitStatus::Rejected,
            block_hash: None,
            error: Some(error.into()),
        }
    }
}

/// Aggregate outcome of a [`Pipeline::run`] call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// Transactions handed to the driver.
    pub submitted: usize,
    /// Transactions that reached commit.
    pub committed: usize,
    /// Blocks appended to the ledger.
    pub appended: usize,
    /// Batches skipped for lack of an eligible leader.
    pub skipped_batches: usize,
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Where a single transaction ended up inside a batch run.
enum TxOutcome {
    /// Committed and stored in an appended block.
    Appended,
    /// Committed, but block admission deferred or rejected it.
    CommittedOnly,
    /// Never reached commit.
    Dropped,
}

/// The batch driver. Owns the engine and the ledger; shares the trust
/// model with both.
pub struct Pipeline {
    engine: UpbftEngine,
    ledger: DagLedger,
    trust: Arc<RwLock<TrustModel>>,
    config: PipelineConfig,
    /// Sum of `|block.transactions|` over appended blocks.
    confirmed_transactions: u64,
}

impl Pipeline {
    /// Assembles a pipeline from pre-built components.
    pub fn new(
        engine: UpbftEngine,
        ledger: DagLedger,
        trust: Arc<RwLock<TrustModel>>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            engine,
            ledger,
            trust,
            config,
            confirmed_transactions: 0,
        }
    }

    /// Builds the whole stack for a validator set: trust model (randomly
    /// seeded), process keypair, genesis ledger, and engine.
    pub fn bootstrap(
        validators: Vec<String>,
        engine_config: EngineConfig,
        ledger_config: LedgerConfig,
        pipeline_config: PipelineConfig,
    ) -> Self {
        let trust = Arc::new(RwLock::new(TrustModel::new(validators.clone())));
        let keypair = Arc::new(TesseraKeypair::generate());
        let ledger = DagLedger::new(Arc::clone(&trust), keypair, ledger_config);
        let engine = UpbftEngine::new(validators, Arc::clone(&trust), engine_config);
        Self::new(engine, ledger, trust, pipeline_config)
    }

    /// The consensus engine.
    pub fn engine(&self) -> &UpbftEngine {
        &self.engine
    }

    /// Mutable engine access, for startup hooks (malicious-node detection,
    /// fault injection) that run before the first batch.
    pub fn engine_mut(&mut self) -> &mut UpbftEngine {
        &mut self.engine
    }

    /// The DAG ledger, for the query contract.
    pub fn ledger(&self) -> &DagLedger {
        &self.ledger
    }

    /// The shared trust model handle.
    pub fn trust(&self) -> &Arc<RwLock<TrustModel>> {
        &self.trust
    }

    /// Sum of transactions carried by appended blocks.
    pub fn confirmed_transactions(&self) -> u64 {
        self.confirmed_transactions
    }

    /// Current throughput counters.
    pub fn performance(&self) -> PerformanceReport {
        self.engine.performance()
    }

    /// Runs an election for the next batch. Exposed for embedders that
    /// surface the current leader (the node API does).
    pub fn elect_leader(&mut self) -> Option<String> {
        self.engine.elect_leader(&self.ledger)
    }

    /// Drives a full transaction stream through the protocol in batches.
    pub fn run(&mut self, transactions: &[String]) -> RunSummary {
        let mut summary = RunSummary {
            submitted: transactions.len(),
            committed: 0,
            appended: 0,
            skipped_batches: 0,
        };

        for batch in transactions.chunks(self.config.batch_size.max(1)) {
            let batch_start = Instant::now();

            let Some(leader) = self.engine.elect_leader(&self.ledger) else {
                warn!(batch_len = batch.len(), "batch skipped, no eligible leader");
                summary.skipped_batches += 1;
                continue;
            };

            for tx in batch {
                match self.process_transaction(tx, &leader) {
                    TxOutcome::Appended => {
                        summary.committed += 1;
                        summary.appended += 1;
                    }
                    TxOutcome::CommittedOnly => summary.committed += 1,
                    TxOutcome::Dropped => {}
                }
            }

            self.engine
                .record_batch_time(batch_start.elapsed().as_secs_f64());
        }

        info!(
            submitted = summary.submitted,
            committed = summary.committed,
            appended = summary.appended,
            skipped = summary.skipped_batches,
            "transaction stream processed"
        );
        summary
    }

    /// Submits a single transaction end to end.
    ///
    /// Elects (or retains) a leader, runs the three phases, and attempts
    /// block admission. The receipt is terminal for this call; transient
    /// ledger verdicts come back as rejections the submitter may retry.
    pub fn submit(&mut self, transaction: &str) -> SubmitReceipt {
        let start = Instant::now();
        let Some(leader) = self.engine.elect_leader(&self.ledger) else {
            return SubmitReceipt::rejected("no valid leader available");
        };

        let receipt = match self.order_and_append(transaction, &leader) {
            Ok(block_hash) => SubmitReceipt::committed(block_hash),
            Err(message) => SubmitReceipt::rejected(message),
        };
        self.engine.record_batch_time(start.elapsed().as_secs_f64());
        receipt
    }

    /// Three phases plus ledger admission for one transaction.
    fn process_transaction(&mut self, transaction: &str, leader: &str) -> TxOutcome {
        let envelope = match self.engine.pre_prepare(transaction) {
            Ok(e) => e,
            Err(e) => {
                warn!(tx = %transaction, error = %e, "pre-prepare failed");
                return TxOutcome::Dropped;
            }
        };
        let prepares = self.engine.prepare(&envelope);
        if let Err(e) = self.engine.commit(&envelope, &prepares) {
            warn!(tx = %transaction, error = %e, "transaction dropped");
            return TxOutcome::Dropped;
        }

        match self.ledger.add_block(vec![transaction.to_string()], leader) {
            Ok(block) => {
                self.confirmed_transactions += block.transactions.len() as u64;
                TxOutcome::Appended
            }
            Err(e) if e.is_transient() => {
                debug!(tx = %transaction, error = %e, "block deferred, transaction may be resubmitted");
                TxOutcome::CommittedOnly
            }
            Err(e) => {
                warn!(tx = %transaction, proposer = %leader, error = %e, "block rejected");
                TxOutcome::CommittedOnly
            }
        }
    }

    fn order_and_append(&mut self, transaction: &str, leader: &str) -> Result<String, String> {
        let envelope = self
            .engine
            .pre_prepare(transaction)
            .map_err(|e| e.to_string())?;
        let prepares = self.engine.prepare(&envelope);
        self.engine
            .commit(&envelope, &prepares)
            .map_err(|e| e.to_string())?;

        match self.ledger.add_block(vec![transaction.to_string()], leader) {
            Ok(block) => {
                self.confirmed_transactions += block.transactions.len() as u64;
                Ok(block.hash_hex())
            }
            Err(e) => Err(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validators() -> Vec<String> {
        ["NodeA", "NodeB", "NodeC", "NodeD"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn pipeline() -> Pipeline {
        let mut p = Pipeline::bootstrap(
            validators(),
            EngineConfig::default(),
            LedgerConfig::default(),
            PipelineConfig { batch_size: 5 },
        );
        // Deterministic scores: everyone healthy.
        for v in validators() {
            p.trust().write().set_score(&v, 0.9);
        }
        p
    }

    #[test]
    fn honest_run_commits_everything() {
        let mut p = pipeline();
        let txs: Vec<String> = (1..=10).map(|i| format!("Tx{}", i)).collect();

        let summary = p.run(&txs);
        assert_eq!(summary.submitted, 10);
        assert_eq!(summary.committed, 10);
        assert_eq!(summary.skipped_batches, 0);
        // Late blocks can defer on the adaptive threshold; everything that
        // appended must be accounted for.
        assert!(summary.appended >= 5);
        assert_eq!(p.confirmed_transactions(), summary.appended as u64);
        assert_eq!(p.performance().total_transactions, 10);
        assert!(p.ledger().audit().is_ok());
    }

    #[test]
    fn run_skips_batches_without_leader() {
        let mut p = pipeline();
        for v in validators() {
            p.trust().write().set_score(&v, 0.2);
        }
        let txs: Vec<String> = (1..=10).map(|i| format!("Tx{}", i)).collect();

        let summary = p.run(&txs);
        assert_eq!(summary.committed, 0);
        assert_eq!(summary.appended, 0);
        assert_eq!(summary.skipped_batches, 2);
        assert_eq!(p.ledger().len(), 1);
    }

    #[test]
    fn submit_returns_committed_receipt() {
        let mut p = pipeline();
        let receipt = p.submit("Tx1");
        assert_eq!(receipt.status, SubmitStatus::Committed);
        let hash = receipt.block_hash.expect("committed receipts carry a hash");
        assert_eq!(
            p.ledger().find_transaction("Tx1").unwrap().containing_block_hash,
            hash
        );
    }

    #[test]
    fn submit_duplicate_is_rejected_with_conflict() {
        let mut p = pipeline();
        assert_eq!(p.submit("Tx1").status, SubmitStatus::Committed);

        let receipt = p.submit("Tx1");
        assert_eq!(receipt.status, SubmitStatus::Rejected);
        assert!(receipt.error.unwrap().contains("already recorded"));
    }

    #[test]
    fn submit_without_leader_is_rejected() {
        let mut p = pipeline();
        for v in validators() {
            p.trust().write().set_score(&v, 0.2);
        }
        let receipt = p.submit("Tx1");
        assert_eq!(receipt.status, SubmitStatus::Rejected);
        assert!(receipt.error.unwrap().contains("leader"));
    }

    #[test]
    fn commit_counter_matches_commits_not_appends() {
        let mut p = pipeline();
        p.submit("Tx1");
        p.submit("Tx1"); // commits, then conflicts at the ledger
        assert_eq!(p.performance().total_transactions, 2);
        assert_eq!(p.confirmed_transactions(), 1);
    }

    #[test]
    fn batch_time_accumulates() {
        let mut p = pipeline();
        let txs: Vec<String> = (1..=5).map(|i| format!("Tx{}", i)).collect();
        p.run(&txs);
        assert!(p.performance().total_time_seconds >= 0.0);
        assert!(p.performance().tps.is_finite());
    }

    #[test]
    fn receipt_serialization_shape() {
        let committed = SubmitReceipt::committed("abcd".into());
        let json = serde_json::to_value(&committed).unwrap();
        assert_eq!(json["status"], "committed");
        assert_eq!(json["block_hash"], "abcd");
        assert!(json.get("error").is_none());

        let rejected = SubmitReceipt::rejected("nope");
        let json = serde_json::to_value(&rejected).unwrap();
        assert_eq!(json["status"], "rejected");
        assert!(json.get("block_hash").is_none());
    }
}
