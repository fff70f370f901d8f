//! # DAG Ledger
//!
//! The block store. Blocks reference up to three parents chosen by trust,
//! admission runs through an adaptive parent-weight threshold, and the
//! whole structure stays acyclic for free because every block's index is
//! the ledger size at creation, so parent edges always point backward.
//!
//! ## Admission pipeline
//!
//! ```text
//! add_block(txs, proposer)
//!   ├─ blacklist gate          (proposer barred? reject, no trust update)
//!   ├─ parent selection        (trust-weighted, last-5 window)
//!   ├─ block construction      (hash + sign in the constructor)
//!   ├─ conflict check          (double-spend scan, 5 s retry window)
//!   └─ adaptive validation     (parent weight vs threshold, bounded
//!                               retries, forced acceptance at the margin)
//! ```
//!
//! Transient outcomes (near-miss weight, in-window conflict) surface as
//! errors with `is_transient() == true`; the caller decides when to retry.
//! Terminal validation failures penalize the proposer's trust.
//!
//! ## Threshold shape
//!
//! The admission threshold grows with total ledger weight and tracks the
//! recent trust average, scaled by ledger size:
//!
//! ```text
//! T = max(0.50 * Σ trust, 0.70 * avg(last 10)) * clamp(n/50, 0.75, 1.2)
//! ```
//!
//! A block whose parent weight misses `T` but clears the retry schedule
//! `T * (0.92 - 0.02k)` gets up to three more attempts; after that the
//! forced-acceptance clause admits anything within 95% of the final retry
//! threshold. That bounds the latency contribution of a near-threshold
//! block at three retry cycles while keeping a safety margin.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{
    DEFAULT_CONFLICT_RETRY_WINDOW_MS, DEFAULT_FORCED_ACCEPTANCE_MARGIN,
    DEFAULT_MAX_VALIDATION_RETRIES, MAX_PARENTS, PARENT_CANDIDATE_WINDOW, PARENT_FALLBACK_WINDOW,
    PARENT_TRUST_CUTOFF, RECENT_TRUST_WINDOW, RETRY_BASE_FACTOR, RETRY_STEP_FACTOR,
    THRESHOLD_RECENT_WEIGHT, THRESHOLD_SCALE_BLOCKS, THRESHOLD_SCALE_MAX, THRESHOLD_SCALE_MIN,
    THRESHOLD_TOTAL_WEIGHT, WEIGHT_EPSILON,
};
use crate::crypto::{TesseraKeypair, TesseraPublicKey};
use crate::trust::TrustModel;

use super::block::{unix_millis, Block};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors surfaced by block admission and the audit pass.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The proposer is currently barred from proposing. No block is
    /// constructed and no trust update happens.
    #[error("proposer {0} is blacklisted")]
    BlacklistedProposer(String),

    /// Parent selection produced nothing to build on. Only possible on an
    /// uninitialized ledger; fatal for the call.
    #[error("no parent candidates available")]
    NoParents,

    /// The stored digest does not match the recomputed one.
    #[error("block {index} hash mismatch")]
    HashMismatch {
        /// Index of the offending block.
        index: u64,
    },

    /// The proposer signature does not verify against the ledger key.
    #[error("block {index} carries an invalid signature")]
    SignatureInvalid {
        /// Index of the offending block.
        index: u64,
    },

    /// The summed trust of the referenced parents missed the admission
    /// threshold. Transient while the retry budget lasts.
    #[error(
        "block {index} parent weight {weight:.3} below threshold {threshold:.3} (retriable: {retriable})"
    )]
    InsufficientTrustWeight {
        /// Index of the candidate block.
        index: u64,
        /// Summed trust snapshot of the referenced parents.
        weight: f64,
        /// The threshold the weight was compared against.
        threshold: f64,
        /// Whether another attempt may succeed.
        retriable: bool,
    },

    /// A transaction in the candidate already appears in a stored block.
    /// Transient inside the retry window (ordering collision), terminal
    /// outside it (hard double-spend).
    #[error("transaction {transaction} already recorded (retriable: {retriable})")]
    ConflictDoubleSpend {
        /// The duplicated transaction id.
        transaction: String,
        /// Whether the collision is still inside the retry window.
        retriable: bool,
    },

    /// Audit found a parent reference that resolves to no stored block.
    #[error("block {index} references missing parent {parent}")]
    MissingParent {
        /// Index of the referencing block.
        index: u64,
        /// Hex digest of the unresolved parent.
        parent: String,
    },
}

impl LedgerError {
    /// Whether the caller may retry the same submission later.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LedgerError::InsufficientTrustWeight { retriable: true, .. }
                | LedgerError::ConflictDoubleSpend { retriable: true, .. }
        )
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tunables for block admission.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Age under which a duplicated transaction counts as a transient
    /// ordering collision rather than a double-spend.
    pub conflict_retry_window_ms: u64,
    /// Near-miss retries granted per block index.
    pub max_validation_retries: u32,
    /// Fraction of the final retry threshold the forced-acceptance clause
    /// still admits.
    pub forced_acceptance_margin: f64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            conflict_retry_window_ms: DEFAULT_CONFLICT_RETRY_WINDOW_MS,
            max_validation_retries: DEFAULT_MAX_VALIDATION_RETRIES,
            forced_acceptance_margin: DEFAULT_FORCED_ACCEPTANCE_MARGIN,
        }
    }
}

// ---------------------------------------------------------------------------
// Query payloads
// ---------------------------------------------------------------------------

/// Compact block view for list queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockSummary {
    /// Block index.
    pub index: u64,
    /// Hex digest of the block.
    pub hash: String,
    /// Hex digests of the parents.
    pub parents: Vec<String>,
    /// Transaction ids carried by the block.
    pub transactions: Vec<String>,
    /// Proposer validator id.
    pub proposer: String,
}

/// Where a transaction landed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionLocation {
    /// The transaction id.
    pub transaction: String,
    /// Hex digest of the containing block.
    pub containing_block_hash: String,
}

/// One audit-dump record per block. Everything an external verifier needs
/// to recompute the digest and check the signature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockRecord {
    /// Block index.
    pub index: u64,
    /// Hex digest of the block.
    pub hash: String,
    /// Hex digests of the parents.
    pub parent_hashes: Vec<String>,
    /// Transaction ids carried by the block.
    pub transactions: Vec<String>,
    /// Proposer validator id.
    pub proposer: String,
    /// Proposer trust at admission time.
    pub trust_snapshot: f64,
    /// Creation timestamp, unix milliseconds.
    pub timestamp_ms: u64,
    /// Hex-encoded Ed25519 signature over the hex digest.
    pub signature: String,
}

// ---------------------------------------------------------------------------
// DagLedger
// ---------------------------------------------------------------------------

/// The append-only DAG block store.
///
/// Owns the block vector, the parent-to-children adjacency map, and the
/// per-index retry counters. Mutation is single-writer: the driver is the
/// only caller of [`add_block`](Self::add_block).
pub struct DagLedger {
    blocks: Vec<Block>,
    /// parent digest -> child digests, in append order.
    children: HashMap<[u8; 32], Vec<[u8; 32]>>,
    /// Near-miss retry counters, keyed by candidate block index.
    retry_counts: HashMap<u64, u32>,
    trust: Arc<RwLock<TrustModel>>,
    keypair: Arc<TesseraKeypair>,
    config: LedgerConfig,
}

impl DagLedger {
    /// Creates a ledger initialized with its genesis block.
    pub fn new(
        trust: Arc<RwLock<TrustModel>>,
        keypair: Arc<TesseraKeypair>,
        config: LedgerConfig,
    ) -> Self {
        let genesis = Block::genesis(&keypair);
        let mut children = HashMap::new();
        children.insert(genesis.hash, Vec::new());
        info!(hash = %genesis.hash_hex(), "genesis block created");
        Self {
            blocks: vec![genesis],
            children,
            retry_counts: HashMap::new(),
            trust,
            keypair,
            config,
        }
    }

    /// Number of stored blocks (genesis included).
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// A ledger always holds at least its genesis block.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// All stored blocks in append order.
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Block by index, if stored.
    pub fn get(&self, index: u64) -> Option<&Block> {
        self.blocks.get(index as usize)
    }

    /// The public key every stored signature verifies against.
    pub fn public_key(&self) -> TesseraPublicKey {
        self.keypair.public_key()
    }

    // -----------------------------------------------------------------------
    // Parent selection
    // -----------------------------------------------------------------------

    /// Selects up to three parent digests by trust.
    ///
    /// Candidates are the last five blocks. Candidates below half the
    /// rolling average trust are dropped (low-trust tails make weak
    /// anchors); survivors are ranked by trust. If fewer than two survive,
    /// the filter is abandoned in favor of the three most recent blocks.
    pub fn select_parents(&self) -> Vec<[u8; 32]> {
        let candidates: Vec<&Block> = self
            .blocks
            .iter()
            .rev()
            .take(PARENT_CANDIDATE_WINDOW)
            .collect();
        if candidates.is_empty() {
            return Vec::new();
        }

        let avg_trust: f64 = candidates.iter().map(|b| b.trust_snapshot).sum::<f64>()
            / candidates.len() as f64;

        let mut ranked: Vec<&Block> = candidates
            .iter()
            .copied()
            .filter(|b| b.trust_snapshot > PARENT_TRUST_CUTOFF * avg_trust)
            .collect();
        ranked.sort_by(|a, b| {
            b.trust_snapshot
                .partial_cmp(&a.trust_snapshot)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        if ranked.len() < 2 {
            debug!("parent trust filter too aggressive, falling back to recent blocks");
            ranked = self
                .blocks
                .iter()
                .rev()
                .take(PARENT_FALLBACK_WINDOW)
                .collect();
        }

        ranked.iter().take(MAX_PARENTS).map(|b| b.hash).collect()
    }

    // -----------------------------------------------------------------------
    // Block admission
    // -----------------------------------------------------------------------

    /// Builds, validates, and appends a block carrying the given
    /// transactions.
    ///
    /// On success the appended block is returned, the adjacency map is
    /// extended, and the proposer's trust record is credited. Transient
    /// failures (`is_transient()`) leave the ledger untouched so the caller
    /// can retry; terminal validation failures penalize the proposer.
    pub fn add_block(
        &mut self,
        transactions: Vec<String>,
        proposer: &str,
    ) -> Result<Block, LedgerError> {
        let snapshot = {
            let trust = self.trust.read();
            if trust.is_blacklisted(proposer) {
                warn!(proposer = %proposer, "block rejected, proposer is blacklisted");
                return Err(LedgerError::BlacklistedProposer(proposer.to_string()));
            }
            // Unknown proposers snapshot the neutral default.
            trust.score(proposer)
        };

        let parents = self.select_parents();
        if parents.is_empty() {
            return Err(LedgerError::NoParents);
        }

        let block = Block::new(
            self.blocks.len() as u64,
            parents,
            transactions,
            proposer,
            snapshot,
            &self.keypair,
        );

        if let Err(e) = self.check_conflicts(&block) {
            if e.is_transient() {
                debug!(index = block.index, error = %e, "conflict inside retry window, deferring");
            } else {
                warn!(index = block.index, proposer = %proposer, error = %e, "hard double-spend rejected");
                self.trust.write().penalize_failure(proposer);
            }
            return Err(e);
        }

        match self.validate_block(&block) {
            Ok(()) => {}
            Err(e) if e.is_transient() => {
                debug!(index = block.index, error = %e, "validation deferred for retry");
                return Err(e);
            }
            Err(e) => {
                warn!(index = block.index, proposer = %proposer, error = %e, "block rejected");
                self.trust.write().penalize_failure(proposer);
                return Err(e);
            }
        }

        for parent in &block.parent_hashes {
            self.children.entry(*parent).or_default().push(block.hash);
        }
        self.children.insert(block.hash, Vec::new());
        self.blocks.push(block.clone());

        {
            let mut trust = self.trust.write();
            trust.record_successful_proposal(proposer);
            trust.update(proposer, 0.75, 5.0);
        }

        info!(
            index = block.index,
            proposer = %proposer,
            trust = snapshot,
            txs = block.transactions.len(),
            "block appended"
        );
        Ok(block)
    }

    /// Runs the adaptive trust-weighted admission check.
    ///
    /// Integrity first (digest, signature), then the parent weight against
    /// the adaptive threshold with the bounded retry schedule and the
    /// forced-acceptance clause.
    fn validate_block(&mut self, block: &Block) -> Result<(), LedgerError> {
        if block.compute_hash() != block.hash {
            return Err(LedgerError::HashMismatch { index: block.index });
        }
        if !block.verify_signature(&self.keypair.public_key()) {
            return Err(LedgerError::SignatureInvalid { index: block.index });
        }

        let total_weight: f64 =
            self.blocks.iter().map(|b| b.trust_snapshot).sum::<f64>() + WEIGHT_EPSILON;
        let recent: &[Block] = if self.blocks.len() > RECENT_TRUST_WINDOW {
            &self.blocks[self.blocks.len() - RECENT_TRUST_WINDOW..]
        } else {
            &self.blocks
        };
        let recent_avg: f64 = recent.iter().map(|b| b.trust_snapshot).sum::<f64>()
            / recent.len().max(1) as f64;

        let base_threshold = (THRESHOLD_TOTAL_WEIGHT * total_weight)
            .max(THRESHOLD_RECENT_WEIGHT * recent_avg);
        let scale = (self.blocks.len() as f64 / THRESHOLD_SCALE_BLOCKS)
            .clamp(THRESHOLD_SCALE_MIN, THRESHOLD_SCALE_MAX);
        let threshold = base_threshold * scale;

        let retries = self.retry_counts.get(&block.index).copied().unwrap_or(0);
        let retry_threshold =
            threshold * (RETRY_BASE_FACTOR - RETRY_STEP_FACTOR * f64::from(retries));

        let parent_weight: f64 = self
            .blocks
            .iter()
            .filter(|b| block.parent_hashes.contains(&b.hash))
            .map(|b| b.trust_snapshot)
            .sum();

        if parent_weight >= threshold {
            debug!(
                index = block.index,
                weight = parent_weight,
                threshold,
                "block passed trust-weight validation"
            );
            return Ok(());
        }

        if parent_weight >= retry_threshold && retries < self.config.max_validation_retries {
            self.retry_counts.insert(block.index, retries + 1);
            info!(
                index = block.index,
                attempt = retries + 1,
                budget = self.config.max_validation_retries,
                "block nearly passed, scheduling retry"
            );
            return Err(LedgerError::InsufficientTrustWeight {
                index: block.index,
                weight: parent_weight,
                threshold: retry_threshold,
                retriable: true,
            });
        }

        if retries >= self.config.max_validation_retries
            && parent_weight >= retry_threshold * self.config.forced_acceptance_margin
        {
            warn!(
                index = block.index,
                weight = parent_weight,
                floor = retry_threshold * self.config.forced_acceptance_margin,
                "retry budget exhausted, forcing acceptance"
            );
            return Ok(());
        }

        Err(LedgerError::InsufficientTrustWeight {
            index: block.index,
            weight: parent_weight,
            threshold: if retries >= self.config.max_validation_retries {
                retry_threshold * self.config.forced_acceptance_margin
            } else {
                retry_threshold
            },
            retriable: false,
        })
    }

    /// Scans stored blocks for transactions duplicated by the candidate.
    ///
    /// A duplicate inside a block younger than the configured window is a
    /// transient ordering collision (the submission races a block that is
    /// still settling); anything older is a hard double-spend.
    fn check_conflicts(&self, candidate: &Block) -> Result<(), LedgerError> {
        let now = unix_millis();
        for stored in &self.blocks {
            for tx in &stored.transactions {
                if candidate.transactions.iter().any(|t| t == tx) {
                    let age = now.saturating_sub(stored.timestamp_ms);
                    let retriable = age < self.config.conflict_retry_window_ms;
                    return Err(LedgerError::ConflictDoubleSpend {
                        transaction: tx.clone(),
                        retriable,
                    });
                }
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Audit
    // -----------------------------------------------------------------------

    /// Full-structure audit: recomputes every digest and resolves every
    /// parent reference against the adjacency map. Read-only,
    /// O(blocks + edges); intended for offline verification after a run.
    pub fn audit(&self) -> Result<(), LedgerError> {
        for block in &self.blocks {
            if block.compute_hash() != block.hash {
                return Err(LedgerError::HashMismatch { index: block.index });
            }
            for parent in &block.parent_hashes {
                if !self.children.contains_key(parent) {
                    return Err(LedgerError::MissingParent {
                        index: block.index,
                        parent: hex::encode(parent),
                    });
                }
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Compact views of every stored block, in append order.
    pub fn list_blocks(&self) -> Vec<BlockSummary> {
        self.blocks
            .iter()
            .map(|b| BlockSummary {
                index: b.index,
                hash: b.hash_hex(),
                parents: b.parent_hashes_hex(),
                transactions: b.transactions.clone(),
                proposer: b.proposer.clone(),
            })
            .collect()
    }

    /// Locates the block containing a transaction id.
    pub fn find_transaction(&self, transaction: &str) -> Option<TransactionLocation> {
        self.blocks
            .iter()
            .find(|b| b.transactions.iter().any(|t| t == transaction))
            .map(|b| TransactionLocation {
                transaction: transaction.to_string(),
                containing_block_hash: b.hash_hex(),
            })
    }

    /// The parent-to-children adjacency map with hex-encoded digests.
    pub fn dag(&self) -> HashMap<String, Vec<String>> {
        self.children
            .iter()
            .map(|(parent, kids)| {
                (
                    hex::encode(parent),
                    kids.iter().map(hex::encode).collect(),
                )
            })
            .collect()
    }

    /// The audit dump: one serializable record per block.
    pub fn export_records(&self) -> Vec<BlockRecord> {
        self.blocks
            .iter()
            .map(|b| BlockRecord {
                index: b.index,
                hash: b.hash_hex(),
                parent_hashes: b.parent_hashes_hex(),
                transactions: b.transactions.clone(),
                proposer: b.proposer.clone(),
                trust_snapshot: b.trust_snapshot,
                timestamp_ms: b.timestamp_ms,
                signature: b.signature.to_hex(),
            })
            .collect()
    }

    /// Appends a pre-built block without admission checks. Test scaffolding
    /// for crafting precise threshold scenarios.
    #[cfg(test)]
    fn push_unchecked(&mut self, block: Block) {
        for parent in &block.parent_hashes {
            self.children.entry(*parent).or_default().push(block.hash);
        }
        self.children.insert(block.hash, Vec::new());
        self.blocks.push(block);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{TRUST_DEFAULT, TRUST_FLOOR};

    fn setup() -> (DagLedger, Arc<RwLock<TrustModel>>, Arc<TesseraKeypair>) {
        let trust = Arc::new(RwLock::new(TrustModel::default()));
        for v in ["NodeA", "NodeB", "NodeC", "NodeD"] {
            trust.write().set_score(v, 0.9);
        }
        let keypair = Arc::new(TesseraKeypair::from_seed(&[3u8; 32]));
        let ledger = DagLedger::new(
            Arc::clone(&trust),
            Arc::clone(&keypair),
            LedgerConfig::default(),
        );
        (ledger, trust, keypair)
    }

    /// Grows the ledger with `count` admitted blocks, pinning the proposer
    /// trust before each append so snapshots stay exact.
    fn grow(ledger: &mut DagLedger, trust: &Arc<RwLock<TrustModel>>, count: usize) {
        for i in 0..count {
            trust.write().set_score("NodeA", 0.9);
            ledger
                .add_block(vec![format!("GrowTx{}", i)], "NodeA")
                .expect("growth block should be admitted");
        }
    }

    #[test]
    fn genesis_is_created_on_construction() {
        let (ledger, _, keypair) = setup();
        assert_eq!(ledger.len(), 1);
        let genesis = ledger.get(0).unwrap();
        assert!(genesis.is_genesis());
        assert!(genesis.verify_signature(&keypair.public_key()));
    }

    #[test]
    fn first_block_builds_on_genesis() {
        let (mut ledger, _, _) = setup();
        let block = ledger.add_block(vec!["Tx1".into()], "NodeA").unwrap();
        assert_eq!(block.index, 1);
        assert_eq!(block.parent_hashes, vec![ledger.get(0).unwrap().hash]);
        assert!((block.trust_snapshot - 0.9).abs() < 1e-12);
    }

    #[test]
    fn blacklisted_proposer_is_rejected_before_construction() {
        let (mut ledger, trust, _) = setup();
        trust.write().blacklist_validator("NodeD");

        let err = ledger.add_block(vec!["Tx1".into()], "NodeD").unwrap_err();
        assert!(matches!(err, LedgerError::BlacklistedProposer(_)));
        assert_eq!(ledger.len(), 1);
        // Rejection happens pre-validation: no trust update either way.
        assert_eq!(trust.read().misbehavior_count("NodeD"), 0);
    }

    #[test]
    fn unknown_proposer_snapshots_neutral_trust() {
        let (mut ledger, _, _) = setup();
        let block = ledger.add_block(vec!["Tx1".into()], "Ghost").unwrap();
        assert!((block.trust_snapshot - TRUST_DEFAULT).abs() < 1e-12);
    }

    #[test]
    fn append_extends_adjacency() {
        let (mut ledger, _, _) = setup();
        let genesis_hash = ledger.get(0).unwrap().hash;
        let block = ledger.add_block(vec!["Tx1".into()], "NodeA").unwrap();

        let dag = ledger.dag();
        let children = dag.get(&hex::encode(genesis_hash)).unwrap();
        assert!(children.contains(&block.hash_hex()));
        assert!(dag.get(&block.hash_hex()).unwrap().is_empty());
    }

    #[test]
    fn append_credits_the_proposer() {
        let (mut ledger, trust, _) = setup();
        ledger.add_block(vec!["Tx1".into()], "NodeA").unwrap();
        assert_eq!(trust.read().successful_proposals("NodeA"), 1);
        // The participation update ran: last score differs from the pin.
        assert!((trust.read().score("NodeA") - 0.9).abs() > 1e-9);
    }

    #[test]
    fn parent_selection_prefers_high_trust() {
        let (mut ledger, trust, keypair) = setup();
        grow(&mut ledger, &trust, 4);

        // Hand-craft a weak block inside the candidate window.
        let weak = Block::with_timestamp(
            ledger.len() as u64,
            vec![ledger.blocks().last().unwrap().hash],
            vec!["WeakTx".into()],
            "NodeC",
            0.2,
            unix_millis(),
            &keypair,
        );
        let weak_hash = weak.hash;
        ledger.push_unchecked(weak);

        let parents = ledger.select_parents();
        assert!(parents.len() <= MAX_PARENTS);
        // 0.2 sits below half the window average (~0.76) and is dropped.
        assert!(!parents.contains(&weak_hash));
    }

    #[test]
    fn parent_selection_falls_back_on_sparse_survivors() {
        let (ledger, _, _) = setup();
        // Only genesis exists: one survivor forces the recency fallback.
        let parents = ledger.select_parents();
        assert_eq!(parents, vec![ledger.get(0).unwrap().hash]);
    }

    #[test]
    fn duplicate_transaction_in_window_is_transient() {
        let (mut ledger, _, _) = setup();
        ledger.add_block(vec!["TxX".into()], "NodeA").unwrap();

        let err = ledger.add_block(vec!["TxX".into()], "NodeB").unwrap_err();
        assert!(matches!(
            err,
            LedgerError::ConflictDoubleSpend { retriable: true, .. }
        ));
        assert!(err.is_transient());
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn duplicate_transaction_outside_window_is_terminal() {
        let (mut ledger, trust, _) = setup();
        let config = LedgerConfig {
            conflict_retry_window_ms: 0,
            ..LedgerConfig::default()
        };
        ledger.config = config;

        ledger.add_block(vec!["TxX".into()], "NodeA").unwrap();
        let err = ledger.add_block(vec!["TxX".into()], "NodeB").unwrap_err();
        assert!(matches!(
            err,
            LedgerError::ConflictDoubleSpend { retriable: false, .. }
        ));
        assert!(!err.is_transient());
        assert_eq!(trust.read().misbehavior_count("NodeB"), 1);
    }

    #[test]
    fn near_threshold_block_retries_then_forces_acceptance() {
        // With all snapshots pinned at 0.9 the eighth block lands in the
        // retry band: weight 2.7 against a threshold of 2.7375 and a first
        // retry floor of 2.5185.
        let (mut ledger, trust, _) = setup();
        grow(&mut ledger, &trust, 7);
        assert_eq!(ledger.len(), 8);

        trust.write().set_score("NodeB", 0.9);
        for attempt in 0..3 {
            trust.write().set_score("NodeB", 0.9);
            let err = ledger.add_block(vec!["EdgeTx".into()], "NodeB").unwrap_err();
            assert!(
                matches!(
                    err,
                    LedgerError::InsufficientTrustWeight { retriable: true, .. }
                ),
                "attempt {} should be a transient near-miss, got {:?}",
                attempt,
                err
            );
        }

        // Retry budget exhausted; the fourth attempt is forced through.
        trust.write().set_score("NodeB", 0.9);
        let block = ledger.add_block(vec!["EdgeTx".into()], "NodeB").unwrap();
        assert_eq!(block.index, 8);
        assert_eq!(ledger.len(), 9);
    }

    #[test]
    fn transient_weight_failures_do_not_penalize() {
        let (mut ledger, trust, _) = setup();
        grow(&mut ledger, &trust, 7);

        trust.write().set_score("NodeB", 0.9);
        let err = ledger.add_block(vec!["EdgeTx".into()], "NodeB").unwrap_err();
        assert!(err.is_transient());
        assert_eq!(trust.read().misbehavior_count("NodeB"), 0);
    }

    #[test]
    fn hopeless_weight_is_terminal_and_penalized() {
        let (mut ledger, trust, keypair) = setup();
        grow(&mut ledger, &trust, 7);

        // Bury the candidate window in near-floor trust so the surviving
        // parent weight cannot clear any retry floor.
        for i in 0..5 {
            let prev = ledger.blocks().last().unwrap().hash;
            let block = Block::with_timestamp(
                ledger.len() as u64,
                vec![prev],
                vec![format!("WeakTx{}", i)],
                "NodeC",
                TRUST_FLOOR,
                unix_millis(),
                &keypair,
            );
            ledger.push_unchecked(block);
        }

        let err = ledger.add_block(vec!["DoomedTx".into()], "NodeB").unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientTrustWeight { retriable: false, .. }
        ));
        assert_eq!(trust.read().misbehavior_count("NodeB"), 1);
    }

    #[test]
    fn retry_budget_is_bounded() {
        let (mut ledger, trust, _) = setup();
        grow(&mut ledger, &trust, 7);

        // Three transient attempts, then every further decision is final
        // (forced acceptance here). No block is considered more than four
        // times.
        let mut transients = 0;
        loop {
            trust.write().set_score("NodeB", 0.9);
            match ledger.add_block(vec!["EdgeTx".into()], "NodeB") {
                Err(e) if e.is_transient() => transients += 1,
                _ => break,
            }
            assert!(transients <= 3, "retry budget must cap at three");
        }
        assert_eq!(transients, 3);
    }

    #[test]
    fn audit_passes_on_honest_ledger() {
        let (mut ledger, trust, _) = setup();
        grow(&mut ledger, &trust, 5);
        assert!(ledger.audit().is_ok());
    }

    #[test]
    fn audit_catches_tampered_block() {
        let (mut ledger, trust, _) = setup();
        grow(&mut ledger, &trust, 3);

        ledger.blocks[2].transactions.push("InjectedTx".into());
        let err = ledger.audit().unwrap_err();
        assert!(matches!(err, LedgerError::HashMismatch { index: 2 }));
    }

    #[test]
    fn audit_catches_missing_parent() {
        let (mut ledger, _, keypair) = setup();
        let orphan = Block::with_timestamp(
            ledger.len() as u64,
            vec![[0xEEu8; 32]],
            vec!["OrphanTx".into()],
            "NodeA",
            0.9,
            unix_millis(),
            &keypair,
        );
        ledger.blocks.push(orphan.clone());
        ledger.children.insert(orphan.hash, Vec::new());

        let err = ledger.audit().unwrap_err();
        assert!(matches!(err, LedgerError::MissingParent { .. }));
    }

    #[test]
    fn find_transaction_locates_containing_block() {
        let (mut ledger, _, _) = setup();
        let block = ledger.add_block(vec!["TxNeedle".into()], "NodeA").unwrap();

        let location = ledger.find_transaction("TxNeedle").unwrap();
        assert_eq!(location.containing_block_hash, block.hash_hex());
        assert!(ledger.find_transaction("TxMissing").is_none());
    }

    #[test]
    fn export_records_round_trip_through_json() {
        let (mut ledger, _, _) = setup();
        ledger.add_block(vec!["Tx1".into()], "NodeA").unwrap();

        let records = ledger.export_records();
        assert_eq!(records.len(), 2);

        let json = serde_json::to_string(&records).unwrap();
        let parsed: Vec<BlockRecord> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.len(), records.len());
        assert_eq!(parsed[1].hash, records[1].hash);
        assert_eq!(parsed[1].signature.len(), 128);
    }

    #[test]
    fn list_blocks_preserves_append_order() {
        let (mut ledger, _, _) = setup();
        ledger.add_block(vec!["Tx1".into()], "NodeA").unwrap();
        ledger.add_block(vec!["Tx2".into()], "NodeB").unwrap();

        let summaries = ledger.list_blocks();
        let indices: Vec<u64> = summaries.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }
}
