//! # U-PBFT Consensus Engine
//!
//! Leader-based three-phase ordering over a bounded validator set with at
//! most `f` Byzantine faults. The engine does not own the ledger; it owns
//! the validator set, the current leader, and the commit counter, and it
//! shares the trust model with the ledger.
//!
//! ## Leader election
//!
//! Election is trust-driven with three moving parts:
//!
//! 1. **Tenure.** A leader serves up to `leader_tenure_rounds` consecutive
//!    batches, amortizing election cost, but only while its trust holds
//!    above 0.6. A leader whose score degrades mid-tenure rotates out at
//!    the next batch.
//! 2. **Candidacy filter.** Blacklisted validators are out; so is anyone
//!    at or below the 0.3 trust floor, and (once the ledger has history)
//!    anyone without at least two successful proposals.
//! 3. **Top-k randomization.** The new leader is drawn uniformly from the
//!    top three candidates by trust, so an adversary cannot precompute
//!    which validator to target.
//!
//! An empty candidate set is a liveness failure, not a safety one: the
//! election returns `None` and the driver skips the batch.
//!
//! ## Commit rule
//!
//! A transaction commits when `2f + 1` non-blacklisted validators echo the
//! leader's envelope digest. Echoes carrying a forged digest count for
//! nothing. A failed commit is terminal for that submission; the ledger's
//! retry machinery handles block-level uncertainty separately.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{
    DEFAULT_LEADER_TENURE_ROUNDS, DEFAULT_LEADER_TOP_K, EFFICIENCY_CUTOFF, ELECTION_TRUST_FLOOR,
    MIN_MEASURED_SECONDS, MIN_SUCCESSFUL_PROPOSALS, PROPOSAL_HISTORY_GRACE_BLOCKS,
    TENURE_TRUST_FLOOR,
};
use crate::ledger::DagLedger;
use crate::trust::TrustModel;

use super::phases::{ByzantineBehavior, Prepare, PrePrepare};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors surfaced by the ordering protocol.
#[derive(Debug, Error)]
pub enum ConsensusError {
    /// No election candidate survived the filters. The batch is skipped
    /// and retried at the next tick.
    #[error("no valid leader available")]
    NoValidLeader,

    /// Fewer than `2f + 1` matching confirmations arrived. Terminal for
    /// the transaction.
    #[error("commit failed: {have} confirmations, quorum requires {need}")]
    CommitFailed {
        /// Matching confirmations from non-blacklisted validators.
        have: usize,
        /// The `2f + 1` quorum.
        need: usize,
    },
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Consensus parameters fixed at engine construction.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Byzantine fault bound `f`. The caller ensures the validator set
    /// holds at least `3f + 1` members.
    pub fault_tolerance: usize,
    /// Consecutive batches a leader serves before rotation.
    pub leader_tenure_rounds: u32,
    /// Size of the top-trust pool a new leader is drawn from.
    pub leader_top_k: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fault_tolerance: 1,
            leader_tenure_rounds: DEFAULT_LEADER_TENURE_ROUNDS,
            leader_top_k: DEFAULT_LEADER_TOP_K,
        }
    }
}

// ---------------------------------------------------------------------------
// Performance
// ---------------------------------------------------------------------------

/// Throughput and latency counters, reported through the query contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceReport {
    /// Transactions that reached commit.
    pub total_transactions: u64,
    /// Wall-clock seconds accumulated by the driver.
    pub total_time_seconds: f64,
    /// Transactions per second over the measured window.
    pub tps: f64,
    /// Mean seconds per committed transaction.
    pub avg_latency_seconds: f64,
}

// ---------------------------------------------------------------------------
// UpbftEngine
// ---------------------------------------------------------------------------

/// The trust-aware U-PBFT engine.
pub struct UpbftEngine {
    /// Active validator set. Shrinks when detection or fault injection
    /// removes members; never grows back within a run.
    validators: Vec<String>,
    config: EngineConfig,
    trust: Arc<RwLock<TrustModel>>,
    leader: Option<String>,
    /// Batches served by the current leader.
    leader_rounds: u32,
    /// One-shot bootstrap scores used by [`detect_malicious`](Self::detect_malicious).
    /// Trust scores govern every decision after startup.
    efficiency: HashMap<String, f64>,
    /// Cached projection of the trust model's blacklist, refreshed at each
    /// election. The trust model stays the source of truth.
    blacklist: HashSet<String>,
    /// Behaviors attached by the fault-injection hook.
    behaviors: HashMap<String, ByzantineBehavior>,
    total_transactions: u64,
    total_time_seconds: f64,
}

impl UpbftEngine {
    /// Creates an engine over the given validator set, seeding each
    /// efficiency score uniformly in [0, 1).
    pub fn new(
        validators: Vec<String>,
        trust: Arc<RwLock<TrustModel>>,
        config: EngineConfig,
    ) -> Self {
        let mut rng = rand::thread_rng();
        let efficiency = validators
            .iter()
            .map(|v| (v.clone(), rng.gen_range(0.0..1.0)))
            .collect();
        info!(
            validators = validators.len(),
            f = config.fault_tolerance,
            quorum = 2 * config.fault_tolerance + 1,
            "consensus engine initialized"
        );
        Self {
            validators,
            config,
            trust,
            leader: None,
            leader_rounds: 0,
            efficiency,
            blacklist: HashSet::new(),
            behaviors: HashMap::new(),
            total_transactions: 0,
            total_time_seconds: 0.0,
        }
    }

    /// The active validator set.
    pub fn validators(&self) -> &[String] {
        &self.validators
    }

    /// The current leader, if one has been elected.
    pub fn leader(&self) -> Option<&str> {
        self.leader.as_deref()
    }

    /// The `2f + 1` confirmation quorum.
    pub fn quorum(&self) -> usize {
        2 * self.config.fault_tolerance + 1
    }

    /// Overrides a validator's bootstrap efficiency score. Test fixtures
    /// use this to make [`detect_malicious`](Self::detect_malicious)
    /// deterministic.
    pub fn set_efficiency(&mut self, validator: &str, score: f64) {
        self.efficiency.insert(validator.to_string(), score);
    }

    // -----------------------------------------------------------------------
    // Detection
    // -----------------------------------------------------------------------

    /// Startup bootstrap: removes every validator whose efficiency score
    /// sits below the cutoff and blacklists it. Returns the removed ids.
    ///
    /// This runs once before the first batch. Everything afterwards is
    /// governed by trust scores.
    pub fn detect_malicious(&mut self) -> Vec<String> {
        let flagged: Vec<String> = self
            .validators
            .iter()
            .filter(|v| {
                self.efficiency.get(*v).copied().unwrap_or(1.0) < EFFICIENCY_CUTOFF
            })
            .cloned()
            .collect();

        if !flagged.is_empty() {
            let mut trust = self.trust.write();
            for v in &flagged {
                trust.blacklist_validator(v);
                self.blacklist.insert(v.clone());
            }
            self.validators.retain(|v| !flagged.contains(v));
            warn!(flagged = ?flagged, "low-efficiency validators removed at startup");
        }
        flagged
    }

    // -----------------------------------------------------------------------
    // Leader election
    // -----------------------------------------------------------------------

    /// Elects (or retains) the leader for the next batch.
    ///
    /// Applies inactivity decay, scans the blacklist for recoveries,
    /// filters candidates, and either extends the sitting leader's tenure
    /// or draws a fresh leader from the top-k pool. Returns `None` when no
    /// candidate survives; the caller skips the batch.
    pub fn elect_leader(&mut self, ledger: &DagLedger) -> Option<String> {
        {
            let mut trust = self.trust.write();
            trust.decay_for_election();
            let restored = trust.scan_blacklist();
            if !restored.is_empty() {
                debug!(restored = ?restored, "validators restored ahead of election");
            }
        }
        let trust = self.trust.read();
        self.blacklist = trust.blacklisted().clone();

        let min_proposals = if ledger.len() < PROPOSAL_HISTORY_GRACE_BLOCKS {
            0
        } else {
            MIN_SUCCESSFUL_PROPOSALS
        };

        let mut candidates: Vec<(String, f64)> = self
            .validators
            .iter()
            .filter(|v| !self.blacklist.contains(*v))
            .filter(|v| trust.score(v) > ELECTION_TRUST_FLOOR)
            .filter(|v| trust.successful_proposals(v) >= min_proposals)
            .map(|v| (v.clone(), trust.score(v)))
            .collect();
        candidates.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });

        if candidates.is_empty() {
            warn!("no eligible leader, skipping this round");
            return None;
        }

        if let Some(current) = &self.leader {
            if self.leader_rounds < self.config.leader_tenure_rounds
                && trust.score(current) > TENURE_TRUST_FLOOR
            {
                self.leader_rounds += 1;
                debug!(leader = %current, rounds = self.leader_rounds, "leader tenure extended");
                return self.leader.clone();
            }
        }

        self.leader_rounds = 1;
        let pool = &candidates[..candidates.len().min(self.config.leader_top_k)];
        let pick = rand::thread_rng().gen_range(0..pool.len());
        let (elected, score) = &pool[pick];
        self.leader = Some(elected.clone());
        info!(
            leader = %elected,
            trust = *score,
            pool = pool.len(),
            "new leader elected"
        );
        self.leader.clone()
    }

    // -----------------------------------------------------------------------
    // Three-phase protocol
    // -----------------------------------------------------------------------

    /// Phase one: the leader binds a transaction into an envelope.
    pub fn pre_prepare(&self, transaction: &str) -> Result<PrePrepare, ConsensusError> {
        let leader = self.leader.as_ref().ok_or(ConsensusError::NoValidLeader)?;
        Ok(PrePrepare::new(leader.clone(), transaction))
    }

    /// Phase two: active, non-blacklisted validators echo the envelope.
    ///
    /// Validators marked `DropMessages` stay silent; validators marked
    /// `SendFakeTx` echo a forged digest that the commit rule discards.
    pub fn prepare(&self, envelope: &PrePrepare) -> Vec<Prepare> {
        self.validators
            .iter()
            .filter(|v| !self.blacklist.contains(*v))
            .filter_map(|v| match self.behaviors.get(v) {
                Some(ByzantineBehavior::DropMessages) => None,
                Some(ByzantineBehavior::SendFakeTx) => Some(Prepare {
                    validator: v.clone(),
                    digest: crate::crypto::sha256_hex(format!("FakeTx-{v}").as_bytes()),
                }),
                None => Some(Prepare::echo(v.clone(), envelope)),
            })
            .collect()
    }

    /// Phase three: counts confirmations against the `2f + 1` quorum.
    ///
    /// Only prepares from non-blacklisted validators that echo the
    /// envelope digest count. On success the commit counter advances and
    /// the confirmation count is returned.
    pub fn commit(
        &mut self,
        envelope: &PrePrepare,
        prepares: &[Prepare],
    ) -> Result<usize, ConsensusError> {
        let need = self.quorum();
        let have = prepares
            .iter()
            .filter(|p| !self.blacklist.contains(&p.validator))
            .filter(|p| p.confirms(envelope))
            .count();

        if have < need {
            warn!(tx = %envelope.transaction, have, need, "commit quorum not reached");
            return Err(ConsensusError::CommitFailed { have, need });
        }
        self.total_transactions += 1;
        debug!(tx = %envelope.transaction, have, "transaction committed");
        Ok(have)
    }

    // -----------------------------------------------------------------------
    // Fault injection (test hook)
    // -----------------------------------------------------------------------

    /// Marks each active validator malicious with the given probability,
    /// attaches a behavior, blacklists it, and removes it from the active
    /// set. Returns the marked ids.
    ///
    /// Adversarial property tests only; production election never calls
    /// this.
    pub fn simulate_byzantine_failures(&mut self, rate: f64) -> Vec<String> {
        let mut rng = rand::thread_rng();
        let mut marked = Vec::new();
        for v in &self.validators {
            if rng.gen::<f64>() < rate {
                let behavior = if rng.gen_bool(0.5) {
                    ByzantineBehavior::SendFakeTx
                } else {
                    ByzantineBehavior::DropMessages
                };
                self.behaviors.insert(v.clone(), behavior);
                marked.push(v.clone());
            }
        }
        if !marked.is_empty() {
            let mut trust = self.trust.write();
            for v in &marked {
                trust.blacklist_validator(v);
                self.blacklist.insert(v.clone());
            }
            self.validators.retain(|v| !marked.contains(v));
            warn!(marked = ?marked, rate, "byzantine failures injected");
        }
        marked
    }

    /// Attaches a behavior to a validator without removing it from the
    /// active set. Lets tests observe corrupted and dropped echoes flowing
    /// through the quorum count.
    pub fn mark_byzantine(&mut self, validator: &str, behavior: ByzantineBehavior) {
        self.behaviors.insert(validator.to_string(), behavior);
    }

    // -----------------------------------------------------------------------
    // Performance
    // -----------------------------------------------------------------------

    /// Adds driver-measured wall-clock seconds to the running total.
    pub fn record_batch_time(&mut self, seconds: f64) {
        self.total_time_seconds += seconds;
    }

    /// Current throughput counters.
    pub fn performance(&self) -> PerformanceReport {
        let time = self.total_time_seconds.max(MIN_MEASURED_SECONDS);
        let committed = self.total_transactions;
        PerformanceReport {
            total_transactions: committed,
            total_time_seconds: self.total_time_seconds,
            tps: committed as f64 / time,
            avg_latency_seconds: self.total_time_seconds / (committed.max(1)) as f64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::TesseraKeypair;
    use crate::ledger::LedgerConfig;

    fn setup() -> (UpbftEngine, Arc<RwLock<TrustModel>>, DagLedger) {
        let trust = Arc::new(RwLock::new(TrustModel::default()));
        let validators: Vec<String> = ["NodeA", "NodeB", "NodeC", "NodeD"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        for v in &validators {
            trust.write().set_score(v, 0.8);
        }
        let keypair = Arc::new(TesseraKeypair::from_seed(&[5u8; 32]));
        let ledger = DagLedger::new(Arc::clone(&trust), keypair, LedgerConfig::default());
        let engine = UpbftEngine::new(validators, Arc::clone(&trust), EngineConfig::default());
        (engine, trust, ledger)
    }

    #[test]
    fn quorum_is_two_f_plus_one() {
        let (engine, _, _) = setup();
        assert_eq!(engine.quorum(), 3);
    }

    #[test]
    fn detection_removes_low_efficiency_validators() {
        let (mut engine, trust, _) = setup();
        engine.set_efficiency("NodeA", 0.9);
        engine.set_efficiency("NodeB", 0.1);
        engine.set_efficiency("NodeC", 0.5);
        engine.set_efficiency("NodeD", 0.29);

        let flagged = engine.detect_malicious();
        assert_eq!(flagged.len(), 2);
        assert!(flagged.contains(&"NodeB".to_string()));
        assert!(flagged.contains(&"NodeD".to_string()));
        assert_eq!(engine.validators().len(), 2);
        assert!(trust.read().is_blacklisted("NodeB"));
    }

    #[test]
    fn election_picks_from_top_candidates() {
        let (mut engine, trust, ledger) = setup();
        trust.write().set_score("NodeA", 0.9);
        trust.write().set_score("NodeB", 0.85);
        trust.write().set_score("NodeC", 0.7);
        trust.write().set_score("NodeD", 0.4);

        let leader = engine.elect_leader(&ledger).expect("leader expected");
        // Top-3 pool by trust: A, B, C. D never leads from fourth place.
        assert_ne!(leader, "NodeD");
    }

    #[test]
    fn election_skips_blacklisted_validators() {
        let (mut engine, trust, ledger) = setup();
        for v in ["NodeA", "NodeB", "NodeC"] {
            trust.write().blacklist_validator(v);
            // Pin below recovery so the scan cannot restore them.
            trust.write().set_score(v, 0.2);
        }
        trust.write().set_score("NodeD", 0.9);

        let leader = engine.elect_leader(&ledger).expect("leader expected");
        assert_eq!(leader, "NodeD");
    }

    #[test]
    fn election_returns_none_without_candidates() {
        let (mut engine, trust, ledger) = setup();
        for v in ["NodeA", "NodeB", "NodeC", "NodeD"] {
            trust.write().set_score(v, 0.2);
        }
        assert!(engine.elect_leader(&ledger).is_none());
    }

    #[test]
    fn leader_tenure_holds_while_trust_holds() {
        let (mut engine, trust, ledger) = setup();
        for v in ["NodeA", "NodeB", "NodeC", "NodeD"] {
            trust.write().set_score(v, 0.9);
        }

        let first = engine.elect_leader(&ledger).unwrap();
        // Tenure rounds 2 and 3 keep the same leader.
        assert_eq!(engine.elect_leader(&ledger).unwrap(), first);
        assert_eq!(engine.elect_leader(&ledger).unwrap(), first);
    }

    #[test]
    fn degraded_leader_rotates_out() {
        let (mut engine, trust, ledger) = setup();
        for v in ["NodeA", "NodeB", "NodeC", "NodeD"] {
            trust.write().set_score(v, 0.9);
        }
        let first = engine.elect_leader(&ledger).unwrap();

        // Tank the sitting leader below the tenure floor; everyone else
        // stays electable.
        trust.write().set_score(&first, 0.4);
        let second = engine.elect_leader(&ledger).unwrap();
        assert_ne!(second, first);
    }

    #[test]
    fn election_requires_proposal_history_on_grown_ledger() {
        let (mut engine, trust, mut ledger) = setup();
        for v in ["NodeA", "NodeB", "NodeC", "NodeD"] {
            trust.write().set_score(v, 0.9);
        }
        // Grow the ledger past the grace window; only NodeA earns history.
        for i in 0..5 {
            trust.write().set_score("NodeA", 0.9);
            ledger
                .add_block(vec![format!("Tx{}", i)], "NodeA")
                .unwrap();
        }
        trust.write().set_score("NodeA", 0.9);

        let leader = engine.elect_leader(&ledger).unwrap();
        assert_eq!(leader, "NodeA");
    }

    #[test]
    fn three_phase_commits_with_honest_validators() {
        let (mut engine, _, ledger) = setup();
        engine.elect_leader(&ledger).unwrap();

        let envelope = engine.pre_prepare("Tx1").unwrap();
        let prepares = engine.prepare(&envelope);
        assert_eq!(prepares.len(), 4);

        let confirmations = engine.commit(&envelope, &prepares).unwrap();
        assert_eq!(confirmations, 4);
        assert_eq!(engine.performance().total_transactions, 1);
    }

    #[test]
    fn pre_prepare_without_leader_fails() {
        let (engine, _, _) = setup();
        assert!(matches!(
            engine.pre_prepare("Tx1"),
            Err(ConsensusError::NoValidLeader)
        ));
    }

    #[test]
    fn dropped_and_forged_echoes_break_quorum() {
        let (mut engine, _, ledger) = setup();
        engine.elect_leader(&ledger).unwrap();
        engine.mark_byzantine("NodeC", ByzantineBehavior::DropMessages);
        engine.mark_byzantine("NodeD", ByzantineBehavior::SendFakeTx);

        let envelope = engine.pre_prepare("Tx1").unwrap();
        let prepares = engine.prepare(&envelope);
        // NodeC is silent, NodeD echoes a forged digest.
        assert_eq!(prepares.len(), 3);

        let err = engine.commit(&envelope, &prepares).unwrap_err();
        assert!(matches!(
            err,
            ConsensusError::CommitFailed { have: 2, need: 3 }
        ));
        assert_eq!(engine.performance().total_transactions, 0);
    }

    #[test]
    fn commit_ignores_blacklisted_confirmations() {
        let (mut engine, trust, ledger) = setup();
        engine.elect_leader(&ledger).unwrap();

        let envelope = engine.pre_prepare("Tx1").unwrap();
        let prepares = engine.prepare(&envelope);

        // Blacklist two echoers after the prepare phase; their
        // confirmations must not count.
        trust.write().set_score("NodeC", 0.2);
        trust.write().set_score("NodeD", 0.2);
        engine.blacklist.insert("NodeC".to_string());
        engine.blacklist.insert("NodeD".to_string());

        let err = engine.commit(&envelope, &prepares).unwrap_err();
        assert!(matches!(err, ConsensusError::CommitFailed { have: 2, .. }));
    }

    #[test]
    fn fault_injection_marks_and_removes() {
        let (mut engine, trust, _) = setup();
        let marked = engine.simulate_byzantine_failures(1.0);
        assert_eq!(marked.len(), 4);
        assert!(engine.validators().is_empty());
        for v in &marked {
            assert!(trust.read().is_blacklisted(v));
        }
    }

    #[test]
    fn fault_injection_at_zero_rate_is_noop() {
        let (mut engine, _, _) = setup();
        assert!(engine.simulate_byzantine_failures(0.0).is_empty());
        assert_eq!(engine.validators().len(), 4);
    }

    #[test]
    fn performance_report_guards_divisions() {
        let (mut engine, _, ledger) = setup();
        let report = engine.performance();
        assert_eq!(report.total_transactions, 0);
        assert!(report.tps.is_finite());
        assert!(report.avg_latency_seconds.is_finite());

        engine.elect_leader(&ledger).unwrap();
        let envelope = engine.pre_prepare("Tx1").unwrap();
        let prepares = engine.prepare(&envelope);
        engine.commit(&envelope, &prepares).unwrap();
        engine.record_batch_time(2.0);

        let report = engine.performance();
        assert_eq!(report.total_transactions, 1);
        assert!((report.total_time_seconds - 2.0).abs() < 1e-12);
        assert!((report.tps - 0.5).abs() < 1e-9);
        assert!((report.avg_latency_seconds - 2.0).abs() < 1e-9);
    }
}
