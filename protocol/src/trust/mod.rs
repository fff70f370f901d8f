//! # Adaptive Trust Model
//!
//! Per-validator reputation scoring. Trust scores drive everything upstream:
//! leader election filters and sorts by them, parent selection weighs them,
//! and block validation sums them. The model itself only knows about four
//! things per validator: a score in [0.1, 1.0], a misbehavior counter, a
//! last-activity timestamp, and a successful-proposal counter.
//!
//! ## Score dynamics
//!
//! Updates use a two-stage exponential moving average:
//!
//! ```text
//! new = clamp(0.8 * prev + 0.2 * (prev + gain), 0.1, 1.0)
//! ```
//!
//! which collapses to `prev + 0.2 * gain`. A single event can move a score
//! by at most ±a few hundredths, so one fluke block (good or bad) never
//! swings an election. Sustained behavior does.
//!
//! ## Blacklisting is a cooldown
//!
//! Three misbehavior strikes multiply the score by 0.7; if that lands below
//! 0.2 the validator is blacklisted. Blacklisted validators keep their
//! (floored) score and are restored at the next election scan once it
//! climbs back above the recovery threshold. Nothing here is permanent.
//!
//! The model is shared behind `Arc<RwLock<TrustModel>>` between the
//! consensus engine, the ledger, and the driver. It is the source of truth
//! for the blacklist; the engine keeps only a cached projection.

use std::collections::{HashMap, HashSet};
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use tracing::{debug, info, warn};

use crate::config::{
    BLACKLIST_THRESHOLD, ELECTION_DECAY_RATE, ELECTION_TRUST_FLOOR, MISBEHAVIOR_STRIKES,
    PROBATION_BOOST, PROBATION_THRESHOLD, RECOVERY_THRESHOLD, STRIKE_PENALTY_FACTOR,
    TRUST_CEILING, TRUST_DEFAULT, TRUST_FLOOR, TRUST_INIT_MAX, TRUST_INIT_MIN,
};

/// Reputation state for a fixed set of validators.
///
/// All mutation goes through the driver thread (see the concurrency notes
/// in the crate docs); the lock around this struct serializes the few
/// cross-component readers.
#[derive(Debug, Default)]
pub struct TrustModel {
    /// Current trust score per validator, always within [0.1, 1.0].
    scores: HashMap<String, f64>,
    /// Unix-millisecond timestamp of each validator's last scored activity.
    last_activity: HashMap<String, u64>,
    /// Strikes accumulated since the last penalty reset.
    misbehavior: HashMap<String, u32>,
    /// Blocks successfully appended per validator.
    successful_proposals: HashMap<String, u32>,
    /// Validators currently barred from proposing.
    blacklist: HashSet<String>,
}

impl TrustModel {
    /// Creates a trust model for the given validators, seeding each score
    /// uniformly in [0.5, 1.0).
    pub fn new<I, S>(validators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut rng = rand::thread_rng();
        let now = unix_millis();
        let mut model = Self::default();
        for v in validators {
            let id = v.into();
            model
                .scores
                .insert(id.clone(), rng.gen_range(TRUST_INIT_MIN..TRUST_INIT_MAX));
            model.last_activity.insert(id.clone(), now);
            model.misbehavior.insert(id.clone(), 0);
            model.successful_proposals.insert(id, 0);
        }
        model
    }

    /// Returns the trust score for a validator, or the neutral default for
    /// one the model has never seen.
    pub fn score(&self, validator: &str) -> f64 {
        self.scores.get(validator).copied().unwrap_or(TRUST_DEFAULT)
    }

    /// Overrides a validator's score (clamped to the legal range),
    /// registering the validator if needed. Used by test fixtures and by
    /// operators re-seeding a deployment.
    pub fn set_score(&mut self, validator: &str, score: f64) {
        let clamped = score.clamp(TRUST_FLOOR, TRUST_CEILING);
        self.scores.insert(validator.to_string(), clamped);
        self.last_activity
            .entry(validator.to_string())
            .or_insert_with(unix_millis);
        self.misbehavior.entry(validator.to_string()).or_insert(0);
        self.successful_proposals
            .entry(validator.to_string())
            .or_insert(0);
    }

    /// Current misbehavior strike count for a validator.
    pub fn misbehavior_count(&self, validator: &str) -> u32 {
        self.misbehavior.get(validator).copied().unwrap_or(0)
    }

    /// Number of blocks this validator has successfully appended.
    pub fn successful_proposals(&self, validator: &str) -> u32 {
        self.successful_proposals
            .get(validator)
            .copied()
            .unwrap_or(0)
    }

    /// Records one successfully appended block for the proposer.
    pub fn record_successful_proposal(&mut self, validator: &str) {
        *self
            .successful_proposals
            .entry(validator.to_string())
            .or_insert(0) += 1;
    }

    /// Whether the validator is currently blacklisted.
    pub fn is_blacklisted(&self, validator: &str) -> bool {
        self.blacklist.contains(validator)
    }

    /// The current blacklist. The consensus engine snapshots this into its
    /// cached projection at each election.
    pub fn blacklisted(&self) -> &HashSet<String> {
        &self.blacklist
    }

    /// Adds a validator to the blacklist directly. Used by the engine's
    /// startup bootstrap; the organic path runs through
    /// [`penalize_failure`](Self::penalize_failure).
    pub fn blacklist_validator(&mut self, validator: &str) {
        if self.blacklist.insert(validator.to_string()) {
            warn!(validator = %validator, "validator blacklisted");
        }
    }

    /// Applies the participation-based score update.
    ///
    /// `successful_blocks / total_attempts` forms the success ratio. Ratios
    /// above one half earn `0.1 * ratio + 0.05`; anything else loses
    /// `0.02 * max(1, strikes)`. Validators on probation (score < 0.35) get
    /// a small recovery boost on top. The result is folded in through the
    /// two-stage EMA and clamped to [0.1, 1.0]. No-op when
    /// `total_attempts` is zero.
    pub fn update(&mut self, validator: &str, successful_blocks: f64, total_attempts: f64) {
        if total_attempts == 0.0 {
            return;
        }
        let ratio = successful_blocks / total_attempts;
        let strikes = self.misbehavior_count(validator).max(1);
        let prev = self.score(validator);

        let mut gain = if ratio > 0.5 {
            0.1 * ratio + 0.05
        } else {
            -0.02 * f64::from(strikes)
        };
        if prev < PROBATION_THRESHOLD {
            gain += PROBATION_BOOST;
        }

        let new_score =
            (0.8 * prev + 0.2 * (prev + gain)).clamp(TRUST_FLOOR, TRUST_CEILING);
        self.scores.insert(validator.to_string(), new_score);
        self.last_activity
            .insert(validator.to_string(), unix_millis());

        debug!(
            validator = %validator,
            ratio,
            prev,
            new = new_score,
            "trust score updated"
        );
    }

    /// Registers a terminal validation failure against a proposer.
    ///
    /// Every third strike multiplies the score by 0.7 and resets the
    /// counter; if the penalized score lands below the blacklist threshold
    /// the proposer is barred from proposing until recovery.
    pub fn penalize_failure(&mut self, validator: &str) {
        let strikes = self.misbehavior.entry(validator.to_string()).or_insert(0);
        *strikes += 1;
        if *strikes < MISBEHAVIOR_STRIKES {
            return;
        }
        *strikes = 0;

        let prev = self.score(validator);
        let penalized = (prev * STRIKE_PENALTY_FACTOR).max(TRUST_FLOOR);
        self.scores.insert(validator.to_string(), penalized);
        warn!(
            validator = %validator,
            trust = penalized,
            "repeated validation failures, trust penalized"
        );

        if penalized < BLACKLIST_THRESHOLD {
            self.blacklist_validator(validator);
        }
    }

    /// Restores blacklisted validators whose score has recovered above the
    /// recovery threshold. Returns the restored ids. Runs at the start of
    /// every leader election.
    pub fn scan_blacklist(&mut self) -> Vec<String> {
        let restored: Vec<String> = self
            .blacklist
            .iter()
            .filter(|v| self.score(v) > RECOVERY_THRESHOLD)
            .cloned()
            .collect();
        for v in &restored {
            self.blacklist.remove(v);
            info!(validator = %v, trust = self.score(v), "validator restored from blacklist");
        }
        restored
    }

    /// Applies the slow inactivity decay used by leader election:
    /// `score *= exp(-0.005 * max(1, seconds_idle))`, floored at 0.1.
    pub fn decay_for_election(&mut self) {
        let now = unix_millis();
        for (validator, score) in self.scores.iter_mut() {
            let last = self.last_activity.get(validator).copied().unwrap_or(now);
            let idle_secs = (now.saturating_sub(last) as f64 / 1_000.0).max(1.0);
            let decay = (-ELECTION_DECAY_RATE * idle_secs).exp();
            *score = (*score * decay).max(TRUST_FLOOR);
        }
    }

    /// Validators eligible for consensus decisions: score at or above the
    /// election floor and not blacklisted, sorted by trust descending.
    pub fn optimize_selection(&self) -> Vec<String> {
        let mut eligible: Vec<(&String, f64)> = self
            .scores
            .iter()
            .filter(|(v, score)| **score >= ELECTION_TRUST_FLOOR && !self.blacklist.contains(*v))
            .map(|(v, score)| (v, *score))
            .collect();
        eligible.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(b.0))
        });
        eligible.into_iter().map(|(v, _)| v.clone()).collect()
    }
}

/// Wall-clock unix time in milliseconds.
fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
