//! # Protocol Configuration & Constants
//!
//! Every tunable in Tessera lives here. The consensus thresholds below are
//! load-bearing: two nodes running with different values will disagree on
//! which blocks are admissible, which is a polite way of saying they fork.
//!
//! Component-level `*Config` structs (election, ledger, pipeline) default
//! to these constants and can be overridden per deployment.

// ---------------------------------------------------------------------------
// Trust Model
// ---------------------------------------------------------------------------

/// Hard floor for a validator's trust score. Scores never drop below this,
/// so a penalized validator always has a numeric path back to recovery.
pub const TRUST_FLOOR: f64 = 0.1;

/// Hard ceiling for a validator's trust score.
pub const TRUST_CEILING: f64 = 1.0;

/// Trust assumed for a validator the model has never seen.
pub const TRUST_DEFAULT: f64 = 0.5;

/// Lower bound of the uniform range used to seed fresh validator scores.
/// New validators start somewhere in [0.5, 1.0): trusted enough to
/// participate, not trusted enough to dominate leader election.
pub const TRUST_INIT_MIN: f64 = 0.5;

/// Upper bound of the uniform seeding range.
pub const TRUST_INIT_MAX: f64 = 1.0;

/// Scores below this mark a validator as being on probation; the update
/// rule adds a small recovery boost so one bad stretch is not a life
/// sentence.
pub const PROBATION_THRESHOLD: f64 = 0.35;

/// Recovery boost added to the trust gain while on probation.
pub const PROBATION_BOOST: f64 = 0.05;

/// Misbehavior strikes before the multiplicative trust penalty fires.
pub const MISBEHAVIOR_STRIKES: u32 = 3;

/// Multiplier applied to a validator's trust after three strikes.
pub const STRIKE_PENALTY_FACTOR: f64 = 0.7;

/// A validator whose post-penalty score falls below this is blacklisted.
pub const BLACKLIST_THRESHOLD: f64 = 0.2;

/// A blacklisted validator whose score climbs back above this is restored
/// at the next election scan. Blacklisting is a cooldown, not a tombstone.
pub const RECOVERY_THRESHOLD: f64 = 0.35;

/// Exponential decay rate (per second of inactivity) applied to every
/// validator at the start of leader election. Deliberately slower than
/// the penalty machinery: idleness is suspicious, not criminal.
pub const ELECTION_DECAY_RATE: f64 = 0.005;

// ---------------------------------------------------------------------------
// Leader Election
// ---------------------------------------------------------------------------

/// Minimum trust score to be considered for leadership at all.
pub const ELECTION_TRUST_FLOOR: f64 = 0.3;

/// Trust a sitting leader must hold to keep its tenure between rounds.
pub const TENURE_TRUST_FLOOR: f64 = 0.6;

/// Default number of consecutive batches a leader serves before rotation.
pub const DEFAULT_LEADER_TENURE_ROUNDS: u32 = 3;

/// Default size of the top-trust candidate pool the new leader is drawn
/// from at random. Randomizing over the top k prevents an adversary from
/// precomputing (and targeting) the single highest-trust validator.
pub const DEFAULT_LEADER_TOP_K: usize = 3;

/// Ledger size below which the successful-proposal requirement is waived.
/// A brand-new network has no proposal history to filter on.
pub const PROPOSAL_HISTORY_GRACE_BLOCKS: usize = 5;

/// Successful proposals required for election candidacy once the ledger
/// has grown past the grace window.
pub const MIN_SUCCESSFUL_PROPOSALS: u32 = 2;

/// Efficiency score below which the startup bootstrap flags a validator
/// as Byzantine and removes it from the active set.
pub const EFFICIENCY_CUTOFF: f64 = 0.3;

// ---------------------------------------------------------------------------
// DAG Ledger
// ---------------------------------------------------------------------------

/// How many recent blocks are considered as parent candidates.
pub const PARENT_CANDIDATE_WINDOW: usize = 5;

/// Fallback window when trust filtering leaves fewer than two candidates.
pub const PARENT_FALLBACK_WINDOW: usize = 3;

/// Maximum number of parents a block references.
pub const MAX_PARENTS: usize = 3;

/// Fraction of the rolling average trust a parent candidate must clear.
pub const PARENT_TRUST_CUTOFF: f64 = 0.5;

/// Weight of the total-ledger term in the base validation threshold.
pub const THRESHOLD_TOTAL_WEIGHT: f64 = 0.50;

/// Weight of the recent-average term in the base validation threshold.
pub const THRESHOLD_RECENT_WEIGHT: f64 = 0.70;

/// Number of recent blocks the rolling trust average is computed over.
pub const RECENT_TRUST_WINDOW: usize = 10;

/// Ledger size at which the threshold size-scaling factor reaches 1.0.
pub const THRESHOLD_SCALE_BLOCKS: f64 = 50.0;

/// Lower clamp of the size-scaling factor.
pub const THRESHOLD_SCALE_MIN: f64 = 0.75;

/// Upper clamp of the size-scaling factor.
pub const THRESHOLD_SCALE_MAX: f64 = 1.2;

/// Base of the retry threshold schedule: retry k admits blocks down to
/// `T * (0.92 - 0.02 * k)`.
pub const RETRY_BASE_FACTOR: f64 = 0.92;

/// Per-retry relaxation step of the retry threshold schedule.
pub const RETRY_STEP_FACTOR: f64 = 0.02;

/// Default retry budget per block. After this many near-miss retries the
/// forced-acceptance clause decides.
pub const DEFAULT_MAX_VALIDATION_RETRIES: u32 = 3;

/// Forced-acceptance margin: a block that exhausted its retries is still
/// admitted if its parent weight sits within this fraction of the final
/// retry threshold. Bounds the worst-case latency of a near-threshold
/// block at three retry cycles.
pub const DEFAULT_FORCED_ACCEPTANCE_MARGIN: f64 = 0.95;

/// Epsilon added to the total-weight sum. Keeps the threshold finite on
/// an empty ledger.
pub const WEIGHT_EPSILON: f64 = 1e-9;

/// Window inside which a duplicate transaction is treated as a transient
/// ordering collision (retry after leader change) rather than a hard
/// double-spend.
pub const DEFAULT_CONFLICT_RETRY_WINDOW_MS: u64 = 5_000;

/// Proposer identifier stamped on the genesis block.
pub const GENESIS_PROPOSER: &str = "System";

/// Trust snapshot carried by the genesis block.
pub const GENESIS_TRUST: f64 = 1.0;

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

/// Default number of transactions processed per batch (one leader
/// election per batch).
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Floor for the measured total time when computing TPS. Guards the
/// division on runs that complete faster than the clock resolution.
pub const MIN_MEASURED_SECONDS: f64 = 1e-4;
