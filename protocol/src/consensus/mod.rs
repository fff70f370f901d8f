//! # Consensus Module
//!
//! The U-PBFT ordering layer.
//!
//! ```text
//! engine.rs  — leader election with tenure, malicious-node bootstrap,
//!              commit quorum, fault injection, performance counters
//! phases.rs  — pre-prepare / prepare envelope types
//! ```
//!
//! ## Design Decisions
//!
//! - The engine never touches the ledger's block store; it only reads the
//!   ledger size to decide whether the proposal-history filter applies.
//! - The trust model owns the blacklist. The engine carries a cached
//!   projection refreshed at every election so the hot paths (prepare,
//!   commit) stay lock-free.
//! - Fault injection lives on the engine but is a test hook; nothing in
//!   the production election path calls it.

pub mod engine;
pub mod phases;

pub use engine::{ConsensusError, EngineConfig, PerformanceReport, UpbftEngine};
pub use phases::{ByzantineBehavior, Prepare, PrePrepare};
