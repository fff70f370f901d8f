// Copyright (c) 2026 Tessera Contributors. MIT License.
// See LICENSE for details.

//! # Tessera Protocol — Core Library
//!
//! A permissioned consensus engine that maintains a trust-weighted DAG
//! ledger under Byzantine conditions. Three subsystems, tightly coupled on
//! purpose:
//!
//! 1. **U-PBFT ordering** — a pre-prepare / prepare / commit protocol over
//!    a bounded validator set tolerating up to `f` Byzantine faults, with
//!    trust-driven leader election and bounded leader tenure.
//! 2. **An adaptive trust model** — per-validator reputation that decays
//!    with inactivity, suffers for misbehavior, recovers on probation, and
//!    feeds every upstream decision.
//! 3. **A DAG block store** — multi-parent blocks, SHA-256 digests signed
//!    with Ed25519, trust-weighted parent selection, double-spend
//!    detection, and an adaptive admission threshold with bounded retries
//!    and a forced-acceptance escape hatch.
//!
//! ## Architecture
//!
//! Modules mirror those concerns:
//!
//! - **crypto** — SHA-256 digests and Ed25519 keypairs. Don't roll your own.
//! - **trust** — the reputation model and the blacklist it owns.
//! - **consensus** — the U-PBFT engine and its phase envelopes.
//! - **ledger** — blocks, the DAG store, admission, conflicts, audit.
//! - **pipeline** — the batch driver and the submission/query contracts.
//! - **config** — every constant and tunable default.
//!
//! ## Concurrency model
//!
//! The core is single-writer by construction: one driver thread mutates
//! the ledger, the trust model, and the engine in sequence. The shared
//! trust model sits behind `Arc<RwLock<_>>` only so the engine and ledger
//! can hold the same handle; nothing here spawns threads. Embedders that
//! accept concurrent submissions serialize them in front of the pipeline.
//!
//! ## Design Philosophy
//!
//! 1. Safety decisions come from trust the adversary had to earn over time.
//! 2. Liveness valves (retry schedules, forced acceptance, blacklist
//!    recovery) are bounded and explicit.
//! 3. If it decides whether a block exists, it has tests.

pub mod config;
pub mod consensus;
pub mod crypto;
pub mod ledger;
pub mod pipeline;
pub mod trust;

pub use consensus::{ConsensusError, EngineConfig, PerformanceReport, UpbftEngine};
pub use crypto::{TesseraKeypair, TesseraPublicKey, TesseraSignature};
pub use ledger::{Block, BlockRecord, BlockSummary, DagLedger, LedgerConfig, LedgerError};
pub use pipeline::{Pipeline, PipelineConfig, RunSummary, SubmitReceipt, SubmitStatus};
pub use trust::TrustModel;
