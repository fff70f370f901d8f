//! # Ledger Module
//!
//! The DAG block store and its admission machinery.
//!
//! ```text
//! block.rs  — Block structure, genesis, digest + signature operations
//! dag.rs    — DAG store: parent selection, adaptive validation with
//!             bounded retries, conflict detection, audit, queries
//! ```
//!
//! ## Design Decisions
//!
//! - Blocks are immutable after construction; the constructor hashes and
//!   signs, and the store only ever appends.
//! - Acyclicity needs no cycle detection: a block's index is the ledger
//!   size at creation, so parent references can only point backward.
//! - The adjacency map is parent-to-children, which is the direction the
//!   audit pass and the DAG query both walk.

pub mod block;
pub mod dag;

pub use block::Block;
pub use dag::{
    BlockRecord, BlockSummary, DagLedger, LedgerConfig, LedgerError, TransactionLocation,
};
