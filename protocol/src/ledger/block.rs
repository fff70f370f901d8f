//! # Block Structure
//!
//! A block is the atomic unit of the Tessera ledger. Unlike a linear chain,
//! a block here references up to three parents, so the ledger forms a DAG
//! anchored at the genesis block.
//!
//! ## Block Layout
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │  index: u64            (ledger size at creation) │
//! │  parent_hashes: Vec<[u8; 32]>   (0 for genesis,  │
//! │                                  else 1..=3)     │
//! │  transactions: Vec<String>   (opaque tx ids)     │
//! │  proposer: String                                │
//! │  trust_snapshot: f64   (proposer trust at birth) │
//! │  timestamp_ms: u64                               │
//! │  hash: [u8; 32]        (SHA-256, see below)      │
//! │  signature             (Ed25519 over hex(hash))  │
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! ## Hash and signature
//!
//! The digest covers `index || parent_hashes || transactions || timestamp`.
//! The trust snapshot and proposer are deliberately outside the preimage:
//! the snapshot is the ledger's opinion at admission time, not part of the
//! block's content identity.
//!
//! The signature covers the lowercase hex string of the digest, so the
//! signed message is exactly what appears in logs, JSON payloads, and
//! parent references rendered for humans.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::{GENESIS_PROPOSER, GENESIS_TRUST};
use crate::crypto::{sha256_multi, TesseraKeypair, TesseraPublicKey, TesseraSignature};

/// A single block in the DAG ledger. Immutable after construction: the
/// constructor hashes and signs, and nothing mutates a stored block.
#[derive(Clone, Debug, PartialEq)]
pub struct Block {
    /// Ledger size at creation time. Unique within a single-writer ledger.
    pub index: u64,
    /// Digests of the parent blocks this block builds on.
    pub parent_hashes: Vec<[u8; 32]>,
    /// Ordered opaque transaction identifiers.
    pub transactions: Vec<String>,
    /// Validator id of the proposer.
    pub proposer: String,
    /// Proposer's trust score at creation time (genesis carries 1.0).
    pub trust_snapshot: f64,
    /// Wall-clock unix milliseconds at creation.
    pub timestamp_ms: u64,
    /// SHA-256 digest over the block content.
    pub hash: [u8; 32],
    /// Ed25519 signature over the hex form of `hash`.
    pub signature: TesseraSignature,
}

impl Block {
    /// Constructs and signs a block stamped with the current wall clock.
    pub fn new(
        index: u64,
        parent_hashes: Vec<[u8; 32]>,
        transactions: Vec<String>,
        proposer: impl Into<String>,
        trust_snapshot: f64,
        keypair: &TesseraKeypair,
    ) -> Self {
        Self::with_timestamp(
            index,
            parent_hashes,
            transactions,
            proposer,
            trust_snapshot,
            unix_millis(),
            keypair,
        )
    }

    /// Constructs and signs a block with an explicit timestamp. The normal
    /// path goes through [`new`](Self::new); this exists for replays and
    /// for tests that need to age a block.
    pub fn with_timestamp(
        index: u64,
        parent_hashes: Vec<[u8; 32]>,
        transactions: Vec<String>,
        proposer: impl Into<String>,
        trust_snapshot: f64,
        timestamp_ms: u64,
        keypair: &TesseraKeypair,
    ) -> Self {
        let hash = compute_digest(index, &parent_hashes, &transactions, timestamp_ms);
        let signature = keypair.sign(hex::encode(hash).as_bytes());
        Self {
            index,
            parent_hashes,
            transactions,
            proposer: proposer.into(),
            trust_snapshot,
            timestamp_ms,
            hash,
            signature,
        }
    }

    /// Constructs the genesis block: index 0, no parents, no transactions,
    /// full trust, proposed by the system identity and signed by the
    /// ledger keypair like every other block.
    pub fn genesis(keypair: &TesseraKeypair) -> Self {
        Self::new(
            0,
            Vec::new(),
            Vec::new(),
            GENESIS_PROPOSER,
            GENESIS_TRUST,
            keypair,
        )
    }

    /// Recomputes the digest from the stored fields. A mismatch against
    /// [`hash`](Self::hash) means the block was tampered with after
    /// construction.
    pub fn compute_hash(&self) -> [u8; 32] {
        compute_digest(
            self.index,
            &self.parent_hashes,
            &self.transactions,
            self.timestamp_ms,
        )
    }

    /// Verifies the stored signature against a public key. The signed
    /// message is the hex form of the stored digest.
    pub fn verify_signature(&self, public_key: &TesseraPublicKey) -> bool {
        public_key.verify(self.hash_hex().as_bytes(), &self.signature)
    }

    /// The block digest as a lowercase hex string.
    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash)
    }

    /// Parent digests as hex strings, in reference order.
    pub fn parent_hashes_hex(&self) -> Vec<String> {
        self.parent_hashes.iter().map(hex::encode).collect()
    }

    /// Whether this is the genesis block.
    pub fn is_genesis(&self) -> bool {
        self.index == 0 && self.parent_hashes.is_empty()
    }
}

/// SHA-256 over `index || parent_hashes || transactions || timestamp`,
/// integers little-endian, parents as raw digest bytes, transaction ids
/// as UTF-8.
fn compute_digest(
    index: u64,
    parent_hashes: &[[u8; 32]],
    transactions: &[String],
    timestamp_ms: u64,
) -> [u8; 32] {
    let index_bytes = index.to_le_bytes();
    let ts_bytes = timestamp_ms.to_le_bytes();

    let mut parts: Vec<&[u8]> = Vec::with_capacity(2 + parent_hashes.len() + transactions.len());
    parts.push(&index_bytes);
    for parent in parent_hashes {
        parts.push(parent);
    }
    for tx in transactions {
        parts.push(tx.as_bytes());
    }
    parts.push(&ts_bytes);
    sha256_multi(&parts)
}

/// Wall-clock unix time in milliseconds.
pub(crate) fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
