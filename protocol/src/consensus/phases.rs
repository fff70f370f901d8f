//! # Three-Phase Protocol Messages
//!
//! Envelope types for the pre-prepare / prepare / commit exchange. The
//! engine in [`super::engine`] drives the phases; this module defines what
//! travels between them.
//!
//! A [`PrePrepare`] binds a transaction to the leader that proposed it via
//! the transaction's SHA-256 digest. A [`Prepare`] is a validator's echo of
//! that digest. The commit rule counts matching echoes from non-blacklisted
//! validators against the `2f + 1` quorum; an echo carrying the wrong
//! digest (a corrupted copy) simply does not count.

use serde::{Deserialize, Serialize};

use crate::crypto::sha256_hex;

/// The leader's phase-one envelope binding a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrePrepare {
    /// Validator id of the leader that issued the envelope.
    pub leader: String,
    /// The transaction being ordered.
    pub transaction: String,
    /// SHA-256 digest of the transaction id, hex-encoded. Prepares echo
    /// this value back; a mismatch marks a corrupted copy.
    pub digest: String,
}

impl PrePrepare {
    /// Binds a transaction under the given leader.
    pub fn new(leader: impl Into<String>, transaction: impl Into<String>) -> Self {
        let transaction = transaction.into();
        let digest = sha256_hex(transaction.as_bytes());
        Self {
            leader: leader.into(),
            transaction,
            digest,
        }
    }
}

/// A validator's phase-two echo of the envelope digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prepare {
    /// The echoing validator.
    pub validator: String,
    /// The digest the validator claims to have seen.
    pub digest: String,
}

impl Prepare {
    /// An honest echo of the envelope.
    pub fn echo(validator: impl Into<String>, envelope: &PrePrepare) -> Self {
        Self {
            validator: validator.into(),
            digest: envelope.digest.clone(),
        }
    }

    /// Whether this prepare confirms the given envelope.
    pub fn confirms(&self, envelope: &PrePrepare) -> bool {
        self.digest == envelope.digest
    }
}

/// Behaviors a simulated Byzantine validator can exhibit. Attached by the
/// fault-injection hook, never by production election.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ByzantineBehavior {
    /// Echoes a forged digest instead of the envelope's.
    SendFakeTx,
    /// Never echoes at all.
    DropMessages,
}
