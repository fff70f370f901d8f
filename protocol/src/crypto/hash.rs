//! # Hashing Utilities
//!
//! Block digests in Tessera are SHA-256 and nothing else. The digest is the
//! identity of a block: it is what parents reference, what proposers sign,
//! and what the audit pass recomputes. Pinning a single hash function keeps
//! every one of those call sites byte-for-byte comparable.

use sha2::{Digest, Sha256};

/// Compute the SHA-256 hash of the input data.
///
/// Returns the 32-byte digest as a fixed-size array, which propagates
/// naturally through parent references and adjacency keys without a heap
/// allocation per lookup.
///
/// # Example
///
/// ```
/// use tessera_protocol::crypto::sha256;
///
/// let digest = sha256(b"tessera");
/// assert_eq!(digest.len(), 32);
/// ```
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}

/// Compute SHA-256 and return the lowercase hex string of the digest.
///
/// Signatures cover this hex form rather than the raw bytes, so the signed
/// message survives any round trip through JSON or log output unchanged.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

/// Hash multiple byte slices together without concatenation overhead.
///
/// Feeds each part sequentially into the hasher. Same result as hashing
/// the concatenation, minus the temporary buffer. Used for composite
/// preimages like `index || parents || transactions || timestamp`.
pub fn sha256_multi(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}
