//! # Cryptographic Primitives for Tessera
//!
//! Everything security-related in the protocol flows through this module:
//! block digests and proposer signatures.
//!
//! We deliberately chose boring, well-audited cryptography:
//!
//! - **SHA-256** for block digests. The digest is the block's identity, and
//!   every external system that inspects the ledger speaks SHA-256.
//! - **Ed25519** for signatures. Fast, deterministic, and nobody has
//!   broken it.
//!
//! Everything here is a thin, type-safe wrapper around audited
//! implementations. If you are tempted to optimize these functions, go
//! read about timing attacks first.

pub mod hash;
pub mod keys;

// Re-export the things people actually need so they don't have to memorize
// the module hierarchy.
pub use hash::{sha256, sha256_hex, sha256_multi};
pub use keys::{KeyError, TesseraKeypair, TesseraPublicKey, TesseraSignature};
