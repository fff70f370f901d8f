//! # Key Management
//!
//! Ed25519 keypair generation and signing for Tessera block proposers.
//!
//! Every block in the ledger carries a signature over the hex string of its
//! digest. The keypair that produces those signatures is owned by whoever
//! constructs the ledger; it is passed in explicitly rather than read from
//! a process-wide global, so tests and multi-instance deployments can each
//! hold their own keys.
//!
//! ## Why Ed25519?
//!
//! - Deterministic signatures (no k-value footguns like ECDSA).
//! - 128-bit security level in 32+32 bytes. Compact and sufficient.
//! - Fast verification, which matters when the audit pass re-verifies
//!   every stored block.
//!
//! Private keys are zeroized on drop (courtesy of ed25519-dalek), and key
//! bytes never appear in `Debug` output.

use ed25519_dalek::{
    Signature as DalekSignature, Signer, SigningKey, Verifier, VerifyingKey, SECRET_KEY_LENGTH,
};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors that can occur during key operations.
///
/// Intentionally vague about *why* something failed; error messages that
/// describe key material are a classic leak.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("invalid secret key bytes: wrong length or not a valid scalar")]
    InvalidSecretKey,

    #[error("invalid public key bytes: not a valid Ed25519 point")]
    InvalidPublicKey,
}

/// A proposer keypair wrapping an Ed25519 signing key.
///
/// Does NOT implement `Serialize`/`Deserialize`: exporting a private key
/// should be a deliberate act (`secret_key_bytes`), not a side effect of
/// serializing whatever struct happens to hold the keypair.
pub struct TesseraKeypair {
    signing_key: SigningKey,
}

/// The public half of a proposer identity, safe to share and to store in
/// block records.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TesseraPublicKey {
    bytes: [u8; 32],
}

/// An Ed25519 signature over a message.
///
/// Stored as `Vec<u8>` for serde compatibility but always exactly 64 bytes
/// when produced by [`TesseraKeypair::sign`]. A signature of any other
/// length simply fails verification; no panics.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TesseraSignature {
    bytes: Vec<u8>,
}

impl TesseraKeypair {
    /// Generate a fresh keypair from the OS cryptographic RNG.
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self { signing_key }
    }

    /// Construct a keypair deterministically from a 32-byte seed.
    ///
    /// Useful for reproducible test fixtures. A weak seed gives a weak key;
    /// production keys come from [`generate`](Self::generate).
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(seed);
        Self { signing_key }
    }

    /// Reconstruct a keypair from a hex-encoded secret key.
    pub fn from_hex(hex_str: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(hex_str).map_err(|_| KeyError::InvalidSecretKey)?;
        if bytes.len() != SECRET_KEY_LENGTH {
            return Err(KeyError::InvalidSecretKey);
        }
        let mut seed = [0u8; SECRET_KEY_LENGTH];
        seed.copy_from_slice(&bytes);
        Ok(Self::from_seed(&seed))
    }

    /// Returns the public key associated with this keypair.
    pub fn public_key(&self) -> TesseraPublicKey {
        TesseraPublicKey {
            bytes: self.signing_key.verifying_key().to_bytes(),
        }
    }

    /// Sign a message and return a [`TesseraSignature`].
    ///
    /// Ed25519 signatures are deterministic: the same (key, message) pair
    /// always produces the same signature, so re-signing a block during a
    /// retry cycle cannot change its identity.
    pub fn sign(&self, message: &[u8]) -> TesseraSignature {
        let sig = self.signing_key.sign(message);
        TesseraSignature {
            bytes: sig.to_bytes().to_vec(),
        }
    }

    /// Verify a signature against this keypair's public key.
    pub fn verify(&self, message: &[u8], signature: &TesseraSignature) -> bool {
        self.public_key().verify(message, signature)
    }

    /// Exports the raw 32-byte secret key material. Handle with care.
    pub fn secret_key_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    /// The public key as a hex string, for display and logging.
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.signing_key.verifying_key().to_bytes())
    }
}

impl Clone for TesseraKeypair {
    fn clone(&self) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&self.signing_key.to_bytes()),
        }
    }
}

impl fmt::Debug for TesseraKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print secret key material, not even partially.
        write!(f, "TesseraKeypair(pub={})", self.public_key_hex())
    }
}

// ---------------------------------------------------------------------------
// TesseraPublicKey
// ---------------------------------------------------------------------------

impl TesseraPublicKey {
    /// Create a public key from raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self { bytes }
    }

    /// Try to create a public key from a byte slice, validating both the
    /// length and that the bytes are a valid Ed25519 point. Low-order and
    /// otherwise degenerate points are rejected here.
    pub fn try_from_slice(slice: &[u8]) -> Result<Self, KeyError> {
        if slice.len() != 32 {
            return Err(KeyError::InvalidPublicKey);
        }
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(slice);
        VerifyingKey::from_bytes(&bytes).map_err(|_| KeyError::InvalidPublicKey)?;
        Ok(Self { bytes })
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    /// Verify a signature against this public key.
    ///
    /// Returns a plain boolean: callers want a yes/no answer, and the
    /// specific failure mode (bad point, wrong length, bad signature) is
    /// not actionable for them.
    pub fn verify(&self, message: &[u8], signature: &TesseraSignature) -> bool {
        let Ok(verifying_key) = VerifyingKey::from_bytes(&self.bytes) else {
            return false;
        };
        let sig_bytes: [u8; 64] = match signature.bytes.as_slice().try_into() {
            Ok(b) => b,
            Err(_) => return false,
        };
        let dalek_sig = DalekSignature::from_bytes(&sig_bytes);
        verifying_key.verify(message, &dalek_sig).is_ok()
    }

    /// Hex-encoded representation. 64 characters for 32 bytes.
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    /// Parse a hex-encoded public key string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 32 {
            return Err(hex::FromHexError::OddLength);
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self { bytes: arr })
    }
}

impl fmt::Display for TesseraPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for TesseraPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TesseraPublicKey({})", &self.to_hex()[..16])
    }
}

// ---------------------------------------------------------------------------
// TesseraSignature
// ---------------------------------------------------------------------------

impl TesseraSignature {
    /// Create a signature from the raw 64-byte representation.
    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Self {
            bytes: bytes.to_vec(),
        }
    }

    /// Returns the raw signature bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Hex-encoded signature string. 128 characters for a valid signature.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }

    /// Parse a hex-encoded signature.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 64 {
            return Err(hex::FromHexError::OddLength);
        }
        Ok(Self { bytes })
    }
}

impl fmt::Display for TesseraSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for TesseraSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex_str = self.to_hex();
        if hex_str.len() >= 128 {
            write!(f, "TesseraSignature({}...{})", &hex_str[..8], &hex_str[120..])
        } else {
            write!(f, "TesseraSignature({})", hex_str)
        }
    }
}
