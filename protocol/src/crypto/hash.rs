//! # Hashing Utilities
//!
//! Ghost Agent uses exactly one hash function: **Keccak-256**, the
//! pre-standardization SHA-3 that Ethereum settled on. It is used for:
//!
//! - intent hashes (the content address of a canonical payload),
//! - identity derivation (last 20 bytes of the hashed public key),
//! - the domain-separated digest that signatures are made over.
//!
//! Note that Keccak-256 is *not* NIST SHA3-256; the padding differs. Using
//! `sha3::Sha3_256` here would silently produce identities nobody else can
//! reproduce.

use sha3::{Digest, Keccak256};

use crate::config::SIGNED_MESSAGE_PREFIX;

/// Compute the Keccak-256 hash of the input data.
///
/// # Example
///
/// ```
/// use ghost_protocol::crypto::keccak256;
///
/// let hash = keccak256(b"ghost agent");
/// assert_eq!(hash.len(), 32);
/// ```
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Hash multiple byte slices as if they were concatenated.
pub fn keccak256_multi(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Wrap a 32-byte hash in the signed-message prefix and hash again.
///
/// ```text
/// digest = keccak256("\x19Ethereum Signed Message:\n32" ‖ hash)
/// ```
///
/// This is what signers actually sign. A signature over the prefixed digest
/// cannot be replayed as a signature over the raw hash in another context
/// (a transaction, a typed-data payload), and vice versa.
pub fn eth_signed_message_hash(hash: &[u8; 32]) -> [u8; 32] {
    keccak256_multi(&[SIGNED_MESSAGE_PREFIX, hash.as_slice()])
}
