//! # Signer Recovery
//!
//! Recoverable ECDSA over secp256k1. The ledger never stores public keys:
//! it recovers the signer's [`Address`] from `(hash, signature)` and compares
//! it with the identity it already has on record.
//!
//! ## Wire format
//!
//! A signature is 65 bytes, `r (32) ‖ s (32) ‖ v (1)`, where `v` is the
//! recovery id plus 27. Raw recovery ids (`0`/`1`) are accepted too, since
//! some signers emit them.
//!
//! ## What gets signed
//!
//! Never the intent hash itself. Signers sign
//! [`eth_signed_message_hash`](super::hash::eth_signed_message_hash) of it, and
//! [`recover`] applies the same prefix before recovery.
//!
//! ## Failure is an error, never an identity
//!
//! Every malformed input maps to a distinct [`VerifyError`]. There is no code
//! path that returns [`Address::ZERO`] or any other placeholder: if a caller
//! compared a placeholder against a declarer that happened to equal it, any
//! garbage signature would authorize the transition.

use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, Secp256k1};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::hash::eth_signed_message_hash;
use super::keys::{Address, AgentKeypair};
use crate::config::{COMPACT_SIGNATURE_LENGTH, RECOVERY_ID_OFFSET, SIGNATURE_LENGTH};

/// Half the secp256k1 group order. Signatures with `s` above this are the
/// malleated twin of a canonical signature and are rejected.
const SECP256K1_HALF_ORDER: [u8; 32] = [
    0x7F, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    0x5D, 0x57, 0x6E, 0x73, 0x57, 0xA4, 0x50, 0x1D, 0xDF, 0xE9, 0x2F, 0x46, 0x68, 0x1B, 0x20, 0xA0,
];

/// Why a signature could not be turned into a signer identity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    #[error("invalid signature length: expected 65 bytes, got {actual}")]
    InvalidLength { actual: usize },

    #[error("invalid recovery parameter v = {0}")]
    InvalidRecoveryId(u8),

    #[error("non-canonical signature: s is in the upper half of the curve order")]
    MalleableSignature,

    #[error("signer recovery failed")]
    RecoveryFailed,

    #[error("signature is not valid hex: {0}")]
    InvalidEncoding(String),
}

// ---------------------------------------------------------------------------
// Signature
// ---------------------------------------------------------------------------

/// A 65-byte `r ‖ s ‖ v` signature.
///
/// Constructing one only checks the length. Everything else is checked by
/// [`recover`], so that a `Signature` read off the wire and a raw byte slice
/// go through the same rejection path.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature([u8; SIGNATURE_LENGTH]);

impl Signature {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, VerifyError> {
        let arr: [u8; SIGNATURE_LENGTH] = bytes
            .try_into()
            .map_err(|_| VerifyError::InvalidLength {
                actual: bytes.len(),
            })?;
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LENGTH] {
        &self.0
    }

    /// The `v` byte.
    pub fn v(&self) -> u8 {
        self.0[SIGNATURE_LENGTH - 1]
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl FromStr for Signature {
    type Err = VerifyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes = hex::decode(digits).map_err(|e| VerifyError::InvalidEncoding(e.to_string()))?;
        Self::from_slice(&bytes)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", self.to_hex())
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Recovery
// ---------------------------------------------------------------------------

/// Recover the identity that signed `hash`.
///
/// The hash is wrapped with the signed-message prefix before recovery, so a
/// signature made over the bare hash does not recover to the same signer.
///
/// # Errors
///
/// - [`VerifyError::InvalidLength`] unless `signature` is exactly 65 bytes.
/// - [`VerifyError::InvalidRecoveryId`] unless `v` is 0, 1, 27 or 28.
/// - [`VerifyError::MalleableSignature`] if `s` is above half the curve order.
/// - [`VerifyError::RecoveryFailed`] if `r`/`s` are out of range or no
///   point recovers.
pub fn recover(hash: &[u8; 32], signature: &[u8]) -> Result<Address, VerifyError> {
    if signature.len() != SIGNATURE_LENGTH {
        return Err(VerifyError::InvalidLength {
            actual: signature.len(),
        });
    }

    let v = signature[SIGNATURE_LENGTH - 1];
    let raw_id = match v {
        0 | 1 => v,
        27 | 28 => v - RECOVERY_ID_OFFSET,
        other => return Err(VerifyError::InvalidRecoveryId(other)),
    };

    let s = &signature[32..COMPACT_SIGNATURE_LENGTH];
    if s > SECP256K1_HALF_ORDER.as_slice() {
        return Err(VerifyError::MalleableSignature);
    }

    let recovery_id =
        RecoveryId::from_i32(i32::from(raw_id)).map_err(|_| VerifyError::InvalidRecoveryId(v))?;
    let recoverable =
        RecoverableSignature::from_compact(&signature[..COMPACT_SIGNATURE_LENGTH], recovery_id)
            .map_err(|_| VerifyError::RecoveryFailed)?;

    let digest = eth_signed_message_hash(hash);
    let message = Message::from_digest(digest);
    let secp = Secp256k1::verification_only();
    let public_key = secp
        .recover_ecdsa(&message, &recoverable)
        .map_err(|_| VerifyError::RecoveryFailed)?;

    let address = Address::from_public_key(&public_key);
    tracing::trace!(signer = %address, "recovered signer");
    Ok(address)
}

/// Sign an intent hash the way [`recover`] expects.
///
/// Used by declarers and by the verifying service. The output is always
/// canonical (low `s`) with `v ∈ {27, 28}`.
pub fn sign_intent_hash(keypair: &AgentKeypair, hash: &[u8; 32]) -> Signature {
    let digest = eth_signed_message_hash(hash);
    let message = Message::from_digest(digest);
    let secp = Secp256k1::signing_only();
    let recoverable = secp.sign_ecdsa_recoverable(&message, keypair.secret_key());
    let (recovery_id, compact) = recoverable.serialize_compact();

    let mut bytes = [0u8; SIGNATURE_LENGTH];
    bytes[..COMPACT_SIGNATURE_LENGTH].copy_from_slice(&compact);
    // to_i32() is 0..=3; only 0 and 1 occur for signatures libsecp produces.
    bytes[SIGNATURE_LENGTH - 1] = recovery_id.to_i32() as u8 + RECOVERY_ID_OFFSET;
    Signature(bytes)
}

/// Returns `true` only if `signature` recovers to exactly `expected`.
pub fn verify_signer(hash: &[u8; 32], signature: &[u8], expected: &Address) -> bool {
    matches!(recover(hash, signature), Ok(ref signer) if signer == expected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::hash::keccak256;

    /// n - s, big-endian, for building the malleated twin of a signature.
    fn negate_scalar(s: &[u8]) -> [u8; 32] {
        let order = secp256k1::constants::CURVE_ORDER;
        let mut out = [0u8; 32];
        let mut borrow = 0i16;
        for i in (0..32).rev() {
            let mut diff = order[i] as i16 - s[i] as i16 - borrow;
            if diff < 0 {
                diff += 256;
                borrow = 1;
            } else {
                borrow = 0;
            }
            out[i] = diff as u8;
        }
        out
    }

    #[test]
    fn test_sign_and_recover() {
        let kp = AgentKeypair::generate();
        let hash = keccak256(b"intent #1");
        let sig = sign_intent_hash(&kp, &hash);
        assert_eq!(recover(&hash, sig.as_bytes()).unwrap(), kp.address());
        assert!(verify_signer(&hash, sig.as_bytes(), &kp.address()));
    }

    #[test]
    fn test_signature_v_is_27_or_28() {
        for i in 0..16u8 {
            let kp = AgentKeypair::generate();
            let sig = sign_intent_hash(&kp, &keccak256(&[i]));
            assert!(sig.v() == 27 || sig.v() == 28);
        }
    }

    #[test]
    fn test_raw_recovery_id_accepted() {
        let kp = AgentKeypair::generate();
        let hash = keccak256(b"raw v");
        let mut bytes = *sign_intent_hash(&kp, &hash).as_bytes();
        bytes[64] -= 27;
        assert_eq!(recover(&hash, &bytes).unwrap(), kp.address());
    }

    #[test]
    fn test_wrong_length_rejected() {
        let hash = keccak256(b"x");
        assert_eq!(
            recover(&hash, &[0u8; 64]),
            Err(VerifyError::InvalidLength { actual: 64 })
        );
        assert_eq!(
            recover(&hash, &[]),
            Err(VerifyError::InvalidLength { actual: 0 })
        );
        assert_eq!(
            recover(&hash, &[1u8; 66]),
            Err(VerifyError::InvalidLength { actual: 66 })
        );
    }

    #[test]
    fn test_invalid_v_rejected() {
        let kp = AgentKeypair::generate();
        let hash = keccak256(b"bad v");
        let mut bytes = *sign_intent_hash(&kp, &hash).as_bytes();
        for v in [2u8, 3, 26, 29, 35, 255] {
            bytes[64] = v;
            assert_eq!(recover(&hash, &bytes), Err(VerifyError::InvalidRecoveryId(v)));
        }
    }

    #[test]
    fn test_all_zero_signature_is_an_error_not_an_identity() {
        let hash = keccak256(b"zero");
        let mut bytes = [0u8; 65];
        bytes[64] = 27;
        assert_eq!(recover(&hash, &bytes), Err(VerifyError::RecoveryFailed));
    }

    #[test]
    fn test_high_s_rejected() {
        let kp = AgentKeypair::generate();
        let hash = keccak256(b"malleable");
        let sig = *sign_intent_hash(&kp, &hash).as_bytes();

        let mut twin = sig;
        twin[32..64].copy_from_slice(&negate_scalar(&sig[32..64]));
        twin[64] = if sig[64] == 27 { 28 } else { 27 };

        assert_eq!(recover(&hash, &twin), Err(VerifyError::MalleableSignature));
    }

    #[test]
    fn test_unprefixed_signature_does_not_recover_signer() {
        // Sign the bare hash, skipping the domain prefix.
        let kp = AgentKeypair::generate();
        let hash = keccak256(b"replayed elsewhere");
        let secp = Secp256k1::signing_only();
        let raw = secp.sign_ecdsa_recoverable(&Message::from_digest(hash), kp.secret_key());
        let (id, compact) = raw.serialize_compact();
        let mut bytes = [0u8; 65];
        bytes[..64].copy_from_slice(&compact);
        bytes[64] = id.to_i32() as u8 + 27;

        assert!(!verify_signer(&hash, &bytes, &kp.address()));
    }

    #[test]
    fn test_wrong_signer_recovers_different_identity() {
        let alice = AgentKeypair::generate();
        let bob = AgentKeypair::generate();
        let hash = keccak256(b"alice's intent");
        let sig = sign_intent_hash(&bob, &hash);
        let recovered = recover(&hash, sig.as_bytes()).unwrap();
        assert_eq!(recovered, bob.address());
        assert_ne!(recovered, alice.address());
    }

    #[test]
    fn test_signature_hex_roundtrip() {
        let kp = AgentKeypair::generate();
        let sig = sign_intent_hash(&kp, &keccak256(b"hex"));
        let parsed: Signature = sig.to_hex().parse().unwrap();
        assert_eq!(parsed, sig);
        assert!("0x1234".parse::<Signature>().is_err());
        assert!(matches!(
            "0xnothex".parse::<Signature>(),
            Err(VerifyError::InvalidEncoding(_))
        ));
    }
}
