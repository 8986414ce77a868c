//! # Key Management
//!
//! secp256k1 keypairs and the 20-byte identities derived from them.
//!
//! An [`Address`] is what the ledger records as a declarer and what signer
//! recovery returns. It is derived as:
//!
//! ```text
//! address = keccak256(uncompressed_pubkey[1..65])[12..32]
//! ```
//!
//! which is the Ethereum account derivation, so keys managed by ordinary
//! wallets produce identities the ledger agrees with.
//!
//! ## Security considerations
//!
//! - Key generation uses `OsRng`.
//! - Secret key bytes are never logged, and `Debug` prints only the address.

use rand::rngs::OsRng;
use secp256k1::{PublicKey, Secp256k1, SecretKey};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::hash::keccak256;
use crate::config::{ADDRESS_LENGTH, SECRET_KEY_LENGTH};

/// Errors that can occur during key operations.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("invalid secret key bytes: wrong length or out of range for secp256k1")]
    InvalidSecretKey,

    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

// ---------------------------------------------------------------------------
// Address
// ---------------------------------------------------------------------------

/// A 20-byte signer identity.
///
/// Displayed and serialized as lowercase `0x`-prefixed hex. Parsing accepts
/// either case, with or without the prefix.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address([u8; ADDRESS_LENGTH]);

impl Address {
    /// The all-zero address. Never a valid recovery result.
    pub const ZERO: Address = Address([0u8; ADDRESS_LENGTH]);

    /// Wrap raw address bytes.
    pub const fn from_bytes(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Derive the address of a secp256k1 public key.
    pub fn from_public_key(public_key: &PublicKey) -> Self {
        let uncompressed = public_key.serialize_uncompressed();
        // Skip the 0x04 tag byte; hash the 64-byte X ‖ Y.
        let digest = keccak256(&uncompressed[1..]);
        let mut bytes = [0u8; ADDRESS_LENGTH];
        bytes.copy_from_slice(&digest[32 - ADDRESS_LENGTH..]);
        Self(bytes)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; ADDRESS_LENGTH] {
        &self.0
    }

    /// Lowercase hex with the `0x` prefix.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; ADDRESS_LENGTH]
    }
}

impl FromStr for Address {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        let bytes = hex::decode(digits).map_err(|e| KeyError::InvalidAddress(e.to_string()))?;
        if bytes.len() != ADDRESS_LENGTH {
            return Err(KeyError::InvalidAddress(format!(
                "expected {} bytes, got {}",
                ADDRESS_LENGTH,
                bytes.len()
            )));
        }
        let mut arr = [0u8; ADDRESS_LENGTH];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_hex())
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// AgentKeypair
// ---------------------------------------------------------------------------

/// A secp256k1 keypair used by declarers and the verifying service.
///
/// Deliberately not `Serialize`. Use [`secret_key_hex`](Self::secret_key_hex)
/// and [`from_hex`](Self::from_hex) when a key must be written to disk.
#[derive(Clone)]
pub struct AgentKeypair {
    secret_key: SecretKey,
    public_key: PublicKey,
}

impl AgentKeypair {
    /// Generate a fresh keypair using the OS cryptographic RNG.
    pub fn generate() -> Self {
        let secp = Secp256k1::signing_only();
        let (secret_key, public_key) = secp.generate_keypair(&mut OsRng);
        Self {
            secret_key,
            public_key,
        }
    }

    /// Reconstruct a keypair from raw 32-byte secret key material.
    ///
    /// Fails for zero or for values at or above the curve order.
    pub fn from_bytes(bytes: &[u8; SECRET_KEY_LENGTH]) -> Result<Self, KeyError> {
        let secret_key = SecretKey::from_slice(bytes).map_err(|_| KeyError::InvalidSecretKey)?;
        let secp = Secp256k1::signing_only();
        let public_key = PublicKey::from_secret_key(&secp, &secret_key);
        Ok(Self {
            secret_key,
            public_key,
        })
    }

    /// Reconstruct a keypair from a hex-encoded secret key (optional `0x`).
    pub fn from_hex(hex_str: &str) -> Result<Self, KeyError> {
        let trimmed = hex_str.trim();
        let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes = hex::decode(digits).map_err(|_| KeyError::InvalidSecretKey)?;
        if bytes.len() != SECRET_KEY_LENGTH {
            return Err(KeyError::InvalidSecretKey);
        }
        let mut arr = [0u8; SECRET_KEY_LENGTH];
        arr.copy_from_slice(&bytes);
        Self::from_bytes(&arr)
    }

    /// The identity this key signs as.
    pub fn address(&self) -> Address {
        Address::from_public_key(&self.public_key)
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// Needed by the signing path. Try not to pass this around.
    pub(crate) fn secret_key(&self) -> &SecretKey {
        &self.secret_key
    }

    /// Exports the raw secret key as hex. **Handle with care.**
    pub fn secret_key_hex(&self) -> String {
        hex::encode(self.secret_key.secret_bytes())
    }
}

impl fmt::Debug for AgentKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AgentKeypair(address={})", self.address())
    }
}

impl PartialEq for AgentKeypair {
    fn eq(&self, other: &Self) -> bool {
        self.public_key == other.public_key
    }
}

impl Eq for AgentKeypair {}
