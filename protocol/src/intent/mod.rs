//! # Intents
//!
//! An intent is identified by a 32-byte content hash that the client
//! computes from the payload. The ledger only ever sees the hash; the payload
//! itself matters to the client helper (which hashes it) and to the
//! verifying service (which audits it).
//!
//! - [`payload`]: the canonical payload encoding and its hash.
//! - [`audit`]: the CRA checks run before the verifying service signs.

pub mod audit;
pub mod payload;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::config::HASH_OUTPUT_LENGTH;

pub use audit::{AuditCheck, AuditPolicy, AuditReport, NoRiskScorer, RiskError, RiskScorer};
pub use payload::IntentPayload;

/// Error parsing an intent hash from its hex form.
#[derive(Debug, Error)]
#[error("invalid intent hash: {0}")]
pub struct IntentHashParseError(String);

/// The content address of an intent and the ledger's primary key.
///
/// Displayed and serialized as `0x`-prefixed lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IntentHash([u8; HASH_OUTPUT_LENGTH]);

impl IntentHash {
    pub const fn from_bytes(bytes: [u8; HASH_OUTPUT_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; HASH_OUTPUT_LENGTH] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl From<[u8; HASH_OUTPUT_LENGTH]> for IntentHash {
    fn from(bytes: [u8; HASH_OUTPUT_LENGTH]) -> Self {
        Self(bytes)
    }
}

impl FromStr for IntentHash {
    type Err = IntentHashParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        let bytes = hex::decode(digits).map_err(|e| IntentHashParseError(e.to_string()))?;
        let arr: [u8; HASH_OUTPUT_LENGTH] = bytes.as_slice().try_into().map_err(|_| {
            IntentHashParseError(format!(
                "expected {} bytes, got {}",
                HASH_OUTPUT_LENGTH,
                bytes.len()
            ))
        })?;
        Ok(Self(arr))
    }
}

impl fmt::Display for IntentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for IntentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IntentHash({})", self.to_hex())
    }
}

impl Serialize for IntentHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for IntentHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intent_hash_hex_forms() {
        let hash = IntentHash::from_bytes([0xAB; 32]);
        let hex_form = hash.to_hex();
        assert!(hex_form.starts_with("0x"));
        assert_eq!(hex_form.len(), 66);
        assert_eq!(hex_form.parse::<IntentHash>().unwrap(), hash);
        assert_eq!(hex_form[2..].parse::<IntentHash>().unwrap(), hash);
    }

    #[test]
    fn test_intent_hash_rejects_short_input() {
        assert!("0xabcd".parse::<IntentHash>().is_err());
        assert!("".parse::<IntentHash>().is_err());
    }

    #[test]
    fn test_intent_hash_serde() {
        let hash = IntentHash::from_bytes([7; 32]);
        let json = serde_json::to_string(&hash).unwrap();
        let back: IntentHash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, hash);
    }
}
