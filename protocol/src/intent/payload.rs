//! # Intent Payloads and Canonical Hashing
//!
//! The client helper turns a payload into an [`IntentHash`] by hashing a
//! canonical encoding of it:
//!
//! ```text
//! intent_hash = keccak256(canonical_json(payload))
//! ```
//!
//! "Canonical" means two payloads that mean the same thing encode to the same
//! bytes, whatever order the client happened to build them in:
//!
//! - object keys are sorted at every depth (including inside `metadata`),
//! - no insignificant whitespace,
//! - `originCountry` is trimmed and upper-cased.
//!
//! Any change to a field value changes the bytes and therefore the hash.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

use super::IntentHash;
use crate::crypto::hash::keccak256;

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("payload encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// The off-ledger description of an intent.
///
/// Field names on the wire are camelCase, matching what existing clients
/// already send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentPayload {
    /// Value the intent concerns, in wei.
    pub amount_wei: u64,
    /// ISO 3166-1 alpha-2 country the intent originates from.
    pub origin_country: String,
    /// Unix timestamp (seconds) the intent was created.
    pub timestamp: i64,
    /// Free-form data forwarded to the external risk check.
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl IntentPayload {
    pub fn new(amount_wei: u64, origin_country: impl Into<String>, timestamp: i64) -> Self {
        Self {
            amount_wei,
            origin_country: origin_country.into(),
            timestamp,
            metadata: BTreeMap::new(),
        }
    }

    /// Attach a metadata entry. Builder-style.
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Parse a payload from JSON bytes.
    pub fn from_json(bytes: &[u8]) -> Result<Self, PayloadError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// The country code as the audit and the hash see it.
    pub fn normalized_country(&self) -> String {
        self.origin_country.trim().to_ascii_uppercase()
    }

    /// The exact bytes that get hashed.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, PayloadError> {
        let mut normalized = self.clone();
        normalized.origin_country = self.normalized_country();
        let value = canonicalize(serde_json::to_value(&normalized)?);
        Ok(serde_json::to_vec(&value)?)
    }

    /// Compute the content address of this payload.
    pub fn intent_hash(&self) -> Result<IntentHash, PayloadError> {
        let bytes = self.canonical_bytes()?;
        Ok(IntentHash::from_bytes(keccak256(&bytes)))
    }
}

/// Rebuild every object with its keys in sorted order.
///
/// `serde_json::Map` is only sorted when the `preserve_order` feature is off,
/// and any crate in the build can switch it on. Sorting here keeps the
/// encoding stable either way.
fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::new();
            for (key, inner) in entries {
                sorted.insert(key, canonicalize(inner));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> IntentPayload {
        IntentPayload::new(250_000_000_000_000_000, "US", 1_760_000_000)
            .with_metadata("channel", json!("mobile"))
            .with_metadata("device", json!({ "os": "ios", "build": 42 }))
    }

    #[test]
    fn test_hash_is_deterministic() {
        assert_eq!(sample().intent_hash().unwrap(), sample().intent_hash().unwrap());
    }

    #[test]
    fn test_key_order_does_not_matter() {
        let a = r#"{"amountWei":5,"originCountry":"DE","timestamp":10,
                    "metadata":{"b":{"y":1,"x":2},"a":[{"k":1,"j":2}]}}"#;
        let b = r#"{"timestamp":10,"metadata":{"a":[{"j":2,"k":1}],"b":{"x":2,"y":1}},
                    "originCountry":"DE","amountWei":5}"#;
        let pa = IntentPayload::from_json(a.as_bytes()).unwrap();
        let pb = IntentPayload::from_json(b.as_bytes()).unwrap();
        assert_eq!(pa.intent_hash().unwrap(), pb.intent_hash().unwrap());
    }

    #[test]
    fn test_country_case_is_normalized() {
        let upper = IntentPayload::new(1, "GB", 1);
        let lower = IntentPayload::new(1, " gb ", 1);
        assert_eq!(upper.intent_hash().unwrap(), lower.intent_hash().unwrap());
    }

    #[test]
    fn test_every_field_changes_the_hash() {
        let base = sample().intent_hash().unwrap();

        let mut p = sample();
        p.amount_wei += 1;
        assert_ne!(p.intent_hash().unwrap(), base);

        let mut p = sample();
        p.origin_country = "CA".into();
        assert_ne!(p.intent_hash().unwrap(), base);

        let mut p = sample();
        p.timestamp += 1;
        assert_ne!(p.intent_hash().unwrap(), base);

        let p = sample().with_metadata("channel", json!("web"));
        assert_ne!(p.intent_hash().unwrap(), base);
    }

    #[test]
    fn test_canonical_bytes_have_sorted_keys_and_no_whitespace() {
        let bytes = IntentPayload::new(1, "us", 2).canonical_bytes().unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(
            text,
            r#"{"amountWei":1,"metadata":{},"originCountry":"US","timestamp":2}"#
        );
    }

    #[test]
    fn test_missing_metadata_defaults_to_empty() {
        let p = IntentPayload::from_json(br#"{"amountWei":1,"originCountry":"US","timestamp":2}"#)
            .unwrap();
        assert!(p.metadata.is_empty());
    }
}
