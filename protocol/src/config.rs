//! # Protocol Configuration & Constants
//!
//! Every magic number in Ghost Agent lives here. Wire-level values (prefix,
//! signature layout, status codes) must match what signers produce
//! off-ledger, so changing them breaks every signature already in flight.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// Protocol fingerprint reported by `/status` and `version`.
pub const PROTOCOL_FINGERPRINT: &str = "GHOST-AGENT-2025";

/// The full version string.
pub const PROTOCOL_VERSION: &str = "0.1.0";

// ---------------------------------------------------------------------------
// Cryptographic Parameters
// ---------------------------------------------------------------------------

/// Recoverable ECDSA over secp256k1, Ethereum style.
pub const SIGNING_ALGORITHM: &str = "secp256k1-ecdsa-recoverable";

/// Secret key length in bytes.
pub const SECRET_KEY_LENGTH: usize = 32;

/// Wire signature length: `r (32) ‖ s (32) ‖ v (1)`.
pub const SIGNATURE_LENGTH: usize = 65;

/// Compact signature length without the recovery byte.
pub const COMPACT_SIGNATURE_LENGTH: usize = 64;

/// Identity length. The last 20 bytes of Keccak-256 over the public key.
pub const ADDRESS_LENGTH: usize = 20;

/// Hash output length in bytes.
pub const HASH_OUTPUT_LENGTH: usize = 32;

/// Domain-separation prefix applied to an intent hash before recovery.
/// The trailing `32` is the byte length of the hash being wrapped.
pub const SIGNED_MESSAGE_PREFIX: &[u8] = b"\x19Ethereum Signed Message:\n32";

/// Offset added to the raw recovery id in the `v` byte.
pub const RECOVERY_ID_OFFSET: u8 = 27;

// ---------------------------------------------------------------------------
// CRA Audit Defaults
// ---------------------------------------------------------------------------

/// Countries whose intents pass the geography check.
pub const DEFAULT_ALLOWED_COUNTRIES: &[&str] = &["US", "CA", "GB", "DE"];

/// Largest amount (in wei) a single intent may carry. 1 ETH.
pub const DEFAULT_MAX_AMOUNT_WEI: u64 = 1_000_000_000_000_000_000;

/// How old an intent payload may be when audited.
pub const DEFAULT_AUDIT_TIME_WINDOW: Duration = Duration::from_secs(300);

/// Risk scores at or above this fail the external risk check.
pub const DEFAULT_MAX_RISK_SCORE: u32 = 70;

// ---------------------------------------------------------------------------
// Node Defaults
// ---------------------------------------------------------------------------

/// Default HTTP API port.
pub const DEFAULT_RPC_PORT: u16 = 9841;

/// Default metrics (Prometheus) port.
pub const DEFAULT_METRICS_PORT: u16 = 9842;

/// How often the verifying service sweeps for declared intents it missed
/// on the push channel.
pub const ORACLE_POLL_INTERVAL: Duration = Duration::from_secs(5);
