//! # Cryptographic Primitives for Ghost Agent
//!
//! Every hash, key, and signature the ledger relies on flows through here.
//!
//! - **Keccak-256** for content hashes and identity derivation.
//! - **secp256k1** recoverable ECDSA for attestations. The signer's identity
//!   is recovered from the signature, so the ledger never stores public keys.
//!
//! Everything is a thin wrapper over audited implementations (`sha3`,
//! `secp256k1`). The wrappers exist to pin the wire format and to make the
//! failure paths explicit.

pub mod hash;
pub mod keys;
pub mod signatures;

pub use hash::{eth_signed_message_hash, keccak256};
pub use keys::{Address, AgentKeypair};
pub use signatures::{recover, sign_intent_hash, verify_signer, Signature, VerifyError};
