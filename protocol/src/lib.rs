// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Ghost Agent: Core Library
//!
//! Primitives shared by the intent ledger, the node, and the off-ledger
//! helpers. Nothing in here holds state; it hashes, signs, recovers, and
//! audits.
//!
//! ## Architecture
//!
//! - **crypto**: Keccak-256, secp256k1 keys, and signer recovery with the
//!   `"\x19Ethereum Signed Message:\n32"` domain prefix.
//! - **intent**: the 32-byte intent hash, the canonical payload encoding
//!   clients hash, and the CRA audit the verifying service runs.
//! - **config**: protocol constants and defaults.
//!
//! ## Design Philosophy
//!
//! 1. Recovery never returns a default identity. Bad input is an error.
//! 2. The ledger trusts signatures, not audits. The audit lives here so the
//!    verifying service can share it, but nothing in the ledger calls it.
//! 3. If it touches money, it has tests. Plural.

pub mod config;
pub mod crypto;
pub mod intent;
