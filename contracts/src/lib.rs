//! # Ghost Agent Contracts
//!
//! The intent ledger and its collaborators:
//!
//! - **Intent Ledger**: the record store and its three guarded transitions,
//!   `declare → verify → seize`.
//! - **Settlement**: the one-shot transfer of everything the system holds to
//!   the declarer once an intent is verified.
//! - **Events**: lifecycle notifications for observers such as the
//!   verifying service.
//! - **Store**: where intent records live (in memory or in sled). A sled
//!   database also carries the treasury state.
//!
//! ## Design Principles
//!
//! 1. State transitions are explicit: one guarded function per edge, each
//!    naming the guard it violated.
//! 2. Every operation is all-or-nothing. A failed call leaves no record
//!    change and emits nothing.
//! 3. The only authorization is a recovered signature. Nothing here trusts
//!    the caller.
//! 4. Balances use checked arithmetic everywhere.

pub mod events;
pub mod intent_ledger;
pub mod settlement;
pub mod store;

pub use events::{EventEmitter, EventRecord, EventSink, LedgerEvent};
pub use intent_ledger::{Intent, IntentLedger, IntentStatus, LedgerError, SignatureRejection};
pub use settlement::{DepositError, SettlementExecutor, TransferError, Treasury};
pub use store::{IntentStore, MemoryIntentStore, SledIntentStore, StoreError};
