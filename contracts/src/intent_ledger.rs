//! # Intent Ledger
//!
//! The record store for intents and the only path by which a record changes.
//! Each intent moves through a fixed lifecycle:
//!
//! 1. **Declare**: a declarer registers a 32-byte content hash. The hash must
//!    not have been seen before, in any status.
//! 2. **Verify**: a 65-byte signature over the hash is presented. The
//!    recovered signer must be the intent's own declarer.
//! 3. **Seize**: the settlement executor's entire held balance is moved to
//!    the declarer. The intent is then terminal.
//!
//! Every operation either commits its record change and publishes exactly
//! one [`LedgerEvent`], or fails with a [`LedgerError`] and changes nothing.
//!
//! ## Serialization and reentrancy
//!
//! Operations take `&self`. They are serialized by a reentrant mutex, and a
//! flag marks that an operation is in progress. Because the mutex is
//! reentrant, a settlement executor that calls back into the ledger from
//! inside `seize_assets` re-acquires the lock on the same thread, sees the
//! flag and fails with [`LedgerError::Reentrancy`] instead of deadlocking.
//!
//! `seize_assets` records `Seized` only after the executor's transfer has
//! succeeded, so no reader ever observes a seizure that did not pay out. A
//! transfer that fails leaves the store untouched.

use parking_lot::ReentrantMutex;
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::fmt;
use thiserror::Error;

use ghost_protocol::crypto::keys::Address;
use ghost_protocol::crypto::signatures::{recover, VerifyError};
use ghost_protocol::intent::IntentHash;

use crate::events::{EventEmitter, LedgerEvent};
use crate::settlement::{SettlementExecutor, TransferError};
use crate::store::{IntentStore, StoreError};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why a presented signature was not accepted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureRejection {
    /// Recovery itself failed: wrong length, bad `v`, high `s`, invalid point.
    #[error("malformed signature: {0}")]
    Malformed(#[from] VerifyError),

    /// The signature is well formed but was produced by someone else.
    #[error("signer {recovered} is not the declarer {expected}")]
    SignerMismatch { expected: Address, recovered: Address },
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("intent {0} already exists")]
    DuplicateIntent(IntentHash),

    #[error("invalid state transition for {intent_hash}: intent is {current}, expected {required}")]
    InvalidStateTransition {
        intent_hash: IntentHash,
        current: IntentStatus,
        required: IntentStatus,
    },

    #[error("invalid signature: {0}")]
    InvalidSignature(#[from] SignatureRejection),

    #[error("settlement transfer failed: {0}")]
    TransferFailure(#[from] TransferError),

    #[error("intent {0} not found")]
    NotFound(IntentHash),

    #[error("ledger operation already in progress")]
    Reentrancy,

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

impl LedgerError {
    fn transition(intent_hash: IntentHash, err: TransitionError) -> Self {
        LedgerError::InvalidStateTransition {
            intent_hash,
            current: err.current,
            required: err.required,
        }
    }
}

/// A per-edge guard failure on a single record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("intent is {current}, expected {required}")]
pub struct TransitionError {
    pub current: IntentStatus,
    pub required: IntentStatus,
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Lifecycle position of an intent. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum IntentStatus {
    /// No record exists for the hash.
    #[default]
    Uninitialized,
    Declared,
    Verified,
    /// Terminal.
    Seized,
}

impl IntentStatus {
    /// Numeric status code as exposed to external observers.
    pub fn code(self) -> u8 {
        match self {
            IntentStatus::Uninitialized => 0,
            IntentStatus::Declared => 1,
            IntentStatus::Verified => 2,
            IntentStatus::Seized => 3,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == IntentStatus::Seized
    }
}

impl fmt::Display for IntentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            IntentStatus::Uninitialized => "Uninitialized",
            IntentStatus::Declared => "Declared",
            IntentStatus::Verified => "Verified",
            IntentStatus::Seized => "Seized",
        };
        f.write_str(label)
    }
}

/// A declared intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    pub declarer: Address,
    pub intent_hash: IntentHash,
    pub status: IntentStatus,
}

impl Intent {
    pub fn declared(intent_hash: IntentHash, declarer: Address) -> Self {
        Self {
            declarer,
            intent_hash,
            status: IntentStatus::Declared,
        }
    }

    /// `Declared → Verified`.
    pub fn mark_verified(&mut self) -> Result<(), TransitionError> {
        self.advance(IntentStatus::Declared, IntentStatus::Verified)
    }

    /// `Verified → Seized`.
    pub fn mark_seized(&mut self) -> Result<(), TransitionError> {
        self.advance(IntentStatus::Verified, IntentStatus::Seized)
    }

    fn advance(&mut self, required: IntentStatus, next: IntentStatus) -> Result<(), TransitionError> {
        if self.status != required {
            return Err(TransitionError {
                current: self.status,
                required,
            });
        }
        self.status = next;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

struct LedgerCell<S> {
    store: RefCell<S>,
    in_progress: Cell<bool>,
}

/// Clears the in-progress flag when an operation returns, on every path.
struct InProgress<'a>(&'a Cell<bool>);

impl Drop for InProgress<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

pub struct IntentLedger<S, X> {
    cell: ReentrantMutex<LedgerCell<S>>,
    executor: X,
    events: EventEmitter,
}

impl<S: IntentStore, X: SettlementExecutor> IntentLedger<S, X> {
    pub fn new(store: S, executor: X) -> Self {
        Self {
            cell: ReentrantMutex::new(LedgerCell {
                store: RefCell::new(store),
                in_progress: Cell::new(false),
            }),
            executor,
            events: EventEmitter::new(),
        }
    }

    /// Run a mutating operation with the lock held and the reentrancy flag set.
    fn exclusive<T>(
        &self,
        op: impl FnOnce(&LedgerCell<S>) -> Result<T, LedgerError>,
    ) -> Result<T, LedgerError> {
        let cell = self.cell.lock();
        if cell.in_progress.replace(true) {
            tracing::warn!("reentrant ledger call rejected");
            return Err(LedgerError::Reentrancy);
        }
        let _in_progress = InProgress(&cell.in_progress);
        op(&cell)
    }

    fn load(cell: &LedgerCell<S>, hash: &IntentHash) -> Result<Option<Intent>, LedgerError> {
        Ok(cell.store.borrow().get(hash)?)
    }

    /// Register a new intent for `declarer`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::DuplicateIntent`] if any record exists for the
    /// hash, whatever its status.
    pub fn declare_intent(&self, intent_hash: IntentHash, declarer: Address) -> Result<(), LedgerError> {
        self.exclusive(|cell| {
            if Self::load(cell, &intent_hash)?.is_some() {
                return Err(LedgerError::DuplicateIntent(intent_hash));
            }

            let intent = Intent::declared(intent_hash, declarer);
            cell.store.borrow_mut().put(&intent)?;

            tracing::info!(intent_hash = %intent_hash, declarer = %declarer, "intent declared");
            self.events.emit(LedgerEvent::IntentDeclared {
                intent_hash,
                declarer,
            });
            Ok(())
        })
    }

    /// Accept a signature over the intent hash from its declarer.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidStateTransition`] unless the intent is
    /// `Declared` (an unknown hash counts as `Uninitialized`), and
    /// [`LedgerError::InvalidSignature`] if the signature does not recover to
    /// the declarer.
    pub fn verify_intent(&self, intent_hash: &IntentHash, signature: &[u8]) -> Result<(), LedgerError> {
        self.exclusive(|cell| {
            let mut intent = Self::load(cell, intent_hash)?.ok_or(LedgerError::InvalidStateTransition {
                intent_hash: *intent_hash,
                current: IntentStatus::Uninitialized,
                required: IntentStatus::Declared,
            })?;
            intent
                .mark_verified()
                .map_err(|e| LedgerError::transition(*intent_hash, e))?;

            let recovered = recover(intent_hash.as_bytes(), signature).map_err(SignatureRejection::Malformed)?;
            if recovered != intent.declarer {
                tracing::warn!(
                    intent_hash = %intent_hash,
                    expected = %intent.declarer,
                    recovered = %recovered,
                    "signature from wrong signer"
                );
                return Err(SignatureRejection::SignerMismatch {
                    expected: intent.declarer,
                    recovered,
                }
                .into());
            }

            cell.store.borrow_mut().put(&intent)?;

            tracing::info!(intent_hash = %intent_hash, "intent verified");
            self.events.emit(LedgerEvent::IntentVerified {
                intent_hash: *intent_hash,
            });
            Ok(())
        })
    }

    /// Move the executor's whole held balance to the declarer of a verified
    /// intent. Returns the amount moved, which may be zero.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidStateTransition`] unless the intent is
    /// `Verified`, and [`LedgerError::TransferFailure`] if the executor
    /// refuses the transfer. In the latter case the intent stays `Verified`.
    pub fn seize_assets(&self, intent_hash: &IntentHash) -> Result<u64, LedgerError> {
        self.exclusive(|cell| {
            let mut intent = Self::load(cell, intent_hash)?.ok_or(LedgerError::InvalidStateTransition {
                intent_hash: *intent_hash,
                current: IntentStatus::Uninitialized,
                required: IntentStatus::Verified,
            })?;
            intent
                .mark_seized()
                .map_err(|e| LedgerError::transition(*intent_hash, e))?;

            // The record stays Verified in the store until the transfer has
            // gone through. The in-progress flag keeps a second seize out.
            let amount = self.executor.held_balance();
            if let Err(err) = self.executor.transfer(&intent.declarer, amount) {
                tracing::warn!(
                    intent_hash = %intent_hash,
                    amount,
                    error = %err,
                    "settlement transfer failed, intent stays Verified"
                );
                return Err(err.into());
            }

            if let Err(commit) = cell.store.borrow_mut().put(&intent) {
                tracing::error!(
                    intent_hash = %intent_hash,
                    amount,
                    error = %commit,
                    "funds transferred but Seized could not be recorded"
                );
                return Err(commit.into());
            }

            tracing::info!(
                intent_hash = %intent_hash,
                declarer = %intent.declarer,
                amount,
                "assets seized"
            );
            self.events.emit(LedgerEvent::AssetsSeized {
                intent_hash: *intent_hash,
                amount,
            });
            Ok(amount)
        })
    }

    /// The stored record for `intent_hash`.
    ///
    /// Reads are not subject to the reentrancy guard.
    pub fn get_intent(&self, intent_hash: &IntentHash) -> Result<Intent, LedgerError> {
        let cell = self.cell.lock();
        Self::load(&cell, intent_hash)?.ok_or(LedgerError::NotFound(*intent_hash))
    }

    /// Status of `intent_hash`, `Uninitialized` when there is no record.
    pub fn status_of(&self, intent_hash: &IntentHash) -> Result<IntentStatus, LedgerError> {
        let cell = self.cell.lock();
        Ok(Self::load(&cell, intent_hash)?
            .map(|intent| intent.status)
            .unwrap_or_default())
    }

    pub fn intent_count(&self) -> usize {
        let cell = self.cell.lock();
        let count = cell.store.borrow().len();
        count
    }

    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    pub fn executor(&self) -> &X {
        &self.executor
    }
}

impl<S, X> fmt::Debug for IntentLedger<S, X> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntentLedger")
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}
