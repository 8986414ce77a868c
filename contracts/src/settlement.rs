//! # Settlement
//!
//! The value side of a seizure. The ledger decides *whether* an intent may be
//! seized; a [`SettlementExecutor`] moves the funds. A seizure always moves
//! the executor's entire held balance to the declarer, so the amount is
//! whatever [`SettlementExecutor::held_balance`] reports at the time of the
//! call, zero included.
//!
//! [`Treasury`] is the in-process executor: a held balance plus a table of
//! credited accounts. Recipients can be frozen, which makes every transfer
//! to them fail. That is the one externally triggerable transfer failure and
//! the way tests exercise the ledger's rollback path.
//!
//! ## Layout (sled)
//!
//! | Tree       | Key     | Value                    |
//! |------------|---------|--------------------------|
//! | `treasury` | `state` | `bincode(TreasuryState)` |
//!
//! A treasury opened with [`Treasury::open`] writes its state through to
//! this tree before a deposit or transfer takes effect in memory. The frozen
//! set is operational and is not persisted.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sled::{Db, Tree};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

use ghost_protocol::crypto::keys::Address;

use crate::store::{StoreError, StoreResult};

const TREASURY_TREE: &str = "treasury";
const STATE_KEY: &[u8] = b"state";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    #[error("insufficient held funds: requested {requested}, held {held}")]
    InsufficientFunds { requested: u64, held: u64 },

    #[error("recipient {0} refused the transfer")]
    RecipientFrozen(Address),

    #[error("recipient balance would overflow")]
    RecipientOverflow,

    #[error("transfer could not be recorded: {0}")]
    Storage(String),

    #[error("transfer rejected: {0}")]
    Rejected(String),
}

/// Why funds could not be added to the held balance.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DepositError {
    #[error("deposit of {amount} would overflow held balance {held}")]
    Overflow { held: u64, amount: u64 },

    #[error("deposit could not be recorded: {0}")]
    Storage(String),
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

/// Moves held value out of the system.
///
/// `transfer` must be all-or-nothing: on `Err` no balance has changed.
pub trait SettlementExecutor: Send + Sync {
    fn held_balance(&self) -> u64;

    fn transfer(&self, to: &Address, amount: u64) -> Result<(), TransferError>;
}

// ---------------------------------------------------------------------------
// Treasury
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct TreasuryState {
    held: u64,
    accounts: HashMap<Address, u64>,
    total_paid_out: u64,
    #[serde(skip)]
    frozen: HashSet<Address>,
}

/// In-process settlement executor, optionally backed by a sled tree.
#[derive(Debug, Default)]
pub struct Treasury {
    state: Mutex<TreasuryState>,
    backing: Option<Tree>,
}

impl Treasury {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_balance(held: u64) -> Self {
        let treasury = Self::new();
        treasury.state.lock().held = held;
        treasury
    }

    /// Load the treasury persisted in `db`, or create it holding
    /// `initial_balance` if the database has never held one.
    pub fn open(db: &Db, initial_balance: u64) -> StoreResult<Self> {
        let tree = db.open_tree(TREASURY_TREE)?;
        let state = match tree.get(STATE_KEY)? {
            Some(bytes) => bincode::deserialize::<TreasuryState>(&bytes)
                .map_err(|e| StoreError::Serialization(e.to_string()))?,
            None => {
                let state = TreasuryState {
                    held: initial_balance,
                    ..TreasuryState::default()
                };
                write_state(&tree, &state)?;
                tracing::info!(held = initial_balance, "treasury created");
                state
            }
        };
        Ok(Self {
            state: Mutex::new(state),
            backing: Some(tree),
        })
    }

    /// Persist `next` if backed. Callers apply it in memory only on success.
    fn commit(&self, next: &TreasuryState) -> StoreResult<()> {
        match &self.backing {
            Some(tree) => write_state(tree, next),
            None => Ok(()),
        }
    }

    /// Add funds to the held balance. Returns the new balance.
    pub fn deposit(&self, amount: u64) -> Result<u64, DepositError> {
        let mut state = self.state.lock();
        let held = state.held.checked_add(amount).ok_or(DepositError::Overflow {
            held: state.held,
            amount,
        })?;
        let mut next = state.clone();
        next.held = held;
        self.commit(&next)
            .map_err(|e| DepositError::Storage(e.to_string()))?;
        *state = next;

        tracing::debug!(amount, held, "treasury deposit");
        Ok(held)
    }

    /// Funds credited to `account` by past transfers.
    pub fn balance_of(&self, account: &Address) -> u64 {
        self.state.lock().accounts.get(account).copied().unwrap_or(0)
    }

    pub fn total_paid_out(&self) -> u64 {
        self.state.lock().total_paid_out
    }

    /// Refuse all future transfers to `account`.
    pub fn freeze(&self, account: Address) {
        self.state.lock().frozen.insert(account);
    }

    pub fn unfreeze(&self, account: &Address) {
        self.state.lock().frozen.remove(account);
    }

    pub fn is_frozen(&self, account: &Address) -> bool {
        self.state.lock().frozen.contains(account)
    }
}

fn write_state(tree: &Tree, state: &TreasuryState) -> StoreResult<()> {
    let bytes = bincode::serialize(state).map_err(|e| StoreError::Serialization(e.to_string()))?;
    tree.insert(STATE_KEY, bytes)?;
    tree.flush()?;
    Ok(())
}

impl SettlementExecutor for Treasury {
    fn held_balance(&self) -> u64 {
        self.state.lock().held
    }

    fn transfer(&self, to: &Address, amount: u64) -> Result<(), TransferError> {
        let mut state = self.state.lock();

        if state.frozen.contains(to) {
            return Err(TransferError::RecipientFrozen(*to));
        }
        let remaining = state
            .held
            .checked_sub(amount)
            .ok_or(TransferError::InsufficientFunds {
                requested: amount,
                held: state.held,
            })?;
        let credited = state
            .accounts
            .get(to)
            .copied()
            .unwrap_or(0)
            .checked_add(amount)
            .ok_or(TransferError::RecipientOverflow)?;

        let mut next = state.clone();
        next.held = remaining;
        next.accounts.insert(*to, credited);
        next.total_paid_out = state.total_paid_out.saturating_add(amount);
        self.commit(&next)
            .map_err(|e| TransferError::Storage(e.to_string()))?;
        *state = next;

        tracing::info!(to = %to, amount, held = remaining, "treasury transfer");
        Ok(())
    }
}
