//! # Intent Stores
//!
//! Where intent records live. The ledger is the only writer: stores expose
//! plain `get`/`put`, and every invariant (uniqueness, monotonic status) is
//! enforced by the ledger before it calls `put`.
//!
//! ## Layout (sled)
//!
//! | Tree      | Key                   | Value             |
//! |-----------|-----------------------|-------------------|
//! | `intents` | `intent_hash` (32B)   | `bincode(Intent)` |
//!
//! The treasury keeps its state in a sibling tree of the same database (see
//! [`crate::settlement`]).
//!
//! Every `put` is flushed before it returns, so by the time the ledger
//! publishes a notification the record it describes is on disk.

use sled::{Db, Tree};
use std::collections::HashMap;
use std::path::Path;

use ghost_protocol::intent::IntentHash;

use crate::intent_ledger::Intent;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Keyed storage for intent records.
pub trait IntentStore: Send {
    fn get(&self, hash: &IntentHash) -> StoreResult<Option<Intent>>;

    /// Insert or overwrite the record for `intent.intent_hash`.
    fn put(&mut self, intent: &Intent) -> StoreResult<()>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: IntentStore + ?Sized> IntentStore for Box<T> {
    fn get(&self, hash: &IntentHash) -> StoreResult<Option<Intent>> {
        (**self).get(hash)
    }

    fn put(&mut self, intent: &Intent) -> StoreResult<()> {
        (**self).put(intent)
    }

    fn len(&self) -> usize {
        (**self).len()
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryIntentStore {
    records: HashMap<IntentHash, Intent>,
}

impl MemoryIntentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IntentStore for MemoryIntentStore {
    fn get(&self, hash: &IntentHash) -> StoreResult<Option<Intent>> {
        Ok(self.records.get(hash).cloned())
    }

    fn put(&mut self, intent: &Intent) -> StoreResult<()> {
        self.records.insert(intent.intent_hash, intent.clone());
        Ok(())
    }

    fn len(&self) -> usize {
        self.records.len()
    }
}

// ---------------------------------------------------------------------------
// sled
// ---------------------------------------------------------------------------

/// Durable intent store backed by sled.
#[derive(Debug, Clone)]
pub struct SledIntentStore {
    db: Db,
    intents: Tree,
}

impl SledIntentStore {
    /// Open (or create) a store at `path`.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// A store that is deleted when dropped. For tests.
    pub fn open_temporary() -> StoreResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    /// The underlying database, for opening sibling trees.
    pub fn db(&self) -> &Db {
        &self.db
    }

    fn from_db(db: Db) -> StoreResult<Self> {
        let intents = db.open_tree("intents")?;
        Ok(Self { db, intents })
    }
}

impl IntentStore for SledIntentStore {
    fn get(&self, hash: &IntentHash) -> StoreResult<Option<Intent>> {
        match self.intents.get(hash.as_bytes())? {
            Some(bytes) => {
                let intent: Intent = bincode::deserialize(&bytes)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?;
                Ok(Some(intent))
            }
            None => Ok(None),
        }
    }

    fn put(&mut self, intent: &Intent) -> StoreResult<()> {
        let bytes =
            bincode::serialize(intent).map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.intents.insert(intent.intent_hash.as_bytes(), bytes)?;
        self.db.flush()?;
        Ok(())
    }

    fn len(&self) -> usize {
        self.intents.len()
    }
}
