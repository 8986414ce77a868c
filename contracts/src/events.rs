//! # Ledger Events
//!
//! Notifications the ledger publishes after a successful state change.
//! Observers (the verifying service, the WebSocket feed, tests) read them
//! either from the in-memory log or from a registered [`EventSink`].
//!
//! Events are published only after the record change they describe has been
//! committed, and failed operations publish nothing.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use ghost_protocol::crypto::keys::Address;
use ghost_protocol::intent::IntentHash;

/// Lifecycle notifications, one per successful transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    IntentDeclared {
        intent_hash: IntentHash,
        declarer: Address,
    },
    IntentVerified { intent_hash: IntentHash },
    AssetsSeized { intent_hash: IntentHash, amount: u64 },
}

impl LedgerEvent {
    pub fn intent_hash(&self) -> &IntentHash {
        match self {
            LedgerEvent::IntentDeclared { intent_hash, .. }
            | LedgerEvent::IntentVerified { intent_hash }
            | LedgerEvent::AssetsSeized { intent_hash, .. } => intent_hash,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LedgerEvent::IntentDeclared { .. } => "IntentDeclared",
            LedgerEvent::IntentVerified { .. } => "IntentVerified",
            LedgerEvent::AssetsSeized { .. } => "AssetsSeized",
        }
    }
}

/// A published event with its position in the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Monotonic, starting at 1.
    pub seq: u64,
    pub emitted_at: DateTime<Utc>,
    pub event: LedgerEvent,
}

/// Receives every event as it is published.
///
/// Sinks are called while the emitter's log lock is held, so they must not
/// call back into the ledger.
pub trait EventSink: Send + Sync {
    fn publish(&self, record: &EventRecord);
}

#[derive(Default)]
struct EventLog {
    next_seq: u64,
    records: Vec<EventRecord>,
}

/// Append-only event log with fan-out to sinks.
#[derive(Default)]
pub struct EventEmitter {
    log: Mutex<EventLog>,
    sinks: RwLock<Vec<Arc<dyn EventSink>>>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, sink: Arc<dyn EventSink>) {
        self.sinks.write().push(sink);
    }

    pub fn emit(&self, event: LedgerEvent) -> EventRecord {
        let mut log = self.log.lock();
        log.next_seq += 1;
        let record = EventRecord {
            seq: log.next_seq,
            emitted_at: Utc::now(),
            event,
        };
        log.records.push(record.clone());

        tracing::debug!(
            seq = record.seq,
            event = record.event.name(),
            intent_hash = %record.event.intent_hash(),
            "ledger event"
        );

        for sink in self.sinks.read().iter() {
            sink.publish(&record);
        }
        record
    }

    /// Records with `seq > since`, oldest first.
    pub fn events_since(&self, since: u64) -> Vec<EventRecord> {
        let log = self.log.lock();
        // seq n lives at index n - 1
        let start = usize::try_from(since).unwrap_or(usize::MAX).min(log.records.len());
        log.records[start..].to_vec()
    }

    pub fn all(&self) -> Vec<EventRecord> {
        self.events_since(0)
    }

    pub fn len(&self) -> usize {
        self.log.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn last_seq(&self) -> u64 {
        self.log.lock().next_seq
    }
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("events", &self.len())
            .field("sinks", &self.sinks.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Collect(Mutex<Vec<u64>>);

    impl EventSink for Collect {
        fn publish(&self, record: &EventRecord) {
            self.0.lock().push(record.seq);
        }
    }

    fn verified(byte: u8) -> LedgerEvent {
        LedgerEvent::IntentVerified {
            intent_hash: IntentHash::from_bytes([byte; 32]),
        }
    }

    #[test]
    fn sequence_numbers_start_at_one() {
        let emitter = EventEmitter::new();
        assert_eq!(emitter.emit(verified(1)).seq, 1);
        assert_eq!(emitter.emit(verified(2)).seq, 2);
        assert_eq!(emitter.last_seq(), 2);
    }

    #[test]
    fn events_since_skips_seen() {
        let emitter = EventEmitter::new();
        for b in 1..=3 {
            emitter.emit(verified(b));
        }
        let tail = emitter.events_since(1);
        assert_eq!(tail.iter().map(|r| r.seq).collect::<Vec<_>>(), vec![2, 3]);
        assert!(emitter.events_since(3).is_empty());
        assert!(emitter.events_since(99).is_empty());
        assert_eq!(emitter.all().len(), 3);
    }

    #[test]
    fn sinks_see_every_event() {
        let emitter = EventEmitter::new();
        let sink = Arc::new(Collect(Mutex::new(Vec::new())));
        emitter.subscribe(sink.clone());
        emitter.emit(verified(1));
        emitter.emit(verified(2));
        assert_eq!(*sink.0.lock(), vec![1, 2]);
    }

    #[test]
    fn serializes_with_type_tag() {
        let event = LedgerEvent::AssetsSeized {
            intent_hash: IntentHash::from_bytes([0xab; 32]),
            amount: 7,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "assets_seized");
        assert_eq!(json["amount"], 7);
        assert!(json["intent_hash"].as_str().unwrap().starts_with("0xabab"));
    }
}
