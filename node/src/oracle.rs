//! # Verifying Service
//!
//! Watches the ledger for `IntentDeclared` events and settles the intents
//! that pass the CRA audit. For each declared hash, once:
//!
//! 1. Load the payload the client submitted with the declaration.
//! 2. Run the audit (timestamp, amount, geography, external risk).
//! 3. Sign the hash with the service key and call `verify_intent`.
//! 4. Call `seize_assets`.
//!
//! The service holds no privileges. Its signature goes through the same
//! signer check as anyone else's, so it only settles intents whose declarer
//! is the service's own address.
//!
//! Events arrive on a broadcast channel. A periodic sweep of the ledger's
//! event log catches anything missed while the receiver lagged.

use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use ghost_contracts::{EventRecord, LedgerEvent, SettlementExecutor};
use ghost_protocol::crypto::keys::{Address, AgentKeypair};
use ghost_protocol::crypto::signatures::sign_intent_hash;
use ghost_protocol::intent::{AuditCheck, AuditPolicy, IntentHash, IntentPayload, RiskScorer};

use crate::api::Ledger;
use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Payload book
// ---------------------------------------------------------------------------

/// Payloads submitted alongside declarations, keyed by their intent hash.
#[derive(Debug, Default)]
pub struct PayloadBook {
    payloads: RwLock<HashMap<IntentHash, IntentPayload>>,
}

impl PayloadBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, intent_hash: IntentHash, payload: IntentPayload) {
        self.payloads.write().insert(intent_hash, payload);
    }

    pub fn get(&self, intent_hash: &IntentHash) -> Option<IntentPayload> {
        self.payloads.read().get(intent_hash).cloned()
    }

    /// Remove and return the payload for `intent_hash`.
    pub fn take(&self, intent_hash: &IntentHash) -> Option<IntentPayload> {
        self.payloads.write().remove(intent_hash)
    }

    pub fn len(&self) -> usize {
        self.payloads.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// What happened to a declared intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Settled { amount: u64 },
    AlreadyProcessed,
    MissingPayload,
    AuditRejected(AuditCheck),
    ExecutionFailed(String),
}

pub struct VerifyingService {
    ledger: Arc<Ledger>,
    payloads: Arc<PayloadBook>,
    keypair: AgentKeypair,
    policy: AuditPolicy,
    scorer: Arc<dyn RiskScorer>,
    metrics: SharedMetrics,
    processed: Mutex<HashSet<IntentHash>>,
}

impl VerifyingService {
    pub fn new(
        ledger: Arc<Ledger>,
        payloads: Arc<PayloadBook>,
        keypair: AgentKeypair,
        policy: AuditPolicy,
        scorer: Arc<dyn RiskScorer>,
        metrics: SharedMetrics,
    ) -> Self {
        Self {
            ledger,
            payloads,
            keypair,
            policy,
            scorer,
            metrics,
            processed: Mutex::new(HashSet::new()),
        }
    }

    pub fn address(&self) -> Address {
        self.keypair.address()
    }

    /// Audit and settle one declared intent. Each hash is handled at most once,
    /// whatever the outcome, and its payload leaves the book when it is.
    pub async fn handle_declared(&self, intent_hash: IntentHash) -> Outcome {
        if !self.processed.lock().insert(intent_hash) {
            return Outcome::AlreadyProcessed;
        }
        tracing::info!(intent_hash = %intent_hash, "new intent declared");

        let Some(payload) = self.payloads.take(&intent_hash) else {
            tracing::warn!(intent_hash = %intent_hash, "no payload retained, audit cannot run");
            self.metrics.audits_failed_total.inc();
            return Outcome::MissingPayload;
        };

        let report = self
            .policy
            .run(intent_hash, &payload, self.scorer.as_ref())
            .await;
        if let Some(check) = report.first_failure() {
            tracing::info!(intent_hash = %intent_hash, check = %check, "CRA audit failed, intent will not be verified");
            self.metrics.audits_failed_total.inc();
            return Outcome::AuditRejected(check);
        }
        self.metrics.audits_passed_total.inc();

        let signature = sign_intent_hash(&self.keypair, intent_hash.as_bytes());
        if let Err(e) = self.ledger.verify_intent(&intent_hash, signature.as_bytes()) {
            tracing::warn!(intent_hash = %intent_hash, error = %e, "verify_intent failed");
            self.metrics.record_failure("verify");
            return Outcome::ExecutionFailed(e.to_string());
        }

        match self.ledger.seize_assets(&intent_hash) {
            Ok(amount) => {
                self.metrics
                    .set_treasury_balance(self.ledger.executor().held_balance());
                tracing::info!(intent_hash = %intent_hash, amount, "intent settled");
                Outcome::Settled { amount }
            }
            Err(e) => {
                tracing::warn!(intent_hash = %intent_hash, error = %e, "seize_assets failed");
                self.metrics.record_failure("seize");
                Outcome::ExecutionFailed(e.to_string())
            }
        }
    }

    async fn on_event(&self, record: &EventRecord) {
        if let LedgerEvent::IntentDeclared { intent_hash, .. } = &record.event {
            let outcome = self.handle_declared(*intent_hash).await;
            tracing::debug!(seq = record.seq, ?outcome, "declaration handled");
        }
    }

    /// Process every logged event after `cursor`, advancing it.
    async fn sweep(&self, cursor: &mut u64) {
        for record in self.ledger.events().events_since(*cursor) {
            *cursor = record.seq;
            self.on_event(&record).await;
        }
    }

    /// Run until the event channel closes.
    pub async fn run(self: Arc<Self>, mut events: broadcast::Receiver<EventRecord>, poll_interval: Duration) {
        tracing::info!(
            oracle = %self.address(),
            poll_secs = poll_interval.as_secs(),
            "verifying service started"
        );
        let mut cursor = 0u64;
        let mut ticker = tokio::time::interval(poll_interval);

        loop {
            tokio::select! {
                received = events.recv() => match received {
                    Ok(record) => self.on_event(&record).await,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("verifying service lagged by {} events, sweeping", n);
                        self.sweep(&mut cursor).await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = ticker.tick() => self.sweep(&mut cursor).await,
            }
        }
        tracing::info!("verifying service stopped");
    }
}
