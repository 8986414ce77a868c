//! # Prometheus Metrics
//!
//! Operational metrics for the node, scraped at `/metrics` on the metrics
//! port. All metrics live in a dedicated [`prometheus::Registry`] under the
//! `ghost` namespace.
//!
//! Lifecycle counters are driven by the ledger's own events (see the
//! [`EventSink`] impl below), so intents settled by the verifying service
//! and through the API are counted the same way.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

use ghost_contracts::{EventRecord, EventSink, LedgerEvent};

/// Holds all Prometheus metric handles for the node.
#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    /// Intents that reached `Declared`.
    pub intents_declared_total: IntCounter,
    /// Intents that reached `Verified`.
    pub intents_verified_total: IntCounter,
    /// Intents that reached `Seized`.
    pub assets_seized_total: IntCounter,
    /// Sum of all amounts moved by seizures.
    pub seized_amount_total: IntCounter,
    /// Rejected ledger calls, by operation.
    pub failed_operations_total: IntCounterVec,
    /// Current held balance of the treasury.
    pub treasury_balance: IntGauge,
    pub audits_passed_total: IntCounter,
    pub audits_failed_total: IntCounter,
    /// Latency of ledger operations in seconds.
    pub operation_latency_seconds: Histogram,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("ghost".into()), None)?;

        let intents_declared_total =
            IntCounter::new("intents_declared_total", "Total number of intents declared")?;
        registry.register(Box::new(intents_declared_total.clone()))?;

        let intents_verified_total =
            IntCounter::new("intents_verified_total", "Total number of intents verified")?;
        registry.register(Box::new(intents_verified_total.clone()))?;

        let assets_seized_total = IntCounter::new(
            "assets_seized_total",
            "Total number of intents settled by seizure",
        )?;
        registry.register(Box::new(assets_seized_total.clone()))?;

        let seized_amount_total = IntCounter::new(
            "seized_amount_total",
            "Total base units moved to declarers by seizures",
        )?;
        registry.register(Box::new(seized_amount_total.clone()))?;

        let failed_operations_total = IntCounterVec::new(
            Opts::new(
                "failed_operations_total",
                "Total number of rejected ledger operations",
            ),
            &["operation"],
        )?;
        registry.register(Box::new(failed_operations_total.clone()))?;

        let treasury_balance =
            IntGauge::new("treasury_balance", "Current held balance of the treasury")?;
        registry.register(Box::new(treasury_balance.clone()))?;

        let audits_passed_total =
            IntCounter::new("audits_passed_total", "Intents approved by the CRA audit")?;
        registry.register(Box::new(audits_passed_total.clone()))?;

        let audits_failed_total =
            IntCounter::new("audits_failed_total", "Intents rejected by the CRA audit")?;
        registry.register(Box::new(audits_failed_total.clone()))?;

        let operation_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "operation_latency_seconds",
                "Ledger operation latency in seconds",
            )
            .buckets(vec![
                0.0001, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
            ]),
        )?;
        registry.register(Box::new(operation_latency_seconds.clone()))?;

        Ok(Self {
            registry,
            intents_declared_total,
            intents_verified_total,
            assets_seized_total,
            seized_amount_total,
            failed_operations_total,
            treasury_balance,
            audits_passed_total,
            audits_failed_total,
            operation_latency_seconds,
        })
    }

    pub fn record_failure(&self, operation: &str) {
        self.failed_operations_total
            .with_label_values(&[operation])
            .inc();
    }

    pub fn set_treasury_balance(&self, held: u64) {
        self.treasury_balance
            .set(i64::try_from(held).unwrap_or(i64::MAX));
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl EventSink for NodeMetrics {
    fn publish(&self, record: &EventRecord) {
        match &record.event {
            LedgerEvent::IntentDeclared { .. } => self.intents_declared_total.inc(),
            LedgerEvent::IntentVerified { .. } => self.intents_verified_total.inc(),
            LedgerEvent::AssetsSeized { amount, .. } => {
                self.assets_seized_total.inc();
                self.seized_amount_total.inc_by(*amount);
            }
        }
    }
}

/// Shared metrics state passed to axum handlers.
pub type SharedMetrics = Arc<NodeMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ghost_protocol::intent::IntentHash;

    fn record(event: LedgerEvent) -> EventRecord {
        EventRecord {
            seq: 1,
            emitted_at: Utc::now(),
            event,
        }
    }

    #[test]
    fn events_drive_counters() {
        let metrics = NodeMetrics::new().unwrap();
        let intent_hash = IntentHash::from_bytes([1; 32]);
        metrics.publish(&record(LedgerEvent::IntentVerified { intent_hash }));
        metrics.publish(&record(LedgerEvent::AssetsSeized {
            intent_hash,
            amount: 12,
        }));

        assert_eq!(metrics.intents_verified_total.get(), 1);
        assert_eq!(metrics.assets_seized_total.get(), 1);
        assert_eq!(metrics.seized_amount_total.get(), 12);
    }

    #[test]
    fn encodes_with_namespace() {
        let metrics = NodeMetrics::new().unwrap();
        metrics.record_failure("verify");
        metrics.set_treasury_balance(5);
        let text = metrics.encode().unwrap();
        assert!(text.contains("ghost_failed_operations_total{operation=\"verify\"} 1"));
        assert!(text.contains("ghost_treasury_balance 5"));
    }
}
