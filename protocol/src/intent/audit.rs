//! # CRA: Containment Reflexion Audit
//!
//! The checks the verifying service runs on a payload before it agrees to
//! sign. The ledger never calls any of this: it trusts the signature, not the
//! reasoning behind it. The audit lives in the protocol crate so that the
//! node's verifying service and any external re-implementation can share one
//! definition.
//!
//! Four checks, all evaluated, all must pass:
//!
//! | Check        | Passes when                                         |
//! |--------------|-----------------------------------------------------|
//! | Timestamp    | payload is at most `time_window` old                |
//! | Amount       | `amount_wei <= max_amount_wei`                      |
//! | Geography    | normalized country is in `allowed_countries`        |
//! | ExternalRisk | scorer returns a score `< max_risk_score`           |
//!
//! A scorer *error* fails the risk check. No scorer configured means the
//! check is skipped (and therefore passes).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use super::payload::IntentPayload;
use super::IntentHash;
use crate::config;

// ---------------------------------------------------------------------------
// Risk scoring
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum RiskError {
    #[error("risk service unavailable: {0}")]
    Unavailable(String),

    #[error("risk service returned an invalid response: {0}")]
    InvalidResponse(String),
}

/// An external risk service. Scores are 0..=100, higher is riskier.
#[async_trait]
pub trait RiskScorer: Send + Sync {
    async fn score(&self, intent_hash: &IntentHash, payload: &IntentPayload)
        -> Result<u32, RiskError>;
}

/// Stand-in used when no risk service is configured. Always scores 0.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRiskScorer;

#[async_trait]
impl RiskScorer for NoRiskScorer {
    async fn score(&self, _: &IntentHash, _: &IntentPayload) -> Result<u32, RiskError> {
        Ok(0)
    }
}

// ---------------------------------------------------------------------------
// Policy & report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditCheck {
    Timestamp,
    Amount,
    Geography,
    ExternalRisk,
}

impl fmt::Display for AuditCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditCheck::Timestamp => write!(f, "timestamp"),
            AuditCheck::Amount => write!(f, "amount"),
            AuditCheck::Geography => write!(f, "geography"),
            AuditCheck::ExternalRisk => write!(f, "externalRisk"),
        }
    }
}

/// Thresholds for the four checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditPolicy {
    /// Upper-case ISO country codes.
    pub allowed_countries: BTreeSet<String>,
    pub max_amount_wei: u64,
    pub time_window: Duration,
    /// Scores at or above this fail.
    pub max_risk_score: u32,
}

impl Default for AuditPolicy {
    fn default() -> Self {
        Self {
            allowed_countries: config::DEFAULT_ALLOWED_COUNTRIES
                .iter()
                .map(|c| c.to_string())
                .collect(),
            max_amount_wei: config::DEFAULT_MAX_AMOUNT_WEI,
            time_window: config::DEFAULT_AUDIT_TIME_WINDOW,
            max_risk_score: config::DEFAULT_MAX_RISK_SCORE,
        }
    }
}

/// Outcome of every check, in evaluation order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditReport {
    pub intent_hash: IntentHash,
    pub results: Vec<(AuditCheck, bool)>,
}

impl AuditReport {
    pub fn passed(&self) -> bool {
        self.results.iter().all(|(_, ok)| *ok)
    }

    /// The first failing check, if any.
    pub fn first_failure(&self) -> Option<AuditCheck> {
        self.results
            .iter()
            .find(|(_, ok)| !*ok)
            .map(|(check, _)| *check)
    }
}

impl AuditPolicy {
    pub fn check_timestamp(&self, payload: &IntentPayload, now: DateTime<Utc>) -> bool {
        let age_secs = now.timestamp().saturating_sub(payload.timestamp);
        // Future-dated payloads have negative age and pass.
        age_secs <= i64::try_from(self.time_window.as_secs()).unwrap_or(i64::MAX)
    }

    pub fn check_amount(&self, payload: &IntentPayload) -> bool {
        payload.amount_wei <= self.max_amount_wei
    }

    pub fn check_geography(&self, payload: &IntentPayload) -> bool {
        self.allowed_countries
            .contains(&payload.normalized_country())
    }

    pub fn check_risk(&self, score: &Result<u32, RiskError>) -> bool {
        match score {
            Ok(score) => *score < self.max_risk_score,
            Err(e) => {
                tracing::warn!(error = %e, "external risk check failed");
                false
            }
        }
    }

    /// Evaluate all checks given an already-obtained risk score.
    pub fn evaluate(
        &self,
        intent_hash: IntentHash,
        payload: &IntentPayload,
        now: DateTime<Utc>,
        risk: Result<u32, RiskError>,
    ) -> AuditReport {
        let results = vec![
            (AuditCheck::Timestamp, self.check_timestamp(payload, now)),
            (AuditCheck::Amount, self.check_amount(payload)),
            (AuditCheck::Geography, self.check_geography(payload)),
            (AuditCheck::ExternalRisk, self.check_risk(&risk)),
        ];

        for (check, ok) in &results {
            tracing::debug!(intent = %intent_hash, check = %check, passed = ok, "CRA check");
        }

        AuditReport {
            intent_hash,
            results,
        }
    }

    /// Query the scorer and evaluate all checks against the current time.
    pub async fn run(
        &self,
        intent_hash: IntentHash,
        payload: &IntentPayload,
        scorer: &dyn RiskScorer,
    ) -> AuditReport {
        let risk = scorer.score(&intent_hash, payload).await;
        self.evaluate(intent_hash, payload, Utc::now(), risk)
    }
}
