//! Trust scores and uncertainty-based routing decisions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Trust scores start here before any evidence arrives.
pub const NEUTRAL_TRUST: f64 = 0.5;

/// Trust in one component.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComponentTrust {
    /// In [0, 1].
    pub trust_score: f64,
    /// In [0, 1); grows with the number of samples.
    pub confidence: f64,
    #[serde(default)]
    pub samples: u64,
}

impl Default for ComponentTrust {
    fn default() -> Self {
        Self {
            trust_score: NEUTRAL_TRUST,
            confidence: 0.0,
            samples: 0,
        }
    }
}

/// Per-component trust snapshot for a (tenant, service, context).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustScoreRecord {
    pub components: BTreeMap<String, ComponentTrust>,
    pub overall_trust: f64,
    pub updated_at: DateTime<Utc>,
}

impl TrustScoreRecord {
    /// Neutral trust for every listed component.
    pub fn neutral<I, S>(components: I, now: DateTime<Utc>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let components = components
            .into_iter()
            .map(|name| (name.into(), ComponentTrust::default()))
            .collect();
        let mut record = Self {
            components,
            overall_trust: NEUTRAL_TRUST,
            updated_at: now,
        };
        record.recompute_overall();
        record
    }

    /// Confidence-weighted mean trust, plain mean when no confidence exists yet.
    pub fn recompute_overall(&mut self) {
        if self.components.is_empty() {
            self.overall_trust = NEUTRAL_TRUST;
            return;
        }
        let total_confidence: f64 = self.components.values().map(|c| c.confidence).sum();
        self.overall_trust = if total_confidence > 0.0 {
            self.components
                .values()
                .map(|c| c.trust_score * c.confidence)
                .sum::<f64>()
                / total_confidence
        } else {
            self.components.values().map(|c| c.trust_score).sum::<f64>()
                / self.components.len() as f64
        };
    }

    /// Components ordered by descending trust, ties broken by name.
    pub fn ranked(&self) -> Vec<(String, f64)> {
        let mut ranked: Vec<(String, f64)> = self
            .components
            .iter()
            .map(|(name, trust)| (name.clone(), trust.trust_score))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked
    }
}

/// One realized outcome used to update trust.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustOutcome {
    pub component: String,
    pub prediction: f64,
    pub actual_outcome: f64,
    /// In [0, 1]; caps the trust the sample can contribute.
    pub uncertainty: f64,
}

impl TrustOutcome {
    pub fn new(component: impl Into<String>, prediction: f64, actual_outcome: f64, uncertainty: f64) -> Self {
        Self {
            component: component.into(),
            prediction,
            actual_outcome,
            uncertainty,
        }
    }
}

/// Where a scoring request should be routed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub use_ensemble: bool,
    pub components: Vec<String>,
    pub primary_component: Option<String>,
    pub reason: String,
}
