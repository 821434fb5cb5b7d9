//! Weight learning records and the weights served to scoring services.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::context::{ContextKey, ServiceType};

/// Component name -> weight.
pub type ComponentWeights = BTreeMap<String, f64>;

/// Beta-like accumulators for one ensemble component.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentBandit {
    /// Sum of observed outcomes in [0, 1].
    pub success_weight: f64,
    /// Number of observed outcomes.
    pub total_weight: f64,
}

impl ComponentBandit {
    /// Fold one outcome into the accumulators.
    pub fn observe(&mut self, outcome: f64) {
        self.success_weight += outcome;
        self.total_weight += 1.0;
    }

    /// Posterior mean under a uniform Beta(1, 1) prior.
    ///
    /// Always strictly inside (0, 1), so a learned weight never reaches 1.0.
    pub fn mean(&self) -> f64 {
        (self.success_weight + 1.0) / (self.total_weight + 2.0)
    }

    pub fn has_observations(&self) -> bool {
        self.total_weight > 0.0
    }
}

/// Point-in-time copy of learned state, used for promotion and rollback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightSnapshot {
    pub components: BTreeMap<String, ComponentBandit>,
    pub examples: u64,
    pub captured_at: DateTime<Utc>,
}

/// Persisted learning state for one (tenant, context, service) triple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightLearningRecord {
    pub tenant_id: String,
    pub context_key: ContextKey,
    pub service_type: ServiceType,
    #[serde(default)]
    pub components: BTreeMap<String, ComponentBandit>,
    pub default_weights: ComponentWeights,
    #[serde(default)]
    pub examples: u64,
    /// Snapshot restored by rollback.
    #[serde(default)]
    pub previous_version: Option<WeightSnapshot>,
    /// Snapshot taken at the most recent promotion.
    #[serde(default)]
    pub promoted_version: Option<WeightSnapshot>,
    #[serde(default)]
    pub rolled_back_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub rollback_reason: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl WeightLearningRecord {
    pub fn new(
        tenant_id: impl Into<String>,
        context_key: ContextKey,
        service_type: ServiceType,
        default_weights: ComponentWeights,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            context_key,
            service_type,
            components: BTreeMap::new(),
            default_weights,
            examples: 0,
            previous_version: None,
            promoted_version: None,
            rolled_back_at: None,
            rollback_reason: None,
            updated_at: now,
        }
    }

    /// Record one outcome for `component`.
    pub fn learn(&mut self, component: &str, outcome: f64, now: DateTime<Utc>) {
        self.components
            .entry(component.to_string())
            .or_default()
            .observe(outcome);
        self.examples += 1;
        self.updated_at = now;
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> WeightSnapshot {
        WeightSnapshot {
            components: self.components.clone(),
            examples: self.examples,
            captured_at: now,
        }
    }

    /// Learned mean per component that has at least one observation.
    pub fn learned_weights(&self) -> ComponentWeights {
        self.components
            .iter()
            .filter(|(_, bandit)| bandit.has_observations())
            .map(|(name, bandit)| (name.clone(), bandit.mean()))
            .collect()
    }
}

/// Learning-curve stage, determined by the accumulated example count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearningStage {
    /// Pure defaults.
    Bootstrap,
    Initial,
    Transition,
    /// Dominated by the learned estimate.
    Mature,
}

impl LearningStage {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Bootstrap => "bootstrap",
            Self::Initial => "initial",
            Self::Transition => "transition",
            Self::Mature => "mature",
        }
    }
}

/// Where a served weight set came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightSource {
    /// Static defaults: no record, bootstrap stage, or gated off.
    Default,
    /// Defaults blended with learned estimates.
    Blended,
    /// Defaults returned because a backing service failed.
    Fallback,
}

/// Weights served to a scoring service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Weights {
    pub values: ComponentWeights,
    pub stage: LearningStage,
    pub blend_ratio: f64,
    pub examples: u64,
    pub source: WeightSource,
}

impl Weights {
    pub fn defaults(values: ComponentWeights, source: WeightSource) -> Self {
        Self {
            values,
            stage: LearningStage::Bootstrap,
            blend_ratio: 0.0,
            examples: 0,
            source,
        }
    }

    pub fn get(&self, component: &str) -> Option<f64> {
        self.values.get(component).copied()
    }
}

/// Result of a best-effort `learn_from_outcome` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LearnReport {
    /// Whether the outcome was persisted.
    pub recorded: bool,
    /// Example count after the update, when recorded.
    pub examples: Option<u64>,
    /// Write attempts made.
    pub attempts: u32,
}

/// A prediction awaiting its realized outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingPrediction {
    pub id: Uuid,
    pub tenant_id: String,
    pub context_key: ContextKey,
    pub service_type: ServiceType,
    pub components: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub outcome: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bandit_prior_mean() {
        let bandit = ComponentBandit::default();
        assert!((bandit.mean() - 0.5).abs() < f64::EPSILON);
        assert!(!bandit.has_observations());
    }

    #[test]
    fn test_bandit_mean_stays_below_one() {
        let mut bandit = ComponentBandit::default();
        for _ in 0..10_000 {
            bandit.observe(1.0);
        }
        assert!(bandit.mean() < 1.0);
        assert!(bandit.mean() > 0.999);
    }

    #[test]
    fn test_record_learn_increments_examples() {
        let now = Utc::now();
        let mut record = WeightLearningRecord::new(
            "tenant-1",
            ContextKey::new(),
            ServiceType::Risk,
            ComponentWeights::new(),
            now,
        );
        record.learn("ml", 0.9, now);
        record.learn("ml", 0.7, now);
        record.learn("rules", 1.0, now);

        assert_eq!(record.examples, 3);
        assert!((record.components["ml"].success_weight - 1.6).abs() < 1e-9);
        assert_eq!(record.learned_weights().len(), 2);
    }
}
