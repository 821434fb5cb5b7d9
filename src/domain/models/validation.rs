//! Validation gate records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::context::{ContextKey, ServiceType};

/// Which weight regime produced a performance sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightRegime {
    Learned,
    Default,
}

/// Lifecycle of the validation gate for one context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    /// Not enough samples to run the statistical test.
    Insufficient,
    /// Enough data, not (or no longer) validated.
    PendingValidation,
    /// Learned weights may be applied.
    Validated,
}

impl ValidationStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Insufficient => "insufficient",
            Self::PendingValidation => "pending_validation",
            Self::Validated => "validated",
        }
    }
}

/// Accuracy comparison captured by the last validation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationPerformance {
    /// Mean accuracy under learned weights.
    pub accuracy: f64,
    /// Mean accuracy under default weights.
    pub baseline: f64,
    pub improvement: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
}

/// Persisted validation state for one context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRecord {
    pub tenant_id: String,
    pub context_key: ContextKey,
    pub service_type: ServiceType,
    #[serde(default)]
    pub examples_at_last_validation: u64,
    #[serde(default)]
    pub validated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub validated: bool,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub performance: ValidationPerformance,
    #[serde(default)]
    pub learned_samples: Vec<f64>,
    #[serde(default)]
    pub default_samples: Vec<f64>,
    #[serde(default)]
    pub invalidated_reason: Option<String>,
    /// Bumped by every invalidation; a validation run only applies to the
    /// generation it read.
    #[serde(default)]
    pub generation: u64,
}

impl ValidationRecord {
    pub fn new(tenant_id: impl Into<String>, context_key: ContextKey, service_type: ServiceType) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            context_key,
            service_type,
            examples_at_last_validation: 0,
            validated_at: None,
            validated: false,
            confidence: 0.0,
            performance: ValidationPerformance::default(),
            learned_samples: Vec::new(),
            default_samples: Vec::new(),
            invalidated_reason: None,
            generation: 0,
        }
    }

    /// Close the gate and discard the evidence behind the last decision.
    ///
    /// `examples` is the learning record's count after the rollback, so the
    /// example trigger measures only outcomes learned from here on.
    pub fn invalidate(&mut self, reason: &str, examples: u64) {
        self.validated = false;
        self.confidence = 0.0;
        self.learned_samples.clear();
        self.default_samples.clear();
        self.examples_at_last_validation = examples;
        self.invalidated_reason = Some(reason.to_string());
        self.generation = self.generation.saturating_add(1);
    }

    /// Append a sample, keeping at most `max_samples` of the newest.
    pub fn push_sample(&mut self, regime: WeightRegime, accuracy: f64, max_samples: usize) {
        let window = match regime {
            WeightRegime::Learned => &mut self.learned_samples,
            WeightRegime::Default => &mut self.default_samples,
        };
        window.push(accuracy);
        if window.len() > max_samples {
            let excess = window.len() - max_samples;
            window.drain(..excess);
        }
    }

    pub fn status(&self, min_samples: usize) -> ValidationStatus {
        if self.validated {
            ValidationStatus::Validated
        } else if self.learned_samples.len() < min_samples || self.default_samples.len() < min_samples {
            ValidationStatus::Insufficient
        } else {
            ValidationStatus::PendingValidation
        }
    }
}

/// Answer from `should_validate`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationCheck {
    pub should_validate: bool,
    pub reason: String,
}

impl ValidationCheck {
    pub fn no(reason: impl Into<String>) -> Self {
        Self {
            should_validate: false,
            reason: reason.into(),
        }
    }

    pub fn yes(reason: impl Into<String>) -> Self {
        Self {
            should_validate: true,
            reason: reason.into(),
        }
    }
}

/// Bootstrap estimate of the learned-minus-default mean accuracy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BootstrapSummary {
    pub mean_difference: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    /// Fraction of resamples in which learned beat default.
    pub probability_improved: f64,
    pub iterations: usize,
}

/// Result of a validation run.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationOutcome {
    pub validated: bool,
    pub confidence: f64,
    pub performance: ValidationPerformance,
    pub status: ValidationStatus,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_window_is_bounded() {
        let mut record = ValidationRecord::new("t", ContextKey::new(), ServiceType::Forecast);
        for i in 0..10 {
            record.push_sample(WeightRegime::Learned, f64::from(i), 4);
        }
        assert_eq!(record.learned_samples, vec![6.0, 7.0, 8.0, 9.0]);
        assert!(record.default_samples.is_empty());
    }

    #[test]
    fn test_status_transitions() {
        let mut record = ValidationRecord::new("t", ContextKey::new(), ServiceType::Risk);
        assert_eq!(record.status(2), ValidationStatus::Insufficient);

        for _ in 0..2 {
            record.push_sample(WeightRegime::Learned, 0.9, 10);
            record.push_sample(WeightRegime::Default, 0.8, 10);
        }
        assert_eq!(record.status(2), ValidationStatus::PendingValidation);

        record.validated = true;
        assert_eq!(record.status(2), ValidationStatus::Validated);
    }
}
