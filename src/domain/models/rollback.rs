//! Inputs and results of the rollback safety controls.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::context::{ContextKey, ServiceType};
use super::weights::ComponentWeights;

/// Production signals watched by the rollback controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackMetrics {
    pub tenant_id: String,
    pub context_key: ContextKey,
    pub service_type: ServiceType,
    #[serde(default)]
    pub user_issues: u32,
    #[serde(default)]
    pub recent_predictions: u32,
    #[serde(default)]
    pub recent_failures: u32,
    /// Newest accuracy observations, bounded.
    #[serde(default)]
    pub recent_accuracy: Vec<f64>,
    pub window_started_at: DateTime<Utc>,
}

impl RollbackMetrics {
    pub fn new(
        tenant_id: impl Into<String>,
        context_key: ContextKey,
        service_type: ServiceType,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            context_key,
            service_type,
            user_issues: 0,
            recent_predictions: 0,
            recent_failures: 0,
            recent_accuracy: Vec::new(),
            window_started_at: now,
        }
    }

    pub fn failure_rate(&self) -> f64 {
        if self.recent_predictions == 0 {
            0.0
        } else {
            f64::from(self.recent_failures) / f64::from(self.recent_predictions)
        }
    }

    pub fn record_result(&mut self, success: bool, accuracy: Option<f64>, max_window: usize) {
        self.recent_predictions = self.recent_predictions.saturating_add(1);
        if !success {
            self.recent_failures = self.recent_failures.saturating_add(1);
        }
        if let Some(accuracy) = accuracy {
            self.recent_accuracy.push(accuracy);
            if self.recent_accuracy.len() > max_window {
                let excess = self.recent_accuracy.len() - max_window;
                self.recent_accuracy.drain(..excess);
            }
        }
    }

    /// Start a fresh observation window.
    pub fn reset(&mut self, now: DateTime<Utc>) {
        self.user_issues = 0;
        self.recent_predictions = 0;
        self.recent_failures = 0;
        self.recent_accuracy.clear();
        self.window_started_at = now;
    }
}

/// Answer from `should_rollback`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollbackDecision {
    pub should_rollback: bool,
    pub reason: String,
}

impl RollbackDecision {
    pub fn keep(reason: impl Into<String>) -> Self {
        Self {
            should_rollback: false,
            reason: reason.into(),
        }
    }

    pub fn trigger(reason: impl Into<String>) -> Self {
        Self {
            should_rollback: true,
            reason: reason.into(),
        }
    }
}

/// What a rollback restored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestoredFrom {
    PreviousVersion,
    Defaults,
    /// No learning record existed; only the gate was reset.
    NothingToRestore,
}

impl RestoredFrom {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::PreviousVersion => "previous_version",
            Self::Defaults => "defaults",
            Self::NothingToRestore => "nothing_to_restore",
        }
    }
}

/// Result of `execute_rollback`.
#[derive(Debug, Clone, PartialEq)]
pub struct RollbackOutcome {
    pub restored_from: RestoredFrom,
    /// Weights the context will serve after the rollback.
    pub weights: ComponentWeights,
    pub reason: String,
    pub rolled_back_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_rate_without_predictions() {
        let metrics = RollbackMetrics::new("t", ContextKey::new(), ServiceType::Risk, Utc::now());
        assert!(metrics.failure_rate().abs() < f64::EPSILON);
    }

    #[test]
    fn test_record_and_reset() {
        let mut metrics = RollbackMetrics::new("t", ContextKey::new(), ServiceType::Risk, Utc::now());
        metrics.record_result(false, Some(0.2), 2);
        metrics.record_result(true, Some(0.9), 2);
        metrics.record_result(true, Some(0.8), 2);
        metrics.user_issues = 4;

        assert_eq!(metrics.recent_predictions, 3);
        assert_eq!(metrics.recent_failures, 1);
        assert_eq!(metrics.recent_accuracy, vec![0.9, 0.8]);

        metrics.reset(Utc::now());
        assert_eq!(metrics.user_issues, 0);
        assert_eq!(metrics.recent_predictions, 0);
        assert!(metrics.recent_accuracy.is_empty());
    }
}
