//! Automatic rollback of learned weights.
//!
//! Three triggers are checked in priority order: statistical degradation of
//! recent accuracy against the validated baseline, user-reported issues, and
//! the recent failure rate. A rollback restores the previous promoted
//! snapshot (or defaults), closes the validation gate and starts a fresh
//! observation window.

use std::sync::Arc;
use tracing::{instrument, warn};

use crate::domain::errors::{LearningError, LearningResult};
use crate::domain::models::{
    ContextKey, RetryConfig, RollbackConfig, RollbackDecision, RollbackMetrics, RollbackOutcome, ServiceType,
    ValidationRecord,
};
use crate::domain::ports::{Clock, DocumentStore, SystemClock, Telemetry};
use crate::services::bootstrap::mean;
use crate::services::diagnostics::{context_props, Diagnostics};
use crate::services::documents;
use crate::services::keys;
use crate::services::validator::Validator;
use crate::services::weight_learner::WeightLearner;

/// Decides whether recent accuracy has degraded.
///
/// Returns a reason when it has.
pub trait DegradationDetector: Send + Sync {
    fn detect(&self, metrics: &RollbackMetrics, validation: Option<&ValidationRecord>) -> Option<String>;
}

/// One-sided z test of the recent accuracy window against the accuracy the
/// learned weights showed when they were validated.
#[derive(Debug, Clone, Copy)]
pub struct ZTestDegradation {
    pub min_samples: usize,
    pub min_accuracy_drop: f64,
    pub z_threshold: f64,
}

impl ZTestDegradation {
    pub fn from_config(config: &RollbackConfig) -> Self {
        Self {
            min_samples: config.min_degradation_samples,
            min_accuracy_drop: config.min_accuracy_drop,
            z_threshold: config.degradation_z,
        }
    }
}

impl DegradationDetector for ZTestDegradation {
    fn detect(&self, metrics: &RollbackMetrics, validation: Option<&ValidationRecord>) -> Option<String> {
        let validation = validation.filter(|v| v.validated_at.is_some() && v.performance.accuracy > 0.0)?;
        let samples = &metrics.recent_accuracy;
        if samples.len() < self.min_samples.max(2) {
            return None;
        }

        let baseline = validation.performance.accuracy;
        let recent = mean(samples);
        let drop = baseline - recent;
        if drop < self.min_accuracy_drop {
            return None;
        }

        let n = samples.len() as f64;
        let variance = samples.iter().map(|s| (s - recent).powi(2)).sum::<f64>() / (n - 1.0);
        let standard_error = (variance / n).sqrt();
        let z = if standard_error > f64::EPSILON {
            drop / standard_error
        } else {
            f64::INFINITY
        };

        (z >= self.z_threshold).then(|| {
            format!("statistical degradation: recent accuracy {recent:.3} vs baseline {baseline:.3} (z = {z:.2})")
        })
    }
}

pub struct RollbackController {
    store: Arc<dyn DocumentStore>,
    learner: Arc<WeightLearner>,
    validator: Arc<Validator>,
    config: RollbackConfig,
    retry: RetryConfig,
    detector: Arc<dyn DegradationDetector>,
    clock: Arc<dyn Clock>,
    diagnostics: Diagnostics,
}

impl RollbackController {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        learner: Arc<WeightLearner>,
        validator: Arc<Validator>,
        config: RollbackConfig,
    ) -> Self {
        let detector = Arc::new(ZTestDegradation::from_config(&config));
        Self {
            store,
            learner,
            validator,
            config,
            retry: RetryConfig::default(),
            detector,
            clock: Arc::new(SystemClock),
            diagnostics: Diagnostics::default(),
        }
    }

    pub fn with_detector(mut self, detector: Arc<dyn DegradationDetector>) -> Self {
        self.detector = detector;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn Telemetry>) -> Self {
        self.diagnostics = Diagnostics::new(Some(telemetry));
        self
    }

    pub async fn get_metrics(
        &self,
        tenant_id: &str,
        context_key: &ContextKey,
        service_type: ServiceType,
    ) -> LearningResult<Option<RollbackMetrics>> {
        let id = keys::rollback_doc(service_type, context_key);
        Ok(documents::load(self.store.as_ref(), tenant_id, &id)
            .await?
            .map(|loaded| loaded.value))
    }

    /// Whether the context should be rolled back now. Never fails.
    pub async fn should_rollback(
        &self,
        tenant_id: &str,
        context_key: &ContextKey,
        service_type: ServiceType,
    ) -> RollbackDecision {
        let props = || context_props(tenant_id, service_type, context_key);

        let metrics = match self.get_metrics(tenant_id, context_key, service_type).await {
            Ok(Some(metrics)) => metrics,
            Ok(None) => return RollbackDecision::keep("no production metrics recorded"),
            Err(err) => {
                self.diagnostics.failure("should_rollback", &err, props());
                return RollbackDecision::keep(format!("rollback metrics unavailable: {err}"));
            }
        };

        let validation = match self.validator.get_record(tenant_id, context_key, service_type).await {
            Ok(record) => record,
            Err(err) => {
                self.diagnostics.failure("should_rollback.validation_read", &err, props());
                None
            }
        };

        if let Some(reason) = self.detector.detect(&metrics, validation.as_ref()) {
            return RollbackDecision::trigger(reason);
        }

        if metrics.user_issues >= self.config.user_issue_threshold {
            return RollbackDecision::trigger(format!(
                "user issues reported: {} (threshold {})",
                metrics.user_issues, self.config.user_issue_threshold
            ));
        }

        let failure_rate = metrics.failure_rate();
        if metrics.recent_predictions >= self.config.min_recent_predictions
            && failure_rate >= self.config.failure_rate_threshold
        {
            return RollbackDecision::trigger(format!(
                "failure rate {:.1}% over {} recent predictions (threshold {:.1}%)",
                failure_rate * 100.0,
                metrics.recent_predictions,
                self.config.failure_rate_threshold * 100.0
            ));
        }

        RollbackDecision::keep("production signals within thresholds")
    }

    /// Record a user complaint; returns the count in the current window.
    pub async fn report_user_issue(
        &self,
        tenant_id: &str,
        context_key: &ContextKey,
        service_type: ServiceType,
    ) -> LearningResult<u32> {
        let updated = self
            .update_metrics(tenant_id, context_key, service_type, |metrics| {
                metrics.user_issues = metrics.user_issues.saturating_add(1);
            })
            .await?;
        Ok(updated.user_issues)
    }

    /// Record whether a production prediction served with learned weights
    /// succeeded, with its accuracy when known.
    pub async fn record_prediction_result(
        &self,
        tenant_id: &str,
        context_key: &ContextKey,
        service_type: ServiceType,
        success: bool,
        accuracy: Option<f64>,
    ) -> LearningResult<RollbackMetrics> {
        if let Some(accuracy) = accuracy {
            if !accuracy.is_finite() || !(0.0..=1.0).contains(&accuracy) {
                return Err(LearningError::InvalidInput(format!(
                    "accuracy must be within [0, 1], got {accuracy}"
                )));
            }
        }
        let window = self.config.max_accuracy_window.max(1);
        self.update_metrics(tenant_id, context_key, service_type, |metrics| {
            metrics.record_result(success, accuracy, window);
        })
        .await
    }

    /// Restore safe weights and close the validation gate.
    ///
    /// Repeating the call leaves the same persisted state.
    #[instrument(skip(self), fields(context = %context_key))]
    pub async fn execute_rollback(
        &self,
        tenant_id: &str,
        context_key: &ContextKey,
        service_type: ServiceType,
        reason: &str,
    ) -> LearningResult<RollbackOutcome> {
        let (restored_from, weights) = self
            .learner
            .restore_safe_weights(tenant_id, context_key, service_type, reason)
            .await?;
        self.validator
            .invalidate(tenant_id, context_key, service_type, reason)
            .await?;

        let now = self.clock.now();
        self.update_metrics(tenant_id, context_key, service_type, |metrics| metrics.reset(now))
            .await?;

        warn!(
            tenant_id,
            service = %service_type,
            restored_from = restored_from.as_str(),
            reason,
            "Rolled back learned weights"
        );

        let mut props = context_props(tenant_id, service_type, context_key);
        props.insert("reason".to_string(), reason.to_string());
        props.insert("restored_from".to_string(), restored_from.as_str().to_string());
        self.diagnostics.event("weights.rollback", props);

        Ok(RollbackOutcome {
            restored_from,
            weights: weights.values,
            reason: reason.to_string(),
            rolled_back_at: now,
        })
    }

    async fn update_metrics<F>(
        &self,
        tenant_id: &str,
        context_key: &ContextKey,
        service_type: ServiceType,
        mut apply: F,
    ) -> LearningResult<RollbackMetrics>
    where
        F: FnMut(&mut RollbackMetrics) + Send,
    {
        let now = self.clock.now();
        let id = keys::rollback_doc(service_type, context_key);
        let updated = documents::update(
            self.store.as_ref(),
            &self.retry,
            tenant_id,
            &id,
            |current: Option<RollbackMetrics>| {
                let mut metrics = current
                    .unwrap_or_else(|| RollbackMetrics::new(tenant_id, context_key.clone(), service_type, now));
                apply(&mut metrics);
                Ok(metrics)
            },
        )
        .await?;
        Ok(updated.value)
    }
}
