//! Statistical gate between learned weights and production.
//!
//! Learned weights are applied only after a bootstrap comparison of accuracy
//! samples collected under learned and default weights shows an improvement
//! whose lower confidence bound clears `min_improvement`.

use rand::rngs::StdRng;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{info, instrument};

use crate::domain::errors::{LearningError, LearningResult};
use crate::domain::models::{
    ContextKey, RetryConfig, ServiceType, ValidationCheck, ValidationConfig, ValidationOutcome,
    ValidationPerformance, ValidationRecord, ValidationStatus, WeightLearningRecord, WeightRegime,
};
use crate::domain::ports::{Clock, DocumentStore, SystemClock, Telemetry};
use crate::services::bootstrap::{bootstrap_improvement, mean, rng_for};
use crate::services::diagnostics::{context_props, Diagnostics};
use crate::services::documents;
use crate::services::keys;

pub struct Validator {
    store: Arc<dyn DocumentStore>,
    config: ValidationConfig,
    retry: RetryConfig,
    rng: Mutex<StdRng>,
    clock: Arc<dyn Clock>,
    diagnostics: Diagnostics,
}

impl Validator {
    pub fn new(store: Arc<dyn DocumentStore>, config: ValidationConfig) -> Self {
        let rng = Mutex::new(rng_for(config.seed));
        Self {
            store,
            config,
            retry: RetryConfig::default(),
            rng,
            clock: Arc::new(SystemClock),
            diagnostics: Diagnostics::default(),
        }
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

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    pub async fn get_record(
        &self,
        tenant_id: &str,
        context_key: &ContextKey,
        service_type: ServiceType,
    ) -> LearningResult<Option<ValidationRecord>> {
        let id = keys::validation_doc(service_type, context_key);
        Ok(documents::load(self.store.as_ref(), tenant_id, &id)
            .await?
            .map(|loaded| loaded.value))
    }

    /// Whether enough new evidence or time has accumulated to re-validate.
    pub async fn should_validate(
        &self,
        tenant_id: &str,
        context_key: &ContextKey,
        service_type: ServiceType,
    ) -> ValidationCheck {
        match self.check_thresholds(tenant_id, context_key, service_type).await {
            Ok(check) => check,
            Err(err) => {
                self.diagnostics.failure(
                    "should_validate",
                    &err,
                    context_props(tenant_id, service_type, context_key),
                );
                ValidationCheck::no(format!("validation state unavailable: {err}"))
            }
        }
    }

    async fn check_thresholds(
        &self,
        tenant_id: &str,
        context_key: &ContextKey,
        service_type: ServiceType,
    ) -> LearningResult<ValidationCheck> {
        let Some(examples) = self.examples(tenant_id, context_key, service_type).await? else {
            return Ok(ValidationCheck::no("no learning record for this context"));
        };
        let record = self.get_record(tenant_id, context_key, service_type).await?;

        let since_examples = examples.saturating_sub(
            record
                .as_ref()
                .map_or(0, |record| record.examples_at_last_validation),
        );
        if since_examples >= self.config.example_threshold {
            return Ok(ValidationCheck::yes(format!(
                "example threshold reached: {since_examples} new examples since last validation"
            )));
        }

        if let Some(validated_at) = record.as_ref().and_then(|record| record.validated_at) {
            let elapsed = self.clock.now() - validated_at;
            if elapsed >= chrono::Duration::hours(self.config.time_threshold_hours) {
                return Ok(ValidationCheck::yes(format!(
                    "time threshold reached: {}h since last validation",
                    elapsed.num_hours()
                )));
            }
        }

        Ok(ValidationCheck::no(format!(
            "thresholds not reached: {since_examples} new examples"
        )))
    }

    /// Add an accuracy sample observed under one weight regime.
    pub async fn record_sample(
        &self,
        tenant_id: &str,
        context_key: &ContextKey,
        service_type: ServiceType,
        regime: WeightRegime,
        accuracy: f64,
    ) -> LearningResult<ValidationStatus> {
        if !accuracy.is_finite() || !(0.0..=1.0).contains(&accuracy) {
            return Err(LearningError::InvalidInput(format!(
                "accuracy must be within [0, 1], got {accuracy}"
            )));
        }

        let max_samples = self.config.max_samples.max(1);
        let id = keys::validation_doc(service_type, context_key);
        let updated = documents::update(
            self.store.as_ref(),
            &self.retry,
            tenant_id,
            &id,
            |current: Option<ValidationRecord>| {
                let mut record = current
                    .unwrap_or_else(|| ValidationRecord::new(tenant_id, context_key.clone(), service_type));
                record.push_sample(regime, accuracy, max_samples);
                Ok(record)
            },
        )
        .await?;

        Ok(updated.value.status(self.config.min_samples))
    }

    /// Run the bootstrap comparison and persist its result.
    ///
    /// Too few samples is not an error here: the run is recorded and the
    /// outcome comes back with `validated: false` and status `insufficient`.
    #[instrument(skip(self), fields(context = %context_key))]
    pub async fn validate_weights(
        &self,
        tenant_id: &str,
        context_key: &ContextKey,
        service_type: ServiceType,
    ) -> LearningResult<ValidationOutcome> {
        let examples = self
            .examples(tenant_id, context_key, service_type)
            .await?
            .unwrap_or(0);
        let record = self
            .get_record(tenant_id, context_key, service_type)
            .await?
            .unwrap_or_else(|| ValidationRecord::new(tenant_id, context_key.clone(), service_type));

        let outcome = match self.validate_samples(&record.learned_samples, &record.default_samples) {
            Ok(outcome) => outcome,
            Err(err @ LearningError::StatisticalInsufficientData { .. }) => ValidationOutcome {
                validated: false,
                confidence: 0.0,
                performance: ValidationPerformance {
                    accuracy: mean(&record.learned_samples),
                    baseline: mean(&record.default_samples),
                    ..ValidationPerformance::default()
                },
                status: ValidationStatus::Insufficient,
                reason: err.to_string(),
            },
            Err(err) => return Err(err),
        };

        let now = self.clock.now();
        let id = keys::validation_doc(service_type, context_key);
        let mut superseded = false;
        documents::update(
            self.store.as_ref(),
            &self.retry,
            tenant_id,
            &id,
            |current: Option<ValidationRecord>| {
                let mut stored = current
                    .unwrap_or_else(|| ValidationRecord::new(tenant_id, context_key.clone(), service_type));
                superseded = stored.generation != record.generation;
                if superseded {
                    // Invalidated since the samples were read; the decision is stale.
                    return Ok(stored);
                }
                stored.examples_at_last_validation = examples;
                stored.validated_at = Some(now);
                stored.validated = outcome.validated;
                stored.confidence = outcome.confidence;
                stored.performance = outcome.performance;
                if outcome.validated {
                    stored.invalidated_reason = None;
                }
                Ok(stored)
            },
        )
        .await?;

        if superseded {
            info!(tenant_id, "Validation superseded by a concurrent invalidation");
            return Ok(ValidationOutcome {
                validated: false,
                confidence: 0.0,
                performance: ValidationPerformance::default(),
                status: ValidationStatus::PendingValidation,
                reason: "invalidated while validating".to_string(),
            });
        }

        info!(
            tenant_id,
            validated = outcome.validated,
            confidence = outcome.confidence,
            improvement = outcome.performance.improvement,
            lower_bound = outcome.performance.lower_bound,
            "Validation completed"
        );

        let mut props = context_props(tenant_id, service_type, context_key);
        props.insert("validated".to_string(), outcome.validated.to_string());
        props.insert("confidence".to_string(), format!("{:.4}", outcome.confidence));
        props.insert("status".to_string(), outcome.status.as_str().to_string());
        self.diagnostics.event("validation.completed", props);

        Ok(outcome)
    }

    /// Statistical decision for two accuracy sample sets.
    pub fn validate_samples(&self, learned: &[f64], default: &[f64]) -> LearningResult<ValidationOutcome> {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        validate_samples(learned, default, &self.config, &mut *rng)
    }

    /// The `validated` flag. False when missing or unreadable.
    pub async fn should_apply_learned_params(
        &self,
        tenant_id: &str,
        context_key: &ContextKey,
        service_type: ServiceType,
    ) -> bool {
        match self.get_record(tenant_id, context_key, service_type).await {
            Ok(record) => record.is_some_and(|record| record.validated),
            Err(err) => {
                self.diagnostics.failure(
                    "should_apply_learned_params",
                    &err,
                    context_props(tenant_id, service_type, context_key),
                );
                false
            }
        }
    }

    /// Force `validated = false` and drop the sample windows.
    ///
    /// Re-opening the gate then needs fresh samples; the example trigger is
    /// re-anchored to the learning record's current count.
    pub async fn invalidate(
        &self,
        tenant_id: &str,
        context_key: &ContextKey,
        service_type: ServiceType,
        reason: &str,
    ) -> LearningResult<()> {
        let examples = self
            .examples(tenant_id, context_key, service_type)
            .await?
            .unwrap_or(0);
        let id = keys::validation_doc(service_type, context_key);
        documents::update(
            self.store.as_ref(),
            &self.retry,
            tenant_id,
            &id,
            |current: Option<ValidationRecord>| {
                let mut record = current
                    .unwrap_or_else(|| ValidationRecord::new(tenant_id, context_key.clone(), service_type));
                record.invalidate(reason, examples);
                Ok(record)
            },
        )
        .await?;
        Ok(())
    }

    async fn examples(
        &self,
        tenant_id: &str,
        context_key: &ContextKey,
        service_type: ServiceType,
    ) -> LearningResult<Option<u64>> {
        let id = keys::weights_doc(service_type, context_key);
        Ok(
            documents::load::<WeightLearningRecord>(self.store.as_ref(), tenant_id, &id)
                .await?
                .map(|loaded| loaded.value.examples),
        )
    }
}

/// Bootstrap decision: validated when the lower bound of the improvement
/// interval exceeds `min_improvement`; confidence is `P(learned > default)`.
pub fn validate_samples<R: rand::Rng + ?Sized>(
    learned: &[f64],
    default: &[f64],
    config: &ValidationConfig,
    rng: &mut R,
) -> LearningResult<ValidationOutcome> {
    let required = config.min_samples.max(1);
    let actual = learned.len().min(default.len());
    if actual < required {
        return Err(LearningError::StatisticalInsufficientData { required, actual });
    }

    let summary = bootstrap_improvement(
        learned,
        default,
        config.bootstrap_iterations,
        config.confidence_level,
        rng,
    )?;
    let validated = summary.lower_bound > config.min_improvement;

    let reason = if validated {
        format!(
            "improvement {:.4} with lower bound {:.4} above {:.4}",
            summary.mean_difference, summary.lower_bound, config.min_improvement
        )
    } else {
        format!(
            "lower bound {:.4} does not clear {:.4}",
            summary.lower_bound, config.min_improvement
        )
    };

    Ok(ValidationOutcome {
        validated,
        confidence: summary.probability_improved,
        performance: ValidationPerformance {
            accuracy: mean(learned),
            baseline: mean(default),
            improvement: summary.mean_difference,
            lower_bound: summary.lower_bound,
            upper_bound: summary.upper_bound,
        },
        status: if validated {
            ValidationStatus::Validated
        } else {
            ValidationStatus::PendingValidation
        },
        reason,
    })
}
