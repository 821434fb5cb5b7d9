//! Per-context bandit that learns component weights from outcome feedback.
//!
//! Weights served to scoring services are a blend of static safe defaults and
//! the bandit's mean estimate, with the blend ratio set by the learning curve.
//! Reads never fail: any backing-store failure yields the defaults.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::domain::errors::{LearningError, LearningResult};
use crate::domain::models::{
    ComponentWeights, ContextKey, LearnReport, LearningConfig, LearningStage, PendingPrediction,
    RestoredFrom, ServiceType, WeightLearningRecord, WeightSnapshot, WeightSource, Weights,
};
use crate::domain::ports::{Clock, DocumentStore, SystemClock, Telemetry, WeightCache};
use crate::services::diagnostics::{context_props, Diagnostics};
use crate::services::documents::{self, decode_cached, encode};
use crate::services::keys;
use crate::services::learning_curve::{blend, blend_ratio, stage_for};

/// Default TTL for cached blended weights.
const WEIGHTS_CACHE_TTL_SECS: u64 = 300;

/// Learns and serves per-(tenant, context, service) ensemble weights.
pub struct WeightLearner {
    store: Arc<dyn DocumentStore>,
    cache: Arc<dyn WeightCache>,
    config: LearningConfig,
    cache_ttl: Duration,
    clock: Arc<dyn Clock>,
    diagnostics: Diagnostics,
}

impl WeightLearner {
    pub fn new(store: Arc<dyn DocumentStore>, cache: Arc<dyn WeightCache>, config: LearningConfig) -> Self {
        Self {
            store,
            cache,
            config,
            cache_ttl: Duration::from_secs(WEIGHTS_CACHE_TTL_SECS),
            clock: Arc::new(SystemClock),
            diagnostics: Diagnostics::default(),
        }
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn Telemetry>) -> Self {
        self.diagnostics = Diagnostics::new(Some(telemetry));
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn config(&self) -> &LearningConfig {
        &self.config
    }

    /// Safe weights for a service.
    pub fn default_weights(&self, service_type: ServiceType) -> ComponentWeights {
        self.config.defaults_for(service_type)
    }

    /// Weights to use for scoring. Never fails.
    #[instrument(skip(self), fields(context = %context_key))]
    pub async fn get_weights(&self, tenant_id: &str, context_key: &ContextKey, service_type: ServiceType) -> Weights {
        let cache_key = keys::weights_cache(tenant_id, service_type, context_key);
        let props = || context_props(tenant_id, service_type, context_key);

        match self.cache.get(&cache_key).await {
            Ok(Some(raw)) => {
                if let Some(weights) = decode_cached::<Weights>(&raw) {
                    return weights;
                }
                debug!(cache_key, "Discarding undecodable cached weights");
            }
            Ok(None) => {}
            Err(err) => self.diagnostics.failure("get_weights.cache_read", &err, props()),
        }

        let record = match self.get_record(tenant_id, context_key, service_type).await {
            Ok(record) => record,
            Err(err) => {
                self.diagnostics.failure("get_weights.store_read", &err, props());
                return Weights::defaults(self.default_weights(service_type), WeightSource::Fallback);
            }
        };

        let weights = self.compute_weights(record.as_ref(), service_type);

        match encode(&weights) {
            Ok(raw) => {
                if let Err(err) = self.cache.set_with_ttl(&cache_key, raw, self.cache_ttl).await {
                    self.diagnostics.failure("get_weights.cache_write", &err, props());
                }
            }
            Err(err) => self.diagnostics.failure("get_weights.encode", &err, props()),
        }

        weights
    }

    /// Blend a record's learned state with its defaults.
    pub fn compute_weights(&self, record: Option<&WeightLearningRecord>, service_type: ServiceType) -> Weights {
        let Some(record) = record else {
            return Weights::defaults(self.default_weights(service_type), WeightSource::Default);
        };

        let curve = &self.config.curve;
        let stage = stage_for(record.examples, curve);
        let ratio = blend_ratio(record.examples, curve);

        if stage == LearningStage::Bootstrap || ratio <= 0.0 {
            return Weights {
                values: record.default_weights.clone(),
                stage,
                blend_ratio: 0.0,
                examples: record.examples,
                source: WeightSource::Default,
            };
        }

        Weights {
            values: blend(&record.default_weights, &record.learned_weights(), ratio),
            stage,
            blend_ratio: ratio,
            examples: record.examples,
            source: WeightSource::Blended,
        }
    }

    pub async fn get_record(
        &self,
        tenant_id: &str,
        context_key: &ContextKey,
        service_type: ServiceType,
    ) -> LearningResult<Option<WeightLearningRecord>> {
        let id = keys::weights_doc(service_type, context_key);
        Ok(documents::load::<WeightLearningRecord>(self.store.as_ref(), tenant_id, &id)
            .await?
            .map(|loaded| loaded.value))
    }

    /// Fold one realized outcome for `component` into the context's bandit.
    ///
    /// Only malformed input is an error. Persistence failures, including
    /// conflicts that outlast the retry budget, are logged and reported via
    /// telemetry and come back as `recorded: false`.
    #[instrument(skip(self), fields(context = %context_key))]
    pub async fn learn_from_outcome(
        &self,
        tenant_id: &str,
        context_key: &ContextKey,
        service_type: ServiceType,
        component: &str,
        outcome: f64,
    ) -> LearningResult<LearnReport> {
        validate_outcome(outcome)?;
        if component.trim().is_empty() {
            return Err(LearningError::InvalidInput("component name is empty".to_string()));
        }

        let now = self.clock.now();
        let id = keys::weights_doc(service_type, context_key);
        let defaults = self.default_weights(service_type);
        let mut props = context_props(tenant_id, service_type, context_key);
        props.insert("component".to_string(), component.to_string());

        let result = documents::update(
            self.store.as_ref(),
            &self.config.retry,
            tenant_id,
            &id,
            |current: Option<WeightLearningRecord>| {
                let mut record = current.unwrap_or_else(|| {
                    WeightLearningRecord::new(tenant_id, context_key.clone(), service_type, defaults.clone(), now)
                });
                record.learn(component, outcome, now);
                Ok(record)
            },
        )
        .await;

        match result {
            Ok(updated) => {
                self.invalidate_cache(tenant_id, context_key, service_type).await;
                let examples = updated.value.examples;
                debug!(component, outcome, examples, attempts = updated.attempts, "Learned from outcome");

                props.insert("examples".to_string(), examples.to_string());
                props.insert("stage".to_string(), stage_for(examples, &self.config.curve).as_str().to_string());
                self.diagnostics.event("weights.outcome_learned", props);

                Ok(LearnReport {
                    recorded: true,
                    examples: Some(examples),
                    attempts: updated.attempts,
                })
            }
            Err(err) => {
                let attempts = if err.is_conflict() { self.config.retry.max_attempts.max(1) } else { 1 };
                self.diagnostics.failure("learn_from_outcome", &err, props);
                Ok(LearnReport {
                    recorded: false,
                    examples: None,
                    attempts,
                })
            }
        }
    }

    /// Register a prediction so its outcome can be resolved later.
    pub async fn record_prediction(
        &self,
        tenant_id: &str,
        context_key: &ContextKey,
        service_type: ServiceType,
        components: Vec<String>,
    ) -> LearningResult<Uuid> {
        if components.is_empty() || components.iter().any(|c| c.trim().is_empty()) {
            return Err(LearningError::InvalidInput(
                "a prediction needs at least one named component".to_string(),
            ));
        }

        let prediction = PendingPrediction {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.to_string(),
            context_key: context_key.clone(),
            service_type,
            components,
            created_at: self.clock.now(),
            resolved_at: None,
            outcome: None,
        };

        documents::save(
            self.store.as_ref(),
            tenant_id,
            &keys::prediction_doc(prediction.id),
            &prediction,
            None,
        )
        .await?;

        Ok(prediction.id)
    }

    /// Resolve a registered prediction and learn its outcome for every
    /// component that contributed to it.
    pub async fn resolve_prediction(
        &self,
        tenant_id: &str,
        prediction_id: Uuid,
        outcome: f64,
    ) -> LearningResult<Vec<LearnReport>> {
        validate_outcome(outcome)?;
        let id = keys::prediction_doc(prediction_id);
        let now = self.clock.now();

        let resolved = documents::update(
            self.store.as_ref(),
            &self.config.retry,
            tenant_id,
            &id,
            |current: Option<PendingPrediction>| {
                let mut prediction =
                    current.ok_or_else(|| LearningError::not_found("prediction", prediction_id.to_string()))?;
                if prediction.resolved_at.is_some() {
                    return Err(LearningError::InvalidInput(format!(
                        "prediction {prediction_id} is already resolved"
                    )));
                }
                prediction.resolved_at = Some(now);
                prediction.outcome = Some(outcome);
                Ok(prediction)
            },
        )
        .await?
        .value;

        let mut reports = Vec::with_capacity(resolved.components.len());
        for component in &resolved.components {
            reports.push(
                self.learn_from_outcome(tenant_id, &resolved.context_key, resolved.service_type, component, outcome)
                    .await?,
            );
        }
        Ok(reports)
    }

    /// Snapshot the current learned state as the promoted version.
    ///
    /// The previously promoted snapshot becomes the rollback target.
    pub async fn checkpoint_promoted(
        &self,
        tenant_id: &str,
        context_key: &ContextKey,
        service_type: ServiceType,
    ) -> LearningResult<Option<WeightSnapshot>> {
        if self.get_record(tenant_id, context_key, service_type).await?.is_none() {
            return Ok(None);
        }

        let now = self.clock.now();
        let id = keys::weights_doc(service_type, context_key);
        let updated = documents::update(
            self.store.as_ref(),
            &self.config.retry,
            tenant_id,
            &id,
            |current: Option<WeightLearningRecord>| {
                let mut record = current.ok_or_else(|| LearningError::not_found("weight learning record", id.clone()))?;
                if let Some(promoted) = record.promoted_version.take() {
                    record.previous_version = Some(promoted);
                }
                record.promoted_version = Some(record.snapshot(now));
                record.updated_at = now;
                Ok(record)
            },
        )
        .await?;

        info!(
            tenant_id,
            context = %context_key,
            service = %service_type,
            examples = updated.value.examples,
            "Checkpointed promoted weights"
        );
        Ok(updated.value.promoted_version)
    }

    /// Revert a context to its previous version, or to defaults.
    ///
    /// Repeating the call leaves the same learned state.
    pub async fn restore_safe_weights(
        &self,
        tenant_id: &str,
        context_key: &ContextKey,
        service_type: ServiceType,
        reason: &str,
    ) -> LearningResult<(RestoredFrom, Weights)> {
        if self.get_record(tenant_id, context_key, service_type).await?.is_none() {
            self.invalidate_cache(tenant_id, context_key, service_type).await;
            return Ok((
                RestoredFrom::NothingToRestore,
                Weights::defaults(self.default_weights(service_type), WeightSource::Default),
            ));
        }

        let now = self.clock.now();
        let id = keys::weights_doc(service_type, context_key);
        let updated = documents::update(
            self.store.as_ref(),
            &self.config.retry,
            tenant_id,
            &id,
            |current: Option<WeightLearningRecord>| {
                let mut record = current.ok_or_else(|| LearningError::not_found("weight learning record", id.clone()))?;
                restore(&mut record, reason, now);
                Ok(record)
            },
        )
        .await?;

        self.invalidate_cache(tenant_id, context_key, service_type).await;

        let restored_from = if updated.value.previous_version.is_some() {
            RestoredFrom::PreviousVersion
        } else {
            RestoredFrom::Defaults
        };
        Ok((restored_from, self.compute_weights(Some(&updated.value), service_type)))
    }

    /// Drop the cached weights for a context. Failures are reported, not returned.
    pub async fn invalidate_cache(&self, tenant_id: &str, context_key: &ContextKey, service_type: ServiceType) {
        let cache_key = keys::weights_cache(tenant_id, service_type, context_key);
        if let Err(err) = self.cache.delete(&cache_key).await {
            self.diagnostics.failure(
                "weights.cache_invalidate",
                &err,
                context_props(tenant_id, service_type, context_key),
            );
        }
    }
}

fn restore(record: &mut WeightLearningRecord, reason: &str, now: DateTime<Utc>) {
    if let Some(previous) = &record.previous_version {
        record.components = previous.components.clone();
        record.examples = previous.examples;
    } else {
        record.components.clear();
        record.examples = 0;
    }
    record.promoted_version = None;
    record.rolled_back_at = Some(now);
    record.rollback_reason = Some(reason.to_string());
    record.updated_at = now;
}

fn validate_outcome(outcome: f64) -> LearningResult<()> {
    if outcome.is_finite() && (0.0..=1.0).contains(&outcome) {
        Ok(())
    } else {
        Err(LearningError::InvalidInput(format!(
            "outcome must be within [0, 1], got {outcome}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{InMemoryDocumentStore, MokaWeightCache, RecordingTelemetry};

    fn ctx() -> ContextKey {
        ContextKey::new().with_industry("technology").with_stage("proposal")
    }

    fn learner() -> (Arc<InMemoryDocumentStore>, WeightLearner) {
        let store = Arc::new(InMemoryDocumentStore::new());
        let learner = WeightLearner::new(store.clone(), Arc::new(MokaWeightCache::new()), LearningConfig::default());
        (store, learner)
    }

    #[tokio::test]
    async fn test_unknown_context_gets_defaults() {
        let (_, learner) = learner();
        let weights = learner.get_weights("t", &ctx(), ServiceType::Risk).await;
        assert_eq!(weights.source, WeightSource::Default);
        assert_eq!(weights.get("rules"), Some(1.0));
        assert_eq!(weights.get("ml"), Some(0.9));
        assert_eq!(weights.get("llm"), Some(0.8));
        assert_eq!(weights.get("historical"), Some(0.9));
    }

    #[tokio::test]
    async fn test_bootstrap_stage_is_pure_default() {
        let (_, learner) = learner();
        for _ in 0..99 {
            learner
                .learn_from_outcome("t", &ctx(), ServiceType::Risk, "ml", 0.1)
                .await
                .unwrap();
        }
        let weights = learner.get_weights("t", &ctx(), ServiceType::Risk).await;
        assert_eq!(weights.examples, 99);
        assert_eq!(weights.stage, LearningStage::Bootstrap);
        assert_eq!(weights.get("ml"), Some(0.9));
    }

    #[tokio::test]
    async fn test_high_outcomes_raise_weight_after_bootstrap() {
        let (_, learner) = learner();
        for _ in 0..100 {
            learner
                .learn_from_outcome("t", &ctx(), ServiceType::Risk, "ml", 0.95)
                .await
                .unwrap();
        }
        let weights = learner.get_weights("t", &ctx(), ServiceType::Risk).await;
        let ml = weights.get("ml").unwrap();
        assert_eq!(weights.stage, LearningStage::Initial);
        assert!(ml >= 0.9, "ml weight {ml} should not drop below default");
        assert!(ml < 1.0);
        // Untouched components keep their defaults.
        assert_eq!(weights.get("rules"), Some(1.0));
    }

    #[tokio::test]
    async fn test_learn_invalidates_cached_weights() {
        let (_, learner) = learner();
        learner.learn_from_outcome("t", &ctx(), ServiceType::Risk, "ml", 1.0).await.unwrap();
        assert_eq!(learner.get_weights("t", &ctx(), ServiceType::Risk).await.examples, 1);

        learner.learn_from_outcome("t", &ctx(), ServiceType::Risk, "ml", 1.0).await.unwrap();
        assert_eq!(learner.get_weights("t", &ctx(), ServiceType::Risk).await.examples, 2);
    }

    #[tokio::test]
    async fn test_invalid_outcomes_rejected() {
        let (store, learner) = learner();
        for bad in [-0.1, 1.5, f64::NAN, f64::INFINITY] {
            let result = learner.learn_from_outcome("t", &ctx(), ServiceType::Risk, "ml", bad).await;
            assert!(matches!(result, Err(LearningError::InvalidInput(_))));
        }
        let empty = learner.learn_from_outcome("t", &ctx(), ServiceType::Risk, " ", 0.5).await;
        assert!(matches!(empty, Err(LearningError::InvalidInput(_))));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_store_outage_degrades_to_defaults() {
        let (store, learner) = learner();
        let telemetry = Arc::new(RecordingTelemetry::new());
        let learner = learner.with_telemetry(telemetry.clone());
        store.set_unavailable(true);

        let report = learner
            .learn_from_outcome("t", &ctx(), ServiceType::Risk, "ml", 0.9)
            .await
            .unwrap();
        assert!(!report.recorded);

        let weights = learner.get_weights("t", &ctx(), ServiceType::Risk).await;
        assert_eq!(weights.source, WeightSource::Fallback);
        assert_eq!(weights.get("ml"), Some(0.9));
        assert_eq!(telemetry.exceptions().len(), 2);
    }

    #[tokio::test]
    async fn test_tenants_are_isolated() {
        let (_, learner) = learner();
        learner.learn_from_outcome("a", &ctx(), ServiceType::Risk, "ml", 1.0).await.unwrap();
        let other = learner.get_weights("b", &ctx(), ServiceType::Risk).await;
        assert_eq!(other.examples, 0);
        let other_service = learner.get_weights("a", &ctx(), ServiceType::Forecast).await;
        assert_eq!(other_service.examples, 0);
    }

    #[tokio::test]
    async fn test_resolve_unknown_prediction_fails() {
        let (_, learner) = learner();
        let result = learner.resolve_prediction("t", Uuid::new_v4(), 1.0).await;
        assert!(matches!(result, Err(LearningError::RecordNotFound { .. })));
    }

    #[tokio::test]
    async fn test_resolve_prediction_learns_each_component() {
        let (_, learner) = learner();
        let id = learner
            .record_prediction("t", &ctx(), ServiceType::Forecast, vec!["ml".into(), "llm".into()])
            .await
            .unwrap();

        let reports = learner.resolve_prediction("t", id, 0.8).await.unwrap();
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.recorded));

        let record = learner.get_record("t", &ctx(), ServiceType::Forecast).await.unwrap().unwrap();
        assert_eq!(record.examples, 2);

        let again = learner.resolve_prediction("t", id, 0.8).await;
        assert!(matches!(again, Err(LearningError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_restore_without_previous_version_resets_to_defaults() {
        let (_, learner) = learner();
        for _ in 0..150 {
            learner.learn_from_outcome("t", &ctx(), ServiceType::Risk, "ml", 0.2).await.unwrap();
        }

        let (from, weights) = learner
            .restore_safe_weights("t", &ctx(), ServiceType::Risk, "test")
            .await
            .unwrap();
        assert_eq!(from, RestoredFrom::Defaults);
        assert_eq!(weights.get("ml"), Some(0.9));
        assert_eq!(weights.examples, 0);
    }

    #[tokio::test]
    async fn test_checkpoint_then_restore_previous_version() {
        let (_, learner) = learner();
        for _ in 0..120 {
            learner.learn_from_outcome("t", &ctx(), ServiceType::Risk, "ml", 0.9).await.unwrap();
        }
        learner.checkpoint_promoted("t", &ctx(), ServiceType::Risk).await.unwrap();
        for _ in 0..80 {
            learner.learn_from_outcome("t", &ctx(), ServiceType::Risk, "ml", 0.1).await.unwrap();
        }
        learner.checkpoint_promoted("t", &ctx(), ServiceType::Risk).await.unwrap();

        let (from, weights) = learner
            .restore_safe_weights("t", &ctx(), ServiceType::Risk, "degradation")
            .await
            .unwrap();
        assert_eq!(from, RestoredFrom::PreviousVersion);
        assert_eq!(weights.examples, 120);
    }
}
