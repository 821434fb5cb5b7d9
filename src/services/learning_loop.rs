//! The assembled control loop.
//!
//! Wires the learner, gate, rollout and rollback controllers over one set of
//! ports and exposes the two entry points a host needs: weights for a scoring
//! request, and the periodic safety/validation check.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::adapters::{InMemoryDocumentStore, MokaWeightCache, TracingTelemetry};
use crate::domain::errors::LearningResult;
use crate::domain::models::{
    Config, ContextKey, RollbackDecision, RollbackOutcome, ServiceType, ValidationCheck, ValidationOutcome,
    WeightSource, WeightSnapshot, Weights,
};
use crate::domain::ports::{Clock, DocumentStore, FeatureFlags, SystemClock, Telemetry, WeightCache};
use crate::services::performance_tracker::PerformanceTracker;
use crate::services::rollback_controller::RollbackController;
use crate::services::rollout_controller::RolloutController;
use crate::services::trust_router::TrustRouter;
use crate::services::validator::Validator;
use crate::services::weight_learner::WeightLearner;

/// Collaborators the loop runs against.
pub struct LoopPorts {
    pub store: Arc<dyn DocumentStore>,
    pub cache: Arc<dyn WeightCache>,
    pub flags: Option<Arc<dyn FeatureFlags>>,
    pub telemetry: Option<Arc<dyn Telemetry>>,
    pub clock: Arc<dyn Clock>,
}

impl LoopPorts {
    /// In-process store and cache, no flag provider, telemetry to `tracing`.
    pub fn in_memory(config: &Config) -> Self {
        Self {
            store: Arc::new(InMemoryDocumentStore::new()),
            cache: Arc::new(MokaWeightCache::with_capacity(config.cache.max_capacity)),
            flags: None,
            telemetry: Some(Arc::new(TracingTelemetry)),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_flags(mut self, flags: Arc<dyn FeatureFlags>) -> Self {
        self.flags = Some(flags);
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn Telemetry>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// What one `run_scheduled_checks` pass decided and did.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckReport {
    pub rollback: RollbackDecision,
    pub rolled_back: Option<RollbackOutcome>,
    /// Absent when a rollback ran.
    pub validation_check: Option<ValidationCheck>,
    pub validation: Option<ValidationOutcome>,
    /// Snapshot checkpointed because validation passed.
    pub promoted: Option<WeightSnapshot>,
}

pub struct AdaptiveLearningLoop {
    learner: Arc<WeightLearner>,
    tracker: Arc<PerformanceTracker>,
    trust: Arc<TrustRouter>,
    validator: Arc<Validator>,
    rollout: Arc<RolloutController>,
    rollback: Arc<RollbackController>,
}

impl AdaptiveLearningLoop {
    pub fn new(config: &Config, ports: LoopPorts) -> Self {
        let LoopPorts {
            store,
            cache,
            flags,
            telemetry,
            clock,
        } = ports;
        let retry = config.learning.retry.clone();

        let mut learner = WeightLearner::new(Arc::clone(&store), Arc::clone(&cache), config.learning.clone())
            .with_clock(Arc::clone(&clock))
            .with_cache_ttl(Duration::from_secs(config.cache.weights_ttl_secs));
        let mut tracker = PerformanceTracker::new(Some(Arc::clone(&cache)))
            .with_ttl(Duration::from_secs(config.cache.performance_ttl_secs));
        let mut trust = TrustRouter::new(Arc::clone(&store), Arc::clone(&cache), config.trust.clone())
            .with_retry(retry.clone())
            .with_clock(Arc::clone(&clock))
            .with_ttl(Duration::from_secs(config.cache.trust_ttl_secs));
        let mut validator = Validator::new(Arc::clone(&store), config.validation.clone())
            .with_retry(retry.clone())
            .with_clock(Arc::clone(&clock));
        let mut rollout = RolloutController::new(flags, config.rollout.clone()).with_clock(Arc::clone(&clock));

        if let Some(telemetry) = &telemetry {
            learner = learner.with_telemetry(Arc::clone(telemetry));
            tracker = tracker.with_telemetry(Arc::clone(telemetry));
            trust = trust.with_telemetry(Arc::clone(telemetry));
            validator = validator.with_telemetry(Arc::clone(telemetry));
            rollout = rollout.with_telemetry(Arc::clone(telemetry));
        }

        let learner = Arc::new(learner);
        let validator = Arc::new(validator);

        let mut rollback = RollbackController::new(
            store,
            Arc::clone(&learner),
            Arc::clone(&validator),
            config.rollback.clone(),
        )
        .with_retry(retry)
        .with_clock(clock);
        if let Some(telemetry) = telemetry {
            rollback = rollback.with_telemetry(telemetry);
        }

        Self {
            learner,
            tracker: Arc::new(tracker),
            trust: Arc::new(trust),
            validator,
            rollout: Arc::new(rollout),
            rollback: Arc::new(rollback),
        }
    }

    pub fn learner(&self) -> &Arc<WeightLearner> {
        &self.learner
    }

    pub fn tracker(&self) -> &Arc<PerformanceTracker> {
        &self.tracker
    }

    pub fn trust_router(&self) -> &Arc<TrustRouter> {
        &self.trust
    }

    pub fn validator(&self) -> &Arc<Validator> {
        &self.validator
    }

    pub fn rollout(&self) -> &Arc<RolloutController> {
        &self.rollout
    }

    pub fn rollback(&self) -> &Arc<RollbackController> {
        &self.rollback
    }

    /// Weights to score one request with.
    ///
    /// Learned weights are served only when the context is validated and the
    /// subject is inside the rollout; everything else gets the defaults.
    pub async fn weights_for_request(
        &self,
        tenant_id: &str,
        context_key: &ContextKey,
        service_type: ServiceType,
        subject_key: &str,
    ) -> Weights {
        let (validated, in_rollout) = futures::join!(
            self.validator
                .should_apply_learned_params(tenant_id, context_key, service_type),
            self.rollout.is_in_rollout(tenant_id, service_type, subject_key),
        );

        if validated && in_rollout {
            self.learner.get_weights(tenant_id, context_key, service_type).await
        } else {
            debug!(tenant_id, validated, in_rollout, "Serving default weights");
            Weights::defaults(self.learner.default_weights(service_type), WeightSource::Default)
        }
    }

    /// One pass of the periodic checks: rollback first, then validation and
    /// promotion. The caller owns the schedule.
    pub async fn run_scheduled_checks(
        &self,
        tenant_id: &str,
        context_key: &ContextKey,
        service_type: ServiceType,
    ) -> LearningResult<CheckReport> {
        let decision = self.rollback.should_rollback(tenant_id, context_key, service_type).await;
        if decision.should_rollback {
            let outcome = self
                .rollback
                .execute_rollback(tenant_id, context_key, service_type, &decision.reason)
                .await?;
            return Ok(CheckReport {
                rollback: decision,
                rolled_back: Some(outcome),
                validation_check: None,
                validation: None,
                promoted: None,
            });
        }

        let check = self.validator.should_validate(tenant_id, context_key, service_type).await;
        if !check.should_validate {
            return Ok(CheckReport {
                rollback: decision,
                rolled_back: None,
                validation_check: Some(check),
                validation: None,
                promoted: None,
            });
        }

        let outcome = self
            .validator
            .validate_weights(tenant_id, context_key, service_type)
            .await?;
        let promoted = if outcome.validated {
            let snapshot = self
                .learner
                .checkpoint_promoted(tenant_id, context_key, service_type)
                .await?;
            info!(tenant_id, context = %context_key, service = %service_type, "Promoted learned weights");
            snapshot
        } else {
            None
        };

        Ok(CheckReport {
            rollback: decision,
            rolled_back: None,
            validation_check: Some(check),
            validation: Some(outcome),
            promoted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ContextKey {
        ContextKey::new().with_industry("retail").with_stage("discovery")
    }

    #[test]
    fn test_without_flag_provider_serves_defaults() {
        let config = Config::default();
        let learning = AdaptiveLearningLoop::new(&config, LoopPorts::in_memory(&config));

        let weights = tokio_test::block_on(async {
            for _ in 0..150 {
                learning
                    .learner()
                    .learn_from_outcome("t", &ctx(), ServiceType::Risk, "ml", 1.0)
                    .await?;
            }
            Ok::<_, crate::domain::errors::LearningError>(
                learning.weights_for_request("t", &ctx(), ServiceType::Risk, "s-1").await,
            )
        })
        .unwrap();

        assert_eq!(weights.source, WeightSource::Default);
        assert_eq!(weights.values, config.learning.defaults_for(ServiceType::Risk));
    }

    #[tokio::test]
    async fn test_checks_without_metrics_or_record() {
        let config = Config::default();
        let learning = AdaptiveLearningLoop::new(&config, LoopPorts::in_memory(&config));

        let report = learning
            .run_scheduled_checks("t", &ctx(), ServiceType::Forecast)
            .await
            .unwrap();
        assert!(!report.rollback.should_rollback);
        assert!(report.rolled_back.is_none());
        assert!(!report.validation_check.unwrap().should_validate);
        assert!(report.validation.is_none());
    }
}
