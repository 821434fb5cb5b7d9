//! Component trust scores and uncertainty-based routing.
//!
//! Trust is learned from how close each component's prediction landed to the
//! realized outcome, discounted by the uncertainty it reported. Routing uses
//! the trust ranking to pick how many components to consult.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::domain::errors::{LearningError, LearningResult};
use crate::domain::models::{
    ContextKey, RetryConfig, RoutingDecision, ServiceType, TrustConfig, TrustOutcome, TrustScoreRecord,
};
use crate::domain::ports::{Clock, DocumentStore, SystemClock, Telemetry, WeightCache};
use crate::services::diagnostics::{context_props, Diagnostics};
use crate::services::documents::{self, decode_cached, encode};
use crate::services::keys;

const TRUST_CACHE_TTL_SECS: u64 = 900;

pub struct TrustRouter {
    store: Arc<dyn DocumentStore>,
    cache: Arc<dyn WeightCache>,
    config: TrustConfig,
    retry: RetryConfig,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    diagnostics: Diagnostics,
}

impl TrustRouter {
    pub fn new(store: Arc<dyn DocumentStore>, cache: Arc<dyn WeightCache>, config: TrustConfig) -> Self {
        Self {
            store,
            cache,
            config,
            retry: RetryConfig::default(),
            ttl: Duration::from_secs(TRUST_CACHE_TTL_SECS),
            clock: Arc::new(SystemClock),
            diagnostics: Diagnostics::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
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

    /// Current trust snapshot; neutral trust when nothing has been learned
    /// or the backing services fail.
    pub async fn get_trust_scores(
        &self,
        tenant_id: &str,
        service_type: ServiceType,
        context_key: &ContextKey,
    ) -> TrustScoreRecord {
        let cache_key = keys::trust_cache(tenant_id, service_type, context_key);
        let props = || context_props(tenant_id, service_type, context_key);

        match self.cache.get(&cache_key).await {
            Ok(Some(raw)) => {
                if let Some(record) = decode_cached::<TrustScoreRecord>(&raw) {
                    return record;
                }
            }
            Ok(None) => {}
            Err(err) => self.diagnostics.failure("trust.cache_read", &err, props()),
        }

        let id = keys::trust_doc(service_type, context_key);
        let record = match documents::load::<TrustScoreRecord>(self.store.as_ref(), tenant_id, &id).await {
            Ok(Some(loaded)) => loaded.value,
            Ok(None) => self.neutral(),
            Err(err) => {
                self.diagnostics.failure("trust.store_read", &err, props());
                return self.neutral();
            }
        };

        match encode(&record) {
            Ok(raw) => {
                if let Err(err) = self.cache.set_with_ttl(&cache_key, raw, self.ttl).await {
                    self.diagnostics.failure("trust.cache_write", &err, props());
                }
            }
            Err(err) => self.diagnostics.failure("trust.encode", &err, props()),
        }
        record
    }

    /// Fold a batch of outcomes into the stored trust scores.
    #[instrument(skip(self, outcomes), fields(context = %context_key, outcomes = outcomes.len()))]
    pub async fn learn_trust_scores(
        &self,
        tenant_id: &str,
        service_type: ServiceType,
        context_key: &ContextKey,
        outcomes: &[TrustOutcome],
    ) -> LearningResult<TrustScoreRecord> {
        for outcome in outcomes {
            validate_outcome(outcome)?;
        }

        let now = self.clock.now();
        let id = keys::trust_doc(service_type, context_key);
        let result = documents::update(
            self.store.as_ref(),
            &self.retry,
            tenant_id,
            &id,
            |current: Option<TrustScoreRecord>| {
                let mut record = current.unwrap_or_else(|| TrustScoreRecord::neutral(&self.config.components, now));
                for outcome in outcomes {
                    apply_outcome(&mut record, outcome, &self.config);
                }
                record.recompute_overall();
                record.updated_at = now;
                Ok(record)
            },
        )
        .await;

        let updated = match result {
            Ok(updated) => updated.value,
            Err(err) => {
                self.diagnostics
                    .failure("learn_trust_scores", &err, context_props(tenant_id, service_type, context_key));
                return Err(err);
            }
        };

        let cache_key = keys::trust_cache(tenant_id, service_type, context_key);
        if let Err(err) = self.cache.delete(&cache_key).await {
            self.diagnostics
                .failure("trust.cache_invalidate", &err, context_props(tenant_id, service_type, context_key));
        }

        debug!(overall_trust = updated.overall_trust, "Updated trust scores");
        Ok(updated)
    }

    /// Pick the components to consult for a request with the given uncertainty.
    pub async fn route_by_uncertainty(
        &self,
        tenant_id: &str,
        service_type: ServiceType,
        context_key: &ContextKey,
        uncertainty: f64,
    ) -> RoutingDecision {
        let record = self.get_trust_scores(tenant_id, service_type, context_key).await;
        route(&record, uncertainty, &self.config)
    }

    fn neutral(&self) -> TrustScoreRecord {
        TrustScoreRecord::neutral(&self.config.components, self.clock.now())
    }
}

/// Routing decision for a trust snapshot.
///
/// NaN uncertainty routes like maximal uncertainty.
pub fn route(record: &TrustScoreRecord, uncertainty: f64, config: &TrustConfig) -> RoutingDecision {
    let uncertainty = normalize_uncertainty(uncertainty);
    let ranked: Vec<String> = record.ranked().into_iter().map(|(name, _)| name).collect();
    let primary_component = ranked.first().cloned();

    if ranked.is_empty() {
        return RoutingDecision {
            use_ensemble: false,
            components: Vec::new(),
            primary_component: None,
            reason: "no components available".to_string(),
        };
    }

    if uncertainty >= config.ensemble_threshold {
        RoutingDecision {
            use_ensemble: true,
            components: ranked,
            primary_component,
            reason: format!("high uncertainty ({uncertainty:.2}): full ensemble"),
        }
    } else if uncertainty >= config.top_two_threshold {
        RoutingDecision {
            use_ensemble: true,
            components: ranked.into_iter().take(2).collect(),
            primary_component,
            reason: format!("moderate uncertainty ({uncertainty:.2}): top two by trust"),
        }
    } else {
        RoutingDecision {
            use_ensemble: false,
            components: ranked.into_iter().take(1).collect(),
            primary_component,
            reason: format!("low uncertainty ({uncertainty:.2}): most trusted component"),
        }
    }
}

/// Trust sample for one outcome: accuracy discounted by reported uncertainty.
pub fn trust_sample(outcome: &TrustOutcome) -> f64 {
    let error = (outcome.prediction - outcome.actual_outcome).abs().min(1.0);
    let certainty = 1.0 - normalize_uncertainty(outcome.uncertainty);
    ((1.0 - error) * certainty).clamp(0.0, 1.0)
}

fn apply_outcome(record: &mut TrustScoreRecord, outcome: &TrustOutcome, config: &TrustConfig) {
    let sample = trust_sample(outcome);
    let trust = record.components.entry(outcome.component.clone()).or_default();
    trust.trust_score = config
        .learning_rate
        .mul_add(sample - trust.trust_score, trust.trust_score)
        .clamp(0.0, 1.0);
    trust.samples += 1;
    let samples = trust.samples as f64;
    trust.confidence = samples / (samples + config.confidence_half_samples.max(f64::MIN_POSITIVE));
}

fn normalize_uncertainty(uncertainty: f64) -> f64 {
    if uncertainty.is_nan() {
        1.0
    } else {
        uncertainty.clamp(0.0, 1.0)
    }
}

fn validate_outcome(outcome: &TrustOutcome) -> LearningResult<()> {
    if outcome.component.trim().is_empty() {
        return Err(LearningError::InvalidInput("trust outcome has no component".to_string()));
    }
    if !outcome.prediction.is_finite() || !outcome.actual_outcome.is_finite() {
        return Err(LearningError::InvalidInput(format!(
            "trust outcome for {} has a non-finite value",
            outcome.component
        )));
    }
    Ok(())
}
