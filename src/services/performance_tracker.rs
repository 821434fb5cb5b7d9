//! Prediction accuracy counters per (tenant, service, context).
//!
//! Counters live in process memory and are mirrored to the cache in the
//! background so another instance can pick them up. The cache copy is soft
//! state and loss of it only costs history. Mirror writes are serialized and
//! always carry the newest in-memory record, so a slow write never leaves an
//! older count behind.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, instrument};

use crate::domain::models::{ContextKey, PerformanceRecord, ServiceType};
use crate::domain::ports::{EventProps, Telemetry, WeightCache};
use crate::services::diagnostics::{context_props, Diagnostics};
use crate::services::documents::{decode_cached, encode};
use crate::services::keys;

const PERFORMANCE_CACHE_TTL_SECS: u64 = 3600;

type Records = Arc<RwLock<HashMap<String, PerformanceRecord>>>;

pub struct PerformanceTracker {
    records: Records,
    mirror_lock: Arc<Mutex<()>>,
    cache: Option<Arc<dyn WeightCache>>,
    ttl: Duration,
    diagnostics: Diagnostics,
}

impl PerformanceTracker {
    pub fn new(cache: Option<Arc<dyn WeightCache>>) -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
            mirror_lock: Arc::new(Mutex::new(())),
            cache,
            ttl: Duration::from_secs(PERFORMANCE_CACHE_TTL_SECS),
            diagnostics: Diagnostics::default(),
        }
    }

    /// Memory-only tracker.
    pub fn in_memory() -> Self {
        Self::new(None)
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn Telemetry>) -> Self {
        self.diagnostics = Diagnostics::new(Some(telemetry));
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Count one prediction for `component` and return the updated record.
    #[instrument(skip(self), fields(context = %context_key))]
    pub async fn track_performance(
        &self,
        tenant_id: &str,
        service_type: ServiceType,
        context_key: &ContextKey,
        component: &str,
        correct: bool,
    ) -> PerformanceRecord {
        let key = keys::performance_cache(tenant_id, service_type, context_key);

        let seed = if self.records.read().await.contains_key(&key) {
            None
        } else {
            self.read_cache(&key, tenant_id, service_type, context_key).await
        };

        let updated = {
            let mut records = self.records.write().await;
            let record = records.entry(key.clone()).or_insert_with(|| seed.unwrap_or_default());
            record.record(component, correct);
            record.clone()
        };

        debug!(
            component,
            correct,
            total = updated.total_predictions,
            "Tracked prediction"
        );

        if let Some(cache) = &self.cache {
            self.mirror(Arc::clone(cache), key, context_props(tenant_id, service_type, context_key));
        }

        updated
    }

    /// Memory, then cache, then an empty record. Never fails.
    pub async fn get_performance(
        &self,
        tenant_id: &str,
        service_type: ServiceType,
        context_key: &ContextKey,
    ) -> PerformanceRecord {
        let key = keys::performance_cache(tenant_id, service_type, context_key);
        if let Some(record) = self.records.read().await.get(&key) {
            return record.clone();
        }
        self.read_cache(&key, tenant_id, service_type, context_key)
            .await
            .unwrap_or_default()
    }

    async fn read_cache(
        &self,
        key: &str,
        tenant_id: &str,
        service_type: ServiceType,
        context_key: &ContextKey,
    ) -> Option<PerformanceRecord> {
        let cache = self.cache.as_ref()?;
        match cache.get(key).await {
            Ok(raw) => raw.and_then(|raw| decode_cached(&raw)),
            Err(err) => {
                self.diagnostics.failure(
                    "performance.cache_read",
                    &err,
                    context_props(tenant_id, service_type, context_key),
                );
                None
            }
        }
    }

    fn mirror(&self, cache: Arc<dyn WeightCache>, key: String, props: EventProps) {
        let records = Arc::clone(&self.records);
        let lock = Arc::clone(&self.mirror_lock);
        let ttl = self.ttl;
        let diagnostics = self.diagnostics.clone();
        tokio::spawn(async move {
            let _guard = lock.lock().await;
            let Some(latest) = records.read().await.get(&key).cloned() else {
                return;
            };
            let raw = match encode(&latest) {
                Ok(raw) => raw,
                Err(err) => {
                    diagnostics.failure("performance.encode", &err, props);
                    return;
                }
            };
            if let Err(err) = cache.set_with_ttl(&key, raw, ttl).await {
                diagnostics.failure("performance.cache_write", &err, props);
            }
        });
    }
}

impl Default for PerformanceTracker {
    fn default() -> Self {
        Self::in_memory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{MokaWeightCache, RecordingTelemetry};
    use crate::domain::errors::{LearningError, LearningResult};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct BrokenCache;

    /// Delays the first write so it would finish after later ones.
    struct SlowFirstWrite {
        inner: MokaWeightCache,
        first: AtomicBool,
    }

    #[async_trait]
    impl WeightCache for SlowFirstWrite {
        async fn get(&self, key: &str) -> LearningResult<Option<String>> {
            self.inner.get(key).await
        }

        async fn set_with_ttl(&self, key: &str, value: String, ttl: Duration) -> LearningResult<()> {
            if self.first.swap(false, Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            self.inner.set_with_ttl(key, value, ttl).await
        }

        async fn delete(&self, key: &str) -> LearningResult<()> {
            self.inner.delete(key).await
        }
    }

    #[async_trait]
    impl WeightCache for BrokenCache {
        async fn get(&self, _key: &str) -> LearningResult<Option<String>> {
            Err(LearningError::CacheUnavailable("down".into()))
        }

        async fn set_with_ttl(&self, _key: &str, _value: String, _ttl: Duration) -> LearningResult<()> {
            Err(LearningError::CacheUnavailable("down".into()))
        }

        async fn delete(&self, _key: &str) -> LearningResult<()> {
            Err(LearningError::CacheUnavailable("down".into()))
        }
    }

    fn ctx() -> ContextKey {
        ContextKey::new().with_industry("retail")
    }

    #[tokio::test]
    async fn test_empty_performance_is_zeroed() {
        let tracker = PerformanceTracker::in_memory();
        let record = tracker.get_performance("t", ServiceType::Risk, &ctx()).await;
        assert_eq!(record.total_predictions, 0);
        assert!(record.accuracy().abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_tracks_overall_and_per_component() {
        let tracker = PerformanceTracker::in_memory();
        tracker.track_performance("t", ServiceType::Risk, &ctx(), "ml", true).await;
        tracker.track_performance("t", ServiceType::Risk, &ctx(), "ml", false).await;
        tracker.track_performance("t", ServiceType::Risk, &ctx(), "rules", true).await;

        let record = tracker.get_performance("t", ServiceType::Risk, &ctx()).await;
        assert_eq!(record.total_predictions, 3);
        assert_eq!(record.correct_predictions, 2);
        assert_eq!(record.components["ml"].total, 2);
        assert!((record.components["ml"].accuracy() - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_mirrors_to_cache_for_other_instances() {
        let cache: Arc<dyn WeightCache> = Arc::new(MokaWeightCache::new());
        let tracker = PerformanceTracker::new(Some(Arc::clone(&cache)));
        tracker.track_performance("t", ServiceType::Forecast, &ctx(), "llm", true).await;

        let key = keys::performance_cache("t", ServiceType::Forecast, &ctx());
        let mut mirrored = None;
        for _ in 0..50 {
            if let Some(raw) = cache.get(&key).await.unwrap() {
                mirrored = Some(raw);
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(mirrored.is_some(), "background mirror never landed");

        let other = PerformanceTracker::new(Some(cache));
        let record = other.get_performance("t", ServiceType::Forecast, &ctx()).await;
        assert_eq!(record.total_predictions, 1);
    }

    #[tokio::test]
    async fn test_cache_failure_never_reaches_caller() {
        let telemetry = Arc::new(RecordingTelemetry::new());
        let tracker = PerformanceTracker::new(Some(Arc::new(BrokenCache) as Arc<dyn WeightCache>))
            .with_telemetry(telemetry.clone());

        let record = tracker.track_performance("t", ServiceType::Risk, &ctx(), "ml", true).await;
        assert_eq!(record.total_predictions, 1);
        assert!(!telemetry.exceptions().is_empty());

        let empty = tracker.get_performance("other", ServiceType::Risk, &ctx()).await;
        assert_eq!(empty.total_predictions, 0);
    }

    #[tokio::test]
    async fn test_slow_mirror_write_never_leaves_older_count() {
        let cache = Arc::new(SlowFirstWrite {
            inner: MokaWeightCache::new(),
            first: AtomicBool::new(true),
        });
        let tracker = PerformanceTracker::new(Some(cache.clone() as Arc<dyn WeightCache>));
        tracker.track_performance("t", ServiceType::Risk, &ctx(), "ml", true).await;
        tracker.track_performance("t", ServiceType::Risk, &ctx(), "ml", false).await;

        tokio::time::sleep(Duration::from_millis(150)).await;

        let other = PerformanceTracker::new(Some(cache as Arc<dyn WeightCache>));
        let record = other.get_performance("t", ServiceType::Risk, &ctx()).await;
        assert_eq!(record.total_predictions, 2);
    }
}
