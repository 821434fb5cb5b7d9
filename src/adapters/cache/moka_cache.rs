//! `WeightCache` backed by a moka future cache with per-entry TTL.

use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;
use std::time::{Duration, Instant};

use crate::domain::errors::LearningResult;
use crate::domain::ports::WeightCache;

/// Default maximum number of cached entries.
const DEFAULT_MAX_CAPACITY: u64 = 10_000;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    ttl: Duration,
}

/// Expires each entry after the TTL it was written with.
struct PerEntryTtl;

impl Expiry<String, Entry> for PerEntryTtl {
    fn expire_after_create(&self, _key: &String, value: &Entry, _created_at: Instant) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-process TTL cache.
#[derive(Clone)]
pub struct MokaWeightCache {
    entries: Cache<String, Entry>,
}

impl MokaWeightCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_CAPACITY)
    }

    pub fn with_capacity(max_capacity: u64) -> Self {
        let entries = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(PerEntryTtl)
            .build();
        Self { entries }
    }
}

impl Default for MokaWeightCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WeightCache for MokaWeightCache {
    async fn get(&self, key: &str) -> LearningResult<Option<String>> {
        Ok(self.entries.get(key).await.map(|entry| entry.value))
    }

    async fn set_with_ttl(&self, key: &str, value: String, ttl: Duration) -> LearningResult<()> {
        self.entries.insert(key.to_string(), Entry { value, ttl }).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> LearningResult<()> {
        self.entries.invalidate(key).await;
        Ok(())
    }
}
