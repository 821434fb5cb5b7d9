//! TTL cache port.

use async_trait::async_trait;
use std::time::Duration;

use crate::domain::errors::LearningResult;

/// String cache with per-entry expiry.
///
/// Entries are soft state: every value must be reconstructable from the
/// document store.
#[async_trait]
pub trait WeightCache: Send + Sync {
    async fn get(&self, key: &str) -> LearningResult<Option<String>>;

    async fn set_with_ttl(&self, key: &str, value: String, ttl: Duration) -> LearningResult<()>;

    async fn delete(&self, key: &str) -> LearningResult<()>;
}
