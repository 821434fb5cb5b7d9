use async_trait::async_trait;

use crate::domain::errors::LearningResult;

/// Feature-flag provider consulted by the rollout kill switch.
#[async_trait]
pub trait FeatureFlags: Send + Sync {
    async fn is_enabled(&self, flag_name: &str, tenant_id: &str) -> LearningResult<bool>;
}
