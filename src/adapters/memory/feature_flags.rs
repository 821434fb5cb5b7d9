use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::domain::errors::LearningResult;
use crate::domain::ports::FeatureFlags;

/// Feature flags held in memory, with per-tenant overrides.
#[derive(Debug, Default)]
pub struct StaticFeatureFlags {
    defaults: RwLock<HashMap<String, bool>>,
    overrides: RwLock<HashMap<(String, String), bool>>,
}

impl StaticFeatureFlags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a flag for every tenant without an override.
    pub async fn set(&self, flag_name: &str, enabled: bool) {
        self.defaults.write().await.insert(flag_name.to_string(), enabled);
    }

    pub async fn set_for_tenant(&self, flag_name: &str, tenant_id: &str, enabled: bool) {
        self.overrides
            .write()
            .await
            .insert((flag_name.to_string(), tenant_id.to_string()), enabled);
    }
}

#[async_trait]
impl FeatureFlags for StaticFeatureFlags {
    async fn is_enabled(&self, flag_name: &str, tenant_id: &str) -> LearningResult<bool> {
        let key = (flag_name.to_string(), tenant_id.to_string());
        if let Some(enabled) = self.overrides.read().await.get(&key) {
            return Ok(*enabled);
        }
        Ok(self.defaults.read().await.get(flag_name).copied().unwrap_or(false))
    }
}
