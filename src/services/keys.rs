//! Document ids and cache keys.
//!
//! Documents are partitioned by tenant id, so document ids only carry the
//! service and context. Cache keys share one namespace and carry the tenant.

use uuid::Uuid;

use crate::domain::models::{ContextKey, ServiceType};

pub fn weights_doc(service_type: ServiceType, context: &ContextKey) -> String {
    format!("weights:{service_type}:{context}")
}

pub fn validation_doc(service_type: ServiceType, context: &ContextKey) -> String {
    format!("validation:{service_type}:{context}")
}

pub fn trust_doc(service_type: ServiceType, context: &ContextKey) -> String {
    format!("trust:{service_type}:{context}")
}

pub fn rollback_doc(service_type: ServiceType, context: &ContextKey) -> String {
    format!("rollback:{service_type}:{context}")
}

pub fn prediction_doc(prediction_id: Uuid) -> String {
    format!("prediction:{prediction_id}")
}

pub fn weights_cache(tenant_id: &str, service_type: ServiceType, context: &ContextKey) -> String {
    format!("learned_weights:{tenant_id}:{service_type}:{context}")
}

pub fn performance_cache(tenant_id: &str, service_type: ServiceType, context: &ContextKey) -> String {
    format!("performance:{tenant_id}:{service_type}:{context}")
}

pub fn trust_cache(tenant_id: &str, service_type: ServiceType, context: &ContextKey) -> String {
    format!("trust_scores:{tenant_id}:{service_type}:{context}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_scoped() {
        let ctx = ContextKey::new().with_industry("retail");
        assert_eq!(weights_doc(ServiceType::Risk, &ctx), "weights:risk:retail:any:any");
        assert_eq!(
            weights_cache("t-1", ServiceType::Forecast, &ctx),
            "learned_weights:t-1:forecast:retail:any:any"
        );
        assert_ne!(
            weights_cache("t-1", ServiceType::Risk, &ctx),
            weights_cache("t-2", ServiceType::Risk, &ctx)
        );
    }
}
