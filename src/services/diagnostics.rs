use std::sync::Arc;

use crate::domain::errors::LearningError;
use crate::domain::models::{ContextKey, ServiceType};
use crate::domain::ports::{EventProps, NullTelemetry, Telemetry};

/// Telemetry sink shared by the services.
///
/// With no sink configured, events go to [`NullTelemetry`] and failures are
/// only logged.
#[derive(Clone)]
pub struct Diagnostics {
    telemetry: Arc<dyn Telemetry>,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self {
            telemetry: Arc::new(NullTelemetry),
        }
    }
}

impl Diagnostics {
    pub fn new(telemetry: Option<Arc<dyn Telemetry>>) -> Self {
        telemetry.map_or_else(Self::default, |telemetry| Self { telemetry })
    }

    pub fn event(&self, name: &str, props: EventProps) {
        self.telemetry.track_event(name, props);
    }

    /// Log a degraded operation and forward it as an exception.
    pub fn failure(&self, operation: &str, error: &LearningError, mut props: EventProps) {
        tracing::warn!(operation, error = %error, error_kind = error.kind(), "Operation degraded");
        props.insert("operation".to_string(), operation.to_string());
        self.telemetry.track_exception(error, props);
    }
}

impl std::fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Diagnostics").finish_non_exhaustive()
    }
}

/// Standard identifying properties for a learning context.
pub fn context_props(tenant_id: &str, service_type: ServiceType, context: &ContextKey) -> EventProps {
    let mut props = EventProps::new();
    props.insert("tenant_id".to_string(), tenant_id.to_string());
    props.insert("service_type".to_string(), service_type.to_string());
    props.insert("context_key".to_string(), context.as_key());
    props
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::RecordingTelemetry;

    #[test]
    fn test_without_sink_is_noop() {
        let diagnostics = Diagnostics::default();
        diagnostics.event("x", EventProps::new());
        diagnostics.failure("op", &LearningError::StoreUnavailable("x".into()), EventProps::new());
    }

    #[test]
    fn test_failure_tags_operation() {
        let telemetry = Arc::new(RecordingTelemetry::new());
        let diagnostics = Diagnostics::new(Some(telemetry.clone() as Arc<dyn Telemetry>));
        diagnostics.failure(
            "get_weights",
            &LearningError::CacheUnavailable("x".into()),
            context_props("t", ServiceType::Risk, &ContextKey::new()),
        );

        let exceptions = telemetry.exceptions();
        assert_eq!(exceptions.len(), 1);
        assert_eq!(exceptions[0].props["operation"], "get_weights");
        assert_eq!(exceptions[0].props["tenant_id"], "t");
    }
}
