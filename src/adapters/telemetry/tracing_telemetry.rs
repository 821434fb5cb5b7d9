use crate::domain::errors::LearningError;
use crate::domain::ports::{EventProps, Telemetry};

/// Forwards telemetry to the `tracing` subscriber as structured log lines.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTelemetry;

impl Telemetry for TracingTelemetry {
    fn track_event(&self, name: &str, props: EventProps) {
        tracing::info!(
            target: "adaptive_weights::telemetry",
            event = name,
            props = ?props,
            "telemetry event"
        );
    }

    fn track_exception(&self, error: &LearningError, props: EventProps) {
        tracing::warn!(
            target: "adaptive_weights::telemetry",
            error = %error,
            error_kind = error.kind(),
            props = ?props,
            "telemetry exception"
        );
    }
}
