//! Telemetry sinks.

pub mod recording;
pub mod tracing_telemetry;

pub use recording::{RecordedEvent, RecordingTelemetry};
pub use tracing_telemetry::TracingTelemetry;
