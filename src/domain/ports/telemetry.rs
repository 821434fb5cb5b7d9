//! Telemetry port and its no-op implementation.

use std::collections::BTreeMap;

use crate::domain::errors::LearningError;

/// Event properties.
pub type EventProps = BTreeMap<String, String>;

/// Build [`EventProps`] from `(key, value)` pairs.
pub fn props<I, K, V>(pairs: I) -> EventProps
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: ToString,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.to_string()))
        .collect()
}

/// Fire-and-forget telemetry sink.
///
/// Implementations must not block and must not fail; correctness never
/// depends on an event being delivered.
pub trait Telemetry: Send + Sync {
    fn track_event(&self, name: &str, props: EventProps);

    fn track_exception(&self, error: &LearningError, props: EventProps);
}

/// A telemetry sink that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTelemetry;

impl Telemetry for NullTelemetry {
    fn track_event(&self, _name: &str, _props: EventProps) {}

    fn track_exception(&self, _error: &LearningError, _props: EventProps) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_props_builder() {
        let p = props([("tenant_id", "t-1"), ("examples", "3")]);
        assert_eq!(p.get("tenant_id").map(String::as_str), Some("t-1"));
        assert_eq!(p.len(), 2);
    }
}
