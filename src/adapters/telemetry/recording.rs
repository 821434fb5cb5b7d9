//! Telemetry sink that keeps everything it receives, for assertions.

use std::sync::Mutex;

use crate::domain::errors::LearningError;
use crate::domain::ports::{EventProps, Telemetry};

/// One captured event or exception.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedEvent {
    pub name: String,
    pub props: EventProps,
    /// Set for exceptions.
    pub error_kind: Option<&'static str>,
}

#[derive(Debug, Default)]
pub struct RecordingTelemetry {
    events: Mutex<Vec<RecordedEvent>>,
}

impl RecordingTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.lock().clone()
    }

    pub fn events_named(&self, name: &str) -> Vec<RecordedEvent> {
        self.lock().iter().filter(|e| e.name == name).cloned().collect()
    }

    pub fn exceptions(&self) -> Vec<RecordedEvent> {
        self.lock().iter().filter(|e| e.error_kind.is_some()).cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<RecordedEvent>> {
        self.events.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Telemetry for RecordingTelemetry {
    fn track_event(&self, name: &str, props: EventProps) {
        self.lock().push(RecordedEvent {
            name: name.to_string(),
            props,
            error_kind: None,
        });
    }

    fn track_exception(&self, error: &LearningError, props: EventProps) {
        self.lock().push(RecordedEvent {
            name: "exception".to_string(),
            props,
            error_kind: Some(error.kind()),
        });
    }
}
