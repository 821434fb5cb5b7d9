//! Common test utilities for integration tests
//!
//! Provides a fully wired learning loop over in-memory adapters with a
//! manual clock, recording telemetry and controllable feature flags.

#![allow(dead_code)]

use std::sync::Arc;

use adaptive_weights::adapters::{InMemoryDocumentStore, MokaWeightCache, RecordingTelemetry, StaticFeatureFlags};
use adaptive_weights::domain::models::RetryConfig;
use adaptive_weights::domain::ports::{Clock, DocumentStore, FeatureFlags, ManualClock, Telemetry, WeightCache};
use adaptive_weights::{AdaptiveLearningLoop, Config, ContextKey, LoopPorts};
use chrono::Utc;

pub const TENANT: &str = "tenant-a";
pub const ROLLOUT_FLAG: &str = "adaptive-learning-rollout";

/// Setup test logging
///
/// Initializes tracing subscriber for test output.
#[allow(dead_code)]
pub fn setup_test_logging() {
    use tracing_subscriber::fmt;

    let _ = fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Defaults with a seeded bootstrap, a low validation threshold and a
/// retry budget large enough for heavy contention.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.validation.seed = Some(42);
    config.validation.example_threshold = 50;
    config.learning.retry = RetryConfig {
        max_attempts: 200,
        initial_backoff_ms: 1,
        max_backoff_ms: 8,
    };
    config
}

pub fn context() -> ContextKey {
    ContextKey::new()
        .with_industry("technology")
        .with_deal_amount(250_000.0)
        .with_stage("negotiation")
}

pub struct Harness {
    pub store: Arc<InMemoryDocumentStore>,
    pub flags: Arc<StaticFeatureFlags>,
    pub telemetry: Arc<RecordingTelemetry>,
    pub clock: Arc<ManualClock>,
    pub learning: AdaptiveLearningLoop,
}

impl Harness {
    pub fn new(config: &Config) -> Self {
        let store = Arc::new(InMemoryDocumentStore::new());
        let flags = Arc::new(StaticFeatureFlags::new());
        let telemetry = Arc::new(RecordingTelemetry::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));

        let ports = LoopPorts {
            store: Arc::clone(&store) as Arc<dyn DocumentStore>,
            cache: Arc::new(MokaWeightCache::new()) as Arc<dyn WeightCache>,
            flags: Some(Arc::clone(&flags) as Arc<dyn FeatureFlags>),
            telemetry: Some(Arc::clone(&telemetry) as Arc<dyn Telemetry>),
            clock: Arc::clone(&clock) as Arc<dyn Clock>,
        };

        Self {
            store,
            flags,
            telemetry,
            clock,
            learning: AdaptiveLearningLoop::new(config, ports),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(&test_config())
    }
}
