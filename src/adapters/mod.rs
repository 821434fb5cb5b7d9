//! Infrastructure adapters for the collaborator ports.

pub mod cache;
pub mod memory;
pub mod telemetry;

pub use cache::MokaWeightCache;
pub use memory::{InMemoryDocumentStore, StaticFeatureFlags};
pub use telemetry::{RecordingTelemetry, TracingTelemetry};
