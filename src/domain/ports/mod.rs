//! Port trait definitions (Hexagonal Architecture)
//!
//! This module defines the interfaces that infrastructure adapters must implement:
//! - DocumentStore: partitioned documents with conditional upsert
//! - WeightCache: TTL string cache
//! - FeatureFlags: kill-switch provider
//! - Telemetry: fire-and-forget events
//! - Clock: injectable time source

pub mod cache;
pub mod clock;
pub mod document_store;
pub mod feature_flags;
pub mod telemetry;

pub use cache::WeightCache;
pub use clock::{Clock, ManualClock, SystemClock};
pub use document_store::{Document, DocumentStore};
pub use feature_flags::FeatureFlags;
pub use telemetry::{props, EventProps, NullTelemetry, Telemetry};
