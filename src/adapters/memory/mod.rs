//! In-process adapters for the document store and feature flags.

pub mod document_store;
pub mod feature_flags;

pub use document_store::InMemoryDocumentStore;
pub use feature_flags::StaticFeatureFlags;
