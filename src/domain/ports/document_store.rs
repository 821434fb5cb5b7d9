//! Document store port.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::errors::LearningResult;

/// A stored document. `version` is assigned by the store on every write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Partition key (the tenant id).
    pub partition: String,
    pub id: String,
    pub version: u64,
    pub body: serde_json::Value,
}

impl Document {
    /// A document that has not been written yet.
    pub fn unsaved(partition: impl Into<String>, id: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            partition: partition.into(),
            id: id.into(),
            version: 0,
            body,
        }
    }
}

/// Repository interface for partitioned JSON documents.
///
/// `upsert` with an expected version is the compare-and-swap primitive that
/// all read-modify-write updates go through.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Get a document by partition and id.
    async fn get(&self, partition: &str, id: &str) -> LearningResult<Option<Document>>;

    /// List documents in a partition whose id starts with `id_prefix`.
    async fn query_partition(&self, partition: &str, id_prefix: &str) -> LearningResult<Vec<Document>>;

    /// Create a document; fails with `ConcurrentUpdateConflict` if it exists.
    async fn create(&self, document: Document) -> LearningResult<Document>;

    /// Write a document if its current version matches `expected_version`.
    ///
    /// `None` means "must not exist yet". `Some(v)` means "must currently be
    /// at version `v`". Returns the stored document with its new version.
    async fn upsert(&self, document: Document, expected_version: Option<u64>) -> LearningResult<Document>;

    /// Delete a document. Deleting a missing document is not an error.
    async fn delete(&self, partition: &str, id: &str) -> LearningResult<()>;
}
