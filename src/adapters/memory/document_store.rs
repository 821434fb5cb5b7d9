//! In-memory document store with versioned conditional writes.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use crate::domain::errors::{LearningError, LearningResult};
use crate::domain::ports::{Document, DocumentStore};

/// An in-process [`DocumentStore`].
///
/// Every write bumps the document version; `upsert` compares versions under
/// the write lock, so concurrent read-modify-write cycles either succeed or
/// see a `ConcurrentUpdateConflict`.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    documents: RwLock<BTreeMap<(String, String), Document>>,
    unavailable: AtomicBool,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: every call fails with `StoreUnavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }

    fn check_available(&self) -> LearningResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(LearningError::StoreUnavailable(
                "in-memory store marked unavailable".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

fn key_of(partition: &str, id: &str) -> (String, String) {
    (partition.to_string(), id.to_string())
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get(&self, partition: &str, id: &str) -> LearningResult<Option<Document>> {
        self.check_available()?;
        let documents = self.documents.read().await;
        Ok(documents.get(&key_of(partition, id)).cloned())
    }

    async fn query_partition(&self, partition: &str, id_prefix: &str) -> LearningResult<Vec<Document>> {
        self.check_available()?;
        let documents = self.documents.read().await;
        Ok(documents
            .iter()
            .filter(|((p, id), _)| p == partition && id.starts_with(id_prefix))
            .map(|(_, doc)| doc.clone())
            .collect())
    }

    async fn create(&self, document: Document) -> LearningResult<Document> {
        self.upsert(document, None).await
    }

    async fn upsert(&self, mut document: Document, expected_version: Option<u64>) -> LearningResult<Document> {
        self.check_available()?;
        let mut documents = self.documents.write().await;
        let key = key_of(&document.partition, &document.id);
        let actual = documents.get(&key).map(|doc| doc.version);

        if actual != expected_version {
            return Err(LearningError::ConcurrentUpdateConflict {
                key: format!("{}/{}", key.0, key.1),
                expected: expected_version,
                actual,
            });
        }

        document.version = actual.unwrap_or(0) + 1;
        documents.insert(key, document.clone());
        Ok(document)
    }

    async fn delete(&self, partition: &str, id: &str) -> LearningResult<()> {
        self.check_available()?;
        let mut documents = self.documents.write().await;
        documents.remove(&key_of(partition, id));
        Ok(())
    }
}
