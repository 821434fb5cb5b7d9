//! Typed access to the document store and optimistic read-modify-write.

use rand::Rng;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

use crate::domain::errors::{LearningError, LearningResult};
use crate::domain::models::RetryConfig;
use crate::domain::ports::{Document, DocumentStore};

/// A deserialized document with the version it was read at.
#[derive(Debug, Clone)]
pub struct Loaded<T> {
    pub value: T,
    pub version: u64,
}

/// Result of [`update`].
#[derive(Debug, Clone)]
pub struct Updated<T> {
    pub value: T,
    pub version: u64,
    pub attempts: u32,
}

pub async fn load<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    partition: &str,
    id: &str,
) -> LearningResult<Option<Loaded<T>>> {
    match store.get(partition, id).await? {
        Some(doc) => Ok(Some(Loaded {
            value: serde_json::from_value(doc.body)?,
            version: doc.version,
        })),
        None => Ok(None),
    }
}

/// Conditionally write `value`; returns the new version.
pub async fn save<T: Serialize + Sync>(
    store: &dyn DocumentStore,
    partition: &str,
    id: &str,
    value: &T,
    expected_version: Option<u64>,
) -> LearningResult<u64> {
    let doc = Document::unsaved(partition, id, serde_json::to_value(value)?);
    Ok(store.upsert(doc, expected_version).await?.version)
}

/// Read, mutate and conditionally write a document, retrying on conflict.
///
/// `mutate` receives the current value (or `None`) and returns the value to
/// store; returning an error aborts without writing. A conflict on the last
/// attempt is returned as `ConcurrentUpdateConflict`.
pub async fn update<T, F>(
    store: &dyn DocumentStore,
    retry: &RetryConfig,
    partition: &str,
    id: &str,
    mut mutate: F,
) -> LearningResult<Updated<T>>
where
    T: Serialize + DeserializeOwned + Send + Sync,
    F: FnMut(Option<T>) -> LearningResult<T> + Send,
{
    let max_attempts = retry.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        let current = load::<T>(store, partition, id).await?;
        let expected = current.as_ref().map(|loaded| loaded.version);
        let next = mutate(current.map(|loaded| loaded.value))?;

        match save(store, partition, id, &next, expected).await {
            Ok(version) => {
                return Ok(Updated {
                    value: next,
                    version,
                    attempts: attempt,
                })
            }
            Err(err) if err.is_conflict() && attempt < max_attempts => {
                let delay = backoff_delay(retry, attempt);
                debug!(
                    partition,
                    id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Document update conflicted, retrying"
                );
                sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Exponential backoff with full jitter, capped at `max_backoff_ms`.
fn backoff_delay(retry: &RetryConfig, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    let base = retry
        .initial_backoff_ms
        .saturating_mul(1_u64 << exponent)
        .min(retry.max_backoff_ms);
    if base == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..=base))
}

/// Deserialize a cached JSON value, treating garbage as a miss.
pub fn decode_cached<T: DeserializeOwned>(raw: &str) -> Option<T> {
    serde_json::from_str(raw).ok()
}

pub fn encode<T: Serialize>(value: &T) -> LearningResult<String> {
    serde_json::to_string(value).map_err(LearningError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryDocumentStore;
    use serde::Deserialize;
    use std::sync::Arc;

    #[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
    struct Counter {
        value: u64,
    }

    fn fast_retry(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_backoff_ms: 1,
            max_backoff_ms: 4,
        }
    }

    #[tokio::test]
    async fn test_update_creates_then_increments() {
        let store = InMemoryDocumentStore::new();
        let retry = fast_retry(3);

        let first = update(&store, &retry, "t", "counter", |c: Option<Counter>| {
            let mut c = c.unwrap_or_default();
            c.value += 1;
            Ok(c)
        })
        .await
        .unwrap();
        assert_eq!(first.value.value, 1);
        assert_eq!(first.version, 1);

        let second = update(&store, &retry, "t", "counter", |c: Option<Counter>| {
            let mut c = c.unwrap_or_default();
            c.value += 1;
            Ok(c)
        })
        .await
        .unwrap();
        assert_eq!(second.value.value, 2);
        assert_eq!(second.version, 2);
    }

    #[tokio::test]
    async fn test_mutate_error_aborts_write() {
        let store = InMemoryDocumentStore::new();
        let result = update(&store, &fast_retry(3), "t", "x", |_: Option<Counter>| {
            Err(LearningError::InvalidInput("nope".into()))
        })
        .await;
        assert!(matches!(result, Err(LearningError::InvalidInput(_))));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_concurrent_updates_lose_nothing() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let retry = fast_retry(100);

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let store = Arc::clone(&store);
                let retry = retry.clone();
                tokio::spawn(async move {
                    update(store.as_ref(), &retry, "t", "counter", |c: Option<Counter>| {
                        let mut c = c.unwrap_or_default();
                        c.value += 1;
                        Ok(c)
                    })
                    .await
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let loaded: Loaded<Counter> = load(store.as_ref(), "t", "counter").await.unwrap().unwrap();
        assert_eq!(loaded.value.value, 20);
    }

    #[test]
    fn test_backoff_is_capped() {
        let retry = RetryConfig {
            max_attempts: 10,
            initial_backoff_ms: 10,
            max_backoff_ms: 50,
        };
        for attempt in 1..10 {
            assert!(backoff_delay(&retry, attempt) <= Duration::from_millis(50));
        }
    }

    #[test]
    fn test_decode_cached_garbage_is_miss() {
        assert!(decode_cached::<Counter>("{not json").is_none());
        assert_eq!(decode_cached::<Counter>(r#"{"value":3}"#), Some(Counter { value: 3 }));
    }
}
