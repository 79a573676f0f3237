//! Store wrapper that fails selected writes, for exercising recovery paths.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use document_store::{
    Document, DocumentQuery, DocumentStore, FieldUpdate, InMemoryDocumentStore, Result, StoreError,
    Version,
};

#[derive(Debug, Default)]
struct Faults {
    /// Successful stock increments left before the next one fails.
    increments_before_failure: Option<usize>,
    fail_replace_in: Option<&'static str>,
}

/// In-memory store with switchable write failures.
#[derive(Clone, Default)]
pub(crate) struct FaultyStore {
    inner: InMemoryDocumentStore,
    faults: Arc<Mutex<Faults>>,
}

impl FaultyStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Lets `n` positive `add_to_field` calls through, then fails the next one once.
    pub(crate) fn fail_increment_after(&self, n: usize) {
        self.faults.lock().unwrap().increments_before_failure = Some(n);
    }

    /// Fails every `replace` in `collection` until cleared.
    pub(crate) fn fail_replace_in(&self, collection: Option<&'static str>) {
        self.faults.lock().unwrap().fail_replace_in = collection;
    }

    fn unavailable() -> StoreError {
        StoreError::Database(sqlx::Error::PoolTimedOut)
    }
}

#[async_trait]
impl DocumentStore for FaultyStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        self.inner.get(collection, id).await
    }

    async fn insert(&self, collection: &str, id: &str, body: serde_json::Value) -> Result<Document> {
        self.inner.insert(collection, id, body).await
    }

    async fn replace(
        &self,
        collection: &str,
        id: &str,
        body: serde_json::Value,
        expected: Version,
    ) -> Result<Document> {
        if self.faults.lock().unwrap().fail_replace_in == Some(collection) {
            return Err(Self::unavailable());
        }
        self.inner.replace(collection, id, body, expected).await
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool> {
        self.inner.delete(collection, id).await
    }

    async fn find(&self, collection: &str, query: DocumentQuery) -> Result<Vec<Document>> {
        self.inner.find(collection, query).await
    }

    async fn count(&self, collection: &str, query: DocumentQuery) -> Result<usize> {
        self.inner.count(collection, query).await
    }

    async fn add_to_field(
        &self,
        collection: &str,
        id: &str,
        path: &str,
        delta: i64,
        floor: Option<i64>,
    ) -> Result<FieldUpdate> {
        if delta > 0 {
            let mut faults = self.faults.lock().unwrap();
            match faults.increments_before_failure {
                Some(0) => {
                    faults.increments_before_failure = None;
                    return Err(Self::unavailable());
                }
                Some(n) => faults.increments_before_failure = Some(n - 1),
                None => {}
            }
        }
        self.inner
            .add_to_field(collection, id, path, delta, floor)
            .await
    }

    async fn next_sequence(&self, name: &str) -> Result<i64> {
        self.inner.next_sequence(name).await
    }
}
