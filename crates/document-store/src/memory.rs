use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::document::value_at_mut;
use crate::store::validate_path;
use crate::{
    Document, DocumentQuery, Result, StoreError, Version,
    store::{DocumentStore, FieldUpdate},
};

type Key = (String, String);

#[derive(Debug, Default)]
struct Collections {
    documents: HashMap<Key, (u64, Document)>,
    sequences: HashMap<String, i64>,
    inserted: u64,
}

/// In-memory document store implementation.
///
/// All writes go through a single lock, so guarded field updates are
/// atomic with respect to every other operation on the store.
#[derive(Clone, Default)]
pub struct InMemoryDocumentStore {
    inner: Arc<RwLock<Collections>>,
}

impl InMemoryDocumentStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of documents stored across collections.
    pub async fn document_count(&self) -> usize {
        self.inner.read().await.documents.len()
    }

    /// Removes all documents and sequences.
    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        inner.documents.clear();
        inner.sequences.clear();
    }
}

fn key(collection: &str, id: &str) -> Key {
    (collection.to_string(), id.to_string())
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let inner = self.inner.read().await;
        Ok(inner
            .documents
            .get(&key(collection, id))
            .map(|(_, doc)| doc.clone()))
    }

    async fn insert(
        &self,
        collection: &str,
        id: &str,
        body: serde_json::Value,
    ) -> Result<Document> {
        let mut inner = self.inner.write().await;
        let k = key(collection, id);
        if inner.documents.contains_key(&k) {
            return Err(StoreError::AlreadyExists {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        }

        let now = Utc::now();
        let doc = Document {
            collection: collection.to_string(),
            id: id.to_string(),
            version: Version::first(),
            created_at: now,
            updated_at: now,
            body,
        };
        inner.inserted += 1;
        let seq = inner.inserted;
        inner.documents.insert(k, (seq, doc.clone()));
        Ok(doc)
    }

    async fn replace(
        &self,
        collection: &str,
        id: &str,
        body: serde_json::Value,
        expected: Version,
    ) -> Result<Document> {
        let mut inner = self.inner.write().await;
        let (_, doc) = inner
            .documents
            .get_mut(&key(collection, id))
            .ok_or_else(|| StoreError::not_found(collection, id))?;

        if doc.version != expected {
            return Err(StoreError::ConcurrencyConflict {
                collection: collection.to_string(),
                id: id.to_string(),
                expected,
                actual: doc.version,
            });
        }

        doc.body = body;
        doc.version = doc.version.next();
        doc.updated_at = Utc::now();
        Ok(doc.clone())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool> {
        let mut inner = self.inner.write().await;
        Ok(inner.documents.remove(&key(collection, id)).is_some())
    }

    async fn find(&self, collection: &str, query: DocumentQuery) -> Result<Vec<Document>> {
        let inner = self.inner.read().await;
        let mut matching: Vec<_> = inner
            .documents
            .iter()
            .filter(|((c, _), (_, doc))| c == collection && query.matches(&doc.body))
            .map(|(_, (seq, doc))| (*seq, doc.clone()))
            .collect();

        matching.sort_by(|(seq_a, a), (seq_b, b)| {
            a.created_at.cmp(&b.created_at).then(seq_a.cmp(seq_b))
        });
        if query.newest_first {
            matching.reverse();
        }

        let offset = query.offset.unwrap_or(0);
        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(matching
            .into_iter()
            .map(|(_, doc)| doc)
            .skip(offset)
            .take(limit)
            .collect())
    }

    async fn count(&self, collection: &str, query: DocumentQuery) -> Result<usize> {
        let inner = self.inner.read().await;
        Ok(inner
            .documents
            .iter()
            .filter(|((c, _), (_, doc))| c == collection && query.matches(&doc.body))
            .count())
    }

    async fn add_to_field(
        &self,
        collection: &str,
        id: &str,
        path: &str,
        delta: i64,
        floor: Option<i64>,
    ) -> Result<FieldUpdate> {
        if !validate_path(path) {
            return Err(StoreError::InvalidPath(path.to_string()));
        }

        let mut inner = self.inner.write().await;
        let (_, doc) = inner
            .documents
            .get_mut(&key(collection, id))
            .ok_or_else(|| StoreError::not_found(collection, id))?;

        let not_numeric = || StoreError::NotNumeric {
            collection: collection.to_string(),
            id: id.to_string(),
            field: path.to_string(),
        };

        let slot = value_at_mut(&mut doc.body, path).ok_or_else(not_numeric)?;
        let current = slot.as_i64().ok_or_else(not_numeric)?;
        let updated = current + delta;

        if let Some(floor) = floor
            && updated < floor
        {
            return Ok(FieldUpdate::Rejected { current });
        }

        *slot = serde_json::Value::from(updated);
        doc.version = doc.version.next();
        doc.updated_at = Utc::now();
        Ok(FieldUpdate::Applied(doc.clone()))
    }

    async fn next_sequence(&self, name: &str) -> Result<i64> {
        let mut inner = self.inner.write().await;
        let value = inner.sequences.entry(name.to_string()).or_insert(0);
        *value += 1;
        Ok(*value)
    }
}
