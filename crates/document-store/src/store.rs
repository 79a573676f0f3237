use async_trait::async_trait;
use serde::Serialize;

use crate::{Document, DocumentQuery, Result, StoreError, Version};

/// Outcome of a guarded numeric field update.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldUpdate {
    /// The delta was applied; carries the document after the write.
    Applied(Document),

    /// Applying the delta would have crossed the floor; nothing was written.
    Rejected { current: i64 },
}

impl FieldUpdate {
    /// Returns true if the update was written.
    pub fn is_applied(&self) -> bool {
        matches!(self, FieldUpdate::Applied(_))
    }
}

/// Core trait for document store implementations.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Reads a document by id. Returns None if it doesn't exist.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>>;

    /// Inserts a new document at [`Version::first`].
    ///
    /// Fails with `AlreadyExists` if the id is taken.
    async fn insert(&self, collection: &str, id: &str, body: serde_json::Value)
    -> Result<Document>;

    /// Replaces the body of an existing document.
    ///
    /// Fails with `ConcurrencyConflict` unless the stored version equals
    /// `expected`, and with `NotFound` if the document is gone.
    async fn replace(
        &self,
        collection: &str,
        id: &str,
        body: serde_json::Value,
        expected: Version,
    ) -> Result<Document>;

    /// Deletes a document. Returns false if there was nothing to delete.
    async fn delete(&self, collection: &str, id: &str) -> Result<bool>;

    /// Returns the documents of a collection matching the query.
    async fn find(&self, collection: &str, query: DocumentQuery) -> Result<Vec<Document>>;

    /// Counts the documents matching the query, ignoring limit and offset.
    async fn count(&self, collection: &str, query: DocumentQuery) -> Result<usize>;

    /// Atomically adds `delta` to the integer at `path`.
    ///
    /// When `floor` is set the write only happens if the result stays at or
    /// above it; otherwise `FieldUpdate::Rejected` reports the current value.
    /// This is a single conditional write, never a read followed by a write.
    async fn add_to_field(
        &self,
        collection: &str,
        id: &str,
        path: &str,
        delta: i64,
        floor: Option<i64>,
    ) -> Result<FieldUpdate>;

    /// Returns the next value of a named, monotonically increasing sequence.
    ///
    /// The first value of a fresh sequence is 1.
    async fn next_sequence(&self, name: &str) -> Result<i64>;
}

/// Extension trait providing typed convenience methods.
#[async_trait]
pub trait DocumentStoreExt: DocumentStore {
    /// Reads a document, failing with `NotFound` if it doesn't exist.
    async fn get_required(&self, collection: &str, id: &str) -> Result<Document> {
        self.get(collection, id)
            .await?
            .ok_or_else(|| StoreError::not_found(collection, id))
    }

    /// Checks if a document exists.
    async fn exists(&self, collection: &str, id: &str) -> Result<bool> {
        Ok(self.get(collection, id).await?.is_some())
    }

    /// Serializes and inserts a value.
    async fn insert_value<T>(&self, collection: &str, id: &str, value: &T) -> Result<Document>
    where
        T: Serialize + Sync + ?Sized,
    {
        let body = serde_json::to_value(value)?;
        self.insert(collection, id, body).await
    }

    /// Serializes a value and replaces the stored body with it.
    async fn replace_value<T>(
        &self,
        collection: &str,
        id: &str,
        value: &T,
        expected: Version,
    ) -> Result<Document>
    where
        T: Serialize + Sync + ?Sized,
    {
        let body = serde_json::to_value(value)?;
        self.replace(collection, id, body, expected).await
    }
}

// Blanket implementation for all DocumentStore implementations
impl<T: DocumentStore + ?Sized> DocumentStoreExt for T {}

/// Validates a field path before it reaches a backend.
pub(crate) fn validate_path(path: &str) -> bool {
    !path.is_empty() && path.split('.').all(|segment| !segment.is_empty())
}
