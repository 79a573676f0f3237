use thiserror::Error;

use crate::Version;

/// Errors that can occur when interacting with the document store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The document was modified since it was read.
    #[error(
        "Concurrency conflict for {collection}/{id}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        collection: String,
        id: String,
        expected: Version,
        actual: Version,
    },

    /// No document exists under the given id.
    #[error("Document not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    /// A document already exists under the given id.
    #[error("Document already exists: {collection}/{id}")]
    AlreadyExists { collection: String, id: String },

    /// The addressed field is missing or not an integer.
    #[error("Field '{field}' of {collection}/{id} is not an integer")]
    NotNumeric {
        collection: String,
        id: String,
        field: String,
    },

    /// A field path was empty or malformed.
    #[error("Invalid field path: '{0}'")]
    InvalidPath(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub(crate) fn not_found(collection: &str, id: &str) -> Self {
        StoreError::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }
}

/// Result type for document store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
