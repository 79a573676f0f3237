//! Core trait for entities persisted as documents.

use serde::{Serialize, de::DeserializeOwned};

/// An entity that lives as a single document in the store.
///
/// The document body is the entity: loading is a decode and saving is a
/// version-checked replace of the whole body.
pub trait Entity: Serialize + DeserializeOwned + Send + Sync {
    /// Collection the entity is stored in.
    const COLLECTION: &'static str;

    /// Human-readable type name used in error messages.
    fn entity_name() -> &'static str;

    /// The document id for this entity.
    fn key(&self) -> String;
}
