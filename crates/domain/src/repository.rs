//! Load-mutate-save infrastructure over the document store.

use std::marker::PhantomData;

use document_store::{DocumentQuery, DocumentStore, DocumentStoreExt, Version};

use crate::entity::Entity;
use crate::error::DomainError;

/// An entity together with the version it was read at.
#[derive(Debug, Clone)]
pub struct Loaded<E> {
    /// The decoded entity.
    pub entity: E,

    /// Version to present when writing the entity back.
    pub version: Version,
}

/// Typed access to one collection of entities.
///
/// Every write of an existing entity is a replace guarded by the version it
/// was loaded at, so two concurrent load-mutate-save cycles cannot both win.
pub struct Repository<S, E> {
    store: S,
    _phantom: PhantomData<fn() -> E>,
}

impl<S: Clone, E> Clone for Repository<S, E> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            _phantom: PhantomData,
        }
    }
}

impl<S, E> Repository<S, E>
where
    S: DocumentStore,
    E: Entity,
{
    /// Creates a new repository over the given store.
    pub fn new(store: S) -> Self {
        Self {
            store,
            _phantom: PhantomData,
        }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Loads an entity, returning None if it doesn't exist.
    pub async fn load(&self, id: &str) -> Result<Option<Loaded<E>>, DomainError> {
        let Some(doc) = self.store.get(E::COLLECTION, id).await? else {
            return Ok(None);
        };
        let version = doc.version;
        Ok(Some(Loaded {
            entity: doc.into_decoded()?,
            version,
        }))
    }

    /// Loads an entity, failing with `NotFound` if it doesn't exist.
    pub async fn load_required(&self, id: &str) -> Result<Loaded<E>, DomainError> {
        self.load(id)
            .await?
            .ok_or_else(|| DomainError::not_found(E::entity_name(), id))
    }

    /// Stores a brand-new entity.
    pub async fn insert(&self, entity: E) -> Result<Loaded<E>, DomainError> {
        let doc = self
            .store
            .insert_value(E::COLLECTION, &entity.key(), &entity)
            .await?;
        Ok(Loaded {
            entity,
            version: doc.version,
        })
    }

    /// Writes an entity back, requiring it to still be at `expected`.
    pub async fn save(&self, entity: &E, expected: Version) -> Result<Version, DomainError> {
        let doc = self
            .store
            .replace_value(E::COLLECTION, &entity.key(), entity, expected)
            .await?;
        Ok(doc.version)
    }

    /// Loads an entity, applies `mutate` and persists the result.
    ///
    /// Nothing is written when `mutate` fails.
    pub async fn execute<F, R>(&self, id: &str, mutate: F) -> Result<(Loaded<E>, R), DomainError>
    where
        F: FnOnce(&mut E) -> Result<R, DomainError>,
    {
        let mut loaded = self.load_required(id).await?;
        let outcome = mutate(&mut loaded.entity)?;
        loaded.version = self.save(&loaded.entity, loaded.version).await?;
        Ok((loaded, outcome))
    }

    /// Hard-deletes an entity. Returns whether it existed.
    pub async fn delete(&self, id: &str) -> Result<bool, DomainError> {
        Ok(self.store.delete(E::COLLECTION, id).await?)
    }

    /// Returns all entities matching the query.
    pub async fn find(&self, query: DocumentQuery) -> Result<Vec<E>, DomainError> {
        let docs = self.store.find(E::COLLECTION, query).await?;
        docs.into_iter()
            .map(|doc| doc.into_decoded().map_err(DomainError::from))
            .collect()
    }

    /// Counts entities matching the query.
    pub async fn count(&self, query: DocumentQuery) -> Result<usize, DomainError> {
        Ok(self.store.count(E::COLLECTION, query).await?)
    }
}
