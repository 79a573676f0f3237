//! Domain error types.

use document_store::StoreError;
use thiserror::Error;

use crate::cart::CartError;
use crate::catalog::CatalogError;
use crate::order::OrderError;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// A catalog rule was violated.
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// A cart rule was violated.
    #[error(transparent)]
    Cart(#[from] CartError),

    /// An order rule was violated.
    #[error(transparent)]
    Order(#[from] OrderError),

    /// The addressed entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The caller is not allowed to act on behalf of this resource owner.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The caller's role or ownership does not permit the operation.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Request data failed validation.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// An error occurred in the document store.
    #[error("Document store error: {0}")]
    Store(#[from] StoreError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Coarse classification of a [`DomainError`], used by outer layers to pick
/// a response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Unauthorized,
    Forbidden,
    InvalidInput,
    InvalidTransition,
    InsufficientStock,
    AlreadyTerminal,
    Conflict,
    Internal,
}

impl DomainError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        DomainError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Returns the taxonomy bucket this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::Catalog(e) => match e {
                CatalogError::InsufficientStock { .. } => ErrorKind::InsufficientStock,
                _ => ErrorKind::InvalidInput,
            },
            DomainError::Cart(e) => match e {
                CartError::ItemNotFound { .. } => ErrorKind::NotFound,
                _ => ErrorKind::InvalidInput,
            },
            DomainError::Order(e) => match e {
                OrderError::InvalidTransition { .. } | OrderError::NotCancellable { .. } => {
                    ErrorKind::InvalidTransition
                }
                OrderError::AlreadyTerminal { .. } => ErrorKind::AlreadyTerminal,
                _ => ErrorKind::InvalidInput,
            },
            DomainError::NotFound { .. } => ErrorKind::NotFound,
            DomainError::Unauthorized(_) => ErrorKind::Unauthorized,
            DomainError::Forbidden(_) => ErrorKind::Forbidden,
            DomainError::InvalidInput(_) => ErrorKind::InvalidInput,
            DomainError::Store(StoreError::NotFound { .. }) => ErrorKind::NotFound,
            DomainError::Store(StoreError::ConcurrencyConflict { .. })
            | DomainError::Store(StoreError::AlreadyExists { .. }) => ErrorKind::Conflict,
            DomainError::Store(_) | DomainError::Serialization(_) => ErrorKind::Internal,
        }
    }
}
