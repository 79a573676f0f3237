//! Versioned JSON document storage.
//!
//! Documents live in named collections and are addressed by string id.
//! Every write bumps the document version; replacements must name the
//! version they were read at, which gives callers optimistic concurrency.
//! Numeric fields can be adjusted with a guarded atomic update so that
//! counters such as stock levels never go through read-then-write.

pub mod document;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod store;

pub use document::{Document, Version};
pub use error::{Result, StoreError};
pub use memory::InMemoryDocumentStore;
pub use postgres::PostgresDocumentStore;
pub use query::{DocumentQuery, Filter};
pub use store::{DocumentStore, DocumentStoreExt, FieldUpdate};
