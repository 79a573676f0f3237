//! Shared identifiers and actor types used across the marketplace crates.

pub mod actor;
pub mod types;

pub use actor::{Actor, ParseRoleError, Role};
pub use types::{OrderId, ProductId, UserId};
