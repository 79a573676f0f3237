//! Domain layer for the marketplace.
//!
//! This crate holds the rules the rest of the system leans on:
//! - Product catalog with review workflow and guarded stock reservation
//! - Per-buyer carts with line merging and batch edits
//! - Orders with a forward-only delivery state machine
//! - A single role-gated table deciding who may do what to an order

pub mod access;
pub mod cart;
pub mod catalog;
pub mod entity;
pub mod error;
pub mod money;
pub mod order;
pub mod repository;
pub mod settings;

#[cfg(test)]
mod testing;

pub use access::{OrderOperation, Scope, can_transition};
pub use cart::{
    AddMultipleReport, AddOutcome, Cart, CartAddition, CartError, CartItem, CartOperation,
    CartOperationKind, CartService, CartSummary, MergeCandidate, MergePreview,
};
pub use catalog::{
    BulkReviewReport, Catalog, CatalogError, NewProduct, Product, ProductFilter, ProductPage,
    ProductStatus, ReviewDecision, Unit,
};
pub use entity::Entity;
pub use error::{DomainError, ErrorKind};
pub use money::Money;
pub use order::{
    Checkout, CheckoutLine, DeliveryStatus, Order, OrderError, OrderPage, OrderService,
    OrderStatus, PaymentMethod, ShippingAddress,
};
pub use repository::{Loaded, Repository};
pub use settings::{FeeSchedule, MarketSettings};
