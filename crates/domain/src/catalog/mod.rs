//! Product catalog: listings, agent review and stock reservation.

mod product;
mod service;

pub use product::{
    Approval, NewProduct, Product, ProductStatus, ReviewAction, ReviewDecision, ReviewRecord,
    SellerInfo, Unit,
};
pub use service::{
    BulkReviewReport, Catalog, ProductFilter, ProductPage, Reservation, ReviewFailure,
};

use common::ProductId;
use thiserror::Error;

/// Errors raised by catalog rules.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The product exists but cannot be bought in its current status.
    #[error("Product {product_id} is not available for purchase (status: {status})")]
    ProductUnavailable {
        product_id: ProductId,
        status: ProductStatus,
    },

    /// Requested quantity is below the seller's minimum.
    #[error("Minimum order quantity for product {product_id} is {minimum}, requested {requested}")]
    BelowMinimumOrder {
        product_id: ProductId,
        minimum: u32,
        requested: u32,
    },

    /// Not enough stock left to cover the request.
    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: i64,
    },

    /// A listing failed validation.
    #[error("Invalid listing: {0}")]
    InvalidListing(String),

    /// The region is not one the market serves.
    #[error("Unknown region: {0}")]
    UnknownRegion(String),

    /// Rejections must say why.
    #[error("A reason is required to reject a product")]
    ReasonRequired,
}
