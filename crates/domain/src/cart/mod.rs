//! Per-user shopping carts with merge-on-add semantics.

mod aggregate;
mod service;

pub use aggregate::{
    AddOutcome, Cart, CartItem, CartOperation, CartOperationKind, CartSeller, CartSummary,
    MergeCandidate, MergePreview,
};
pub use service::{AddMultipleReport, AdditionFailure, CartAddition, CartService};

use common::ProductId;
use thiserror::Error;

/// Errors that can occur during cart operations.
#[derive(Debug, Error)]
pub enum CartError {
    /// No line for this product in the cart.
    #[error("Item not found in cart: {product_id}")]
    ItemNotFound { product_id: ProductId },

    /// A line quantity may not drop below the product's minimum.
    #[error("Minimum order quantity for product {product_id} is {minimum}, requested {requested}")]
    BelowMinimumOrder {
        product_id: ProductId,
        minimum: u32,
        requested: u32,
    },

    /// A quantity or cart total no longer fits the representable range.
    #[error("Quantity or amount for product {product_id} is out of range")]
    AmountOutOfRange { product_id: ProductId },

    /// Checkout was attempted on a cart without lines.
    #[error("Cart is empty")]
    Empty,
}
