//! Order aggregate, placement and lifecycle.

mod aggregate;
mod placement;
mod service;
mod state;

pub use aggregate::{
    ActorRef, Buyer, Fees, Order, OrderLine, PaymentMethod, ShippingAddress, TimelineEntry,
};
pub use placement::{Checkout, CheckoutLine};
pub use service::{OrderPage, OrderService};
pub use state::{DeliveryStatus, OrderStatus};

use common::ProductId;
use thiserror::Error;

/// Errors that can occur during order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// Delivery status may only move forward.
    #[error("Invalid state transition: cannot move delivery status from {from} to {to}")]
    InvalidTransition {
        from: DeliveryStatus,
        to: DeliveryStatus,
    },

    /// Orders can only be cancelled before they leave packaging.
    #[error("Order cannot be cancelled once it is {delivery_status}")]
    NotCancellable { delivery_status: DeliveryStatus },

    /// The order already reached a final status.
    #[error("Order is already {status}")]
    AlreadyTerminal { status: OrderStatus },

    /// Order has no items.
    #[error("Order has no items")]
    NoItems,

    /// The order total no longer fits the representable range.
    #[error("Order amount is out of range")]
    AmountOutOfRange,

    /// Invalid quantity.
    #[error("Invalid quantity for product {product_id}: {quantity} (must be greater than 0)")]
    InvalidQuantity { product_id: ProductId, quantity: u32 },
}
