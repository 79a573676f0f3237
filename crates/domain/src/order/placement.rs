//! Checkout input and the reserve-or-compensate step of order placement.

use std::collections::BTreeMap;

use chrono::{Datelike, Utc};
use common::ProductId;
use document_store::DocumentStore;
use serde::{Deserialize, Serialize};

use crate::catalog::{Catalog, Reservation};
use crate::error::DomainError;

use super::{OrderError, OrderLine, PaymentMethod, ShippingAddress};

/// A requested order line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutLine {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// Everything needed to place an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkout {
    pub items: Vec<CheckoutLine>,
    pub shipping_address: ShippingAddress,
    #[serde(default)]
    pub payment_method: PaymentMethod,
}

impl Checkout {
    /// Returns one line per product, summing duplicates, in request order.
    pub(crate) fn normalized_lines(&self) -> Result<Vec<CheckoutLine>, OrderError> {
        if self.items.is_empty() {
            return Err(OrderError::NoItems);
        }

        let mut order: Vec<ProductId> = Vec::new();
        let mut quantities: BTreeMap<ProductId, u32> = BTreeMap::new();
        for line in &self.items {
            if line.quantity == 0 {
                return Err(OrderError::InvalidQuantity {
                    product_id: line.product_id,
                    quantity: line.quantity,
                });
            }
            let total = quantities.entry(line.product_id).or_insert_with(|| {
                order.push(line.product_id);
                0
            });
            *total = total.saturating_add(line.quantity);
        }

        Ok(order
            .into_iter()
            .map(|product_id| CheckoutLine {
                product_id,
                quantity: quantities[&product_id],
            })
            .collect())
    }
}

/// Formats the human-facing order number, e.g. `ORD-2026-042`.
pub(crate) fn order_number(sequence: i64) -> String {
    format!("ORD-{}-{:03}", Utc::now().year(), sequence)
}

/// Stock taken so far while placing one order.
///
/// If a later step fails, [`Reservations::compensate`] puts every unit
/// back, most recent first.
pub(crate) struct Reservations<'a, S> {
    catalog: &'a Catalog<S>,
    taken: Vec<Reservation>,
}

impl<'a, S: DocumentStore> Reservations<'a, S> {
    pub(crate) fn new(catalog: &'a Catalog<S>) -> Self {
        Self {
            catalog,
            taken: Vec::new(),
        }
    }

    pub(crate) async fn reserve(&mut self, line: CheckoutLine) -> Result<(), DomainError> {
        let reservation = self.catalog.reserve(line.product_id, line.quantity).await?;
        self.taken.push(reservation);
        Ok(())
    }

    /// Order lines priced from the reservation snapshots.
    pub(crate) fn lines(&self) -> Vec<OrderLine> {
        self.taken.iter().cloned().map(OrderLine::from).collect()
    }

    /// Releases everything reserved so far.
    ///
    /// A failed release is logged and the rest still run.
    pub(crate) async fn compensate(self) {
        if self.taken.is_empty() {
            return;
        }
        tracing::info!(lines = self.taken.len(), "releasing stock for failed checkout");

        for reservation in self.taken.iter().rev() {
            if let Err(e) = self
                .catalog
                .release(reservation.product_id, reservation.quantity)
                .await
            {
                metrics::counter!("checkout_compensation_failures_total").increment(1);
                tracing::error!(
                    product_id = %reservation.product_id,
                    quantity = reservation.quantity,
                    error = %e,
                    "failed to release reserved stock"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkout(items: Vec<CheckoutLine>) -> Checkout {
        Checkout {
            items,
            shipping_address: ShippingAddress {
                recipient: "Buyer".into(),
                phone: "01900000000".into(),
                region: "Dhaka".into(),
                district: None,
                address: "Mirpur 10".into(),
            },
            payment_method: PaymentMethod::Cash,
        }
    }

    #[test]
    fn test_duplicate_lines_are_summed_in_request_order() {
        let a = ProductId::new();
        let b = ProductId::new();
        let lines = checkout(vec![
            CheckoutLine { product_id: b, quantity: 1 },
            CheckoutLine { product_id: a, quantity: 2 },
            CheckoutLine { product_id: b, quantity: 4 },
        ])
        .normalized_lines()
        .unwrap();

        assert_eq!(
            lines,
            vec![
                CheckoutLine { product_id: b, quantity: 5 },
                CheckoutLine { product_id: a, quantity: 2 },
            ]
        );
    }

    #[test]
    fn test_empty_or_zero_lines_rejected() {
        assert!(matches!(
            checkout(vec![]).normalized_lines(),
            Err(OrderError::NoItems)
        ));
        assert!(matches!(
            checkout(vec![CheckoutLine {
                product_id: ProductId::new(),
                quantity: 0
            }])
            .normalized_lines(),
            Err(OrderError::InvalidQuantity { quantity: 0, .. })
        ));
    }

    #[test]
    fn test_order_number_format() {
        let number = order_number(7);
        assert!(number.starts_with("ORD-"));
        assert!(number.ends_with("-007"));
        assert_eq!(order_number(1234).rsplit('-').next(), Some("1234"));
    }

    #[test]
    fn test_payment_method_defaults_to_cash() {
        let parsed: Checkout = serde_json::from_value(serde_json::json!({
            "items": [],
            "shipping_address": {
                "recipient": "B",
                "phone": "1",
                "region": "Dhaka",
                "address": "X"
            }
        }))
        .unwrap();
        assert_eq!(parsed.payment_method, PaymentMethod::Cash);
    }
}
