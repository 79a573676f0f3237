//! Cart aggregate implementation.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use common::{ProductId, UserId};
use serde::{Deserialize, Serialize};

use crate::catalog::{Product, Unit};
use crate::entity::Entity;
use crate::money::Money;

use super::CartError;

/// Seller reference copied into a cart line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartSeller {
    pub id: UserId,
    pub name: String,
}

/// A line in a cart, holding a snapshot of the product at the time it was added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: ProductId,
    pub title: String,
    pub price: Money,
    pub unit: Unit,
    pub quantity: u32,
    pub minimum_order_quantity: u32,
    pub seller: CartSeller,
    pub added_at: DateTime<Utc>,
}

impl CartItem {
    /// Snapshots `product` as a line of `quantity` units.
    pub fn from_product(product: &Product, quantity: u32) -> Self {
        Self {
            product_id: product.id,
            title: product.title.clone(),
            price: product.price_per_unit,
            unit: product.unit,
            quantity,
            minimum_order_quantity: product.minimum_order_quantity,
            seller: CartSeller {
                id: product.seller.id.clone(),
                name: product.seller.name.clone(),
            },
            added_at: Utc::now(),
        }
    }

    /// Returns price * quantity, or `None` on overflow.
    pub fn line_total(&self) -> Option<Money> {
        self.price.checked_multiply(self.quantity)
    }
}

/// Whether an add created a new line or grew an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    Merged { previous_quantity: u32 },
}

/// Kind of a batch operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CartOperationKind {
    Update,
    Remove,
}

/// One entry of a batch update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartOperation {
    pub target_id: ProductId,
    pub kind: CartOperationKind,
    #[serde(default)]
    pub quantity: Option<u32>,
}

/// A product/quantity pair considered for merging into the cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeCandidate {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// What the cart would look like after merging a set of candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MergePreview {
    pub current_line_count: usize,
    pub candidate_count: usize,
    pub final_line_count: usize,
    pub merged_line_count: usize,
    pub total_quantity_delta: u64,
}

/// Read model of a cart with its derived totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartSummary {
    pub owner_email: String,
    pub owner_id: Option<UserId>,
    pub items: Vec<CartItem>,
    pub total_items: u64,
    pub subtotal: Money,
    pub delivery_charge: Money,
    pub total_amount: Money,
}

/// Cart aggregate root, one per user email.
///
/// Holds at most one line per product; every line keeps
/// `quantity >= minimum_order_quantity`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    owner_email: String,
    #[serde(default)]
    owner_id: Option<UserId>,
    items: Vec<CartItem>,
    delivery_charge: Money,
    updated_at: DateTime<Utc>,
}

impl Cart {
    /// Creates an empty cart. The email is normalized to lowercase.
    pub fn new(owner_email: &str, owner_id: Option<UserId>) -> Self {
        Self {
            owner_email: normalize_email(owner_email),
            owner_id,
            items: Vec::new(),
            delivery_charge: Money::zero(),
            updated_at: Utc::now(),
        }
    }

    // Queries

    pub fn owner_email(&self) -> &str {
        &self.owner_email
    }

    pub fn owner_id(&self) -> Option<&UserId> {
        self.owner_id.as_ref()
    }

    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    /// Returns the line for a product, if present.
    pub fn item(&self, product_id: ProductId) -> Option<&CartItem> {
        self.items.iter().find(|i| i.product_id == product_id)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn delivery_charge(&self) -> Money {
        self.delivery_charge
    }

    /// Sum of line quantities.
    pub fn total_items(&self) -> u64 {
        self.items.iter().map(|i| u64::from(i.quantity)).sum()
    }

    /// Sum of line totals.
    ///
    /// Every mutation keeps the totals in range; a cart that somehow breaks
    /// this reports the largest amount.
    pub fn subtotal(&self) -> Money {
        subtotal_of(&self.items).unwrap_or(Money::from_minor(i64::MAX))
    }

    /// Subtotal plus delivery charge.
    pub fn total_amount(&self) -> Money {
        total_of(&self.items, self.delivery_charge).unwrap_or(Money::from_minor(i64::MAX))
    }

    /// Builds the read model with derived totals.
    pub fn summary(&self) -> CartSummary {
        CartSummary {
            owner_email: self.owner_email.clone(),
            owner_id: self.owner_id.clone(),
            items: self.items.clone(),
            total_items: self.total_items(),
            subtotal: self.subtotal(),
            delivery_charge: self.delivery_charge,
            total_amount: self.total_amount(),
        }
    }

    // Mutations

    /// Adds a line, or merges it into the existing line for the same product.
    ///
    /// The first line added to an empty cart picks up `delivery_charge`. The
    /// cart is left untouched if the merged quantity or the new total would
    /// overflow.
    pub fn add_line(&mut self, item: CartItem, delivery_charge: Money) -> Result<AddOutcome, CartError> {
        let product_id = item.product_id;
        let out_of_range = || CartError::AmountOutOfRange { product_id };

        let mut items = self.items.clone();
        let outcome = match items.iter_mut().find(|i| i.product_id == product_id) {
            Some(existing) => {
                let previous_quantity = existing.quantity;
                existing.quantity = previous_quantity
                    .checked_add(item.quantity)
                    .ok_or_else(out_of_range)?;
                AddOutcome::Merged { previous_quantity }
            }
            None => {
                items.push(item);
                AddOutcome::Added
            }
        };

        let delivery_charge = if self.items.is_empty() {
            delivery_charge
        } else {
            self.delivery_charge
        };
        total_of(&items, delivery_charge).ok_or_else(out_of_range)?;

        self.items = items;
        self.delivery_charge = delivery_charge;
        self.touch();
        Ok(outcome)
    }

    /// Overwrites the quantity of an existing line.
    pub fn update_quantity(&mut self, product_id: ProductId, quantity: u32) -> Result<(), CartError> {
        let line = self
            .items
            .iter_mut()
            .find(|i| i.product_id == product_id)
            .ok_or(CartError::ItemNotFound { product_id })?;

        if quantity < line.minimum_order_quantity {
            return Err(CartError::BelowMinimumOrder {
                product_id,
                minimum: line.minimum_order_quantity,
                requested: quantity,
            });
        }

        let previous_quantity = line.quantity;
        line.quantity = quantity;
        if total_of(&self.items, self.delivery_charge).is_none() {
            if let Some(line) = self.items.iter_mut().find(|i| i.product_id == product_id) {
                line.quantity = previous_quantity;
            }
            return Err(CartError::AmountOutOfRange { product_id });
        }

        self.touch();
        Ok(())
    }

    /// Removes the line for a product. Returns whether a line was removed.
    pub fn remove_item(&mut self, product_id: ProductId) -> bool {
        let before = self.items.len();
        self.items.retain(|i| i.product_id != product_id);
        let removed = self.items.len() != before;
        if removed {
            if self.items.is_empty() {
                self.delivery_charge = Money::zero();
            }
            self.touch();
        }
        removed
    }

    /// Empties the cart and zeroes the delivery charge.
    pub fn clear(&mut self) {
        self.items.clear();
        self.delivery_charge = Money::zero();
        self.touch();
    }

    /// Applies a batch of update/remove operations in order.
    ///
    /// Operations that target a missing line, lack a quantity, or would break
    /// the minimum are skipped. Returns how many were applied.
    pub fn batch_apply(&mut self, operations: &[CartOperation]) -> usize {
        operations
            .iter()
            .filter(|op| match (op.kind, op.quantity) {
                (CartOperationKind::Update, Some(quantity)) => {
                    self.update_quantity(op.target_id, quantity).is_ok()
                }
                (CartOperationKind::Update, None) => false,
                (CartOperationKind::Remove, _) => self.remove_item(op.target_id),
            })
            .count()
    }

    /// Projects the effect of adding `candidates` without changing the cart.
    ///
    /// Candidates naming the same product count as one line.
    pub fn preview_merge(&self, candidates: &[MergeCandidate]) -> MergePreview {
        let current: BTreeSet<ProductId> = self.items.iter().map(|i| i.product_id).collect();
        let incoming: BTreeSet<ProductId> = candidates.iter().map(|c| c.product_id).collect();

        MergePreview {
            current_line_count: current.len(),
            candidate_count: candidates.len(),
            final_line_count: current.union(&incoming).count(),
            merged_line_count: current.intersection(&incoming).count(),
            total_quantity_delta: candidates.iter().map(|c| u64::from(c.quantity)).sum(),
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

impl Entity for Cart {
    const COLLECTION: &'static str = "carts";

    fn entity_name() -> &'static str {
        "Cart"
    }

    fn key(&self) -> String {
        self.owner_email.clone()
    }
}

fn subtotal_of(items: &[CartItem]) -> Option<Money> {
    items
        .iter()
        .map(CartItem::line_total)
        .try_fold(Money::zero(), |acc, line| acc.checked_add(line?))
}

fn total_of(items: &[CartItem], delivery_charge: Money) -> Option<Money> {
    subtotal_of(items)?.checked_add(delivery_charge)
}

/// Cart documents are keyed by the lowercase, trimmed email.
pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
