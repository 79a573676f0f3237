use chrono::{DateTime, Utc};
use common::{Actor, ProductId, Role, UserId};
use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::error::DomainError;
use crate::money::Money;
use crate::settings::MarketSettings;

use super::CatalogError;

/// Review status of a listing.
///
/// ```text
/// Pending ──┬──► Approved ◄──► SoldOut
///           └──► Rejected
/// ```
///
/// Agents and admins may re-review a product in any status; `SoldOut` is
/// entered and left only through stock changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
    SoldOut,
}

impl ProductStatus {
    /// Returns true if buyers may add or order the product.
    pub fn is_purchasable(&self) -> bool {
        matches!(self, ProductStatus::Approved)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProductStatus::Pending => "pending",
            ProductStatus::Approved => "approved",
            ProductStatus::Rejected => "rejected",
            ProductStatus::SoldOut => "sold_out",
        }
    }
}

impl std::fmt::Display for ProductStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Unit a price and quantity refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    Kg,
    Ton,
    Quintal,
    Piece,
}

impl Unit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::Kg => "kg",
            Unit::Ton => "ton",
            Unit::Quintal => "quintal",
            Unit::Piece => "piece",
        }
    }
}

/// Seller reference embedded in a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellerInfo {
    pub id: UserId,
    /// Lowercase contact email, used to look up a seller's listings.
    #[serde(default)]
    pub email: String,
    pub name: String,
    pub region: String,
}

/// Who last approved a product, and when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approval {
    pub reviewer_id: UserId,
    pub approved_at: DateTime<Utc>,
}

/// An agent or admin decision on a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewDecision {
    Approve,
    Reject { reason: String },
}

/// The outcome recorded in the review history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewAction {
    Approved,
    Rejected,
}

/// One entry of a product's append-only review history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub reviewer_id: UserId,
    pub reviewer_role: Role,
    pub action: ReviewAction,
    pub previous_status: ProductStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Listing data submitted by a seller.
#[derive(Debug, Clone, Deserialize)]
pub struct NewProduct {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub crop_type: String,
    pub price_per_unit: Money,
    pub unit: Unit,
    pub minimum_order_quantity: u32,
    pub available_stock: u32,
    pub region: String,
    #[serde(default)]
    pub district: Option<String>,
    pub seller_name: String,
}

impl NewProduct {
    /// Checks the listing and returns the configured spelling of its region.
    pub fn validate<'s>(&self, settings: &'s MarketSettings) -> Result<&'s str, CatalogError> {
        if self.title.trim().is_empty() {
            return Err(CatalogError::InvalidListing("title is required".into()));
        }
        if self.crop_type.trim().is_empty() {
            return Err(CatalogError::InvalidListing("crop_type is required".into()));
        }
        if self.seller_name.trim().is_empty() {
            return Err(CatalogError::InvalidListing("seller_name is required".into()));
        }
        if !self.price_per_unit.is_positive() {
            return Err(CatalogError::InvalidListing(
                "price_per_unit must be greater than 0".into(),
            ));
        }
        if self.minimum_order_quantity == 0 {
            return Err(CatalogError::InvalidListing(
                "minimum_order_quantity must be at least 1".into(),
            ));
        }
        settings
            .resolve_region(&self.region)
            .ok_or_else(|| CatalogError::UnknownRegion(self.region.clone()))
    }
}

/// A product listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub title: String,
    pub description: String,
    pub crop_type: String,
    pub price_per_unit: Money,
    pub unit: Unit,
    pub minimum_order_quantity: u32,
    pub available_stock: u32,
    pub seller: SellerInfo,
    #[serde(default)]
    pub district: Option<String>,
    pub status: ProductStatus,
    #[serde(default)]
    pub status_reason: Option<String>,
    #[serde(default)]
    pub approved_by: Option<Approval>,
    #[serde(default)]
    pub review_history: Vec<ReviewRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Builds a pending listing owned by `seller`.
    ///
    /// `region` must already be resolved against the market settings.
    pub fn list(id: ProductId, seller: &Actor, region: &str, input: NewProduct) -> Self {
        let now = Utc::now();
        Self {
            id,
            title: input.title.trim().to_string(),
            description: input.description,
            crop_type: input.crop_type.trim().to_string(),
            price_per_unit: input.price_per_unit,
            unit: input.unit,
            minimum_order_quantity: input.minimum_order_quantity,
            available_stock: input.available_stock,
            seller: SellerInfo {
                id: seller.id.clone(),
                email: seller.email.trim().to_lowercase(),
                name: input.seller_name.trim().to_string(),
                region: region.to_string(),
            },
            district: input.district,
            status: ProductStatus::Pending,
            status_reason: None,
            approved_by: None,
            review_history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Checks that `quantity` of this product may be put in a cart or order.
    pub fn ensure_purchasable(&self, quantity: u32) -> Result<(), CatalogError> {
        if !self.status.is_purchasable() {
            return Err(CatalogError::ProductUnavailable {
                product_id: self.id,
                status: self.status,
            });
        }
        if quantity < self.minimum_order_quantity {
            return Err(CatalogError::BelowMinimumOrder {
                product_id: self.id,
                minimum: self.minimum_order_quantity,
                requested: quantity,
            });
        }
        Ok(())
    }

    /// Admins review anything; agents only products from their own region.
    pub fn can_be_reviewed_by(&self, actor: &Actor) -> bool {
        match actor.role {
            Role::Admin => true,
            Role::Agent => actor
                .region
                .as_deref()
                .is_some_and(|r| r.eq_ignore_ascii_case(&self.seller.region)),
            Role::Consumer | Role::Seller => false,
        }
    }

    /// Sellers delete their own listings; admins delete any.
    pub fn can_be_deleted_by(&self, actor: &Actor) -> bool {
        actor.is_admin() || (actor.role == Role::Seller && actor.id == self.seller.id)
    }

    /// Applies an approve or reject decision and records it in the history.
    pub fn review(&mut self, actor: &Actor, decision: ReviewDecision) -> Result<(), DomainError> {
        if !self.can_be_reviewed_by(actor) {
            return Err(DomainError::Forbidden(format!(
                "{} cannot review products from region {}",
                actor.role, self.seller.region
            )));
        }

        let now = Utc::now();
        let previous_status = self.status;
        let (action, reason) = match decision {
            ReviewDecision::Approve => {
                self.status = if self.available_stock == 0 {
                    ProductStatus::SoldOut
                } else {
                    ProductStatus::Approved
                };
                self.status_reason = None;
                self.approved_by = Some(Approval {
                    reviewer_id: actor.id.clone(),
                    approved_at: now,
                });
                (ReviewAction::Approved, None)
            }
            ReviewDecision::Reject { reason } => {
                let reason = reason.trim();
                if reason.is_empty() {
                    return Err(CatalogError::ReasonRequired.into());
                }
                self.status = ProductStatus::Rejected;
                self.status_reason = Some(reason.to_string());
                (ReviewAction::Rejected, Some(reason.to_string()))
            }
        };

        self.review_history.push(ReviewRecord {
            reviewer_id: actor.id.clone(),
            reviewer_role: actor.role,
            action,
            previous_status,
            reason,
            timestamp: now,
        });
        self.updated_at = now;
        Ok(())
    }

    /// Moves between `Approved` and `SoldOut` to match the current stock.
    ///
    /// Returns true if the status changed.
    pub fn refresh_stock_status(&mut self) -> bool {
        let next = match self.status {
            ProductStatus::Approved if self.available_stock == 0 => ProductStatus::SoldOut,
            ProductStatus::SoldOut if self.available_stock > 0 => ProductStatus::Approved,
            _ => return false,
        };
        self.status = next;
        self.updated_at = Utc::now();
        true
    }
}

impl Entity for Product {
    const COLLECTION: &'static str = "products";

    fn entity_name() -> &'static str {
        "Product"
    }

    fn key(&self) -> String {
        self.id.to_string()
    }
}
