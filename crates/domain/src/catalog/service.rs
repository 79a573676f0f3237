//! Catalog service: listing management and the stock reservation primitives.

use std::collections::BTreeSet;
use std::sync::Arc;

use common::{Actor, ProductId, Role, UserId};
use document_store::{DocumentQuery, DocumentStore, FieldUpdate, StoreError, Version};
use serde::Serialize;

use crate::entity::Entity;
use crate::error::DomainError;
use crate::money::Money;
use crate::repository::Repository;
use crate::settings::MarketSettings;

use super::{CatalogError, NewProduct, Product, ProductStatus, ReviewDecision};

const STOCK_FIELD: &str = "available_stock";
const DEFAULT_PAGE_SIZE: usize = 20;
const MAX_PAGE_SIZE: usize = 100;

/// Filters for the public product listing and search.
#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    /// Case-insensitive text matched against title and crop type.
    pub search: Option<String>,
    pub crop_type: Option<String>,
    pub region: Option<String>,
    /// Inclusive unit price bounds.
    pub min_price: Option<Money>,
    pub max_price: Option<Money>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// One page of search results.
#[derive(Debug, Clone, Serialize)]
pub struct ProductPage {
    pub products: Vec<Product>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

/// Stock taken from a product for one order line, with the price snapshot
/// copied at reservation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reservation {
    pub product_id: ProductId,
    pub title: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub seller_id: UserId,
    pub seller_region: String,
}

/// A product that could not be reviewed in a bulk action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewFailure {
    pub product_id: ProductId,
    pub error: String,
}

/// Per-item outcome of a bulk approve/reject.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkReviewReport {
    pub successful: Vec<ProductId>,
    pub failed: Vec<ReviewFailure>,
}

/// Service over the product collection.
pub struct Catalog<S> {
    products: Repository<S, Product>,
    settings: Arc<MarketSettings>,
}

impl<S: Clone> Clone for Catalog<S> {
    fn clone(&self) -> Self {
        Self {
            products: self.products.clone(),
            settings: Arc::clone(&self.settings),
        }
    }
}

impl<S: DocumentStore> Catalog<S> {
    /// Creates a new catalog over the given store.
    pub fn new(store: S, settings: Arc<MarketSettings>) -> Self {
        Self {
            products: Repository::new(store),
            settings,
        }
    }

    /// Creates a pending listing for the calling seller.
    #[tracing::instrument(skip(self, actor, input), fields(seller = %actor.id))]
    pub async fn create_product(
        &self,
        actor: &Actor,
        input: NewProduct,
    ) -> Result<Product, DomainError> {
        if actor.role != Role::Seller {
            return Err(DomainError::Forbidden(
                "only sellers can list products".into(),
            ));
        }
        let region = input.validate(&self.settings)?.to_string();
        let product = Product::list(ProductId::new(), actor, &region, input);

        let loaded = self.products.insert(product).await?;
        tracing::info!(product_id = %loaded.entity.id, region = %region, "product listed");
        Ok(loaded.entity)
    }

    /// Loads a product by id.
    #[tracing::instrument(skip(self))]
    pub async fn get_product(&self, product_id: ProductId) -> Result<Product, DomainError> {
        Ok(self
            .products
            .load_required(&product_id.to_string())
            .await?
            .entity)
    }

    /// Lists approved products, newest first.
    #[tracing::instrument(skip(self))]
    pub async fn list_approved(&self, filter: ProductFilter) -> Result<Vec<Product>, DomainError> {
        let (limit, offset) = page_bounds(&filter);
        let query = self.approved_query(&filter).newest_first().limit(limit).offset(offset);
        self.products.find(query).await
    }

    /// Searches approved products and reports the total number of matches.
    #[tracing::instrument(skip(self))]
    pub async fn search(&self, filter: ProductFilter) -> Result<ProductPage, DomainError> {
        let (limit, offset) = page_bounds(&filter);
        let query = self.approved_query(&filter);

        let total = self.products.count(query.clone()).await?;
        let products = self
            .products
            .find(query.newest_first().limit(limit).offset(offset))
            .await?;

        Ok(ProductPage {
            products,
            total,
            limit,
            offset,
        })
    }

    /// Lists every listing of one seller, in any status, newest first.
    ///
    /// Only the seller themself or an admin may look, since rejected
    /// listings carry the reviewer's reason.
    #[tracing::instrument(skip(self, actor), fields(actor = %actor.id))]
    pub async fn list_by_seller(&self, actor: &Actor, email: &str) -> Result<Vec<Product>, DomainError> {
        let email = email.trim();
        if email.is_empty() {
            return Err(DomainError::InvalidInput("seller email is required".into()));
        }
        if !actor.can_access_email(email) {
            return Err(DomainError::Forbidden(
                "only the seller or an admin can list a seller's products".into(),
            ));
        }

        let query = DocumentQuery::new()
            .eq("seller.email", email.to_lowercase())
            .newest_first();
        self.products.find(query).await
    }

    /// Returns the distinct crop types across all listings, sorted.
    #[tracing::instrument(skip(self))]
    pub async fn crop_types(&self) -> Result<Vec<String>, DomainError> {
        let products = self.products.find(DocumentQuery::new()).await?;
        let crop_types: BTreeSet<String> = products
            .into_iter()
            .map(|p| p.crop_type)
            .filter(|c| !c.is_empty())
            .collect();
        Ok(crop_types.into_iter().collect())
    }

    fn approved_query(&self, filter: &ProductFilter) -> DocumentQuery {
        let mut query = DocumentQuery::new().eq("status", ProductStatus::Approved.as_str());

        if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            query = query.text(["title", "crop_type"], search);
        }
        if let Some(crop_type) = filter.crop_type.as_deref().map(str::trim) {
            query = query.eq("crop_type", crop_type);
        }
        if let Some(region) = filter.region.as_deref() {
            let region = self.settings.resolve_region(region).unwrap_or(region);
            query = query.eq("seller.region", region);
        }
        if filter.min_price.is_some() || filter.max_price.is_some() {
            query = query.range(
                "price_per_unit",
                filter.min_price.map(|m| m.minor()),
                filter.max_price.map(|m| m.minor()),
            );
        }
        query
    }

    /// Lists pending products an agent may review; admins see every region.
    #[tracing::instrument(skip(self, actor), fields(actor = %actor.id))]
    pub async fn pending_for(&self, actor: &Actor) -> Result<Vec<Product>, DomainError> {
        let query = DocumentQuery::new().eq("status", ProductStatus::Pending.as_str());
        let query = match actor.role {
            Role::Admin => query,
            Role::Agent => {
                let region = actor.region.as_deref().ok_or_else(|| {
                    DomainError::Forbidden("agent has no assigned region".into())
                })?;
                let region = self.settings.resolve_region(region).unwrap_or(region);
                query.eq("seller.region", region)
            }
            Role::Consumer | Role::Seller => {
                return Err(DomainError::Forbidden(
                    "only agents and admins can review products".into(),
                ));
            }
        };
        self.products.find(query).await
    }

    /// Applies an approve/reject decision to one product.
    #[tracing::instrument(skip(self, actor), fields(actor = %actor.id))]
    pub async fn review(
        &self,
        actor: &Actor,
        product_id: ProductId,
        decision: ReviewDecision,
    ) -> Result<Product, DomainError> {
        let (loaded, ()) = self
            .products
            .execute(&product_id.to_string(), |product| {
                product.review(actor, decision)
            })
            .await?;

        tracing::info!(%product_id, status = %loaded.entity.status, "product reviewed");
        Ok(loaded.entity)
    }

    /// Admin-only review of many products; each outcome is reported separately.
    #[tracing::instrument(skip(self, actor, product_ids), fields(actor = %actor.id, count = product_ids.len()))]
    pub async fn bulk_review(
        &self,
        actor: &Actor,
        product_ids: &[ProductId],
        decision: ReviewDecision,
    ) -> Result<BulkReviewReport, DomainError> {
        if !actor.is_admin() {
            return Err(DomainError::Forbidden(
                "bulk review is restricted to admins".into(),
            ));
        }
        if matches!(&decision, ReviewDecision::Reject { reason } if reason.trim().is_empty()) {
            return Err(CatalogError::ReasonRequired.into());
        }

        let mut report = BulkReviewReport::default();
        for &product_id in product_ids {
            match self.review(actor, product_id, decision.clone()).await {
                Ok(_) => report.successful.push(product_id),
                Err(e) => report.failed.push(ReviewFailure {
                    product_id,
                    error: e.to_string(),
                }),
            }
        }
        Ok(report)
    }

    /// Hard-deletes a listing owned by the caller (or any listing, for admins).
    #[tracing::instrument(skip(self, actor), fields(actor = %actor.id))]
    pub async fn delete_product(
        &self,
        actor: &Actor,
        product_id: ProductId,
    ) -> Result<(), DomainError> {
        let id = product_id.to_string();
        let product = self.products.load_required(&id).await?.entity;
        if !product.can_be_deleted_by(actor) {
            return Err(DomainError::Forbidden(
                "only the owning seller or an admin can delete a product".into(),
            ));
        }
        self.products.delete(&id).await?;
        Ok(())
    }

    /// Takes `quantity` units out of stock.
    ///
    /// The decrement is a single conditional update in the store, so
    /// concurrent reservations can never drive stock below zero.
    #[tracing::instrument(skip(self))]
    pub async fn reserve(
        &self,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<Reservation, DomainError> {
        let id = product_id.to_string();
        let product = self.products.load_required(&id).await?.entity;
        if !product.status.is_purchasable() {
            return Err(CatalogError::ProductUnavailable {
                product_id,
                status: product.status,
            }
            .into());
        }

        let update = self
            .products
            .store()
            .add_to_field(
                Product::COLLECTION,
                &id,
                STOCK_FIELD,
                -i64::from(quantity),
                Some(0),
            )
            .await?;

        match update {
            FieldUpdate::Applied(doc) => {
                let version = doc.version;
                let mut product: Product = match doc.into_decoded() {
                    Ok(product) => product,
                    Err(e) => {
                        // Nobody holds this reservation yet, so hand the units straight back.
                        self.undo_reservation(product_id, quantity).await;
                        return Err(e.into());
                    }
                };
                let reservation = Reservation {
                    product_id,
                    title: product.title.clone(),
                    quantity,
                    unit_price: product.price_per_unit,
                    seller_id: product.seller.id.clone(),
                    seller_region: product.seller.region.clone(),
                };
                if product.refresh_stock_status() {
                    self.save_stock_status(&product, version).await;
                }
                Ok(reservation)
            }
            FieldUpdate::Rejected { current } => {
                metrics::counter!("stock_reservation_failures_total").increment(1);
                tracing::debug!(%product_id, quantity, available = current, "reservation rejected");
                Err(CatalogError::InsufficientStock {
                    product_id,
                    requested: quantity,
                    available: current,
                }
                .into())
            }
        }
    }

    /// Puts `quantity` units back into stock.
    ///
    /// Releasing stock for a product that has since been deleted is a no-op.
    #[tracing::instrument(skip(self))]
    pub async fn release(&self, product_id: ProductId, quantity: u32) -> Result<(), DomainError> {
        let id = product_id.to_string();
        let update = self
            .products
            .store()
            .add_to_field(
                Product::COLLECTION,
                &id,
                STOCK_FIELD,
                i64::from(quantity),
                None,
            )
            .await;

        match update {
            Ok(FieldUpdate::Applied(doc)) => {
                let version = doc.version;
                match doc.into_decoded::<Product>() {
                    Ok(mut product) => {
                        if product.refresh_stock_status() {
                            self.save_stock_status(&product, version).await;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(%product_id, error = %e, "stock released but product could not be decoded");
                    }
                }
                Ok(())
            }
            Ok(FieldUpdate::Rejected { current }) => {
                tracing::warn!(%product_id, quantity, current, "unguarded release was rejected");
                Ok(())
            }
            Err(StoreError::NotFound { .. }) => {
                tracing::warn!(%product_id, quantity, "released stock for a deleted product");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Persists a sold-out/approved flip computed from a stock update.
    ///
    /// The stock write has already happened, so a failure here only leaves
    /// the status stale until the next stock change. Losing the race to
    /// another stock change is fine: that writer sees the newer stock and
    /// makes its own decision.
    async fn save_stock_status(&self, product: &Product, version: Version) {
        match self.products.save(product, version).await {
            Ok(_) => {
                tracing::info!(product_id = %product.id, status = %product.status, "stock status changed");
            }
            Err(DomainError::Store(StoreError::ConcurrencyConflict { .. })) => {
                tracing::debug!(product_id = %product.id, "stock status update lost a race");
            }
            Err(e) => {
                metrics::counter!("stock_status_update_failures_total").increment(1);
                tracing::warn!(product_id = %product.id, error = %e, "failed to persist stock status");
            }
        }
    }

    async fn undo_reservation(&self, product_id: ProductId, quantity: u32) {
        let undone = self
            .products
            .store()
            .add_to_field(
                Product::COLLECTION,
                &product_id.to_string(),
                STOCK_FIELD,
                i64::from(quantity),
                None,
            )
            .await;
        if let Err(e) = undone {
            metrics::counter!("checkout_compensation_failures_total").increment(1);
            tracing::error!(%product_id, quantity, error = %e, "failed to undo reservation");
        }
    }
}

fn page_bounds(filter: &ProductFilter) -> (usize, usize) {
    (
        filter.limit.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE),
        filter.offset.unwrap_or(0),
    )
}

#[cfg(test)]
mod tests {
    use document_store::InMemoryDocumentStore;

    use super::*;
    use crate::catalog::Unit;

    fn catalog() -> Catalog<InMemoryDocumentStore> {
        Catalog::new(
            InMemoryDocumentStore::new(),
            Arc::new(MarketSettings::default()),
        )
    }

    fn seller() -> Actor {
        Actor::new("seller-1", "seller@example.com", Role::Seller)
    }

    fn admin() -> Actor {
        Actor::new("admin-1", "admin@example.com", Role::Admin)
    }

    fn listing(stock: u32) -> NewProduct {
        NewProduct {
            title: "Potato".into(),
            description: "Diamond variety".into(),
            crop_type: "vegetable".into(),
            price_per_unit: Money::from_major(25),
            unit: Unit::Kg,
            minimum_order_quantity: 1,
            available_stock: stock,
            region: "Rangpur".into(),
            district: None,
            seller_name: "Rahim".into(),
        }
    }

    async fn approved(catalog: &Catalog<InMemoryDocumentStore>, stock: u32) -> Product {
        let p = catalog.create_product(&seller(), listing(stock)).await.unwrap();
        catalog
            .review(&admin(), p.id, ReviewDecision::Approve)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_only_sellers_list_products() {
        let catalog = catalog();
        let consumer = Actor::new("c1", "c@example.com", Role::Consumer);
        let err = catalog
            .create_product(&consumer, listing(5))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_listing_shows_only_approved() {
        let catalog = catalog();
        let pending = catalog.create_product(&seller(), listing(5)).await.unwrap();
        let live = approved(&catalog, 5).await;

        let listed = catalog.list_approved(ProductFilter::default()).await.unwrap();
        let ids: Vec<_> = listed.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![live.id]);
        assert!(!ids.contains(&pending.id));

        let by_region = catalog
            .list_approved(ProductFilter {
                region: Some("rangpur".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_region.len(), 1);

        let elsewhere = catalog
            .list_approved(ProductFilter {
                region: Some("Sylhet".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(elsewhere.is_empty());
    }

    #[tokio::test]
    async fn test_pending_queue_is_region_scoped() {
        let catalog = catalog();
        catalog.create_product(&seller(), listing(5)).await.unwrap();

        let local = Actor::new("a1", "a1@example.com", Role::Agent).with_region("Rangpur");
        let remote = Actor::new("a2", "a2@example.com", Role::Agent).with_region("Khulna");
        assert_eq!(catalog.pending_for(&local).await.unwrap().len(), 1);
        assert!(catalog.pending_for(&remote).await.unwrap().is_empty());
        assert_eq!(catalog.pending_for(&admin()).await.unwrap().len(), 1);
        assert!(catalog.pending_for(&seller()).await.is_err());
    }

    #[tokio::test]
    async fn test_reserve_decrements_and_snapshots_price() {
        let catalog = catalog();
        let p = approved(&catalog, 10).await;

        let reservation = catalog.reserve(p.id, 4).await.unwrap();
        assert_eq!(reservation.unit_price, Money::from_major(25));
        assert_eq!(reservation.seller_region, "Rangpur");
        assert_eq!(catalog.get_product(p.id).await.unwrap().available_stock, 6);
    }

    #[tokio::test]
    async fn test_reserve_fails_without_stock() {
        let catalog = catalog();
        let p = approved(&catalog, 3).await;

        let err = catalog.reserve(p.id, 4).await.unwrap_err();
        assert!(matches!(
            err,
            DomainError::Catalog(CatalogError::InsufficientStock {
                requested: 4,
                available: 3,
                ..
            })
        ));
        assert_eq!(catalog.get_product(p.id).await.unwrap().available_stock, 3);
    }

    #[tokio::test]
    async fn test_stock_exhaustion_marks_sold_out_and_release_restores() {
        let catalog = catalog();
        let p = approved(&catalog, 2).await;

        catalog.reserve(p.id, 2).await.unwrap();
        let sold_out = catalog.get_product(p.id).await.unwrap();
        assert_eq!(sold_out.status, ProductStatus::SoldOut);
        assert!(matches!(
            catalog.reserve(p.id, 1).await,
            Err(DomainError::Catalog(CatalogError::ProductUnavailable { .. }))
        ));

        catalog.release(p.id, 2).await.unwrap();
        let restored = catalog.get_product(p.id).await.unwrap();
        assert_eq!(restored.status, ProductStatus::Approved);
        assert_eq!(restored.available_stock, 2);
    }

    #[tokio::test]
    async fn test_release_of_deleted_product_is_noop() {
        let catalog = catalog();
        let p = approved(&catalog, 2).await;
        catalog.delete_product(&seller(), p.id).await.unwrap();
        catalog.release(p.id, 2).await.unwrap();
    }

    #[tokio::test]
    async fn test_bulk_review_reports_each_item() {
        let catalog = catalog();
        let a = catalog.create_product(&seller(), listing(5)).await.unwrap();
        let b = catalog.create_product(&seller(), listing(5)).await.unwrap();
        let missing = ProductId::new();

        let report = catalog
            .bulk_review(&admin(), &[a.id, missing, b.id], ReviewDecision::Approve)
            .await
            .unwrap();
        assert_eq!(report.successful, vec![a.id, b.id]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].product_id, missing);

        let agent = Actor::new("a1", "a1@example.com", Role::Agent).with_region("Rangpur");
        assert!(matches!(
            catalog
                .bulk_review(&agent, &[a.id], ReviewDecision::Approve)
                .await,
            Err(DomainError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_requires_owner() {
        let catalog = catalog();
        let p = catalog.create_product(&seller(), listing(5)).await.unwrap();
        let other = Actor::new("seller-2", "s2@example.com", Role::Seller);

        assert!(matches!(
            catalog.delete_product(&other, p.id).await,
            Err(DomainError::Forbidden(_))
        ));
        catalog.delete_product(&seller(), p.id).await.unwrap();
        assert!(matches!(
            catalog.get_product(p.id).await,
            Err(DomainError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_search_matches_text_and_price() {
        let catalog = catalog();
        let potato = approved(&catalog, 5).await;
        let mut rice = listing(5);
        rice.title = "Aromatic Rice".into();
        rice.crop_type = "grain".into();
        rice.price_per_unit = Money::from_major(90);
        let rice = catalog.create_product(&seller(), rice).await.unwrap();
        catalog
            .review(&admin(), rice.id, ReviewDecision::Approve)
            .await
            .unwrap();
        let mut hidden = listing(5);
        hidden.title = "Rice seedlings".into();
        catalog.create_product(&seller(), hidden).await.unwrap();

        let page = catalog
            .search(ProductFilter {
                search: Some("  RICE ".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.products[0].id, rice.id);

        let cheap = catalog
            .search(ProductFilter {
                max_price: Some(Money::from_major(25)),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(cheap.total, 1);
        assert_eq!(cheap.products[0].id, potato.id);

        let paged = catalog
            .search(ProductFilter {
                min_price: Some(Money::from_major(25)),
                limit: Some(1),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(paged.total, 2);
        assert_eq!(paged.products.len(), 1);
        assert_eq!(paged.limit, 1);
    }

    #[tokio::test]
    async fn test_seller_listing_includes_every_status() {
        let catalog = catalog();
        let live = approved(&catalog, 5).await;
        let rejected = catalog.create_product(&seller(), listing(5)).await.unwrap();
        catalog
            .review(
                &admin(),
                rejected.id,
                ReviewDecision::Reject {
                    reason: "blurry photos".into(),
                },
            )
            .await
            .unwrap();
        let other = Actor::new("seller-2", "other@example.com", Role::Seller);
        catalog.create_product(&other, listing(5)).await.unwrap();

        let own = catalog
            .list_by_seller(&seller(), "Seller@Example.com")
            .await
            .unwrap();
        let ids: Vec<_> = own.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![rejected.id, live.id]);
        assert_eq!(own[0].status_reason.as_deref(), Some("blurry photos"));

        assert_eq!(
            catalog
                .list_by_seller(&admin(), "other@example.com")
                .await
                .unwrap()
                .len(),
            1
        );
        assert!(matches!(
            catalog.list_by_seller(&other, "seller@example.com").await,
            Err(DomainError::Forbidden(_))
        ));
        assert!(matches!(
            catalog.list_by_seller(&seller(), " ").await,
            Err(DomainError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_crop_types_are_distinct_and_sorted() {
        let catalog = catalog();
        assert!(catalog.crop_types().await.unwrap().is_empty());

        for crop in ["vegetable", "grain", "vegetable", "fruit"] {
            let mut input = listing(1);
            input.crop_type = crop.into();
            catalog.create_product(&seller(), input).await.unwrap();
        }

        assert_eq!(
            catalog.crop_types().await.unwrap(),
            vec!["fruit", "grain", "vegetable"]
        );
    }
}
