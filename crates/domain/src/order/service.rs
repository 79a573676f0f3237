//! Order service: placement, lifecycle transitions and scoped reads.

use std::sync::Arc;
use std::time::Instant;

use common::{Actor, OrderId};
use document_store::DocumentStore;
use serde::Serialize;

use crate::access::{self, OrderOperation};
use crate::cart::{CartError, CartService};
use crate::catalog::Catalog;
use crate::error::DomainError;
use crate::repository::{Loaded, Repository};
use crate::settings::MarketSettings;

use super::placement::{Reservations, order_number};
use super::{
    Checkout, CheckoutLine, DeliveryStatus, Order, OrderLine, PaymentMethod, ShippingAddress,
};

const ORDER_SEQUENCE: &str = "orders";
const DEFAULT_PAGE_SIZE: usize = 20;
const MAX_PAGE_SIZE: usize = 100;

/// One page of orders visible to an actor.
#[derive(Debug, Clone, Serialize)]
pub struct OrderPage {
    pub orders: Vec<Order>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

/// Service for placing and progressing orders.
pub struct OrderService<S> {
    orders: Repository<S, Order>,
    catalog: Catalog<S>,
    carts: CartService<S>,
    settings: Arc<MarketSettings>,
}

impl<S: Clone> Clone for OrderService<S> {
    fn clone(&self) -> Self {
        Self {
            orders: self.orders.clone(),
            catalog: self.catalog.clone(),
            carts: self.carts.clone(),
            settings: Arc::clone(&self.settings),
        }
    }
}

impl<S: DocumentStore + Clone> OrderService<S> {
    /// Creates a new order service with the given store.
    pub fn new(store: S, settings: Arc<MarketSettings>) -> Self {
        Self {
            orders: Repository::new(store.clone()),
            catalog: Catalog::new(store.clone(), Arc::clone(&settings)),
            carts: CartService::new(store, Arc::clone(&settings)),
            settings,
        }
    }

    /// Places an order, reserving stock for every line.
    ///
    /// All-or-nothing: if any line cannot be reserved, or the order cannot
    /// be stored, every reservation already made is released.
    #[tracing::instrument(skip(self, actor, checkout), fields(buyer = %actor.id, lines = checkout.items.len()))]
    pub async fn checkout(&self, actor: &Actor, checkout: Checkout) -> Result<Order, DomainError> {
        let started = Instant::now();
        let lines = checkout.normalized_lines()?;
        let shipping_address = self.resolve_shipping(checkout.shipping_address)?;

        // Validate every line before touching stock.
        for line in &lines {
            let product = self.catalog.get_product(line.product_id).await?;
            product.ensure_purchasable(line.quantity)?;
        }

        let mut reservations = Reservations::new(&self.catalog);
        for line in lines {
            if let Err(e) = reservations.reserve(line).await {
                tracing::warn!(product_id = %line.product_id, error = %e, "checkout line rejected");
                reservations.compensate().await;
                return Err(e);
            }
        }

        let placed = self
            .store_order(
                actor,
                &reservations,
                shipping_address,
                checkout.payment_method,
            )
            .await;

        match placed {
            Ok(order) => {
                metrics::counter!("orders_placed_total").increment(1);
                metrics::histogram!("checkout_duration_seconds")
                    .record(started.elapsed().as_secs_f64());
                tracing::info!(
                    order_id = %order.id(),
                    order_number = order.order_number(),
                    total = %order.total_amount(),
                    "order placed"
                );
                Ok(order)
            }
            Err(e) => {
                reservations.compensate().await;
                Err(e)
            }
        }
    }

    /// Places an order from the lines of a cart, then clears the cart.
    #[tracing::instrument(skip(self, actor, shipping_address), fields(actor = %actor.id))]
    pub async fn checkout_cart(
        &self,
        actor: &Actor,
        email: &str,
        shipping_address: ShippingAddress,
        payment_method: PaymentMethod,
    ) -> Result<Order, DomainError> {
        let cart = self.carts.get_cart(actor, email).await?;
        if cart.is_empty() {
            return Err(CartError::Empty.into());
        }

        let items = cart
            .items()
            .iter()
            .map(|item| CheckoutLine {
                product_id: item.product_id,
                quantity: item.quantity,
            })
            .collect();
        let order = self
            .checkout(
                actor,
                Checkout {
                    items,
                    shipping_address,
                    payment_method,
                },
            )
            .await?;

        // The order stands even if clearing loses a race with another cart write.
        if let Err(e) = self.carts.clear(actor, email).await {
            tracing::warn!(order_id = %order.id(), error = %e, "failed to clear cart after checkout");
        }
        Ok(order)
    }

    /// Loads an order the actor is allowed to see.
    #[tracing::instrument(skip(self, actor), fields(actor = %actor.id))]
    pub async fn get_order(&self, actor: &Actor, order_id: OrderId) -> Result<Order, DomainError> {
        let order = self.orders.load_required(&order_id.to_string()).await?.entity;
        access::authorize(actor, &order, OrderOperation::View)?;
        Ok(order)
    }

    /// Lists orders visible to the actor, newest first.
    #[tracing::instrument(skip(self, actor), fields(actor = %actor.id, role = %actor.role))]
    pub async fn list_orders(
        &self,
        actor: &Actor,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Result<OrderPage, DomainError> {
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE);
        let offset = offset.unwrap_or(0);
        let empty = OrderPage {
            orders: Vec::new(),
            total: 0,
            limit,
            offset,
        };

        let actor = self.canonical_region(actor);
        let Some(query) = access::listing_query(&actor) else {
            return Ok(empty);
        };

        let total = self.orders.count(query.clone()).await?;
        let orders = self
            .orders
            .find(query.newest_first().limit(limit).offset(offset))
            .await?;

        Ok(OrderPage {
            orders,
            total,
            limit,
            offset,
        })
    }

    /// Moves the delivery status forward.
    #[tracing::instrument(skip(self, actor), fields(actor = %actor.id, role = %actor.role))]
    pub async fn update_delivery_status(
        &self,
        actor: &Actor,
        order_id: OrderId,
        target: DeliveryStatus,
    ) -> Result<Order, DomainError> {
        let (loaded, ()) = self
            .orders
            .execute(&order_id.to_string(), |order| {
                order.update_delivery_status(actor, target)
            })
            .await?;

        tracing::info!(%order_id, delivery_status = %target, "delivery status updated");
        Ok(loaded.entity)
    }

    /// Buyer confirms receipt.
    #[tracing::instrument(skip(self, actor), fields(actor = %actor.id))]
    pub async fn complete(&self, actor: &Actor, order_id: OrderId) -> Result<Order, DomainError> {
        let (loaded, ()) = self
            .orders
            .execute(&order_id.to_string(), |order| order.complete(actor))
            .await?;

        metrics::counter!("orders_completed_total").increment(1);
        Ok(loaded.entity)
    }

    /// Cancels an order still in packaging: restores stock, then deletes it.
    ///
    /// If some stock cannot be released the order stays cancelled with those
    /// lines pending, and cancelling it again finishes the job.
    ///
    /// Returns the order as it was at cancellation.
    #[tracing::instrument(skip(self, actor), fields(actor = %actor.id, role = %actor.role))]
    pub async fn cancel(&self, actor: &Actor, order_id: OrderId) -> Result<Order, DomainError> {
        let id = order_id.to_string();
        let (order, claimed) = self.claim(&id, |order| order.cancel(actor)).await?;

        self.restock(&id, &claimed).await?;
        self.orders.delete(&id).await?;

        metrics::counter!("orders_cancelled_total").increment(1);
        tracing::info!(%order_id, order_number = order.order_number(), "order cancelled");
        Ok(order)
    }

    /// Records a return and restores stock for every line.
    ///
    /// Like [`cancel`](Self::cancel), a partially restocked return can be
    /// retried until every line is back.
    #[tracing::instrument(skip(self, actor), fields(actor = %actor.id, role = %actor.role))]
    pub async fn return_order(&self, actor: &Actor, order_id: OrderId) -> Result<Order, DomainError> {
        let id = order_id.to_string();
        let (order, claimed) = self.claim(&id, |order| order.mark_returned(actor)).await?;

        self.restock(&id, &claimed).await?;

        metrics::counter!("orders_returned_total").increment(1);
        tracing::info!(%order_id, order_number = order.order_number(), "order returned");
        Ok(order)
    }

    async fn store_order(
        &self,
        actor: &Actor,
        reservations: &Reservations<'_, S>,
        shipping_address: ShippingAddress,
        payment_method: PaymentMethod,
    ) -> Result<Order, DomainError> {
        let sequence = self.orders.store().next_sequence(ORDER_SEQUENCE).await?;
        let order = Order::place(
            OrderId::new(),
            order_number(sequence),
            actor,
            reservations.lines(),
            &self.settings.fees,
            shipping_address,
            payment_method,
        )?;
        let Loaded { entity, .. } = self.orders.insert(order).await?;
        Ok(entity)
    }

    /// Applies a terminal transition and claims the lines still to restock,
    /// persisting both before any stock moves.
    ///
    /// The version check on save means that of two concurrent cancels or
    /// returns only one claims a given line, so stock is released at most once.
    async fn claim<F>(&self, id: &str, apply: F) -> Result<(Order, Vec<OrderLine>), DomainError>
    where
        F: FnOnce(&mut Order) -> Result<(), DomainError>,
    {
        let (loaded, claimed) = self
            .orders
            .execute(id, |order| {
                apply(order)?;
                Ok(order.claim_restock())
            })
            .await?;
        Ok((loaded.entity, claimed))
    }

    /// Releases claimed lines. Lines that fail are handed back to the order
    /// and the first failure is returned.
    async fn restock(&self, id: &str, claimed: &[OrderLine]) -> Result<(), DomainError> {
        let mut failed = Vec::new();
        let mut first_error = None;
        for line in claimed {
            if let Err(e) = self.catalog.release(line.product_id, line.quantity).await {
                tracing::warn!(
                    order_id = id,
                    product_id = %line.product_id,
                    quantity = line.quantity,
                    error = %e,
                    "failed to restock order line"
                );
                failed.push(line.product_id);
                first_error.get_or_insert(e);
            }
        }

        let Some(error) = first_error else {
            return Ok(());
        };

        let handed_back = self
            .orders
            .execute(id, |order| {
                order.unclaim_restock(&failed);
                Ok(())
            })
            .await;
        if let Err(e) = handed_back {
            metrics::counter!("order_restock_failures_total").increment(1);
            tracing::error!(
                order_id = id,
                lines = failed.len(),
                error = %e,
                "failed to hand back unreleased order lines"
            );
        }
        Err(error)
    }

    fn resolve_shipping(&self, mut address: ShippingAddress) -> Result<ShippingAddress, DomainError> {
        let region = self
            .settings
            .resolve_region(&address.region)
            .ok_or_else(|| {
                DomainError::InvalidInput(format!("unknown shipping region: {}", address.region))
            })?;
        address.region = region.to_string();
        Ok(address)
    }

    /// Agents' token regions are matched against the configured spelling.
    fn canonical_region(&self, actor: &Actor) -> Actor {
        let mut actor = actor.clone();
        if let Some(region) = actor.region.as_deref()
            && let Some(canonical) = self.settings.resolve_region(region)
        {
            actor.region = Some(canonical.to_string());
        }
        actor
    }
}

#[cfg(test)]
mod tests {
    use common::{ProductId, Role};
    use document_store::InMemoryDocumentStore;

    use super::*;
    use crate::ErrorKind;
    use crate::catalog::{NewProduct, Product, ReviewDecision, Unit};
    use crate::entity::Entity;
    use crate::money::Money;
    use crate::order::{OrderError, OrderStatus};
    use crate::testing::FaultyStore;

    struct Fixture<S = InMemoryDocumentStore> {
        orders: OrderService<S>,
        catalog: Catalog<S>,
    }

    fn fixture_with<S: DocumentStore + Clone>(store: S) -> Fixture<S> {
        let settings = Arc::new(MarketSettings::default());
        Fixture {
            orders: OrderService::new(store.clone(), Arc::clone(&settings)),
            catalog: Catalog::new(store, settings),
        }
    }

    fn fixture() -> Fixture {
        fixture_with(InMemoryDocumentStore::new())
    }

    fn buyer() -> Actor {
        Actor::new("buyer-1", "buyer@example.com", Role::Consumer)
    }

    fn seller() -> Actor {
        Actor::new("seller-1", "seller@example.com", Role::Seller)
    }

    fn agent(region: &str) -> Actor {
        Actor::new("agent-1", "agent@example.com", Role::Agent).with_region(region)
    }

    async fn stocked<S: DocumentStore + Clone>(f: &Fixture<S>, stock: u32, price_major: i64) -> ProductId {
        let p = f
            .catalog
            .create_product(
                &seller(),
                NewProduct {
                    title: "Onion".into(),
                    description: String::new(),
                    crop_type: "vegetable".into(),
                    price_per_unit: Money::from_major(price_major),
                    unit: Unit::Kg,
                    minimum_order_quantity: 1,
                    available_stock: stock,
                    region: "Khulna".into(),
                    district: Some("Jessore".into()),
                    seller_name: "Farm".into(),
                },
            )
            .await
            .unwrap();
        f.catalog
            .review(&agent("Khulna"), p.id, ReviewDecision::Approve)
            .await
            .unwrap();
        p.id
    }

    fn checkout(lines: &[(ProductId, u32)]) -> Checkout {
        Checkout {
            items: lines
                .iter()
                .map(|&(product_id, quantity)| CheckoutLine {
                    product_id,
                    quantity,
                })
                .collect(),
            shipping_address: ShippingAddress {
                recipient: "Buyer".into(),
                phone: "01700000000".into(),
                region: "dhaka".into(),
                district: None,
                address: "Dhanmondi 27".into(),
            },
            payment_method: PaymentMethod::Cash,
        }
    }

    async fn stock_of<S: DocumentStore + Clone>(f: &Fixture<S>, id: ProductId) -> u32 {
        f.catalog.get_product(id).await.unwrap().available_stock
    }

    #[tokio::test]
    async fn test_checkout_reserves_and_prices() {
        let f = fixture();
        let a = stocked(&f, 10, 40).await;

        let order = f.orders.checkout(&buyer(), checkout(&[(a, 4)])).await.unwrap();

        assert_eq!(stock_of(&f, a).await, 6);
        assert_eq!(order.subtotal(), Money::from_major(160));
        assert_eq!(order.shipping_address().region, "Dhaka");
        assert!(order.order_number().ends_with("-001"));
        assert_eq!(order.regions(), &["Dhaka".to_string(), "Khulna".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_line_releases_earlier_reservations() {
        let f = fixture();
        let a = stocked(&f, 10, 40).await;
        let b = stocked(&f, 2, 15).await;

        let err = f
            .orders
            .checkout(&buyer(), checkout(&[(a, 5), (b, 3)]))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InsufficientStock);
        assert_eq!(stock_of(&f, a).await, 10);
        assert_eq!(stock_of(&f, b).await, 2);
        let page = f.orders.list_orders(&buyer(), None, None).await.unwrap();
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn test_unknown_shipping_region_is_invalid() {
        let f = fixture();
        let a = stocked(&f, 10, 40).await;
        let mut request = checkout(&[(a, 1)]);
        request.shipping_address.region = "Gondwana".into();

        let err = f.orders.checkout(&buyer(), request).await.unwrap_err();
        assert!(matches!(err, DomainError::InvalidInput(_)));
        assert_eq!(stock_of(&f, a).await, 10);
    }

    #[tokio::test]
    async fn test_cancel_restores_stock_and_deletes() {
        let f = fixture();
        let a = stocked(&f, 10, 40).await;
        let order = f.orders.checkout(&buyer(), checkout(&[(a, 5)])).await.unwrap();

        let cancelled = f.orders.cancel(&buyer(), order.id()).await.unwrap();
        assert_eq!(cancelled.status(), OrderStatus::Cancelled);
        assert_eq!(stock_of(&f, a).await, 10);
        assert!(matches!(
            f.orders.get_order(&buyer(), order.id()).await,
            Err(DomainError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_cancel_after_packaging_is_rejected() {
        let f = fixture();
        let a = stocked(&f, 10, 40).await;
        let order = f.orders.checkout(&buyer(), checkout(&[(a, 5)])).await.unwrap();
        f.orders
            .update_delivery_status(&seller(), order.id(), DeliveryStatus::ToAgent)
            .await
            .unwrap();

        let err = f.orders.cancel(&buyer(), order.id()).await.unwrap_err();
        assert!(matches!(
            err,
            DomainError::Order(OrderError::NotCancellable { .. })
        ));
        assert_eq!(stock_of(&f, a).await, 5);
    }

    #[tokio::test]
    async fn test_return_restores_stock_once() {
        let f = fixture();
        let a = stocked(&f, 10, 40).await;
        let order = f.orders.checkout(&buyer(), checkout(&[(a, 3)])).await.unwrap();

        let returned = f
            .orders
            .return_order(&agent("Dhaka"), order.id())
            .await
            .unwrap();
        assert_eq!(returned.status(), OrderStatus::Returned);
        assert_eq!(stock_of(&f, a).await, 10);

        let err = f
            .orders
            .return_order(&agent("Dhaka"), order.id())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyTerminal);
        assert_eq!(stock_of(&f, a).await, 10);
    }

    #[tokio::test]
    async fn test_listing_is_role_scoped() {
        let f = fixture();
        let a = stocked(&f, 50, 10).await;
        let other_buyer = Actor::new("buyer-2", "b2@example.com", Role::Consumer);

        f.orders.checkout(&buyer(), checkout(&[(a, 1)])).await.unwrap();
        f.orders.checkout(&buyer(), checkout(&[(a, 1)])).await.unwrap();
        f.orders
            .checkout(&other_buyer, checkout(&[(a, 1)]))
            .await
            .unwrap();

        assert_eq!(f.orders.list_orders(&buyer(), None, None).await.unwrap().total, 2);
        assert_eq!(f.orders.list_orders(&seller(), None, None).await.unwrap().total, 3);
        assert_eq!(
            f.orders
                .list_orders(&agent("khulna"), None, None)
                .await
                .unwrap()
                .total,
            3
        );
        assert_eq!(
            f.orders
                .list_orders(&agent("Sylhet"), None, None)
                .await
                .unwrap()
                .total,
            0
        );

        let page = f.orders.list_orders(&seller(), Some(2), Some(0)).await.unwrap();
        assert_eq!(page.orders.len(), 2);
        assert_eq!(page.total, 3);
    }

    #[tokio::test]
    async fn test_listing_includes_own_purchases_for_every_role() {
        let f = fixture();
        let a = stocked(&f, 50, 10).await;
        let other_seller = Actor::new("seller-2", "s2@example.com", Role::Seller);
        let sylhet_agent = agent("Sylhet");

        f.orders.checkout(&buyer(), checkout(&[(a, 1)])).await.unwrap();
        f.orders
            .checkout(&other_seller, checkout(&[(a, 1)]))
            .await
            .unwrap();
        f.orders
            .checkout(&sylhet_agent, checkout(&[(a, 1)]))
            .await
            .unwrap();

        let listed = f.orders.list_orders(&other_seller, None, None).await.unwrap();
        assert_eq!(listed.total, 1);
        assert_eq!(listed.orders[0].buyer().id, other_seller.id);

        // Out of region, but the agent bought it.
        let listed = f.orders.list_orders(&sylhet_agent, None, None).await.unwrap();
        assert_eq!(listed.total, 1);
        assert_eq!(listed.orders[0].buyer().id, sylhet_agent.id);

        // A seller's sales and own purchases are not counted twice.
        assert_eq!(f.orders.list_orders(&seller(), None, None).await.unwrap().total, 3);
    }

    #[tokio::test]
    async fn test_get_order_applies_view_scope() {
        let f = fixture();
        let a = stocked(&f, 10, 40).await;
        let order = f.orders.checkout(&buyer(), checkout(&[(a, 1)])).await.unwrap();

        let stranger = Actor::new("buyer-9", "x@example.com", Role::Consumer);
        assert!(matches!(
            f.orders.get_order(&stranger, order.id()).await,
            Err(DomainError::Forbidden(_))
        ));
        assert!(f.orders.get_order(&seller(), order.id()).await.is_ok());
    }

    #[tokio::test]
    async fn test_interrupted_cancel_finishes_on_retry() {
        let store = FaultyStore::new();
        let f = fixture_with(store.clone());
        let a = stocked(&f, 10, 40).await;
        let b = stocked(&f, 10, 15).await;
        let order = f
            .orders
            .checkout(&buyer(), checkout(&[(a, 4), (b, 4)]))
            .await
            .unwrap();

        store.fail_increment_after(1);
        let err = f.orders.cancel(&buyer(), order.id()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(stock_of(&f, a).await, 10);
        assert_eq!(stock_of(&f, b).await, 6);

        let stuck = f.orders.get_order(&buyer(), order.id()).await.unwrap();
        assert_eq!(stuck.status(), OrderStatus::Cancelled);
        assert!(stuck.has_pending_restock());

        f.orders.cancel(&buyer(), order.id()).await.unwrap();
        assert_eq!(stock_of(&f, a).await, 10);
        assert_eq!(stock_of(&f, b).await, 10);
        assert!(matches!(
            f.orders.get_order(&buyer(), order.id()).await,
            Err(DomainError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_interrupted_return_finishes_on_retry() {
        let store = FaultyStore::new();
        let f = fixture_with(store.clone());
        let a = stocked(&f, 10, 40).await;
        let b = stocked(&f, 10, 15).await;
        let order = f
            .orders
            .checkout(&buyer(), checkout(&[(a, 3), (b, 5)]))
            .await
            .unwrap();

        store.fail_increment_after(0);
        assert!(f.orders.return_order(&agent("Dhaka"), order.id()).await.is_err());
        assert_eq!(stock_of(&f, a).await, 7);
        assert_eq!(stock_of(&f, b).await, 10);

        let returned = f
            .orders
            .return_order(&agent("Dhaka"), order.id())
            .await
            .unwrap();
        assert_eq!(returned.status(), OrderStatus::Returned);
        assert!(!returned.has_pending_restock());
        assert_eq!(stock_of(&f, a).await, 10);
        assert_eq!(stock_of(&f, b).await, 10);

        let err = f
            .orders
            .return_order(&agent("Dhaka"), order.id())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyTerminal);
        assert_eq!(stock_of(&f, a).await, 10);
    }

    #[tokio::test]
    async fn test_failed_status_flip_keeps_reservation_compensable() {
        let store = FaultyStore::new();
        let f = fixture_with(store.clone());
        let a = stocked(&f, 4, 40).await;
        let b = stocked(&f, 1, 15).await;

        // Taking all of `a` would flip it to sold out, but that write fails.
        store.fail_replace_in(Some(Product::COLLECTION));
        let err = f
            .orders
            .checkout(&buyer(), checkout(&[(a, 4), (b, 2)]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientStock);
        assert_eq!(stock_of(&f, a).await, 4);
        assert_eq!(stock_of(&f, b).await, 1);

        let order = f.orders.checkout(&buyer(), checkout(&[(a, 4)])).await.unwrap();
        assert_eq!(order.items()[0].quantity, 4);
        assert_eq!(stock_of(&f, a).await, 0);
    }

    #[tokio::test]
    async fn test_checkout_past_money_range_releases_stock() {
        let f = fixture();
        let a = stocked(&f, 10, i64::MAX / 200).await;

        let err = f.orders.checkout(&buyer(), checkout(&[(a, 3)])).await.unwrap_err();
        assert!(matches!(err, DomainError::Order(OrderError::AmountOutOfRange)));
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(stock_of(&f, a).await, 10);
    }
}
