//! Order aggregate implementation.

use chrono::{DateTime, Utc};
use common::{Actor, OrderId, ProductId, Role, UserId};
use serde::{Deserialize, Serialize};

use crate::access::{self, OrderOperation};
use crate::catalog::Reservation;
use crate::entity::Entity;
use crate::error::DomainError;
use crate::money::Money;
use crate::settings::FeeSchedule;

use super::{DeliveryStatus, OrderError, OrderStatus};

/// A line in an order, priced at the moment stock was reserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub title: String,
    pub quantity: u32,
    pub price: Money,
    pub seller_id: UserId,
    pub seller_region: String,
    /// Set once this line's stock has been handed back to the catalog.
    #[serde(default)]
    pub restocked: bool,
}

impl OrderLine {
    /// Returns price * quantity, or `None` on overflow.
    pub fn line_total(&self) -> Option<Money> {
        self.price.checked_multiply(self.quantity)
    }
}

impl From<Reservation> for OrderLine {
    fn from(r: Reservation) -> Self {
        Self {
            product_id: r.product_id,
            title: r.title,
            quantity: r.quantity,
            price: r.unit_price,
            seller_id: r.seller_id,
            seller_region: r.seller_region,
            restocked: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Buyer {
    pub id: UserId,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub recipient: String,
    pub phone: String,
    pub region: String,
    #[serde(default)]
    pub district: Option<String>,
    pub address: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    #[default]
    Cash,
    Stripe,
    Sslcommerz,
}

/// Fee breakdown fixed at placement.
///
/// `agent_commission` is deducted from the seller payout and is not part of
/// the buyer's total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fees {
    pub delivery: Money,
    pub platform: Money,
    pub agent_commission: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorRef {
    pub id: UserId,
    pub role: Role,
}

impl From<&Actor> for ActorRef {
    fn from(actor: &Actor) -> Self {
        Self {
            id: actor.id.clone(),
            role: actor.role,
        }
    }
}

/// One entry of the append-only order timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub actor: ActorRef,
}

/// Order aggregate root.
///
/// `status` and `delivery_status` are independent axes, tied by one rule:
/// a completed order has always been delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    order_number: String,
    buyer: Buyer,
    items: Vec<OrderLine>,
    subtotal: Money,
    fees: Fees,
    total_amount: Money,
    shipping_address: ShippingAddress,
    payment_method: PaymentMethod,
    status: OrderStatus,
    delivery_status: DeliveryStatus,
    timeline: Vec<TimelineEntry>,
    /// Distinct sellers with a line in this order, for seller-scoped queries.
    seller_ids: Vec<UserId>,
    /// Seller regions plus the shipping region, for agent-scoped queries.
    regions: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    delivered_at: Option<DateTime<Utc>>,
    #[serde(default)]
    returned_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Builds a new pending order from already-reserved lines.
    pub fn place(
        id: OrderId,
        order_number: String,
        buyer: &Actor,
        items: Vec<OrderLine>,
        fee_schedule: &FeeSchedule,
        shipping_address: ShippingAddress,
        payment_method: PaymentMethod,
    ) -> Result<Self, OrderError> {
        if items.is_empty() {
            return Err(OrderError::NoItems);
        }
        if let Some(line) = items.iter().find(|l| l.quantity == 0) {
            return Err(OrderError::InvalidQuantity {
                product_id: line.product_id,
                quantity: 0,
            });
        }

        let (subtotal, fees, total_amount) =
            price_lines(&items, fee_schedule).ok_or(OrderError::AmountOutOfRange)?;

        let mut seller_ids: Vec<UserId> = items.iter().map(|l| l.seller_id.clone()).collect();
        seller_ids.sort();
        seller_ids.dedup();

        let mut regions: Vec<String> = items
            .iter()
            .map(|l| l.seller_region.clone())
            .chain(std::iter::once(shipping_address.region.clone()))
            .collect();
        regions.sort();
        regions.dedup();

        let now = Utc::now();
        Ok(Self {
            id,
            order_number,
            buyer: Buyer {
                id: buyer.id.clone(),
                email: buyer.email.clone(),
            },
            items,
            subtotal,
            fees,
            total_amount,
            shipping_address,
            payment_method,
            status: OrderStatus::Pending,
            delivery_status: DeliveryStatus::Packaging,
            timeline: vec![TimelineEntry {
                status: OrderStatus::Pending.as_str().to_string(),
                timestamp: now,
                actor: ActorRef::from(buyer),
            }],
            seller_ids,
            regions,
            created_at: now,
            updated_at: now,
            delivered_at: None,
            returned_at: None,
        })
    }

    // Queries

    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn order_number(&self) -> &str {
        &self.order_number
    }

    pub fn buyer(&self) -> &Buyer {
        &self.buyer
    }

    pub fn items(&self) -> &[OrderLine] {
        &self.items
    }

    pub fn subtotal(&self) -> Money {
        self.subtotal
    }

    pub fn fees(&self) -> Fees {
        self.fees
    }

    pub fn total_amount(&self) -> Money {
        self.total_amount
    }

    pub fn shipping_address(&self) -> &ShippingAddress {
        &self.shipping_address
    }

    pub fn payment_method(&self) -> PaymentMethod {
        self.payment_method
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn delivery_status(&self) -> DeliveryStatus {
        self.delivery_status
    }

    pub fn timeline(&self) -> &[TimelineEntry] {
        &self.timeline
    }

    pub fn seller_ids(&self) -> &[UserId] {
        &self.seller_ids
    }

    pub fn regions(&self) -> &[String] {
        &self.regions
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn delivered_at(&self) -> Option<DateTime<Utc>> {
        self.delivered_at
    }

    pub fn returned_at(&self) -> Option<DateTime<Utc>> {
        self.returned_at
    }

    // Transitions

    /// Moves delivery forward. Reaching `Delivered` also completes the order.
    pub fn update_delivery_status(
        &mut self,
        actor: &Actor,
        target: DeliveryStatus,
    ) -> Result<(), DomainError> {
        access::authorize(actor, self, OrderOperation::UpdateDelivery(target))?;
        self.ensure_open()?;

        if !self.delivery_status.can_advance_to(target) {
            return Err(OrderError::InvalidTransition {
                from: self.delivery_status,
                to: target,
            }
            .into());
        }

        let now = Utc::now();
        self.delivery_status = target;
        if target == DeliveryStatus::Delivered {
            self.status = OrderStatus::Completed;
            self.delivered_at = Some(now);
        }
        self.record(target.as_str(), actor, now);
        Ok(())
    }

    /// The buyer confirms receipt.
    pub fn complete(&mut self, actor: &Actor) -> Result<(), DomainError> {
        access::authorize(actor, self, OrderOperation::Complete)?;
        self.ensure_open()?;

        let now = Utc::now();
        self.status = OrderStatus::Completed;
        self.delivery_status = DeliveryStatus::Delivered;
        self.delivered_at = Some(now);
        self.record(OrderStatus::Completed.as_str(), actor, now);
        Ok(())
    }

    /// Marks the order cancelled. Only possible while still in packaging.
    ///
    /// The caller is responsible for releasing stock and deleting the order.
    /// An order that is already cancelled is still waiting for that cleanup,
    /// so cancelling it again succeeds without a new timeline entry.
    pub fn cancel(&mut self, actor: &Actor) -> Result<(), DomainError> {
        access::authorize(actor, self, OrderOperation::Cancel)?;
        if self.status == OrderStatus::Cancelled {
            return Ok(());
        }
        self.ensure_open()?;

        if !self.delivery_status.can_cancel() {
            return Err(OrderError::NotCancellable {
                delivery_status: self.delivery_status,
            }
            .into());
        }

        self.status = OrderStatus::Cancelled;
        self.record(OrderStatus::Cancelled.as_str(), actor, Utc::now());
        Ok(())
    }

    /// Records a return. The caller releases the stock of every line.
    ///
    /// A returned order with lines not yet restocked may be returned again to
    /// finish the restock; once every line is back it is terminal.
    pub fn mark_returned(&mut self, actor: &Actor) -> Result<(), DomainError> {
        access::authorize(actor, self, OrderOperation::Return)?;
        if self.status == OrderStatus::Returned && self.has_pending_restock() {
            return Ok(());
        }
        self.ensure_open()?;

        let now = Utc::now();
        self.status = OrderStatus::Returned;
        self.returned_at = Some(now);
        self.record(OrderStatus::Returned.as_str(), actor, now);
        Ok(())
    }

    /// Returns true if some line's stock has not been handed back yet.
    pub fn has_pending_restock(&self) -> bool {
        self.items.iter().any(|l| !l.restocked)
    }

    /// Marks every line not yet restocked as restocked and returns them.
    ///
    /// Saved together with the status change, this claims the lines so that
    /// concurrent callers never release the same stock twice.
    pub fn claim_restock(&mut self) -> Vec<OrderLine> {
        self.items
            .iter_mut()
            .filter(|l| !l.restocked)
            .map(|l| {
                l.restocked = true;
                l.clone()
            })
            .collect()
    }

    /// Hands lines whose release failed back for a later retry.
    pub fn unclaim_restock(&mut self, product_ids: &[ProductId]) {
        for line in self
            .items
            .iter_mut()
            .filter(|l| product_ids.contains(&l.product_id))
        {
            line.restocked = false;
        }
    }

    fn ensure_open(&self) -> Result<(), OrderError> {
        if self.status.is_terminal() {
            return Err(OrderError::AlreadyTerminal {
                status: self.status,
            });
        }
        Ok(())
    }

    fn record(&mut self, status: &str, actor: &Actor, at: DateTime<Utc>) {
        self.timeline.push(TimelineEntry {
            status: status.to_string(),
            timestamp: at,
            actor: ActorRef::from(actor),
        });
        self.updated_at = at;
    }
}

/// Subtotal, fees and buyer total, or `None` if any of them overflows.
fn price_lines(items: &[OrderLine], fee_schedule: &FeeSchedule) -> Option<(Money, Fees, Money)> {
    let subtotal = items
        .iter()
        .map(OrderLine::line_total)
        .try_fold(Money::zero(), |acc, line| acc.checked_add(line?))?;
    let fees = Fees {
        delivery: fee_schedule.delivery_charge,
        platform: subtotal.checked_basis_points(fee_schedule.platform_fee_bps)?,
        agent_commission: subtotal.checked_basis_points(fee_schedule.agent_commission_bps)?,
    };
    let total = subtotal
        .checked_add(fees.delivery)?
        .checked_add(fees.platform)?;
    Some((subtotal, fees, total))
}

impl Entity for Order {
    const COLLECTION: &'static str = "orders";

    fn entity_name() -> &'static str {
        "Order"
    }

    fn key(&self) -> String {
        self.id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buyer() -> Actor {
        Actor::new("buyer-1", "buyer@example.com", Role::Consumer)
    }

    fn seller() -> Actor {
        Actor::new("seller-1", "seller@example.com", Role::Seller)
    }

    fn agent() -> Actor {
        Actor::new("agent-1", "agent@example.com", Role::Agent).with_region("Khulna")
    }

    fn line(quantity: u32, price: i64) -> OrderLine {
        OrderLine {
            product_id: ProductId::new(),
            title: "Shrimp".into(),
            quantity,
            price: Money::from_minor(price),
            seller_id: UserId::new("seller-1"),
            seller_region: "Khulna".into(),
            restocked: false,
        }
    }

    fn address() -> ShippingAddress {
        ShippingAddress {
            recipient: "Buyer".into(),
            phone: "01700000000".into(),
            region: "Dhaka".into(),
            district: None,
            address: "House 1, Road 2".into(),
        }
    }

    fn order() -> Order {
        Order::place(
            OrderId::new(),
            "ORD-2026-001".into(),
            &buyer(),
            vec![line(2, 10_000), line(1, 5_000)],
            &FeeSchedule::default(),
            address(),
            PaymentMethod::Cash,
        )
        .unwrap()
    }

    #[test]
    fn test_place_computes_fees() {
        let order = order();
        assert_eq!(order.subtotal().minor(), 25_000);
        assert_eq!(order.fees().delivery.minor(), 30_000);
        assert_eq!(order.fees().platform.minor(), 500);
        assert_eq!(order.fees().agent_commission.minor(), 750);
        assert_eq!(order.total_amount().minor(), 55_500);
        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(order.delivery_status(), DeliveryStatus::Packaging);
        assert_eq!(order.seller_ids(), &[UserId::new("seller-1")]);
        assert_eq!(order.regions(), &["Dhaka".to_string(), "Khulna".to_string()]);
        assert_eq!(order.timeline().len(), 1);
    }

    #[test]
    fn test_place_requires_items() {
        let result = Order::place(
            OrderId::new(),
            "ORD-2026-002".into(),
            &buyer(),
            vec![],
            &FeeSchedule::default(),
            address(),
            PaymentMethod::Cash,
        );
        assert!(matches!(result, Err(OrderError::NoItems)));
    }

    #[test]
    fn test_place_rejects_totals_past_money_range() {
        let result = Order::place(
            OrderId::new(),
            "ORD-2026-003".into(),
            &buyer(),
            vec![line(3, i64::MAX / 2)],
            &FeeSchedule::default(),
            address(),
            PaymentMethod::Cash,
        );
        assert!(matches!(result, Err(OrderError::AmountOutOfRange)));

        // the subtotal fits but the delivery charge pushes the total over
        let result = Order::place(
            OrderId::new(),
            "ORD-2026-004".into(),
            &buyer(),
            vec![line(1, i64::MAX - 1)],
            &FeeSchedule::default(),
            address(),
            PaymentMethod::Cash,
        );
        assert!(matches!(result, Err(OrderError::AmountOutOfRange)));
    }

    #[test]
    fn test_seller_may_only_hand_to_agent() {
        let mut order = order();
        let err = order
            .update_delivery_status(&seller(), DeliveryStatus::OnTheWay)
            .unwrap_err();
        assert!(matches!(err, DomainError::Forbidden(_)));

        order
            .update_delivery_status(&seller(), DeliveryStatus::ToAgent)
            .unwrap();
        assert_eq!(order.delivery_status(), DeliveryStatus::ToAgent);
    }

    #[test]
    fn test_delivery_never_regresses() {
        let mut order = order();
        order
            .update_delivery_status(&agent(), DeliveryStatus::Reached)
            .unwrap();

        let err = order
            .update_delivery_status(&agent(), DeliveryStatus::OnTheWay)
            .unwrap_err();
        assert!(matches!(
            err,
            DomainError::Order(OrderError::InvalidTransition {
                from: DeliveryStatus::Reached,
                to: DeliveryStatus::OnTheWay,
            })
        ));

        let err = order
            .update_delivery_status(&agent(), DeliveryStatus::Reached)
            .unwrap_err();
        assert!(matches!(err, DomainError::Order(OrderError::InvalidTransition { .. })));
        assert_eq!(order.delivery_status(), DeliveryStatus::Reached);
    }

    #[test]
    fn test_consumer_delivery_completes_order() {
        let mut order = order();
        let err = order
            .update_delivery_status(&buyer(), DeliveryStatus::Reached)
            .unwrap_err();
        assert!(matches!(err, DomainError::Forbidden(_)));

        order
            .update_delivery_status(&buyer(), DeliveryStatus::Delivered)
            .unwrap();
        assert_eq!(order.status(), OrderStatus::Completed);
        assert!(order.delivered_at().is_some());

        let last = order.timeline().last().unwrap();
        assert_eq!(last.status, "delivered");
        assert_eq!(last.actor.role, Role::Consumer);
    }

    #[test]
    fn test_complete_is_buyer_only() {
        let mut order = order();
        assert!(matches!(
            order.complete(&agent()),
            Err(DomainError::Forbidden(_))
        ));

        order.complete(&buyer()).unwrap();
        assert_eq!(order.status(), OrderStatus::Completed);
        assert_eq!(order.delivery_status(), DeliveryStatus::Delivered);

        assert!(matches!(
            order.complete(&buyer()),
            Err(DomainError::Order(OrderError::AlreadyTerminal { .. }))
        ));
    }

    #[test]
    fn test_cancel_only_in_packaging() {
        let mut order = order();
        order
            .update_delivery_status(&seller(), DeliveryStatus::ToAgent)
            .unwrap();
        assert!(matches!(
            order.cancel(&buyer()),
            Err(DomainError::Order(OrderError::NotCancellable { .. }))
        ));

        let mut fresh = self::order();
        let stranger = Actor::new("buyer-2", "other@example.com", Role::Consumer);
        assert!(matches!(
            fresh.cancel(&stranger),
            Err(DomainError::Forbidden(_))
        ));
        fresh.cancel(&buyer()).unwrap();
        assert_eq!(fresh.status(), OrderStatus::Cancelled);
    }

    #[test]
    fn test_return_rules() {
        let mut order = order();
        assert!(matches!(
            order.mark_returned(&buyer()),
            Err(DomainError::Forbidden(_))
        ));

        order.mark_returned(&agent()).unwrap();
        assert_eq!(order.status(), OrderStatus::Returned);
        assert!(order.returned_at().is_some());
        order.claim_restock();

        assert!(matches!(
            order.mark_returned(&agent()),
            Err(DomainError::Order(OrderError::AlreadyTerminal {
                status: OrderStatus::Returned
            }))
        ));
    }

    #[test]
    fn test_restock_claims_each_line_once() {
        let mut order = order();
        order.cancel(&buyer()).unwrap();

        let claimed = order.claim_restock();
        assert_eq!(claimed.len(), 2);
        assert!(!order.has_pending_restock());
        assert!(order.claim_restock().is_empty());

        order.unclaim_restock(&[claimed[1].product_id]);
        assert!(order.has_pending_restock());
        let retried = order.claim_restock();
        assert_eq!(retried.len(), 1);
        assert_eq!(retried[0].product_id, claimed[1].product_id);
    }

    #[test]
    fn test_interrupted_cleanup_can_resume() {
        let mut cancelled = order();
        cancelled.cancel(&buyer()).unwrap();
        cancelled.claim_restock();
        cancelled.cancel(&buyer()).unwrap();
        assert_eq!(cancelled.status(), OrderStatus::Cancelled);
        assert_eq!(cancelled.timeline().len(), 2);
        // the gate still applies to a resumed cancel
        assert!(matches!(
            cancelled.cancel(&seller()),
            Err(DomainError::Forbidden(_))
        ));

        let mut returned = order();
        returned.mark_returned(&agent()).unwrap();
        let lines = returned.claim_restock();
        returned.unclaim_restock(&[lines[0].product_id]);
        returned.mark_returned(&agent()).unwrap();
        assert_eq!(returned.timeline().len(), 2);
        assert_eq!(returned.claim_restock().len(), 1);
        assert!(matches!(
            returned.mark_returned(&agent()),
            Err(DomainError::Order(OrderError::AlreadyTerminal { .. }))
        ));
    }

    #[test]
    fn test_timeline_is_append_only() {
        let mut order = order();
        order
            .update_delivery_status(&seller(), DeliveryStatus::ToAgent)
            .unwrap();
        order
            .update_delivery_status(&agent(), DeliveryStatus::OnTheWay)
            .unwrap();
        let _ = order.update_delivery_status(&agent(), DeliveryStatus::Packaging);

        let statuses: Vec<_> = order.timeline().iter().map(|e| e.status.as_str()).collect();
        assert_eq!(statuses, vec!["pending", "to_agent", "on_the_way"]);
    }

    #[test]
    fn test_serialization_round_trip() {
        let order = order();
        let json = serde_json::to_value(&order).unwrap();
        assert_eq!(json["buyer"]["id"], "buyer-1");
        assert_eq!(json["delivery_status"], "packaging");
        let back: Order = serde_json::from_value(json).unwrap();
        assert_eq!(back, order);
    }
}
