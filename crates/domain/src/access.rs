//! Role-gated access to order operations.
//!
//! Every order read and transition is checked against one table of rules
//! keyed by role and operation. A rule names the delivery targets it allows
//! and whose orders it covers; an actor is allowed if any rule for its role
//! and the operation matches.

use common::{Actor, Role};
use document_store::{DocumentQuery, Filter};

use crate::error::DomainError;
use crate::order::{DeliveryStatus, Order};

use DeliveryStatus::{Delivered, Packaging, ToAgent};
use OperationKind::{Cancel, Complete, Return, View};
use Role::{Admin, Agent, Consumer, Seller};

/// An operation on an existing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderOperation {
    View,
    UpdateDelivery(DeliveryStatus),
    Complete,
    Cancel,
    Return,
}

impl OrderOperation {
    fn kind(&self) -> OperationKind {
        match self {
            OrderOperation::View => OperationKind::View,
            OrderOperation::UpdateDelivery(_) => OperationKind::UpdateDelivery,
            OrderOperation::Complete => OperationKind::Complete,
            OrderOperation::Cancel => OperationKind::Cancel,
            OrderOperation::Return => OperationKind::Return,
        }
    }

    fn describe(&self) -> String {
        match self {
            OrderOperation::View => "view".to_string(),
            OrderOperation::UpdateDelivery(target) => format!("set delivery status to {target}"),
            OrderOperation::Complete => "complete".to_string(),
            OrderOperation::Cancel => "cancel".to_string(),
            OrderOperation::Return => "return".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OperationKind {
    View,
    UpdateDelivery,
    Complete,
    Cancel,
    Return,
}

/// Which orders a rule covers, from narrowest to widest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Scope {
    /// Orders the actor placed.
    Buyer,
    /// Orders with at least one line sold by the actor.
    Seller,
    /// Orders touching the actor's region.
    Region,
    /// Every order.
    Any,
}

impl Scope {
    fn covers(&self, actor: &Actor, order: &Order) -> bool {
        match self {
            Scope::Buyer => order.buyer().id == actor.id,
            Scope::Seller => order.seller_ids().contains(&actor.id),
            Scope::Region => actor.region.as_deref().is_some_and(|region| {
                order
                    .regions()
                    .iter()
                    .any(|r| r.eq_ignore_ascii_case(region))
            }),
            Scope::Any => true,
        }
    }

    /// The predicate selecting this scope's orders in the orders collection.
    ///
    /// Returns None for [`Scope::Any`], which needs no predicate, and for
    /// [`Scope::Region`] when the actor has no region.
    fn filter(&self, actor: &Actor) -> Option<Filter> {
        match self {
            Scope::Buyer => Some(Filter::Eq {
                path: "buyer.id".into(),
                value: actor.id.as_str().into(),
            }),
            Scope::Seller => Some(Filter::Contains {
                path: "seller_ids".into(),
                value: actor.id.as_str().into(),
            }),
            Scope::Region => actor.region.as_deref().map(|region| Filter::Contains {
                path: "regions".into(),
                value: region.into(),
            }),
            Scope::Any => None,
        }
    }
}

struct Rule {
    role: Role,
    operation: OperationKind,
    scope: Scope,
    /// Allowed delivery targets; None when the operation has no target.
    targets: Option<&'static [DeliveryStatus]>,
}

const fn rule(role: Role, operation: OperationKind, scope: Scope) -> Rule {
    Rule {
        role,
        operation,
        scope,
        targets: None,
    }
}

const fn delivery(role: Role, scope: Scope, targets: &'static [DeliveryStatus]) -> Rule {
    Rule {
        role,
        operation: OperationKind::UpdateDelivery,
        scope,
        targets: Some(targets),
    }
}

const RULES: &[Rule] = &[
    rule(Consumer, View, Scope::Buyer),
    rule(Seller, View, Scope::Buyer),
    rule(Seller, View, Scope::Seller),
    rule(Agent, View, Scope::Buyer),
    rule(Agent, View, Scope::Region),
    rule(Admin, View, Scope::Any),
    delivery(Consumer, Scope::Buyer, &[Delivered]),
    delivery(Seller, Scope::Seller, &[Packaging, ToAgent]),
    delivery(Agent, Scope::Any, &DeliveryStatus::ALL),
    delivery(Admin, Scope::Any, &DeliveryStatus::ALL),
    rule(Consumer, Complete, Scope::Buyer),
    rule(Seller, Complete, Scope::Buyer),
    rule(Agent, Complete, Scope::Buyer),
    rule(Admin, Complete, Scope::Buyer),
    rule(Consumer, Cancel, Scope::Buyer),
    rule(Agent, Cancel, Scope::Any),
    rule(Admin, Cancel, Scope::Any),
    rule(Agent, Return, Scope::Any),
    rule(Admin, Return, Scope::Any),
];

impl Rule {
    fn allows(&self, operation: &OrderOperation) -> bool {
        match (operation, self.targets) {
            (OrderOperation::UpdateDelivery(target), Some(targets)) => targets.contains(target),
            (OrderOperation::UpdateDelivery(_), None) => false,
            _ => true,
        }
    }
}

/// Returns true if `actor` may perform `operation` on `order`.
///
/// This checks roles and ownership only; whether the order's state permits
/// the operation is the aggregate's concern.
pub fn can_transition(actor: &Actor, order: &Order, operation: OrderOperation) -> bool {
    let kind = operation.kind();
    RULES
        .iter()
        .filter(|r| r.role == actor.role && r.operation == kind)
        .any(|r| r.allows(&operation) && r.scope.covers(actor, order))
}

/// Like [`can_transition`], but fails with `Forbidden`.
pub fn authorize(actor: &Actor, order: &Order, operation: OrderOperation) -> Result<(), DomainError> {
    if can_transition(actor, order, operation) {
        Ok(())
    } else {
        Err(DomainError::Forbidden(format!(
            "{} cannot {} order {}",
            actor.role,
            operation.describe(),
            order.order_number()
        )))
    }
}

/// Every scope under which `role` may view orders.
pub fn listing_scopes(role: Role) -> Vec<Scope> {
    RULES
        .iter()
        .filter(|r| r.role == role && r.operation == OperationKind::View)
        .map(|r| r.scope)
        .collect()
}

/// A query for every order `actor` may view.
///
/// An order is listed when any of the role's view scopes covers it, the same
/// rule [`can_transition`] applies to a single order. Returns None when no
/// order can be visible.
pub fn listing_query(actor: &Actor) -> Option<DocumentQuery> {
    let scopes = listing_scopes(actor.role);
    if scopes.contains(&Scope::Any) {
        return Some(DocumentQuery::new());
    }

    let filters: Vec<Filter> = scopes.iter().filter_map(|s| s.filter(actor)).collect();
    if filters.is_empty() {
        return None;
    }
    Some(DocumentQuery::new().any(filters))
}
