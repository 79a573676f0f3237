//! Order state machines.

use serde::{Deserialize, Serialize};

/// Overall status of an order.
///
/// State transitions:
/// ```text
/// Pending ──┬──► Completed
///           ├──► Returned
///           └──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Completed,
    Returned,
    Cancelled,
}

impl OrderStatus {
    /// Returns true if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Completed => "completed",
            OrderStatus::Returned => "returned",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Delivery progress of an order. Only ever moves forward.
///
/// ```text
/// Packaging ──► ToAgent ──► OnTheWay ──► Reached ──► Delivered
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    #[default]
    Packaging,
    ToAgent,
    OnTheWay,
    Reached,
    Delivered,
}

impl DeliveryStatus {
    /// Every delivery status, in order.
    pub const ALL: [DeliveryStatus; 5] = [
        DeliveryStatus::Packaging,
        DeliveryStatus::ToAgent,
        DeliveryStatus::OnTheWay,
        DeliveryStatus::Reached,
        DeliveryStatus::Delivered,
    ];

    /// Returns true if moving from `self` to `next` goes strictly forward.
    pub fn can_advance_to(&self, next: DeliveryStatus) -> bool {
        next > *self
    }

    /// Returns true if the order can still be cancelled.
    pub fn can_cancel(&self) -> bool {
        matches!(self, DeliveryStatus::Packaging)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Packaging => "packaging",
            DeliveryStatus::ToAgent => "to_agent",
            DeliveryStatus::OnTheWay => "on_the_way",
            DeliveryStatus::Reached => "reached",
            DeliveryStatus::Delivered => "delivered",
        }
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DeliveryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DeliveryStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown delivery status: {s}"))
    }
}
