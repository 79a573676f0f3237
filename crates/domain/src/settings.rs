//! Market-wide settings injected at startup.

use serde::{Deserialize, Serialize};

use crate::money::Money;

/// Divisions served when no region list is configured.
pub const DEFAULT_REGIONS: [&str; 8] = [
    "Dhaka",
    "Chittagong",
    "Rajshahi",
    "Khulna",
    "Barisal",
    "Sylhet",
    "Rangpur",
    "Mymensingh",
];

/// Fees applied when an order is placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    /// Flat delivery charge per order, also the charge a cart starts with.
    pub delivery_charge: Money,

    /// Platform fee in basis points of the subtotal, charged to the buyer.
    pub platform_fee_bps: u32,

    /// Agent commission in basis points of the subtotal, deducted seller-side.
    pub agent_commission_bps: u32,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            delivery_charge: Money::from_major(300),
            platform_fee_bps: 200,
            agent_commission_bps: 300,
        }
    }
}

/// Settings shared by the catalog, cart and order services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketSettings {
    pub fees: FeeSchedule,
    pub regions: Vec<String>,
}

impl MarketSettings {
    /// Returns the configured spelling of `region`, matched case-insensitively.
    pub fn resolve_region(&self, region: &str) -> Option<&str> {
        let wanted = region.trim();
        self.regions
            .iter()
            .find(|r| r.eq_ignore_ascii_case(wanted))
            .map(String::as_str)
    }
}

impl Default for MarketSettings {
    fn default() -> Self {
        Self {
            fees: FeeSchedule::default(),
            regions: DEFAULT_REGIONS.iter().map(|r| r.to_string()).collect(),
        }
    }
}
