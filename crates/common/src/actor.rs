//! The authenticated caller of a marketplace operation.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::UserId;

/// Marketplace role carried in the identity token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Buys produce.
    #[default]
    Consumer,
    /// Lists produce for sale.
    Seller,
    /// Operates within one region: reviews listings and moves deliveries.
    Agent,
    /// Unrestricted operator.
    Admin,
}

impl Role {
    /// Returns the role name as used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Consumer => "consumer",
            Role::Seller => "seller",
            Role::Agent => "agent",
            Role::Admin => "admin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned when a role string is not recognised.
#[derive(Debug, Clone, Error)]
#[error("unknown role: {0}")]
pub struct ParseRoleError(String);

impl FromStr for Role {
    type Err = ParseRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "consumer" => Ok(Role::Consumer),
            "seller" => Ok(Role::Seller),
            "agent" => Ok(Role::Agent),
            "admin" => Ok(Role::Admin),
            other => Err(ParseRoleError(other.to_string())),
        }
    }
}

/// The caller identity extracted from a verified token.
///
/// Everything here is trusted verbatim; verification happens at the edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    pub email: String,
    pub role: Role,
    /// Operational region, set for agents (and sellers) by the identity service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

impl Actor {
    /// Creates an actor without a region.
    pub fn new(id: impl Into<UserId>, email: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            role,
            region: None,
        }
    }

    /// Attaches an operational region.
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Returns true if this actor may act on data belonging to `email`.
    ///
    /// Owners act on their own data; admins act on anyone's.
    pub fn can_access_email(&self, email: &str) -> bool {
        self.is_admin() || self.email.eq_ignore_ascii_case(email)
    }
}
