//! HTTP handlers, one module per resource.

pub mod cart;
pub mod health;
pub mod jwt;
pub mod metrics;
pub mod orders;
pub mod products;
pub mod regions;

use serde::Serialize;

use crate::error::ApiError;
use crate::extract::Json;

/// Success envelope: `{"success": true, ...body}`.
#[derive(Debug, Serialize)]
pub struct Success<T> {
    success: bool,
    #[serde(flatten)]
    body: T,
}

pub fn success<T: Serialize>(body: T) -> Json<Success<T>> {
    Json(Success {
        success: true,
        body,
    })
}

/// Body carrying only a human-readable message.
#[derive(Debug, Serialize)]
pub struct MessageBody {
    pub message: String,
}

pub fn message(text: impl Into<String>) -> Json<Success<MessageBody>> {
    success(MessageBody {
        message: text.into(),
    })
}

fn parse_id<T: std::str::FromStr>(kind: &str, raw: &str) -> Result<T, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid {kind} id: {raw}")))
}
