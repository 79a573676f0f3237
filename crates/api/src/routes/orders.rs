//! Order placement and lifecycle endpoints.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use common::OrderId;
use document_store::DocumentStore;
use domain::{Checkout, DeliveryStatus, Order, OrderPage};
use serde::{Deserialize, Serialize};

use crate::auth::AuthenticatedActor;
use crate::error::ApiError;
use crate::extract::{Json, Path, Query};
use crate::routes::{Success, parse_id, success};
use crate::state::AppState;

// -- Request types --

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Deserialize)]
pub struct DeliveryStatusRequest {
    pub delivery_status: String,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderBody {
    pub order: Order,
}

#[derive(Serialize)]
pub struct TransitionBody {
    pub message: String,
    pub order: Order,
}

// -- Handlers --

/// POST /orders/checkout — place an order; all lines or none.
#[tracing::instrument(skip(state, actor, checkout), fields(actor = %actor.id))]
pub async fn checkout<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Json(checkout): Json<Checkout>,
) -> Result<(StatusCode, Json<Success<OrderBody>>), ApiError> {
    let order = state.orders.checkout(&actor, checkout).await?;
    Ok((StatusCode::CREATED, success(OrderBody { order })))
}

/// GET /orders — orders visible to the caller's role.
#[tracing::instrument(skip(state, actor), fields(actor = %actor.id))]
pub async fn list<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Query(query): Query<ListQuery>,
) -> Result<Json<Success<OrderPage>>, ApiError> {
    let page = state
        .orders
        .list_orders(&actor, query.limit, query.offset)
        .await?;
    Ok(success(page))
}

/// GET /orders/:id
#[tracing::instrument(skip(state, actor), fields(actor = %actor.id))]
pub async fn get<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Path(id): Path<String>,
) -> Result<Json<Success<OrderBody>>, ApiError> {
    let order = state.orders.get_order(&actor, parse_order_id(&id)?).await?;
    Ok(success(OrderBody { order }))
}

/// PATCH /orders/:id/delivery-status
#[tracing::instrument(skip(state, actor, req), fields(actor = %actor.id, target = %req.delivery_status))]
pub async fn update_delivery_status<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Path(id): Path<String>,
    Json(req): Json<DeliveryStatusRequest>,
) -> Result<Json<Success<OrderBody>>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let target: DeliveryStatus = req.delivery_status.parse().map_err(ApiError::BadRequest)?;
    let order = state
        .orders
        .update_delivery_status(&actor, order_id, target)
        .await?;
    Ok(success(OrderBody { order }))
}

/// POST /orders/:id/complete — buyer confirms receipt.
#[tracing::instrument(skip(state, actor), fields(actor = %actor.id))]
pub async fn complete<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Path(id): Path<String>,
) -> Result<Json<Success<TransitionBody>>, ApiError> {
    let order = state.orders.complete(&actor, parse_order_id(&id)?).await?;
    Ok(success(TransitionBody {
        message: format!("order {} completed", order.order_number()),
        order,
    }))
}

/// POST /orders/:id/cancel — only while packaging; the order is removed.
#[tracing::instrument(skip(state, actor), fields(actor = %actor.id))]
pub async fn cancel<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Path(id): Path<String>,
) -> Result<Json<Success<TransitionBody>>, ApiError> {
    let order = state.orders.cancel(&actor, parse_order_id(&id)?).await?;
    Ok(success(TransitionBody {
        message: format!(
            "order {} cancelled and stock restored",
            order.order_number()
        ),
        order,
    }))
}

/// POST /orders/:id/return
#[tracing::instrument(skip(state, actor), fields(actor = %actor.id))]
pub async fn return_order<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Path(id): Path<String>,
) -> Result<Json<Success<TransitionBody>>, ApiError> {
    let order = state.orders.return_order(&actor, parse_order_id(&id)?).await?;
    Ok(success(TransitionBody {
        message: format!("order {} returned and stock restored", order.order_number()),
        order,
    }))
}

fn parse_order_id(id: &str) -> Result<OrderId, ApiError> {
    parse_id("order", id)
}
