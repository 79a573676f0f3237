//! Cart endpoints. Carts are addressed by owner email.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use common::ProductId;
use document_store::DocumentStore;
use domain::{
    AddMultipleReport, AddOutcome, CartAddition, CartOperation, CartSummary, MergeCandidate,
    MergePreview, Order, PaymentMethod, ShippingAddress,
};
use serde::{Deserialize, Serialize};

use crate::auth::AuthenticatedActor;
use crate::error::ApiError;
use crate::extract::{Json, Path};
use crate::routes::orders::OrderBody;
use crate::routes::{Success, success};
use crate::state::AppState;

// -- Request types --

#[derive(Deserialize)]
pub struct AddItemRequest {
    pub email: String,
    pub product_id: ProductId,
    pub quantity: u32,
}

#[derive(Deserialize)]
pub struct AddMultipleRequest {
    pub email: String,
    pub items: Vec<CartAddition>,
}

#[derive(Deserialize)]
pub struct UpdateItemRequest {
    pub email: String,
    pub product_id: ProductId,
    pub quantity: u32,
}

#[derive(Deserialize)]
pub struct RemoveItemRequest {
    pub email: String,
    pub product_id: ProductId,
}

#[derive(Deserialize)]
pub struct BatchUpdateRequest {
    pub email: String,
    pub operations: Vec<CartOperation>,
}

#[derive(Deserialize)]
pub struct PreviewMergeRequest {
    pub email: String,
    pub items: Vec<MergeCandidate>,
}

#[derive(Deserialize)]
pub struct CartCheckoutRequest {
    pub shipping_address: ShippingAddress,
    #[serde(default)]
    pub payment_method: PaymentMethod,
}

// -- Response types --

#[derive(Serialize)]
pub struct CartBody {
    pub cart: CartSummary,
}

#[derive(Serialize)]
pub struct AddItemBody {
    pub cart: CartSummary,
    pub merged: bool,
}

#[derive(Serialize)]
pub struct AddMultipleBody {
    pub cart: CartSummary,
    pub report: AddMultipleReport,
}

#[derive(Serialize)]
pub struct BatchUpdateBody {
    pub cart: CartSummary,
    pub applied: usize,
}

#[derive(Serialize)]
pub struct PreviewBody {
    pub preview: MergePreview,
}

// -- Handlers --

/// GET /cart/:email
#[tracing::instrument(skip(state, actor), fields(actor = %actor.id))]
pub async fn get<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Path(email): Path<String>,
) -> Result<Json<Success<CartBody>>, ApiError> {
    let cart = state.carts.get_cart(&actor, &email).await?;
    Ok(success(CartBody {
        cart: cart.summary(),
    }))
}

/// DELETE /cart/:email — empty the cart.
#[tracing::instrument(skip(state, actor), fields(actor = %actor.id))]
pub async fn clear<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Path(email): Path<String>,
) -> Result<Json<Success<CartBody>>, ApiError> {
    let cart = state.carts.clear(&actor, &email).await?;
    Ok(success(CartBody {
        cart: cart.summary(),
    }))
}

/// POST /cart/add
#[tracing::instrument(skip(state, actor, req), fields(actor = %actor.id, product_id = %req.product_id))]
pub async fn add<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Json(req): Json<AddItemRequest>,
) -> Result<Json<Success<AddItemBody>>, ApiError> {
    let (cart, outcome) = state
        .carts
        .add_item(&actor, &req.email, req.product_id, req.quantity)
        .await?;
    Ok(success(AddItemBody {
        cart: cart.summary(),
        merged: matches!(outcome, AddOutcome::Merged { .. }),
    }))
}

/// POST /cart/add-multiple — per-item outcomes, partial success allowed.
#[tracing::instrument(skip(state, actor, req), fields(actor = %actor.id))]
pub async fn add_multiple<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Json(req): Json<AddMultipleRequest>,
) -> Result<Json<Success<AddMultipleBody>>, ApiError> {
    if req.items.is_empty() {
        return Err(ApiError::BadRequest("items must not be empty".into()));
    }
    let (cart, report) = state
        .carts
        .add_multiple(&actor, &req.email, &req.items)
        .await?;
    Ok(success(AddMultipleBody {
        cart: cart.summary(),
        report,
    }))
}

/// PUT /cart/update — overwrite a line's quantity.
#[tracing::instrument(skip(state, actor, req), fields(actor = %actor.id, product_id = %req.product_id))]
pub async fn update<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Json(req): Json<UpdateItemRequest>,
) -> Result<Json<Success<CartBody>>, ApiError> {
    let cart = state
        .carts
        .update_quantity(&actor, &req.email, req.product_id, req.quantity)
        .await?;
    Ok(success(CartBody {
        cart: cart.summary(),
    }))
}

/// DELETE /cart/remove
#[tracing::instrument(skip(state, actor, req), fields(actor = %actor.id, product_id = %req.product_id))]
pub async fn remove<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Json(req): Json<RemoveItemRequest>,
) -> Result<Json<Success<CartBody>>, ApiError> {
    let cart = state
        .carts
        .remove_item(&actor, &req.email, req.product_id)
        .await?;
    Ok(success(CartBody {
        cart: cart.summary(),
    }))
}

/// POST /cart/batch-update — invalid operations are skipped.
#[tracing::instrument(skip(state, actor, req), fields(actor = %actor.id))]
pub async fn batch_update<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Json(req): Json<BatchUpdateRequest>,
) -> Result<Json<Success<BatchUpdateBody>>, ApiError> {
    let (cart, applied) = state
        .carts
        .batch_apply(&actor, &req.email, &req.operations)
        .await?;
    Ok(success(BatchUpdateBody {
        cart: cart.summary(),
        applied,
    }))
}

/// POST /cart/preview-merge — read-only.
#[tracing::instrument(skip(state, actor, req), fields(actor = %actor.id))]
pub async fn preview_merge<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Json(req): Json<PreviewMergeRequest>,
) -> Result<Json<Success<PreviewBody>>, ApiError> {
    let preview = state
        .carts
        .preview_merge(&actor, &req.email, &req.items)
        .await?;
    Ok(success(PreviewBody { preview }))
}

/// POST /cart/:email/checkout — turn the cart into an order.
#[tracing::instrument(skip(state, actor, req), fields(actor = %actor.id))]
pub async fn checkout<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Path(email): Path<String>,
    Json(req): Json<CartCheckoutRequest>,
) -> Result<(StatusCode, Json<Success<OrderBody>>), ApiError> {
    let order: Order = state
        .orders
        .checkout_cart(&actor, &email, req.shipping_address, req.payment_method)
        .await?;
    Ok((StatusCode::CREATED, success(OrderBody { order })))
}
