//! Product listing and review endpoints.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use common::ProductId;
use document_store::DocumentStore;
use domain::{
    BulkReviewReport, Money, NewProduct, Product, ProductFilter, ProductPage, ReviewDecision,
};
use serde::{Deserialize, Serialize};

use crate::auth::AuthenticatedActor;
use crate::error::ApiError;
use crate::extract::{Json, Path, Query};
use crate::routes::{MessageBody, Success, message, parse_id, success};
use crate::state::AppState;

// -- Request types --

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub search: Option<String>,
    pub crop_type: Option<String>,
    pub region: Option<String>,
    /// Unit price bounds in minor units.
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl From<ListQuery> for ProductFilter {
    fn from(query: ListQuery) -> Self {
        Self {
            search: query.search,
            crop_type: query.crop_type,
            region: query.region,
            min_price: query.min_price.map(Money::from_minor),
            max_price: query.max_price.map(Money::from_minor),
            limit: query.limit,
            offset: query.offset,
        }
    }
}

#[derive(Deserialize)]
pub struct RejectRequest {
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BulkAction {
    Approve,
    Reject,
}

#[derive(Deserialize)]
pub struct BulkActionRequest {
    pub product_ids: Vec<ProductId>,
    pub action: BulkAction,
    #[serde(default)]
    pub reason: Option<String>,
}

// -- Response types --

#[derive(Serialize)]
pub struct ProductBody {
    pub product: Product,
}

#[derive(Serialize)]
pub struct ProductsBody {
    pub count: usize,
    pub products: Vec<Product>,
}

impl From<Vec<Product>> for ProductsBody {
    fn from(products: Vec<Product>) -> Self {
        Self {
            count: products.len(),
            products,
        }
    }
}

#[derive(Serialize)]
pub struct CropTypesBody {
    pub crop_types: Vec<String>,
}

#[derive(Serialize)]
pub struct BulkBody {
    pub report: BulkReviewReport,
}

// -- Handlers --

/// GET /products — approved products, newest first.
#[tracing::instrument(skip(state))]
pub async fn list<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Success<ProductsBody>>, ApiError> {
    let products = state.catalog.list_approved(query.into()).await?;
    Ok(success(products.into()))
}

/// GET /products/search — approved products matching text and price bounds.
#[tracing::instrument(skip(state))]
pub async fn search<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Success<ProductPage>>, ApiError> {
    let page = state.catalog.search(query.into()).await?;
    Ok(success(page))
}

/// GET /products/crop-types
pub async fn crop_types<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Success<CropTypesBody>>, ApiError> {
    let crop_types = state.catalog.crop_types().await?;
    Ok(success(CropTypesBody { crop_types }))
}

/// GET /products/seller/:email — every listing of one seller, any status.
#[tracing::instrument(skip(state, actor), fields(actor = %actor.id))]
pub async fn by_seller<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Path(email): Path<String>,
) -> Result<Json<Success<ProductsBody>>, ApiError> {
    let products = state.catalog.list_by_seller(&actor, &email).await?;
    Ok(success(products.into()))
}

/// POST /products — a seller lists a product for review.
#[tracing::instrument(skip(state, actor, input), fields(actor = %actor.id))]
pub async fn create<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Json(input): Json<NewProduct>,
) -> Result<(StatusCode, Json<Success<ProductBody>>), ApiError> {
    let product = state.catalog.create_product(&actor, input).await?;
    Ok((StatusCode::CREATED, success(ProductBody { product })))
}

/// GET /products/:id
#[tracing::instrument(skip(state))]
pub async fn get<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Success<ProductBody>>, ApiError> {
    let product = state.catalog.get_product(parse_id("product", &id)?).await?;
    Ok(success(ProductBody { product }))
}

/// DELETE /products/:id — owning seller or admin.
#[tracing::instrument(skip(state, actor), fields(actor = %actor.id))]
pub async fn delete<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Path(id): Path<String>,
) -> Result<Json<Success<MessageBody>>, ApiError> {
    let product_id: ProductId = parse_id("product", &id)?;
    state.catalog.delete_product(&actor, product_id).await?;
    Ok(message(format!("product {product_id} deleted")))
}

/// GET /products/agent/pending — the caller's review queue.
#[tracing::instrument(skip(state, actor), fields(actor = %actor.id))]
pub async fn pending<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthenticatedActor(actor): AuthenticatedActor,
) -> Result<Json<Success<ProductsBody>>, ApiError> {
    let products = state.catalog.pending_for(&actor).await?;
    Ok(success(products.into()))
}

/// PATCH /products/:id/approve
#[tracing::instrument(skip(state, actor), fields(actor = %actor.id))]
pub async fn approve<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Path(id): Path<String>,
) -> Result<Json<Success<ProductBody>>, ApiError> {
    let product = state
        .catalog
        .review(&actor, parse_id("product", &id)?, ReviewDecision::Approve)
        .await?;
    Ok(success(ProductBody { product }))
}

/// PATCH /products/:id/reject — requires a reason.
#[tracing::instrument(skip(state, actor, req), fields(actor = %actor.id))]
pub async fn reject<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Path(id): Path<String>,
    Json(req): Json<RejectRequest>,
) -> Result<Json<Success<ProductBody>>, ApiError> {
    let product = state
        .catalog
        .review(
            &actor,
            parse_id("product", &id)?,
            ReviewDecision::Reject { reason: req.reason },
        )
        .await?;
    Ok(success(ProductBody { product }))
}

/// PATCH /products/bulk-action — admin approve/reject of many products.
#[tracing::instrument(skip(state, actor, req), fields(actor = %actor.id, count = req.product_ids.len()))]
pub async fn bulk_action<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Json(req): Json<BulkActionRequest>,
) -> Result<Json<Success<BulkBody>>, ApiError> {
    if req.product_ids.is_empty() {
        return Err(ApiError::BadRequest("product_ids must not be empty".into()));
    }
    let decision = match req.action {
        BulkAction::Approve => ReviewDecision::Approve,
        BulkAction::Reject => ReviewDecision::Reject {
            reason: req.reason.unwrap_or_default(),
        },
    };
    let report = state
        .catalog
        .bulk_review(&actor, &req.product_ids, decision)
        .await?;
    Ok(success(BulkBody { report }))
}
