//! HTTP API server for the produce marketplace.
//!
//! Provides REST endpoints for products, carts and orders, with JWT
//! authentication, structured logging (tracing) and Prometheus metrics.

pub mod auth;
pub mod config;
pub mod error;
pub mod extract;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, patch, post, put};
use document_store::DocumentStore;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use auth::{AuthenticatedActor, Claims, TokenService};
pub use config::{Config, ConfigError};
pub use error::ApiError;
pub use state::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: DocumentStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    use routes::{cart, health, jwt, orders, products, regions};

    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(health::check))
        .route("/regions", get(regions::list::<S>))
        // Tokens
        .route("/jwt", post(jwt::issue::<S>))
        .route("/jwt/verify", get(jwt::verify))
        .route("/jwt/logout", post(jwt::logout))
        // Products
        .route(
            "/products",
            get(products::list::<S>).post(products::create::<S>),
        )
        .route("/products/search", get(products::search::<S>))
        .route("/products/crop-types", get(products::crop_types::<S>))
        .route("/products/seller/{email}", get(products::by_seller::<S>))
        .route("/products/agent/pending", get(products::pending::<S>))
        .route("/products/bulk-action", patch(products::bulk_action::<S>))
        .route(
            "/products/{id}",
            get(products::get::<S>).delete(products::delete::<S>),
        )
        .route("/products/{id}/approve", patch(products::approve::<S>))
        .route("/products/{id}/reject", patch(products::reject::<S>))
        // Cart
        .route("/cart/add", post(cart::add::<S>))
        .route("/cart/add-multiple", post(cart::add_multiple::<S>))
        .route("/cart/update", put(cart::update::<S>))
        .route("/cart/remove", delete(cart::remove::<S>))
        .route("/cart/batch-update", post(cart::batch_update::<S>))
        .route("/cart/preview-merge", post(cart::preview_merge::<S>))
        .route("/cart/{email}", get(cart::get::<S>).delete(cart::clear::<S>))
        .route("/cart/{email}/checkout", post(cart::checkout::<S>))
        // Orders
        .route("/orders/checkout", post(orders::checkout::<S>))
        .route("/orders", get(orders::list::<S>))
        .route("/orders/{id}", get(orders::get::<S>))
        .route(
            "/orders/{id}/delivery-status",
            patch(orders::update_delivery_status::<S>),
        )
        .route("/orders/{id}/complete", post(orders::complete::<S>))
        .route("/orders/{id}/cancel", post(orders::cancel::<S>))
        .route("/orders/{id}/return", post(orders::return_order::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates application state from configuration over the given store.
pub fn create_state<S: DocumentStore + Clone + 'static>(store: S, config: &Config) -> Arc<AppState<S>> {
    let tokens = TokenService::new(&config.jwt_secret, config.token_ttl_secs);
    Arc::new(AppState::new(store, config.market.clone(), tokens))
}
