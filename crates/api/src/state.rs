//! Shared application state.

use std::sync::Arc;

use document_store::DocumentStore;
use domain::{CartService, Catalog, MarketSettings, OrderService};

use crate::auth::TokenService;

/// Shared application state accessible from all handlers.
pub struct AppState<S> {
    pub catalog: Catalog<S>,
    pub carts: CartService<S>,
    pub orders: OrderService<S>,
    pub tokens: TokenService,
    pub settings: Arc<MarketSettings>,
}

impl<S: DocumentStore + Clone> AppState<S> {
    /// Wires every service over one store.
    pub fn new(store: S, settings: MarketSettings, tokens: TokenService) -> Self {
        let settings = Arc::new(settings);
        Self {
            catalog: Catalog::new(store.clone(), Arc::clone(&settings)),
            carts: CartService::new(store.clone(), Arc::clone(&settings)),
            orders: OrderService::new(store, Arc::clone(&settings)),
            tokens,
            settings,
        }
    }
}
