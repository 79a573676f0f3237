//! Configured delivery regions.

use std::sync::Arc;

use axum::extract::State;
use serde::Serialize;

use crate::extract::Json;
use crate::routes::{Success, success};
use crate::state::AppState;

#[derive(Serialize)]
pub struct RegionsBody {
    pub regions: Vec<String>,
}

/// GET /regions — the regions products may be listed in and shipped to.
pub async fn list<S: Send + Sync + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Json<Success<RegionsBody>> {
    success(RegionsBody {
        regions: state.settings.regions.clone(),
    })
}
