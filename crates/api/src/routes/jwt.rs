//! Token issue, verification and logout.

use std::sync::Arc;

use axum::extract::State;
use axum::http::header::SET_COOKIE;
use axum::response::IntoResponse;
use common::{Actor, Role};
use serde::{Deserialize, Serialize};

use crate::auth::{AuthenticatedActor, TokenService};
use crate::error::ApiError;
use crate::extract::Json;
use crate::routes::{message, success};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct IssueRequest {
    pub uid: String,
    pub email: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub region: Option<String>,
}

#[derive(Serialize)]
pub struct IssuedBody {
    pub message: &'static str,
    pub token: String,
    pub user: Actor,
}

#[derive(Serialize)]
pub struct UserBody {
    pub user: Actor,
}

/// POST /jwt — issue a token for an identity vouched for upstream.
#[tracing::instrument(skip(state, req), fields(uid = %req.uid, role = %req.role))]
pub async fn issue<S: Send + Sync + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<IssueRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.uid.trim().is_empty() || req.email.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "user id and email are required".to_string(),
        ));
    }

    let mut user = Actor::new(req.uid.trim(), req.email.trim(), req.role);
    if let Some(region) = req.region.as_deref() {
        let region = state.settings.resolve_region(region).ok_or_else(|| {
            ApiError::BadRequest(format!("unknown region: {region}"))
        })?;
        user = user.with_region(region);
    }

    let token = state.tokens.issue(&user)?;
    let cookie = state.tokens.cookie(&token);
    Ok((
        [(SET_COOKIE, cookie)],
        success(IssuedBody {
            message: "token issued",
            token,
            user,
        }),
    ))
}

/// GET /jwt/verify — echo the identity carried by the caller's token.
pub async fn verify(AuthenticatedActor(user): AuthenticatedActor) -> impl IntoResponse {
    success(UserBody { user })
}

/// POST /jwt/logout — drop the token cookie.
pub async fn logout() -> impl IntoResponse {
    (
        [(SET_COOKIE, TokenService::expired_cookie())],
        message("logged out"),
    )
}
