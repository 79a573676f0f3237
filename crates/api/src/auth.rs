//! Identity tokens and the authenticated-caller extractor.
//!
//! Tokens are HS256 JWTs carrying the caller's id, email, role and optional
//! region. They are read from `Authorization: Bearer <token>` or, failing
//! that, from the `jwt` cookie.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::request::Parts;
use chrono::Utc;
use common::{Actor, Role};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::AppState;

/// Name of the cookie holding the token.
pub const TOKEN_COOKIE: &str = "jwt";

/// JWT claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub id: String,
    pub email: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    pub iat: u64,
    pub exp: u64,
}

impl Claims {
    pub fn into_actor(self) -> Actor {
        Actor {
            id: self.id.into(),
            email: self.email,
            role: self.role,
            region: self.region,
        }
    }
}

/// Signs and verifies identity tokens with a shared secret.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl_secs: u64,
}

impl TokenService {
    pub fn new(secret: &str, ttl_secs: u64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
            ttl_secs,
        }
    }

    pub fn ttl_secs(&self) -> u64 {
        self.ttl_secs
    }

    /// Issues a token for `actor`, valid for the configured lifetime.
    pub fn issue(&self, actor: &Actor) -> Result<String, ApiError> {
        let now = Utc::now().timestamp().max(0) as u64;
        let claims = Claims {
            id: actor.id.to_string(),
            email: actor.email.clone(),
            role: actor.role,
            region: actor.region.clone(),
            iat: now,
            exp: now + self.ttl_secs,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| ApiError::Internal(format!("failed to sign token: {e}")))
    }

    /// Verifies signature and expiry.
    pub fn verify(&self, token: &str) -> Result<Claims, ApiError> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "token rejected");
                ApiError::Unauthorized("invalid or expired token".to_string())
            })
    }

    /// `Set-Cookie` value storing `token`.
    pub fn cookie(&self, token: &str) -> String {
        format!(
            "{TOKEN_COOKIE}={token}; Max-Age={}; Path=/; HttpOnly; SameSite=Strict",
            self.ttl_secs
        )
    }

    /// `Set-Cookie` value removing the token cookie.
    pub fn expired_cookie() -> String {
        format!("{TOKEN_COOKIE}=; Max-Age=0; Path=/; HttpOnly; SameSite=Strict")
    }
}

/// The verified caller of a request.
#[derive(Debug, Clone)]
pub struct AuthenticatedActor(pub Actor);

impl<S> FromRequestParts<Arc<AppState<S>>> for AuthenticatedActor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState<S>>,
    ) -> Result<Self, Self::Rejection> {
        let token = token_from_parts(parts)
            .ok_or_else(|| ApiError::Unauthorized("missing token".to_string()))?;
        let claims = state.tokens.verify(token)?;
        Ok(Self(claims.into_actor()))
    }
}

fn token_from_parts(parts: &Parts) -> Option<&str> {
    let bearer = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if bearer.is_some() {
        return bearer;
    }

    parts
        .headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|h| h.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == TOKEN_COOKIE)
        .map(|(_, value)| value)
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use axum::http::Request;

    use super::*;

    fn parts(header: (&str, &str)) -> Parts {
        let (parts, ()) = Request::builder()
            .header(header.0, header.1)
            .body(())
            .unwrap()
            .into_parts();
        parts
    }

    #[test]
    fn test_issue_then_verify() {
        let tokens = TokenService::new("test-secret", 60);
        let actor = Actor::new("u-1", "a@example.com", Role::Agent).with_region("Sylhet");

        let claims = tokens.verify(&tokens.issue(&actor).unwrap()).unwrap();
        assert_eq!(claims.exp - claims.iat, 60);
        assert_eq!(claims.into_actor(), actor);
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let token = TokenService::new("one", 60)
            .issue(&Actor::new("u-1", "a@example.com", Role::Admin))
            .unwrap();
        assert!(matches!(
            TokenService::new("two", 60).verify(&token),
            Err(ApiError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_token_from_header_or_cookie() {
        assert_eq!(
            token_from_parts(&parts(("authorization", "Bearer abc"))),
            Some("abc")
        );
        assert_eq!(
            token_from_parts(&parts(("cookie", "theme=dark; jwt=xyz"))),
            Some("xyz")
        );
        assert_eq!(token_from_parts(&parts(("cookie", "jwt="))), None);
        assert_eq!(token_from_parts(&parts(("authorization", "Basic abc"))), None);
    }
}
