//! Authenticated-owner extraction
//!
//! Registration, login, and token verification live in an upstream
//! identity service; by the time a request reaches this core it carries
//! a trusted `x-user-id` header (and optionally `x-user-email`, used by
//! the "needs my signature" view). Ownership checks trust these values.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::error::ApiError;

/// The identity the upstream gateway attached to the request.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: String,
    pub email: Option<String>,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ApiError::Forbidden("missing x-user-id header".to_string()))?
            .to_string();

        let email = parts
            .headers
            .get("x-user-email")
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(|v| v.to_string());

        Ok(AuthUser { id, email })
    }
}
