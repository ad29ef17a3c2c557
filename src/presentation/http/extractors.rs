//! Custom Extractors

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::presentation::middleware::AuthUser;
use crate::shared::error::AppError;

/// Pulls the user the auth middleware attached to the request.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized("Not authenticated".into()))
    }
}
