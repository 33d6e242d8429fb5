use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use super::error::HTTPError;
use super::state::BackendState;
use crate::models::User;

/// The user behind a valid `Authorization: Bearer` header.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

#[async_trait]
impl FromRequestParts<BackendState> for AuthenticatedUser {
    type Rejection = HTTPError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &BackendState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| HTTPError::unauthorized("Access token required"))?;

        state.user_for_token(token).await.map(AuthenticatedUser)
    }
}
