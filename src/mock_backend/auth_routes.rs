//! `/auth/*` handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use super::error::HTTPError;
use super::extract::AuthenticatedUser;
use super::state::BackendState;
use crate::endpoints;
use crate::models::{
    AuthResponse, LoginCredentials, RefreshRequest, RefreshResponse, RegisterData, User,
};

pub fn routes() -> Router<BackendState> {
    Router::new()
        .route(endpoints::AUTH_LOGIN, post(login))
        .route(endpoints::AUTH_REGISTER, post(register))
        .route(endpoints::AUTH_REFRESH, post(refresh))
        .route(endpoints::AUTH_LOGOUT, post(logout))
        .route(endpoints::AUTH_ME, get(me))
}

async fn login(
    State(state): State<BackendState>,
    Json(credentials): Json<LoginCredentials>,
) -> Result<Json<AuthResponse>, HTTPError> {
    state
        .login(&credentials.email, &credentials.password)
        .await
        .map(Json)
}

async fn register(
    State(state): State<BackendState>,
    Json(data): Json<RegisterData>,
) -> Result<(StatusCode, Json<AuthResponse>), HTTPError> {
    let auth = state.register(data).await?;
    Ok((StatusCode::CREATED, Json(auth)))
}

async fn refresh(
    State(state): State<BackendState>,
    Json(body): Json<RefreshRequest>,
) -> Result<Json<RefreshResponse>, HTTPError> {
    state.refresh(&body.refresh_token).await.map(Json)
}

/// Logging out with a dead access token still succeeds; there is nothing
/// left to revoke that the client could use.
async fn logout(State(state): State<BackendState>, user: Option<AuthenticatedUser>) -> Json<Value> {
    if let Some(AuthenticatedUser(user)) = user {
        state.logout(&user.id).await;
    }
    Json(json!({ "message": "Logged out successfully" }))
}

async fn me(AuthenticatedUser(user): AuthenticatedUser) -> Json<User> {
    Json(user)
}
