use axum::routing::get;
use axum::{Json, Router};

use super::extract::AuthenticatedUser;
use super::state::BackendState;
use crate::endpoints;
use crate::models::User;

pub fn routes() -> Router<BackendState> {
    Router::new().route(endpoints::USER_PROFILE, get(profile))
}

async fn profile(AuthenticatedUser(user): AuthenticatedUser) -> Json<User> {
    Json(user)
}
