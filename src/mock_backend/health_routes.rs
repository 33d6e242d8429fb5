use axum::body::Body;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;

use super::state::BackendState;

pub fn routes() -> Router<BackendState> {
    Router::new().route("/health", get(health_check))
}

async fn health_check() -> impl IntoResponse {
    Response::new(Body::from("OK"))
}
