//! A small in-process stand-in for the storefront backend.
//!
//! It serves the auth endpoints the session layer talks to from in-memory
//! state, which makes it useful both for demos (`storefront-auth
//! mock-backend`) and as a real HTTP peer in integration tests.

mod auth_routes;
mod error;
mod extract;
mod health_routes;
mod profile_routes;
mod state;
mod tokens;

use axum::Router;

pub use error::HTTPError;
pub use extract::AuthenticatedUser;
pub use state::{BackendState, DEMO_EMAIL, DEMO_PASSWORD};

/// Builds the backend router. Paths are served without a prefix; mount it
/// with [`Router::nest`] to reproduce an `/api` base path.
pub fn create_router(state: BackendState) -> Router {
    Router::new()
        .merge(auth_routes::routes())
        .merge(profile_routes::routes())
        .merge(health_routes::routes())
        .with_state(state)
}
