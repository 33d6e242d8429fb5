//! Wiring: building a session from configuration, and serving the mock
//! backend.

use std::net::SocketAddr;

use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::{ConfigV1, MockBackendConfig};
use crate::error::ClientError;
use crate::mock_backend::{create_router, BackendState};
use crate::session::Session;
use crate::store::create_store;

/// Path prefix the mock backend is mounted under, matching the default
/// `http://localhost:5000/api` base URL.
pub const MOCK_API_PREFIX: &str = "/api";

/// Opens the configured store, builds a session over it and confirms any
/// stored credentials with the backend.
pub async fn connect(config: &ConfigV1) -> Result<Session, ClientError> {
    let store = create_store(&config.store).await?;
    info!(
        event_name = "session.connect",
        event_domain = "session",
        store = store.backend_name(),
        base_url = config.api.base_url.as_str(),
        "Connecting session"
    );
    let session = Session::new(&config.api, store).await?;
    session.restore().await;
    Ok(session)
}

fn mock_app(state: BackendState) -> Router {
    Router::new().nest(MOCK_API_PREFIX, create_router(state))
}

/// Serves the mock backend on the configured address until the process ends.
pub async fn run_mock_backend(config: MockBackendConfig) -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind(&config.bind_address).await?;
    info!(
        "Mock backend listening on http://{}{}",
        listener.local_addr()?,
        MOCK_API_PREFIX
    );
    axum::serve(listener, mock_app(BackendState::new(config))).await?;
    Ok(())
}

/// Serves `state` on `bind_address` in a background task and returns the
/// address actually bound (use port 0 for an ephemeral port).
pub async fn spawn_mock_backend(
    state: BackendState,
    bind_address: &str,
) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
    let listener = TcpListener::bind(bind_address).await?;
    let addr = listener.local_addr()?;
    let app = mock_app(state);
    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Mock backend stopped: {}", e);
        }
    });
    Ok((addr, handle))
}
