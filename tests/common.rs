#![allow(dead_code)]

use std::sync::Arc;

use storefront_auth::config::{ApiConfig, MockBackendConfig};
use storefront_auth::mock_backend::{BackendState, DEMO_EMAIL, DEMO_PASSWORD};
use storefront_auth::models::{LoginCredentials, TokenPair};
use storefront_auth::startup::{spawn_mock_backend, MOCK_API_PREFIX};
use storefront_auth::store::{MemoryStore, TokenStore};
use storefront_auth::Session;

/// A mock backend serving on an ephemeral port.
pub struct TestBackend {
    pub state: BackendState,
    pub base_url: String,
}

pub async fn spawn_backend(config: MockBackendConfig) -> TestBackend {
    let state = BackendState::new(config);
    let (addr, _handle) = spawn_mock_backend(state.clone(), "127.0.0.1:0")
        .await
        .expect("failed to bind mock backend");
    TestBackend {
        state,
        base_url: format!("http://{}{}", addr, MOCK_API_PREFIX),
    }
}

pub async fn spawn_default_backend() -> TestBackend {
    spawn_backend(MockBackendConfig::default()).await
}

pub fn memory_store(tokens: TokenPair) -> Arc<dyn TokenStore> {
    Arc::new(MemoryStore::with_tokens(tokens))
}

pub async fn session_over(api: &ApiConfig, store: Arc<dyn TokenStore>) -> Session {
    Session::new(api, store)
        .await
        .expect("failed to build session")
}

/// A fresh session logged in as the demo user, plus the store behind it.
pub async fn demo_session(api: &ApiConfig) -> (Session, Arc<dyn TokenStore>) {
    let store = memory_store(TokenPair::empty());
    let session = session_over(api, store.clone()).await;
    session
        .login(&LoginCredentials::new(DEMO_EMAIL, DEMO_PASSWORD))
        .await
        .expect("demo login should succeed");
    (session, store)
}

/// A base URL nothing is listening on.
pub fn closed_port_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    format!("http://{}", addr)
}
