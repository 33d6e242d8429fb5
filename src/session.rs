//! The session context: who is logged in, and the entry point for every
//! authenticated call the application makes.
//!
//! A `Session` is an ordinary value owned by the application's composition
//! root. Independent sessions (e.g. one per test) share nothing.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};
use validator::Validate;

use crate::client::{ApiRequest, ApiResponse, Attempt, RefreshCoordinator, RequestDispatcher};
use crate::config::ApiConfig;
use crate::endpoints;
use crate::error::ClientError;
use crate::events::{self, SessionEvent};
use crate::models::{AuthResponse, LoginCredentials, RegistrationForm, TokenPair, User};
use crate::store::TokenStore;

pub struct Session {
    coordinator: RefreshCoordinator,
    user: RwLock<Option<User>>,
    events: broadcast::Sender<SessionEvent>,
}

impl Session {
    /// Builds a session over `store`. The user is seeded from the store's
    /// cached copy; call [`Session::restore`] to confirm it with the backend.
    pub async fn new(config: &ApiConfig, store: Arc<dyn TokenStore>) -> Result<Self, ClientError> {
        let events = events::channel();
        let dispatcher = RequestDispatcher::new(config, store.clone())?;
        let coordinator = RefreshCoordinator::new(
            dispatcher,
            config.refresh_timeout(),
            config.login_path.clone(),
            events.clone(),
        );

        let cached_user = if store.access_token().await.is_some() {
            store.get_user().await
        } else {
            None
        };

        Ok(Session {
            coordinator,
            user: RwLock::new(cached_user),
            events,
        })
    }

    fn store(&self) -> &Arc<dyn TokenStore> {
        self.coordinator.dispatcher().store()
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Confirms a stored session with `GET /auth/me`. Any failure (including
    /// a failed refresh along the way) clears the credentials and leaves the
    /// session unauthenticated instead of surfacing the error.
    pub async fn restore(&self) -> Option<User> {
        if !self.is_authenticated().await {
            debug!("No stored access token; starting unauthenticated");
            *self.user.write().await = None;
            return None;
        }

        match self.fetch_current_user().await {
            Ok(user) => {
                info!(
                    event_name = "session.restored",
                    event_domain = "session",
                    user_id = user.id.as_str(),
                    "Restored session for '{}'",
                    user.email
                );
                Some(user)
            }
            Err(e) => {
                warn!(
                    event_name = "session.restore.failed",
                    event_domain = "session",
                    "Could not restore session, clearing credentials: {}",
                    e
                );
                self.drop_credentials().await;
                None
            }
        }
    }

    /// Fetches `/auth/me` through the refresh pipeline and caches the result.
    pub async fn fetch_current_user(&self) -> Result<User, ClientError> {
        let user: User = self.get_json(endpoints::AUTH_ME).await?;
        self.remember_user(Some(user.clone())).await;
        Ok(user)
    }

    pub async fn current_user(&self) -> Option<User> {
        // A refresh failure elsewhere may have cleared the store.
        if !self.is_authenticated().await {
            return None;
        }
        self.user.read().await.clone()
    }

    /// True iff the store holds an access token.
    pub async fn is_authenticated(&self) -> bool {
        self.store().access_token().await.is_some()
    }

    pub async fn has_role(&self, role: &str) -> bool {
        self.current_user()
            .await
            .is_some_and(|user| user.has_role(role))
    }

    pub async fn login(&self, credentials: &LoginCredentials) -> Result<User, ClientError> {
        credentials.validate()?;

        let request = ApiRequest::post(endpoints::AUTH_LOGIN).with_body(credentials)?;
        let response = self.coordinator.dispatcher().send_anonymous(&request).await?;
        let user = self.start(response).await?;

        info!(
            event_name = "session.login",
            event_domain = "session",
            user_id = user.id.as_str(),
            "Logged in as '{}'",
            user.email
        );
        events::emit(&self.events, SessionEvent::LoggedIn(user.clone()));
        Ok(user)
    }

    pub async fn register(&self, form: RegistrationForm) -> Result<User, ClientError> {
        let data = form.into_register_data()?;

        let request = ApiRequest::post(endpoints::AUTH_REGISTER).with_body(&data)?;
        let response = self.coordinator.dispatcher().send_anonymous(&request).await?;
        let user = self.start(response).await?;

        info!(
            event_name = "session.register",
            event_domain = "session",
            user_id = user.id.as_str(),
            "Registered '{}'",
            user.email
        );
        events::emit(&self.events, SessionEvent::Registered(user.clone()));
        Ok(user)
    }

    /// Tells the backend (best effort) and always drops local credentials,
    /// rejecting anything queued behind a refresh. The logout call never
    /// triggers a refresh.
    pub async fn logout(&self) {
        if self.is_authenticated().await {
            let request = ApiRequest::post(endpoints::AUTH_LOGOUT);
            let outcome = self
                .coordinator
                .dispatcher()
                .send(&request, Attempt::Initial)
                .await;
            if let Err(e) = outcome.into_result() {
                warn!(
                    event_name = "session.logout.remote_failed",
                    event_domain = "session",
                    "Logout call failed, clearing local session anyway: {}",
                    e
                );
            }
        }

        self.drop_credentials().await;
        info!(event_name = "session.logout", event_domain = "session", "Logged out");
        events::emit(&self.events, SessionEvent::LoggedOut);
    }

    /// Sends an application request through the refresh pipeline.
    pub async fn request(&self, request: &ApiRequest) -> Result<ApiResponse, ClientError> {
        self.coordinator.execute(request).await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.request(&ApiRequest::get(path)).await?.json()
    }

    async fn start(&self, response: ApiResponse) -> Result<User, ClientError> {
        let auth: AuthResponse = response.json()?;
        self.store().set(TokenPair::from(&auth)).await?;
        self.remember_user(Some(auth.user.clone())).await;
        Ok(auth.user)
    }

    async fn remember_user(&self, user: Option<User>) {
        if let Err(e) = self.store().set_user(user.clone()).await {
            warn!("Failed to persist user: {}", e);
        }
        *self.user.write().await = user;
    }

    /// Clears the store through the coordinator, so requests waiting on a
    /// refresh fail and a refresh still in flight cannot restore the tokens.
    async fn drop_credentials(&self) {
        if let Err(e) = self.coordinator.end_session().await {
            warn!("Failed to clear token store: {}", e);
        }
        *self.user.write().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use mockito::Server;

    async fn session_with(url: &str, tokens: TokenPair) -> Session {
        let store: Arc<dyn TokenStore> = Arc::new(MemoryStore::with_tokens(tokens));
        Session::new(&ApiConfig::new(url), store).await.unwrap()
    }

    fn closed_port_url() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn refresh_token_alone_is_not_authenticated() {
        let session = session_with(&closed_port_url(), TokenPair::empty()).await;
        session
            .store()
            .set(TokenPair::new(None, Some("r1".into())))
            .await
            .unwrap();
        assert!(!session.is_authenticated().await);
        assert!(session.current_user().await.is_none());
    }

    #[tokio::test]
    async fn logout_clears_store_when_backend_is_unreachable() {
        let session = session_with(
            &closed_port_url(),
            TokenPair::new(Some("a1".into()), Some("r1".into())),
        )
        .await;
        let mut events = session.subscribe();

        session.logout().await;

        assert!(!session.is_authenticated().await);
        assert!(session.store().get().await.is_empty());
        assert_eq!(events.recv().await.unwrap(), SessionEvent::LoggedOut);
    }

    #[tokio::test]
    async fn logout_does_not_refresh_on_401() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/auth/logout")
            .with_status(401)
            .create_async()
            .await;
        let refresh = server
            .mock("POST", "/auth/refresh")
            .expect(0)
            .create_async()
            .await;

        let session =
            session_with(&server.url(), TokenPair::new(Some("a1".into()), Some("r1".into()))).await;
        session.logout().await;

        refresh.assert_async().await;
        assert!(!session.is_authenticated().await);
    }

    #[tokio::test]
    async fn restore_failure_clears_instead_of_erroring() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/auth/me")
            .with_status(500)
            .create_async()
            .await;

        let session =
            session_with(&server.url(), TokenPair::new(Some("a1".into()), Some("r1".into()))).await;
        assert_eq!(session.restore().await, None);
        assert!(!session.is_authenticated().await);
    }

    #[tokio::test]
    async fn restore_caches_user_from_me_endpoint() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/auth/me")
            .match_header("authorization", "Bearer a1")
            .with_status(200)
            .with_body(r#"{"id":"user123","name":"John Doe","email":"john.doe@example.com","roles":["customer"]}"#)
            .create_async()
            .await;

        let session =
            session_with(&server.url(), TokenPair::new(Some("a1".into()), Some("r1".into()))).await;
        let user = session.restore().await.unwrap();
        assert_eq!(user.id, "user123");
        assert_eq!(session.current_user().await, Some(user.clone()));
        assert_eq!(session.store().get_user().await, Some(user));
        assert!(session.has_role("customer").await);
        assert!(!session.has_role("admin").await);
    }

    #[tokio::test]
    async fn invalid_login_never_reaches_network() {
        let mut server = Server::new_async().await;
        let login = server
            .mock("POST", "/auth/login")
            .expect(0)
            .create_async()
            .await;

        let session = session_with(&server.url(), TokenPair::empty()).await;
        let err = session
            .login(&LoginCredentials::new("", "password"))
            .await
            .unwrap_err();

        login.assert_async().await;
        assert_eq!(
            err,
            ClientError::Validation("All fields are required".to_string())
        );
    }

    #[tokio::test]
    async fn rejected_login_keeps_backend_message() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/auth/login")
            .with_status(401)
            .with_body(r#"{"error":"Invalid email or password"}"#)
            .create_async()
            .await;

        let session = session_with(&server.url(), TokenPair::empty()).await;
        let err = session
            .login(&LoginCredentials::new("demo@example.com", "wrong"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ClientError::Http {
                status: 401,
                message: "Invalid email or password".to_string()
            }
        );
        assert!(!session.is_authenticated().await);
    }

    #[tokio::test]
    async fn resource_calls_carry_the_bearer_token() {
        let mut server = Server::new_async().await;
        let mut mocks = Vec::new();
        for (method, path) in [
            ("GET", endpoints::PRODUCTS.to_string()),
            ("GET", endpoints::product("p1")),
            ("POST", endpoints::ORDERS.to_string()),
            ("GET", endpoints::MY_ORDERS.to_string()),
            ("DELETE", endpoints::order("o1")),
            ("PUT", endpoints::CHANGE_PASSWORD.to_string()),
        ] {
            mocks.push(
                server
                    .mock(method, path.as_str())
                    .match_header("authorization", "Bearer a1")
                    .with_status(200)
                    .with_body("{}")
                    .create_async()
                    .await,
            );
        }

        let session =
            session_with(&server.url(), TokenPair::new(Some("a1".into()), Some("r1".into()))).await;
        let requests = [
            ApiRequest::get(endpoints::PRODUCTS),
            ApiRequest::get(endpoints::product("p1")),
            ApiRequest::post(endpoints::ORDERS).json(serde_json::json!({"items": []})),
            ApiRequest::get(endpoints::MY_ORDERS),
            ApiRequest::delete(endpoints::order("o1")),
            ApiRequest::put(endpoints::CHANGE_PASSWORD)
                .json(serde_json::json!({"current": "password", "new": "secret1"})),
        ];
        for request in &requests {
            let response = session.request(request).await.unwrap();
            assert_eq!(response.status, 200);
        }
        for mock in mocks {
            mock.assert_async().await;
        }
    }
}
