use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use super::error::HTTPError;
use super::tokens::{mint_access_token, verify_access_token};
use crate::config::MockBackendConfig;
use crate::models::{AuthResponse, RefreshResponse, RegisterData, User};

pub const DEMO_EMAIL: &str = "demo@example.com";
pub const DEMO_PASSWORD: &str = "password";

const DEFAULT_ROLE: &str = "customer";

struct Account {
    password: String,
    user: User,
}

struct Inner {
    config: MockBackendConfig,
    /// Keyed by login email.
    accounts: RwLock<HashMap<String, Account>>,
    /// Refresh token to user id.
    refresh_tokens: RwLock<HashMap<String, String>>,
    generation: AtomicU64,
    refresh_calls: AtomicU64,
}

/// Shared state behind the mock backend's handlers. Clones share state, so
/// a test can keep a handle and poke at the backend while it serves.
#[derive(Clone)]
pub struct BackendState {
    inner: Arc<Inner>,
}

impl BackendState {
    /// Creates the backend with the demo account already registered.
    pub fn new(config: MockBackendConfig) -> Self {
        let demo = User::new(
            "user123",
            "John Doe",
            "john.doe@example.com",
            Some("Acme Construction Ltd.".to_string()),
            Some(vec![DEFAULT_ROLE.to_string()]),
        );
        let mut accounts = HashMap::new();
        accounts.insert(
            DEMO_EMAIL.to_string(),
            Account {
                password: DEMO_PASSWORD.to_string(),
                user: demo,
            },
        );

        BackendState {
            inner: Arc::new(Inner {
                config,
                accounts: RwLock::new(accounts),
                refresh_tokens: RwLock::new(HashMap::new()),
                generation: AtomicU64::new(0),
                refresh_calls: AtomicU64::new(0),
            }),
        }
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, HTTPError> {
        let user = {
            let accounts = self.inner.accounts.read().await;
            match accounts.get(email) {
                Some(account) if account.password == password => account.user.clone(),
                _ => return Err(HTTPError::unauthorized("Invalid email or password")),
            }
        };
        self.start_session(user).await
    }

    pub async fn register(&self, data: RegisterData) -> Result<AuthResponse, HTTPError> {
        if data.name.trim().is_empty() || data.email.trim().is_empty() || data.password.is_empty()
        {
            return Err(HTTPError::bad_request("All fields are required"));
        }

        let user = {
            let mut accounts = self.inner.accounts.write().await;
            if accounts.contains_key(&data.email) {
                return Err(HTTPError::new(
                    axum::http::StatusCode::CONFLICT,
                    "An account with this email already exists",
                ));
            }
            let user = User::new(
                format!("user-{}", Uuid::new_v4()),
                data.name,
                data.email.clone(),
                data.company,
                Some(vec![DEFAULT_ROLE.to_string()]),
            );
            accounts.insert(
                data.email,
                Account {
                    password: data.password,
                    user: user.clone(),
                },
            );
            user
        };
        self.start_session(user).await
    }

    /// Trades a refresh token for a new access token. The refresh token
    /// itself stays valid and is not echoed back.
    pub async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse, HTTPError> {
        self.inner.refresh_calls.fetch_add(1, Ordering::SeqCst);

        let delay = self.inner.config.refresh_delay_ms;
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        let user_id = self
            .inner
            .refresh_tokens
            .read()
            .await
            .get(refresh_token)
            .cloned()
            .ok_or_else(|| HTTPError::unauthorized("Invalid refresh token"))?;

        debug!(user_id = user_id.as_str(), "Refreshing access token");
        Ok(RefreshResponse {
            access_token: self.issue_access_token(&user_id)?,
            refresh_token: None,
        })
    }

    /// Revokes every refresh token held by `user_id`.
    pub async fn logout(&self, user_id: &str) {
        self.inner
            .refresh_tokens
            .write()
            .await
            .retain(|_, owner| owner != user_id);
        info!(
            event_name = "mock_backend.logout",
            event_domain = "mock_backend",
            user_id,
            "Session ended"
        );
    }

    /// Resolves a bearer token to its user.
    pub async fn user_for_token(&self, token: &str) -> Result<User, HTTPError> {
        let claims = verify_access_token(token, &self.inner.config.jwt_secret).map_err(|e| {
            debug!("Rejected access token: {}", e);
            HTTPError::unauthorized("Invalid or expired token")
        })?;
        if claims.gen < self.inner.generation.load(Ordering::SeqCst) {
            return Err(HTTPError::unauthorized("Invalid or expired token"));
        }

        self.user_by_id(&claims.sub)
            .await
            .ok_or_else(|| HTTPError::unauthorized("Invalid or expired token"))
    }

    /// Invalidates every access token issued so far; refresh tokens survive.
    pub fn expire_access_tokens(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Invalidates every refresh token, so the next refresh fails.
    pub async fn revoke_refresh_tokens(&self) {
        self.inner.refresh_tokens.write().await.clear();
    }

    /// How many refresh exchanges have been received.
    pub fn refresh_calls(&self) -> u64 {
        self.inner.refresh_calls.load(Ordering::SeqCst)
    }

    async fn user_by_id(&self, id: &str) -> Option<User> {
        self.inner
            .accounts
            .read()
            .await
            .values()
            .find(|account| account.user.id == id)
            .map(|account| account.user.clone())
    }

    async fn start_session(&self, user: User) -> Result<AuthResponse, HTTPError> {
        let access_token = self.issue_access_token(&user.id)?;
        let refresh_token = Uuid::new_v4().to_string();
        self.inner
            .refresh_tokens
            .write()
            .await
            .insert(refresh_token.clone(), user.id.clone());

        info!(
            event_name = "mock_backend.session.started",
            event_domain = "mock_backend",
            user_id = user.id.as_str(),
            "Issued tokens for '{}'",
            user.email
        );
        Ok(AuthResponse {
            access_token,
            refresh_token,
            user,
        })
    }

    fn issue_access_token(&self, user_id: &str) -> Result<String, HTTPError> {
        mint_access_token(
            user_id,
            self.inner.generation.load(Ordering::SeqCst),
            self.inner.config.access_token_ttl_secs,
            &self.inner.config.jwt_secret,
        )
        .map_err(|e| {
            HTTPError::new(
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to sign token: {}", e),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> BackendState {
        BackendState::new(MockBackendConfig::default())
    }

    #[tokio::test]
    async fn demo_login_issues_working_tokens() {
        let backend = backend();
        let auth = backend.login(DEMO_EMAIL, DEMO_PASSWORD).await.unwrap();
        assert_eq!(auth.user.id, "user123");
        assert_eq!(auth.user.company.as_deref(), Some("Acme Construction Ltd."));

        let user = backend.user_for_token(&auth.access_token).await.unwrap();
        assert_eq!(user, auth.user);
    }

    #[tokio::test]
    async fn wrong_password_is_unauthorized() {
        let err = backend().login(DEMO_EMAIL, "nope").await.unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn expiring_tokens_keeps_refresh_tokens_usable() {
        let backend = backend();
        let auth = backend.login(DEMO_EMAIL, DEMO_PASSWORD).await.unwrap();

        backend.expire_access_tokens();
        assert!(backend.user_for_token(&auth.access_token).await.is_err());

        let refreshed = backend.refresh(&auth.refresh_token).await.unwrap();
        assert!(refreshed.refresh_token.is_none());
        assert!(backend.user_for_token(&refreshed.access_token).await.is_ok());
        assert_eq!(backend.refresh_calls(), 1);
    }

    #[tokio::test]
    async fn logout_revokes_refresh_tokens() {
        let backend = backend();
        let auth = backend.login(DEMO_EMAIL, DEMO_PASSWORD).await.unwrap();
        backend.logout("user123").await;
        assert!(backend.refresh(&auth.refresh_token).await.is_err());
    }

    #[tokio::test]
    async fn duplicate_registration_conflicts() {
        let backend = backend();
        let data = RegisterData {
            name: "Jane".into(),
            email: DEMO_EMAIL.into(),
            password: "secret1".into(),
            company: None,
        };
        let err = backend.register(data).await.unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::CONFLICT);
    }
}
