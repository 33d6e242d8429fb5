use serde::{Deserialize, Serialize};

use super::user::User;

/// Snapshot of both credentials held by a token store.
///
/// Empty strings are normalised to `None` so that a blank access token never
/// counts as a session.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

impl TokenPair {
    pub fn new(access_token: Option<String>, refresh_token: Option<String>) -> Self {
        TokenPair {
            access_token: access_token.filter(|t| !t.is_empty()),
            refresh_token: refresh_token.filter(|t| !t.is_empty()),
        }
    }

    pub fn empty() -> Self {
        TokenPair::default()
    }

    pub fn has_access_token(&self) -> bool {
        self.access_token.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none()
    }
}

impl From<&AuthResponse> for TokenPair {
    fn from(resp: &AuthResponse) -> Self {
        TokenPair::new(
            Some(resp.access_token.clone()),
            Some(resp.refresh_token.clone()),
        )
    }
}

/// Body returned by the login and register endpoints.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user: User,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Body returned by `/auth/refresh`. Backends that do not rotate refresh
/// tokens omit `refresh_token`; the current one is then kept.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RefreshResponse {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl RefreshResponse {
    /// Merge the response with the refresh token that was exchanged.
    pub fn into_pair(self, exchanged: &str) -> TokenPair {
        let refresh = self
            .refresh_token
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| exchanged.to_string());
        TokenPair::new(Some(self.access_token), Some(refresh))
    }
}
