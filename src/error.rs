//! Error types shared by the token store, dispatcher and session.

use thiserror::Error;

/// Errors a storage backend can report.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("failed to read token storage: {0}")]
    Read(String),
    #[error("failed to write token storage: {0}")]
    Write(String),
}

/// Every failure a caller of the session layer can observe.
///
/// The type is `Clone` because a single refresh failure is delivered to every
/// request queued behind it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    /// No response was received (connect error, timeout, broken body stream).
    #[error("transport error: {0}")]
    Transport(String),

    /// The backend rejected a request that had already been replayed with a
    /// refreshed token.
    #[error("unauthorized")]
    Unauthorized,

    /// Any other non-success status.
    #[error("request failed with status {status}: {message}")]
    Http { status: u16, message: String },

    /// The refresh exchange was rejected by the backend or failed in transit.
    #[error("token refresh failed: {0}")]
    Refresh(String),

    #[error("no refresh token available")]
    MissingRefreshToken,

    #[error("token refresh timed out after {0} ms")]
    RefreshTimeout(u64),

    /// Local form validation; never reaches the network.
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl ClientError {
    /// The HTTP status associated with this error, if the backend answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Unauthorized => Some(401),
            ClientError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True for errors that end the session (the user has to log in again).
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            ClientError::Unauthorized
                | ClientError::Refresh(_)
                | ClientError::MissingRefreshToken
                | ClientError::RefreshTimeout(_)
        )
    }

    /// Text suitable for showing to the end user.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Transport(_) => {
                "No response from server. Please check your connection.".to_string()
            }
            ClientError::Validation(message) => message.clone(),
            ClientError::Http { status, message } => match *status {
                401 => SESSION_EXPIRED.to_string(),
                403 => "You do not have permission to perform this action.".to_string(),
                404 => "The requested resource was not found.".to_string(),
                s if s >= 500 => "A server error occurred. Please try again later.".to_string(),
                _ => message.clone(),
            },
            e if e.is_session_fatal() => SESSION_EXPIRED.to_string(),
            _ => "An unexpected error occurred".to_string(),
        }
    }
}

const SESSION_EXPIRED: &str = "Your session has expired. Please log in again.";

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ClientError::Decode(e.to_string())
        } else {
            ClientError::Transport(e.to_string())
        }
    }
}

impl From<validator::ValidationErrors> for ClientError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ClientError::Validation(crate::models::credentials::describe(&errors))
    }
}
