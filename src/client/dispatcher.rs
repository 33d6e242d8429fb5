use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use super::request::{ApiRequest, ApiResponse};
use crate::config::ApiConfig;
use crate::error::ClientError;
use crate::store::TokenStore;

const DEFAULT_ERROR_MESSAGE: &str = "An error occurred";

/// Whether a send is the first try or the single replay after a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    Initial,
    Replay,
}

/// The result of one send, discriminated so the coordinator can decide what
/// to do without inspecting raw statuses.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Success(ApiResponse),
    /// A first attempt was rejected with 401. `sent_token` is the access token
    /// that was attached, so the caller can tell whether it is already stale.
    AuthExpired { sent_token: Option<String> },
    Failure(ClientError),
}

impl DispatchOutcome {
    /// Collapses the outcome for callers that do not recover from 401.
    pub fn into_result(self) -> Result<ApiResponse, ClientError> {
        match self {
            DispatchOutcome::Success(resp) => Ok(resp),
            DispatchOutcome::AuthExpired { .. } => Err(ClientError::Unauthorized),
            DispatchOutcome::Failure(e) => Err(e),
        }
    }
}

/// Sends requests to the backend with the store's current access token.
#[derive(Clone)]
pub struct RequestDispatcher {
    http: reqwest::Client,
    base_url: String,
    store: Arc<dyn TokenStore>,
}

impl RequestDispatcher {
    pub fn new(config: &ApiConfig, store: Arc<dyn TokenStore>) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(RequestDispatcher {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            store,
        })
    }

    pub fn store(&self) -> &Arc<dyn TokenStore> {
        &self.store
    }

    pub fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Sends `request` with whatever access token the store holds right now.
    pub async fn send(&self, request: &ApiRequest, attempt: Attempt) -> DispatchOutcome {
        let token = self.store.access_token().await;
        self.send_with_token(request, token.as_deref(), attempt).await
    }

    /// Sends `request` with an explicit access token (or none).
    pub async fn send_with_token(
        &self,
        request: &ApiRequest,
        token: Option<&str>,
        attempt: Attempt,
    ) -> DispatchOutcome {
        match self.execute(request, token).await {
            Ok(resp) => DispatchOutcome::Success(resp),
            Err(ClientError::Http { status: 401, .. }) => match attempt {
                Attempt::Initial => DispatchOutcome::AuthExpired {
                    sent_token: token.map(str::to_string),
                },
                Attempt::Replay => DispatchOutcome::Failure(ClientError::Unauthorized),
            },
            Err(e) => DispatchOutcome::Failure(e),
        }
    }

    /// Sends `request` without credentials. A 401 here is an ordinary
    /// failure (bad password, revoked refresh token), not an expiry.
    pub async fn send_anonymous(&self, request: &ApiRequest) -> Result<ApiResponse, ClientError> {
        self.execute(request, None).await
    }

    async fn execute(
        &self,
        request: &ApiRequest,
        token: Option<&str>,
    ) -> Result<ApiResponse, ClientError> {
        let url = self.url(&request.path);
        let mut builder = self.http.request(request.method.clone(), &url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let resp = builder.send().await.map_err(|e| {
            debug!(
                event_name = "client.request.transport_error",
                event_domain = "client",
                method = %request.method,
                path = request.path.as_str(),
                "No response: {}",
                e
            );
            ClientError::Transport(e.to_string())
        })?;

        let status = resp.status();
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        let body = serde_json::from_slice::<Value>(&bytes).unwrap_or(Value::Null);

        debug!(
            event_name = "client.request.completed",
            event_domain = "client",
            method = %request.method,
            path = request.path.as_str(),
            status = status.as_u16(),
            authenticated = token.is_some(),
            "{} {} -> {}",
            request.method,
            request.path,
            status.as_u16()
        );

        if status.is_success() {
            Ok(ApiResponse {
                status: status.as_u16(),
                body,
            })
        } else {
            Err(ClientError::Http {
                status: status.as_u16(),
                message: error_message(&body),
            })
        }
    }
}

/// Pulls a message out of an error body: `error`, then `message`.
fn error_message(body: &Value) -> String {
    body.get("error")
        .and_then(Value::as_str)
        .or_else(|| body.get("message").and_then(Value::as_str))
        .unwrap_or(DEFAULT_ERROR_MESSAGE)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TokenPair;
    use crate::store::MemoryStore;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn dispatcher(url: &str, tokens: TokenPair) -> RequestDispatcher {
        let store: Arc<dyn TokenStore> = Arc::new(MemoryStore::with_tokens(tokens));
        RequestDispatcher::new(&ApiConfig::new(url), store).unwrap()
    }

    fn pair(access: &str) -> TokenPair {
        TokenPair::new(Some(access.to_string()), Some("r1".to_string()))
    }

    #[tokio::test]
    async fn attaches_current_bearer_token() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("GET", "/api/orders/my-orders")
            .match_header("authorization", "Bearer a1")
            .with_status(200)
            .with_body(r#"[{"id":"o1"}]"#)
            .create_async()
            .await;

        let d = dispatcher(&format!("{}/api/", server.url()), pair("a1"));
        let outcome = d.send(&ApiRequest::get("/orders/my-orders"), Attempt::Initial).await;

        m.assert_async().await;
        assert_eq!(
            outcome,
            DispatchOutcome::Success(ApiResponse {
                status: 200,
                body: json!([{"id": "o1"}]),
            })
        );
    }

    #[tokio::test]
    async fn reads_store_immediately_before_sending() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("GET", "/auth/me")
            .match_header("authorization", "Bearer a2")
            .with_status(200)
            .with_body(r#"{}"#)
            .create_async()
            .await;

        let d = dispatcher(&server.url(), pair("a1"));
        d.store().set(pair("a2")).await.unwrap();
        let outcome = d.send(&ApiRequest::get("/auth/me"), Attempt::Initial).await;

        m.assert_async().await;
        assert!(matches!(outcome, DispatchOutcome::Success(_)));
    }

    #[tokio::test]
    async fn no_token_means_no_authorization_header() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("POST", "/auth/login")
            .match_header("authorization", Matcher::Missing)
            .match_body(Matcher::Json(json!({"email": "a@b.c", "password": "pw"})))
            .with_status(200)
            .create_async()
            .await;

        let d = dispatcher(&server.url(), TokenPair::empty());
        let req = ApiRequest::post("/auth/login").json(json!({"email": "a@b.c", "password": "pw"}));
        let resp = d.send_anonymous(&req).await.unwrap();

        m.assert_async().await;
        assert_eq!(resp.body, Value::Null);
    }

    #[tokio::test]
    async fn unauthorized_first_attempt_reports_sent_token() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/auth/me")
            .with_status(401)
            .create_async()
            .await;

        let d = dispatcher(&server.url(), pair("a1"));
        let outcome = d.send(&ApiRequest::get("/auth/me"), Attempt::Initial).await;
        assert_eq!(
            outcome,
            DispatchOutcome::AuthExpired {
                sent_token: Some("a1".to_string())
            }
        );
    }

    #[tokio::test]
    async fn unauthorized_replay_is_terminal() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/auth/me")
            .with_status(401)
            .create_async()
            .await;

        let d = dispatcher(&server.url(), pair("a1"));
        let outcome = d
            .send_with_token(&ApiRequest::get("/auth/me"), Some("a2"), Attempt::Replay)
            .await;
        assert_eq!(outcome, DispatchOutcome::Failure(ClientError::Unauthorized));
    }

    #[tokio::test]
    async fn error_body_message_is_surfaced() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/orders")
            .with_status(422)
            .with_body(r#"{"error": "Cart is empty"}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/products/p1")
            .with_status(404)
            .with_body("not json")
            .create_async()
            .await;

        let d = dispatcher(&server.url(), pair("a1"));
        let outcome = d.send(&ApiRequest::post("/orders"), Attempt::Initial).await;
        assert_eq!(
            outcome,
            DispatchOutcome::Failure(ClientError::Http {
                status: 422,
                message: "Cart is empty".to_string()
            })
        );

        let outcome = d.send(&ApiRequest::get("/products/p1"), Attempt::Initial).await;
        assert_eq!(
            outcome,
            DispatchOutcome::Failure(ClientError::Http {
                status: 404,
                message: DEFAULT_ERROR_MESSAGE.to_string()
            })
        );
    }

    #[tokio::test]
    async fn unreachable_backend_is_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let d = dispatcher(&format!("http://{}", addr), pair("a1"));
        let outcome = d.send(&ApiRequest::get("/auth/me"), Attempt::Initial).await;
        assert!(matches!(
            outcome,
            DispatchOutcome::Failure(ClientError::Transport(_))
        ));
    }
}
