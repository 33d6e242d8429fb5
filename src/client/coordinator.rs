//! Single-flight recovery from expired access tokens.
//!
//! The first request to come back with 401 starts one refresh exchange; every
//! other request that fails while it runs waits in a FIFO queue. When the
//! exchange finishes, each waiter receives either the new access token (and
//! replays once with it) or the refresh error.
//!
//! Ending the session (logout) bumps an epoch: waiters are rejected at once
//! and a refresh that completes afterwards is discarded instead of stored.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, oneshot, Mutex};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use super::dispatcher::{Attempt, DispatchOutcome, RequestDispatcher};
use super::request::{ApiRequest, ApiResponse};
use crate::endpoints;
use crate::error::{ClientError, StoreError};
use crate::events::{self, SessionEvent};
use crate::models::{RefreshRequest, RefreshResponse, TokenPair};
use crate::utils::log_throttle::LogThrottle;

const QUEUED_LOG_WINDOW: Duration = Duration::from_secs(30);

type Waiter = oneshot::Sender<Result<String, ClientError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    Refreshing,
}

#[derive(Default)]
struct CoordinatorState {
    refreshing: bool,
    pending: VecDeque<Waiter>,
    /// Incremented whenever the session is ended.
    epoch: u64,
}

struct Inner {
    dispatcher: RequestDispatcher,
    state: Mutex<CoordinatorState>,
    refresh_timeout: Duration,
    login_path: String,
    events: broadcast::Sender<SessionEvent>,
    exchanges: AtomicU64,
    throttle: LogThrottle,
}

/// Wraps a [`RequestDispatcher`] and transparently recovers from expired
/// access tokens. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

impl RefreshCoordinator {
    pub fn new(
        dispatcher: RequestDispatcher,
        refresh_timeout: Duration,
        login_path: impl Into<String>,
        events: broadcast::Sender<SessionEvent>,
    ) -> Self {
        RefreshCoordinator {
            inner: Arc::new(Inner {
                dispatcher,
                state: Mutex::new(CoordinatorState::default()),
                refresh_timeout,
                login_path: login_path.into(),
                events,
                exchanges: AtomicU64::new(0),
                throttle: LogThrottle::new(QUEUED_LOG_WINDOW),
            }),
        }
    }

    pub fn dispatcher(&self) -> &RequestDispatcher {
        &self.inner.dispatcher
    }

    pub async fn state(&self) -> RefreshState {
        if self.inner.state.lock().await.refreshing {
            RefreshState::Refreshing
        } else {
            RefreshState::Idle
        }
    }

    pub async fn pending_len(&self) -> usize {
        self.inner.state.lock().await.pending.len()
    }

    /// Number of refresh exchanges sent to the backend so far.
    pub fn exchange_count(&self) -> u64 {
        self.inner.exchanges.load(Ordering::SeqCst)
    }

    /// Sends `request`; on an authorization failure obtains a fresh token
    /// (starting or joining a refresh) and replays the request exactly once.
    pub async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, ClientError> {
        match self.inner.dispatcher.send(request, Attempt::Initial).await {
            DispatchOutcome::Success(resp) => Ok(resp),
            DispatchOutcome::Failure(e) => Err(e),
            DispatchOutcome::AuthExpired { sent_token } => {
                let token = self.fresh_token(request, sent_token).await?;
                self.replay(request, &token).await
            }
        }
    }

    async fn replay(&self, request: &ApiRequest, token: &str) -> Result<ApiResponse, ClientError> {
        match self
            .inner
            .dispatcher
            .send_with_token(request, Some(token), Attempt::Replay)
            .await
        {
            DispatchOutcome::Success(resp) => Ok(resp),
            DispatchOutcome::Failure(e) => {
                if e == ClientError::Unauthorized {
                    warn!(
                        event_name = "coordinator.replay.rejected",
                        event_domain = "coordinator",
                        path = request.path.as_str(),
                        "Request rejected again after refresh; not retrying"
                    );
                }
                Err(e)
            }
            DispatchOutcome::AuthExpired { .. } => Err(ClientError::Unauthorized),
        }
    }

    /// Resolves to the access token a 401'd request should replay with.
    async fn fresh_token(
        &self,
        request: &ApiRequest,
        sent_token: Option<String>,
    ) -> Result<String, ClientError> {
        let (tx, rx) = oneshot::channel();
        {
            let mut state = self.inner.state.lock().await;
            if state.refreshing {
                state.pending.push_back(tx);
                if let Some(suppressed_count) = self.inner.throttle.should_emit("coordinator.queued")
                {
                    debug!(
                        event_name = "coordinator.request.queued",
                        event_domain = "coordinator",
                        path = request.path.as_str(),
                        queue_len = state.pending.len(),
                        suppressed_count,
                        "Request queued behind in-flight refresh"
                    );
                }
            } else {
                // The 401 may belong to a token another caller has already replaced,
                // or to a session that has since been torn down.
                let current = self.inner.dispatcher.store().access_token().await;
                match (current, sent_token) {
                    (Some(current), sent) if sent.as_deref() != Some(current.as_str()) => {
                        debug!(
                            path = request.path.as_str(),
                            "Token already refreshed; replaying without a new exchange"
                        );
                        return Ok(current);
                    }
                    (None, Some(_)) => {
                        debug!(
                            path = request.path.as_str(),
                            "Session already ended; not refreshing"
                        );
                        return Err(ClientError::Unauthorized);
                    }
                    _ => {}
                }

                state.refreshing = true;
                state.pending.push_back(tx);
                let epoch = state.epoch;
                info!(
                    event_name = "coordinator.refresh.started",
                    event_domain = "coordinator",
                    path = request.path.as_str(),
                    "Access token rejected; refreshing"
                );
                // The exchange runs on its own task so a caller that gives up
                // cannot leave the coordinator stuck in `Refreshing`.
                let this = self.clone();
                tokio::spawn(async move { this.run_refresh(epoch).await });
            }
        }

        rx.await
            .unwrap_or_else(|_| Err(ClientError::Refresh("refresh task ended unexpectedly".into())))
    }

    /// Ends the session: clears the store, rejects every queued request and
    /// makes any in-flight refresh discard its result.
    pub async fn end_session(&self) -> Result<(), StoreError> {
        let mut state = self.inner.state.lock().await;
        state.epoch += 1;
        state.refreshing = false;
        let cleared = self.inner.dispatcher.store().clear().await;

        let waiters = std::mem::take(&mut state.pending);
        if !waiters.is_empty() {
            info!(
                event_name = "coordinator.session.ended",
                event_domain = "coordinator",
                rejected = waiters.len(),
                "Rejecting requests queued behind refresh"
            );
        }
        for waiter in waiters {
            let _ = waiter.send(Err(ClientError::Unauthorized));
        }
        cleared
    }

    async fn run_refresh(&self, epoch: u64) {
        let result = self.exchange().await;
        self.finish_refresh(epoch, result).await;
    }

    /// Applies the exchange result and releases the waiters in arrival order,
    /// unless the session ended while the exchange was running.
    async fn finish_refresh(&self, epoch: u64, result: Result<TokenPair, ClientError>) {
        let store = self.inner.dispatcher.store();
        let mut state = self.inner.state.lock().await;
        if state.epoch != epoch {
            debug!("Session ended during refresh; discarding result");
            return;
        }

        let result = match result {
            Ok(pair) => match pair.access_token.clone() {
                Some(access_token) => match store.set(pair).await {
                    Ok(()) => Ok(access_token),
                    Err(e) => Err(ClientError::from(e)),
                },
                None => Err(ClientError::Refresh(
                    "backend returned an empty access token".into(),
                )),
            },
            Err(e) => Err(e),
        };

        if let Err(e) = &result {
            warn!(
                event_name = "coordinator.refresh.failed",
                event_domain = "coordinator",
                "Refresh failed, tearing session down: {}",
                e
            );
            if let Err(store_err) = store.clear().await {
                error!("Failed to clear token store after refresh failure: {}", store_err);
            }
        }

        state.refreshing = false;
        let waiters = std::mem::take(&mut state.pending);
        let released = waiters.len();
        for waiter in waiters {
            // A dropped receiver means that caller stopped waiting.
            let _ = waiter.send(result.clone());
        }
        drop(state);

        match result {
            Ok(_) => {
                info!(
                    event_name = "coordinator.refresh.succeeded",
                    event_domain = "coordinator",
                    released,
                    "Access token refreshed"
                );
                events::emit(&self.inner.events, SessionEvent::Refreshed);
            }
            Err(_) => events::emit(
                &self.inner.events,
                SessionEvent::Expired {
                    redirect_to: self.inner.login_path.clone(),
                },
            ),
        }
    }

    /// Trades the stored refresh token for a new pair. Storing it is left to
    /// `finish_refresh`, under the state lock.
    async fn exchange(&self) -> Result<TokenPair, ClientError> {
        let store = self.inner.dispatcher.store();
        let refresh_token = store
            .get()
            .await
            .refresh_token
            .ok_or(ClientError::MissingRefreshToken)?;

        let request = ApiRequest::post(endpoints::AUTH_REFRESH).with_body(&RefreshRequest {
            refresh_token: refresh_token.clone(),
        })?;

        self.inner.exchanges.fetch_add(1, Ordering::SeqCst);
        let response = match timeout(
            self.inner.refresh_timeout,
            self.inner.dispatcher.send_anonymous(&request),
        )
        .await
        {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(ClientError::Refresh(e.to_string())),
            Err(_) => {
                return Err(ClientError::RefreshTimeout(
                    self.inner.refresh_timeout.as_millis() as u64,
                ))
            }
        };

        Ok(response
            .json::<RefreshResponse>()
            .map_err(|e| ClientError::Refresh(e.to_string()))?
            .into_pair(&refresh_token))
    }
}
