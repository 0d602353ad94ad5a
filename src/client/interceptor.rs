//! Refresh-and-retry on `401` with a single-flight refresh gate.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;

use super::REFRESH_PATH;
use super::error::ClientError;
use super::transport::{ApiRequest, ApiResponse, Transport};

/// Consecutive ineffective refreshes allowed before giving up.
pub const DEFAULT_MAX_REFRESH_ATTEMPTS: u32 = 3;

/// Called once when the session cannot be recovered.
pub trait LoginRedirect: Send + Sync {
    fn redirect_to_login(&self);
}

/// Redirect hook for hosts without a login page; only logs.
pub struct LogRedirect;

impl LoginRedirect for LogRedirect {
    fn redirect_to_login(&self) {
        tracing::warn!("Session expired; login required");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientOptions {
    pub max_refresh_attempts: u32,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            max_refresh_attempts: DEFAULT_MAX_REFRESH_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RefreshOutcome {
    refreshed: bool,
    /// This caller ran (or refused) the refresh itself
    leader: bool,
}

/// Single-flight refresh coordination.
///
/// `generation` counts settled refreshes. A caller records it before sending;
/// if it moved by the time the caller reaches the gate, a refresh settled
/// after the request left and its outcome is reused. The mutex is held for
/// the whole refresh call, so at most one is ever in flight.
struct RefreshGate {
    generation: AtomicU64,
    attempts: AtomicU32,
    last: Mutex<Option<bool>>,
    max_attempts: u32,
}

impl RefreshGate {
    fn new(max_attempts: u32) -> Self {
        Self {
            generation: AtomicU64::new(0),
            attempts: AtomicU32::new(0),
            last: Mutex::new(None),
            max_attempts,
        }
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    async fn refresh(&self, observed: u64, transport: &dyn Transport) -> RefreshOutcome {
        let mut last = self.last.lock().await;

        if self.generation() != observed {
            return RefreshOutcome {
                refreshed: last.unwrap_or(false),
                leader: false,
            };
        }

        let refreshed = if self.attempts.load(Ordering::Acquire) >= self.max_attempts {
            tracing::warn!(
                attempts = self.max_attempts,
                "Refresh attempts exhausted"
            );
            false
        } else {
            self.attempts.fetch_add(1, Ordering::AcqRel);
            match transport.send(&ApiRequest::post(REFRESH_PATH)).await {
                Ok(response) if response.status.is_success() => true,
                Ok(response) => {
                    tracing::debug!(status = %response.status, "Refresh rejected");
                    false
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Refresh request failed");
                    false
                }
            }
        };

        *last = Some(refreshed);
        self.generation.fetch_add(1, Ordering::AcqRel);

        RefreshOutcome {
            refreshed,
            leader: true,
        }
    }

    fn reset_attempts(&self) {
        self.attempts.store(0, Ordering::Release);
    }
}

/// HTTP client that recovers expired sessions transparently.
pub struct AuthClient {
    transport: Arc<dyn Transport>,
    redirect: Arc<dyn LoginRedirect>,
    gate: RefreshGate,
}

impl AuthClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        redirect: Arc<dyn LoginRedirect>,
        options: ClientOptions,
    ) -> Self {
        Self {
            transport,
            redirect,
            gate: RefreshGate::new(options.max_refresh_attempts),
        }
    }

    /// Send a request; on `401` refresh once and replay it once.
    ///
    /// Requests to the refresh endpoint are never retried. When the refresh
    /// fails the redirect hook runs (once per failed refresh) and the call
    /// returns [`ClientError::LoginRequired`].
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ClientError> {
        let observed = self.gate.generation();
        let response = self.transport.send(&request).await?;

        if response.status != StatusCode::UNAUTHORIZED || request.path == REFRESH_PATH {
            return Ok(response);
        }

        let outcome = self.gate.refresh(observed, self.transport.as_ref()).await;
        if !outcome.refreshed {
            if outcome.leader {
                self.redirect.redirect_to_login();
            }
            return Err(ClientError::LoginRequired);
        }

        let replay = self.transport.send(&request).await?;
        if replay.status != StatusCode::UNAUTHORIZED {
            self.gate.reset_attempts();
        }
        Ok(replay)
    }

    /// Send without the refresh-and-retry logic.
    pub async fn send_once(&self, request: ApiRequest) -> Result<ApiResponse, ClientError> {
        self.transport.send(&request).await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.send(ApiRequest::get(path)).await?.json()
    }

    pub async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<T, ClientError> {
        self.send(ApiRequest::post(path).with_json(body)).await?.json()
    }

    /// Refresh generation to pass to [`AuthClient::refresh_after`].
    pub fn generation(&self) -> u64 {
        self.gate.generation()
    }

    /// Join the single-flight refresh for a `401` observed at `generation`.
    /// Does not run the redirect hook.
    pub async fn refresh_after(&self, generation: u64) -> bool {
        self.gate
            .refresh(generation, self.transport.as_ref())
            .await
            .refreshed
    }

    /// Forget earlier refresh attempts, e.g. after a new login.
    pub fn reset_attempts(&self) {
        self.gate.reset_attempts();
    }
}
