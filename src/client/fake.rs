//! In-memory backend for client tests.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};

use super::error::ClientError;
use super::interceptor::LoginRedirect;
use super::transport::{ApiRequest, ApiResponse, Transport};
use super::{LOGOUT_PATH, REFRESH_PATH, USER_PATH};
use crate::db::{Preferences, UserProfile};

pub struct FakeBackend {
    authenticated: AtomicBool,
    refresh_succeeds: AtomicBool,
    refresh_grants_access: AtomicBool,
    logout_fails: AtomicBool,
    refresh_calls: AtomicU32,
    user_calls: AtomicU32,
    logout_calls: AtomicU32,
    refresh_delay: Mutex<Duration>,
    user_delay: Mutex<Duration>,
}

impl FakeBackend {
    fn new(authenticated: bool, refresh_succeeds: bool) -> Arc<Self> {
        Arc::new(Self {
            authenticated: AtomicBool::new(authenticated),
            refresh_succeeds: AtomicBool::new(refresh_succeeds),
            refresh_grants_access: AtomicBool::new(true),
            logout_fails: AtomicBool::new(false),
            refresh_calls: AtomicU32::new(0),
            user_calls: AtomicU32::new(0),
            logout_calls: AtomicU32::new(0),
            refresh_delay: Mutex::new(Duration::ZERO),
            user_delay: Mutex::new(Duration::ZERO),
        })
    }

    /// Valid access token.
    pub fn authenticated() -> Arc<Self> {
        Self::new(true, true)
    }

    /// Access token expired, refresh token still valid.
    pub fn expired() -> Arc<Self> {
        Self::new(false, true)
    }

    /// No usable credentials at all.
    pub fn logged_out() -> Arc<Self> {
        Self::new(false, false)
    }

    pub fn expire_access(&self) {
        self.authenticated.store(false, Ordering::SeqCst);
    }

    pub fn set_refresh_succeeds(&self, value: bool) {
        self.refresh_succeeds.store(value, Ordering::SeqCst);
    }

    pub fn set_refresh_grants_access(&self, value: bool) {
        self.refresh_grants_access.store(value, Ordering::SeqCst);
    }

    pub fn set_logout_fails(&self, value: bool) {
        self.logout_fails.store(value, Ordering::SeqCst);
    }

    pub fn set_refresh_delay(&self, delay: Duration) {
        *self.refresh_delay.lock().unwrap() = delay;
    }

    pub fn set_user_delay(&self, delay: Duration) {
        *self.user_delay.lock().unwrap() = delay;
    }

    pub fn refresh_calls(&self) -> u32 {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn user_calls(&self) -> u32 {
        self.user_calls.load(Ordering::SeqCst)
    }

    pub fn logout_calls(&self) -> u32 {
        self.logout_calls.load(Ordering::SeqCst)
    }

    pub fn profile() -> UserProfile {
        UserProfile {
            id: "uuid-alice".to_string(),
            google_id: "google-alice".to_string(),
            name: "Alice".to_string(),
            email: "alice@example.com".to_string(),
            avatar: None,
            preferences: Preferences::default(),
            created_at: "2024-01-15 10:30:00".to_string(),
            updated_at: "2024-01-15 10:30:00".to_string(),
        }
    }

    fn unauthorized() -> ApiResponse {
        ApiResponse::new(
            StatusCode::UNAUTHORIZED,
            br#"{"error":"Not authenticated"}"#.to_vec(),
        )
    }
}

#[async_trait]
impl Transport for FakeBackend {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ClientError> {
        match request.path.as_str() {
            USER_PATH if request.method == Method::GET => {
                self.user_calls.fetch_add(1, Ordering::SeqCst);
                // Answered on arrival; the delay models a slow response.
                let authenticated = self.authenticated.load(Ordering::SeqCst);
                let delay = *self.user_delay.lock().unwrap();
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                if authenticated {
                    let body = serde_json::to_vec(&Self::profile()).unwrap();
                    Ok(ApiResponse::new(StatusCode::OK, body))
                } else {
                    Ok(Self::unauthorized())
                }
            }
            REFRESH_PATH if request.method == Method::POST => {
                self.refresh_calls.fetch_add(1, Ordering::SeqCst);
                let delay = *self.refresh_delay.lock().unwrap();
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                if self.refresh_succeeds.load(Ordering::SeqCst) {
                    if self.refresh_grants_access.load(Ordering::SeqCst) {
                        self.authenticated.store(true, Ordering::SeqCst);
                    }
                    Ok(ApiResponse::new(StatusCode::OK, b"{}".to_vec()))
                } else {
                    Ok(Self::unauthorized())
                }
            }
            LOGOUT_PATH if request.method == Method::POST => {
                self.logout_calls.fetch_add(1, Ordering::SeqCst);
                self.authenticated.store(false, Ordering::SeqCst);
                self.refresh_succeeds.store(false, Ordering::SeqCst);
                if self.logout_fails.load(Ordering::SeqCst) {
                    Err(ClientError::Transport("connection reset".to_string()))
                } else {
                    Ok(ApiResponse::new(StatusCode::OK, b"{}".to_vec()))
                }
            }
            _ => Ok(ApiResponse::new(StatusCode::NOT_FOUND, Vec::new())),
        }
    }
}

pub struct CountingRedirect {
    count: AtomicU32,
}

impl CountingRedirect {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            count: AtomicU32::new(0),
        })
    }

    pub fn count(&self) -> u32 {
        self.count.load(Ordering::SeqCst)
    }
}

impl LoginRedirect for CountingRedirect {
    fn redirect_to_login(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}
