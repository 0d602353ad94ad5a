//! Rate limiting for authentication endpoints.
//!
//! Uses a token bucket algorithm with per-IP tracking to prevent brute force attacks.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use std::{num::NonZeroU32, sync::Arc};

use crate::auth::extract_client_ip;

/// Per-IP rate limiter for stricter endpoint-specific limiting.
pub type IpLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Key shared by requests whose address cannot be determined.
const UNKNOWN_CLIENT: &str = "unknown";

const LOGIN_START_PER_SEC: NonZeroU32 = NonZeroU32::new(10).unwrap();
const LOGIN_FINISH_PER_SEC: NonZeroU32 = NonZeroU32::new(1).unwrap();
const LOGIN_FINISH_BURST: NonZeroU32 = NonZeroU32::new(5).unwrap();
const REFRESH_PER_SEC: NonZeroU32 = NonZeroU32::new(5).unwrap();
const REFRESH_BURST: NonZeroU32 = NonZeroU32::new(20).unwrap();

/// Rate limiting configuration for authentication endpoints.
#[derive(Clone)]
pub struct RateLimitConfig {
    /// Per-IP limiter for `/auth/google` (generous: 10 requests per second)
    pub login_start: Arc<IpLimiter>,
    /// Per-IP limiter for the OAuth callback (strict: 5 requests per 5 seconds)
    pub login_finish: Arc<IpLimiter>,
    /// Per-IP limiter for `/auth/refresh` (5 per second, bursts of 20)
    pub refresh: Arc<IpLimiter>,
    /// Key clients by `X-Forwarded-For` instead of the socket address
    pub trust_proxy: bool,
}

impl RateLimitConfig {
    /// Create rate limiters with default configuration.
    pub fn new(trust_proxy: bool) -> Self {
        Self {
            login_start: Arc::new(RateLimiter::keyed(Quota::per_second(LOGIN_START_PER_SEC))),
            login_finish: Arc::new(RateLimiter::keyed(
                Quota::per_second(LOGIN_FINISH_PER_SEC).allow_burst(LOGIN_FINISH_BURST),
            )),
            refresh: Arc::new(RateLimiter::keyed(
                Quota::per_second(REFRESH_PER_SEC).allow_burst(REFRESH_BURST),
            )),
            trust_proxy,
        }
    }

    /// Forget clients whose buckets have fully refilled. Run periodically;
    /// keyed limiters otherwise keep one entry per address ever seen.
    pub fn retain_recent(&self) -> usize {
        let mut remaining = 0;
        for limiter in [&self.login_start, &self.login_finish, &self.refresh] {
            limiter.retain_recent();
            limiter.shrink_to_fit();
            remaining += limiter.len();
        }
        remaining
    }

    fn client_key(&self, request: &Request) -> String {
        match extract_client_ip(request, self.trust_proxy) {
            Ok(ip) => ip.to_string(),
            Err(reason) => {
                tracing::debug!("Rate limiting under shared key: {}", reason);
                UNKNOWN_CLIENT.to_string()
            }
        }
    }
}

async fn check(
    limiter: &IpLimiter,
    key: String,
    request: Request,
    next: Next,
    message: &'static str,
) -> Response {
    match limiter.check_key(&key) {
        Ok(_) => next.run(request).await,
        Err(_) => {
            tracing::warn!(client = %key, "Rate limit exceeded");
            (StatusCode::TOO_MANY_REQUESTS, message).into_response()
        }
    }
}

/// Middleware for rate limiting login start endpoints.
pub async fn rate_limit_login_start(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    let key = config.client_key(&request);
    check(
        &config.login_start,
        key,
        request,
        next,
        "Too many requests. Please try again later.",
    )
    .await
}

/// Middleware for rate limiting the OAuth callback.
pub async fn rate_limit_login_finish(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    let key = config.client_key(&request);
    check(
        &config.login_finish,
        key,
        request,
        next,
        "Too many authentication attempts. Please wait before trying again.",
    )
    .await
}

/// Middleware for rate limiting token refresh.
pub async fn rate_limit_refresh(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    let key = config.client_key(&request);
    check(
        &config.refresh,
        key,
        request,
        next,
        "Too many refresh attempts. Please wait before trying again.",
    )
    .await
}
