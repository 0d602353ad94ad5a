#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    Extension, Json, Router,
    body::Body,
    http::{Request, Response},
    routing::get,
};
use tower::ServiceExt;
use url::Url;
use wellvantage::{
    ServerConfig,
    auth::{CookiePolicy, CurrentUser},
    client::{ApiRequest, ApiResponse, ClientError, Transport},
    create_app_with_protected,
    db::{Database, NewUser, User},
    jwt::{JwtConfig, SessionPolicy},
    oauth::{AuthorizationRequest, ExternalProfile, IdentityProvider, ProviderError},
    rate_limit::RateLimitConfig,
};

pub const ACCESS_SECRET: &[u8] = b"test-access-secret-at-least-32-chars";
pub const REFRESH_SECRET: &[u8] = b"test-refresh-secret-at-least-32-chars";
pub const CLIENT_URL: &str = "http://localhost:5173";

/// Authorization code the fake provider accepts.
pub const GOOD_CODE: &str = "good-code";

/// Provider that never leaves the process.
pub struct FakeProvider {
    next_state: AtomicU32,
    pub profile: ExternalProfile,
    /// Verifiers passed to `complete`, in call order
    pub verifiers: Mutex<Vec<String>>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self {
            next_state: AtomicU32::new(0),
            profile: ExternalProfile {
                subject: "google-alice".to_string(),
                name: "Alice".to_string(),
                email: "alice@example.com".to_string(),
                avatar: Some("https://example.com/alice.png".to_string()),
            },
            verifiers: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl IdentityProvider for FakeProvider {
    fn begin(&self) -> AuthorizationRequest {
        let n = self.next_state.fetch_add(1, Ordering::SeqCst);
        let state = format!("state-{}", n);
        AuthorizationRequest {
            url: format!("https://accounts.test/authorize?state={}", state),
            verifier: format!("verifier-{}", n),
            state,
        }
    }

    async fn complete(&self, code: &str, verifier: &str) -> Result<ExternalProfile, ProviderError> {
        self.verifiers.lock().unwrap().push(verifier.to_string());
        if code == GOOD_CODE {
            Ok(self.profile.clone())
        } else {
            Err(ProviderError::Exchange("invalid_grant".to_string()))
        }
    }
}

pub struct TestApp {
    pub router: Router,
    pub db: Database,
    pub jwt: JwtConfig,
    pub provider: Arc<FakeProvider>,
}

/// App with the default policy and a protected `/api/meals` route.
pub async fn create_test_app() -> TestApp {
    create_test_app_with(SessionPolicy::default(), CookiePolicy::development()).await
}

pub async fn create_test_app_with(policy: SessionPolicy, cookies: CookiePolicy) -> TestApp {
    let db = Database::open(":memory:")
        .await
        .expect("Failed to open test database");
    let provider = Arc::new(FakeProvider::new());

    let config = ServerConfig {
        db: db.clone(),
        access_secret: ACCESS_SECRET.to_vec(),
        refresh_secret: REFRESH_SECRET.to_vec(),
        policy,
        cookies,
        client_url: Url::parse(CLIENT_URL).expect("Invalid URL"),
        provider: provider.clone(),
        rate_limits: Arc::new(RateLimitConfig::new(false)),
    };

    let router = create_app_with_protected(&config, protected_routes());
    let jwt = JwtConfig::with_policy(ACCESS_SECRET, REFRESH_SECRET, policy);

    TestApp {
        router,
        db,
        jwt,
        provider,
    }
}

/// Stand-in for a feature route mounted behind the verifier.
fn protected_routes() -> Router {
    Router::new().route(
        "/meals",
        get(|Extension(CurrentUser(user)): Extension<CurrentUser>| async move {
            Json(serde_json::json!({ "owner": user.uuid, "meals": [] }))
        }),
    )
}

pub async fn create_user(db: &Database, google_id: &str, email: &str) -> User {
    db.users()
        .find_or_create(&NewUser {
            google_id,
            name: "Test User",
            email,
            avatar: None,
        })
        .await
        .unwrap()
}

pub fn now() -> u64 {
    wellvantage::jwt::now_secs().unwrap()
}

pub fn auth_cookies(access_token: &str, refresh_token: &str) -> String {
    format!("accessToken={}; refreshToken={}", access_token, refresh_token)
}

pub fn access_cookie_only(access_token: &str) -> String {
    format!("accessToken={}", access_token)
}

pub fn refresh_cookie_only(refresh_token: &str) -> String {
    format!("refreshToken={}", refresh_token)
}

pub fn extract_set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .collect()
}

/// Check if cookies contain a token being cleared (Max-Age=0)
pub fn has_cleared_cookie(cookies: &[String], cookie_name: &str) -> bool {
    cookies
        .iter()
        .any(|c| c.starts_with(&format!("{}=;", cookie_name)) && c.contains("Max-Age=0"))
}

/// Value of a freshly set (not cleared) cookie.
pub fn set_cookie_value(cookies: &[String], cookie_name: &str) -> Option<String> {
    let prefix = format!("{}=", cookie_name);
    cookies.iter().find_map(|c| {
        let value = c.strip_prefix(&prefix)?.split(';').next()?;
        (!value.is_empty()).then(|| value.to_string())
    })
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

pub async fn get_with_cookies(router: &Router, uri: &str, cookies: Option<&str>) -> Response<Body> {
    send_with_cookies(router, "GET", uri, cookies).await
}

pub async fn post_with_cookies(router: &Router, uri: &str, cookies: Option<&str>) -> Response<Body> {
    send_with_cookies(router, "POST", uri, cookies).await
}

async fn send_with_cookies(
    router: &Router,
    method: &str,
    uri: &str,
    cookies: Option<&str>,
) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookies) = cookies {
        builder = builder.header("cookie", cookies);
    }
    router
        .clone()
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

/// Client transport that drives the router in-process and keeps a cookie jar.
pub struct RouterTransport {
    router: Router,
    jar: Mutex<HashMap<String, String>>,
    pub refresh_calls: AtomicU32,
}

impl RouterTransport {
    pub fn new(router: Router) -> Self {
        Self {
            router,
            jar: Mutex::new(HashMap::new()),
            refresh_calls: AtomicU32::new(0),
        }
    }

    pub fn set_cookie(&self, name: &str, value: &str) {
        self.jar
            .lock()
            .unwrap()
            .insert(name.to_string(), value.to_string());
    }

    pub fn cookie(&self, name: &str) -> Option<String> {
        self.jar.lock().unwrap().get(name).cloned()
    }

    fn cookie_header(&self) -> Option<String> {
        let jar = self.jar.lock().unwrap();
        if jar.is_empty() {
            return None;
        }
        Some(
            jar.iter()
                .map(|(name, value)| format!("{}={}", name, value))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    fn store_cookies(&self, set_cookies: &[String]) {
        let mut jar = self.jar.lock().unwrap();
        for cookie in set_cookies {
            let Some((name, rest)) = cookie.split_once('=') else {
                continue;
            };
            let value = rest.split(';').next().unwrap_or("");
            if value.is_empty() || cookie.contains("Max-Age=0") {
                jar.remove(name);
            } else {
                jar.insert(name.to_string(), value.to_string());
            }
        }
    }
}

#[async_trait]
impl Transport for RouterTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ClientError> {
        if request.path == wellvantage::client::REFRESH_PATH {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        }

        let mut builder = Request::builder()
            .method(request.method.clone())
            .uri(&request.path);
        if let Some(cookies) = self.cookie_header() {
            builder = builder.header("cookie", cookies);
        }
        let body = match &request.body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let http_request = builder
            .body(body)
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        let response = self
            .router
            .clone()
            .oneshot(http_request)
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        self.store_cookies(&extract_set_cookies(&response));

        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        Ok(ApiResponse::new(status, body.to_vec()))
    }
}
