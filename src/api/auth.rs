//! Session API endpoints.
//!
//! - GET `/google` - Start a Google login
//! - GET `/google/callback` - Finish the login, set cookies and go to the dashboard
//! - GET `/user` - Current user's profile
//! - POST `/logout` - Revoke every refresh token and clear cookies
//! - POST `/refresh` - Exchange the refresh token for a new pair

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{StatusCode, header::SET_COOKIE},
    middleware,
    response::{AppendHeaders, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use url::Url;

use super::error::{ApiError, ResultExt};
use crate::auth::{
    ApiAuthError, Auth, AuthErrorKind, CookiePolicy, REFRESH_COOKIE_NAME, get_cookie,
    refresh_session, verify_session,
};
use crate::db::{Database, UserProfile};
use crate::jwt::JwtConfig;
use crate::oauth::IdentityProvider;
use crate::rate_limit::{
    RateLimitConfig, rate_limit_login_finish, rate_limit_login_start, rate_limit_refresh,
};

/// Client route shown after a successful login.
pub const DASHBOARD_PATH: &str = "/dashboard";
/// Client route that renders login errors.
pub const LOGIN_ERROR_PATH: &str = "/auth";

#[derive(Clone)]
pub struct AuthApiState {
    pub db: Database,
    pub jwt: Arc<JwtConfig>,
    pub cookies: CookiePolicy,
    pub provider: Arc<dyn IdentityProvider>,
    pub client_url: Url,
}

crate::impl_has_auth_backend!(AuthApiState);

impl AuthApiState {
    fn client_location(&self, path: &str) -> String {
        format!("{}{}", self.client_url.as_str().trim_end_matches('/'), path)
    }

    fn login_failed(&self, reason: &str) -> Response {
        Redirect::to(&self.client_location(&format!("{}?error={}", LOGIN_ERROR_PATH, reason)))
            .into_response()
    }
}

pub fn router(state: AuthApiState, rate_limits: Arc<RateLimitConfig>) -> Router {
    let login_start = Router::new()
        .route("/google", get(google_login))
        .route_layer(middleware::from_fn_with_state(
            rate_limits.clone(),
            rate_limit_login_start,
        ));

    let login_finish = Router::new()
        .route("/google/callback", get(google_callback))
        .route_layer(middleware::from_fn_with_state(
            rate_limits.clone(),
            rate_limit_login_finish,
        ));

    let refresh = Router::new()
        .route("/refresh", post(refresh_tokens))
        .route_layer(middleware::from_fn_with_state(rate_limits, rate_limit_refresh));

    Router::new()
        .route("/user", get(current_user))
        .route("/logout", post(logout))
        .merge(login_start)
        .merge(login_finish)
        .merge(refresh)
        .with_state(state)
}

#[derive(Serialize)]
struct MessageResponse {
    message: &'static str,
}

/// Redirect to the provider's consent screen.
async fn google_login(State(state): State<AuthApiState>) -> Response {
    let request = state.provider.begin();

    if let Err(e) = state
        .db
        .oauth_states()
        .store(&request.state, &request.verifier)
        .await
    {
        error!("Failed to store OAuth state: {}", e);
        return state.login_failed("authentication_failed");
    }

    Redirect::to(&request.url).into_response()
}

#[derive(Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// Complete the login started by `google_login`.
async fn google_callback(
    State(state): State<AuthApiState>,
    Query(params): Query<CallbackParams>,
) -> Response {
    if let Some(provider_error) = params.error {
        warn!("Provider rejected login: {}", provider_error);
        return state.login_failed("authentication_failed");
    }

    let (Some(code), Some(csrf_state)) = (params.code, params.state) else {
        warn!("OAuth callback without code or state");
        return state.login_failed("authentication_failed");
    };

    let verifier = match state.db.oauth_states().take(&csrf_state).await {
        Ok(Some(verifier)) => verifier,
        Ok(None) => {
            warn!("OAuth callback with unknown or expired state");
            return state.login_failed("authentication_failed");
        }
        Err(e) => {
            error!("Failed to load OAuth state: {}", e);
            return state.login_failed("authentication_failed");
        }
    };

    let profile = match state.provider.complete(&code, &verifier).await {
        Ok(profile) => profile,
        Err(e) => {
            warn!("OAuth exchange failed: {}", e);
            return state.login_failed("authentication_failed");
        }
    };

    let user = match state.db.users().find_or_create(&profile.as_new_user()).await {
        Ok(user) => user,
        Err(e) => {
            error!("Failed to find or create user: {}", e);
            return state.login_failed("authentication_failed");
        }
    };

    let pair = match state.jwt.issue_tokens(&user) {
        Ok(pair) => pair,
        Err(e) => {
            error!("Failed to generate tokens: {}", e);
            return state.login_failed("token_generation_failed");
        }
    };

    info!(user = %user.uuid, "User logged in");

    let [access_cookie, refresh_cookie] = state.cookies.session_cookies(&pair);
    (
        AppendHeaders([(SET_COOKIE, access_cookie), (SET_COOKIE, refresh_cookie)]),
        Redirect::to(&state.client_location(DASHBOARD_PATH)),
    )
        .into_response()
}

/// Profile of the authenticated user.
async fn current_user(Auth(user): Auth) -> Json<UserProfile> {
    Json(user.profile())
}

/// Logout - bump the token version and clear both cookies.
///
/// Credential failures still log out locally. A failed user lookup answers
/// `500` so the client does not believe the session was revoked.
async fn logout(
    State(state): State<AuthApiState>,
    headers: axum::http::HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    // Any rotation from this verification is dropped; the cookies are cleared below.
    let user = match verify_session(&headers, &state).await {
        Ok(verified) => Some(verified.user),
        Err(kind) if kind.is_credential_failure() => None,
        Err(kind) => return Err(ApiError::db_error("Logout failed", kind.as_str())),
    };

    if let Some(user) = user {
        state
            .db
            .users()
            .increment_token_version(user.id)
            .await
            .db_err("Logout failed")?;
        info!(user = %user.uuid, "User logged out");
    }

    let [clear_access, clear_refresh] = state.cookies.clear_session_cookies();
    Ok((
        StatusCode::OK,
        AppendHeaders([(SET_COOKIE, clear_access), (SET_COOKIE, clear_refresh)]),
        Json(MessageResponse {
            message: "Logged out successfully",
        }),
    ))
}

/// Exchange the refresh token for a new pair. Never clears cookies.
async fn refresh_tokens(
    State(state): State<AuthApiState>,
    headers: axum::http::HeaderMap,
) -> Result<impl IntoResponse, ApiAuthError> {
    let reject = |kind: AuthErrorKind| {
        tracing::debug!(kind = kind.as_str(), "Refresh rejected");
        ApiAuthError::keep_cookies(kind, state.cookies)
    };

    let refresh_token =
        get_cookie(&headers, REFRESH_COOKIE_NAME).ok_or_else(|| reject(AuthErrorKind::NoCredentials))?;

    let (_, pair) = refresh_session(&state, refresh_token).await.map_err(reject)?;

    let [access_cookie, refresh_cookie] = state.cookies.session_cookies(&pair);
    Ok((
        StatusCode::OK,
        AppendHeaders([(SET_COOKIE, access_cookie), (SET_COOKIE, refresh_cookie)]),
        Json(MessageResponse {
            message: "Tokens refreshed successfully",
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth::{AuthorizationRequest, ExternalProfile, ProviderError};

    struct NoProvider;

    #[async_trait::async_trait]
    impl IdentityProvider for NoProvider {
        fn begin(&self) -> AuthorizationRequest {
            AuthorizationRequest {
                url: "https://provider.test/authorize".to_string(),
                state: "s".to_string(),
                verifier: "v".to_string(),
            }
        }

        async fn complete(&self, _: &str, _: &str) -> Result<ExternalProfile, ProviderError> {
            Err(ProviderError::Exchange("unused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_client_location_joins_paths() {
        let state = AuthApiState {
            db: Database::open(":memory:").await.unwrap(),
            jwt: Arc::new(JwtConfig::new(b"a", b"b")),
            cookies: CookiePolicy::development(),
            provider: Arc::new(NoProvider),
            client_url: Url::parse("http://localhost:5173").unwrap(),
        };

        assert_eq!(
            state.client_location(DASHBOARD_PATH),
            "http://localhost:5173/dashboard"
        );

        let response = state.login_failed("authentication_failed");
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers()["location"],
            "http://localhost:5173/auth?error=authentication_failed"
        );
    }
}
