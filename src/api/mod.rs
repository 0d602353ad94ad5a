mod auth;
mod error;
mod health;

use axum::Router;
use std::sync::Arc;
use url::Url;

use crate::auth::CookiePolicy;
use crate::db::Database;
use crate::jwt::JwtConfig;
use crate::oauth::IdentityProvider;
use crate::rate_limit::RateLimitConfig;

pub use auth::{AuthApiState, DASHBOARD_PATH, LOGIN_ERROR_PATH};
pub use error::{ApiError, ResultExt};

/// Create the API router.
pub fn create_api_router(
    db: Database,
    jwt: Arc<JwtConfig>,
    cookies: CookiePolicy,
    provider: Arc<dyn IdentityProvider>,
    client_url: Url,
    rate_limits: Arc<RateLimitConfig>,
) -> Router {
    let auth_state = auth::AuthApiState {
        db,
        jwt,
        cookies,
        provider,
        client_url,
    };

    Router::new()
        .nest("/auth", auth::router(auth_state, rate_limits))
        .nest("/health", health::router())
}
