pub mod api;
pub mod auth;
pub mod cleanup;
pub mod cli;
pub mod client;
pub mod db;
pub mod jwt;
pub mod oauth;
pub mod rate_limit;

use api::create_api_router;
use auth::{AuthState, CookiePolicy, add_rotated_cookies, require_auth};
use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
};
use db::Database;
use jwt::{JwtConfig, SessionPolicy};
use oauth::IdentityProvider;
use rate_limit::RateLimitConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use url::Url;

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// Secret for signing access tokens
    pub access_secret: Vec<u8>,
    /// Secret for signing refresh tokens, distinct from `access_secret`
    pub refresh_secret: Vec<u8>,
    /// Token lifetimes and rotation threshold
    pub policy: SessionPolicy,
    /// Session cookie attributes
    pub cookies: CookiePolicy,
    /// Origin of the browser client; login redirects and CORS target it
    pub client_url: Url,
    /// External login provider
    pub provider: Arc<dyn IdentityProvider>,
    /// Per-client limiters for the login and refresh endpoints, pruned by the cleanup task
    pub rate_limits: Arc<RateLimitConfig>,
}

/// Create the application router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Router {
    create_app_with_protected(config, Router::new())
}

/// Create the application router and mount `protected` under `/api` behind
/// session verification. Handlers read the user from the
/// [`auth::CurrentUser`] request extension.
pub fn create_app_with_protected(config: &ServerConfig, protected: Router) -> Router {
    let jwt = Arc::new(JwtConfig::with_policy(
        &config.access_secret,
        &config.refresh_secret,
        config.policy,
    ));
    let api_router = create_api_router(
        config.db.clone(),
        jwt.clone(),
        config.cookies,
        config.provider.clone(),
        config.client_url.clone(),
        config.rate_limits.clone(),
    );

    let auth_state = AuthState {
        db: config.db.clone(),
        jwt,
        cookies: config.cookies,
    };
    let protected = protected.layer(middleware::from_fn_with_state(auth_state, require_auth));

    Router::new()
        .nest("/api", api_router.merge(protected))
        .layer(middleware::from_fn(add_rotated_cookies))
        .layer(cors_layer(&config.client_url))
        .layer(TraceLayer::new_for_http())
}

/// Credentialed CORS for the configured client origin only.
fn cors_layer(client_url: &Url) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    let origin = client_url.origin().ascii_serialization();
    match HeaderValue::from_str(&origin) {
        Ok(origin) => cors.allow_origin(origin),
        Err(e) => {
            tracing::error!(origin = %origin, error = %e, "Client origin is not a valid header value");
            cors
        }
    }
}

/// Run cleanup tasks and spawn background scheduler.
/// Call this before starting the server.
pub async fn init_cleanup(config: &ServerConfig) {
    cleanup::run_cleanup(&config.db, &config.rate_limits).await;
    cleanup::spawn_cleanup_scheduler(config.db.clone(), config.rate_limits.clone());
}

/// Run the server on the given listener. This function blocks until the server exits.
/// Call `init_cleanup` before this to run cleanup on startup.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}

/// Start the server on the given port in a background task. Use port 0 to let the OS choose a random port.
/// Returns the actual address the server is listening on.
/// Note: For production use, prefer `run_server` directly in main.
pub async fn start_server(
    config: ServerConfig,
    port: u16,
) -> Result<(tokio::task::JoinHandle<()>, SocketAddr), std::io::Error> {
    // Run cleanup tasks on startup
    init_cleanup(&config).await;

    let addr = format!("127.0.0.1:{}", port);
    let listener = TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = run_server(config, listener).await {
            tracing::error!(error = %e, "Server error");
        }
    });

    Ok((handle, local_addr))
}
