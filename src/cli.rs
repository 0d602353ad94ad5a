//! CLI argument parsing, validation, and startup helpers.

use std::sync::Arc;
use std::time::Duration;

use crate::ServerConfig;
use crate::auth::CookiePolicy;
use crate::db::Database;
use crate::jwt::{DEFAULT_ROTATION_THRESHOLD_SECS, SessionPolicy};
use crate::oauth::{GoogleConfig, GoogleProvider};
use crate::rate_limit::RateLimitConfig;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use url::Url;

const MIN_JWT_SECRET_LENGTH: usize = 32;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "wellvantage",
    about = "Google login and cookie sessions for the WellVantage tracker"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "5000")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, env = "DATABASE_PATH", default_value = "wellvantage.db")]
    pub database: String,

    /// Origin of the browser client (login redirects and CORS)
    #[arg(long, env = "CLIENT_URL", default_value = "http://localhost:5173")]
    pub client_url: String,

    /// Production mode: Secure cookies with SameSite=None
    #[arg(long, env = "PRODUCTION")]
    pub production: bool,

    /// Google OAuth client ID
    #[arg(long, env = "GOOGLE_CLIENT_ID")]
    pub google_client_id: String,

    /// Google OAuth client secret
    #[arg(long, env = "GOOGLE_CLIENT_SECRET", hide_env_values = true)]
    pub google_client_secret: String,

    /// Callback URL registered with Google
    #[arg(
        long,
        env = "GOOGLE_REDIRECT_URI",
        default_value = "http://localhost:5000/api/auth/google/callback"
    )]
    pub google_redirect_uri: String,

    /// Path to file containing the access token secret. Prefer using JWT_SECRET env var instead
    #[arg(long)]
    pub jwt_secret_file: Option<String>,

    /// Path to file containing the refresh token secret. Prefer using JWT_REFRESH_SECRET env var instead
    #[arg(long)]
    pub jwt_refresh_secret_file: Option<String>,

    /// Rotate both tokens when the access token has less than this many seconds left
    #[arg(long, env = "ROTATION_THRESHOLD_SECS", default_value_t = DEFAULT_ROTATION_THRESHOLD_SECS)]
    pub rotation_threshold_secs: u64,

    /// Trust X-Forwarded-For for client addresses (only behind a reverse proxy)
    #[arg(long, env = "TRUST_PROXY")]
    pub trust_proxy: bool,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Initialize logging based on the specified format.
/// `RUST_LOG` overrides the default `info` level.
pub fn init_logging(format: &LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
        LogFormat::Compact => builder.compact().init(),
    }
}

/// Load a signing secret from an environment variable or file.
/// Returns None and logs an error if the secret cannot be loaded.
pub fn load_secret(env_var: &str, secret_file: Option<&str>, flag: &str) -> Option<String> {
    let secret = if let Ok(secret) = std::env::var(env_var) {
        // Clear the environment variable to prevent leaking
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var(env_var) };
        secret
    } else if let Some(path) = secret_file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read secret file");
                return None;
            }
        }
    } else {
        error!(
            "{} is required. Set the environment variable (recommended) or use {}",
            env_var, flag
        );
        return None;
    };

    validate_secret(env_var, secret)
}

fn validate_secret(name: &str, secret: String) -> Option<String> {
    if secret.len() < MIN_JWT_SECRET_LENGTH {
        error!(
            "{} is shorter than {} characters. Use a longer secret",
            name, MIN_JWT_SECRET_LENGTH
        );
        return None;
    }
    Some(secret)
}

/// Load both token secrets. They must differ so one class cannot forge the other.
pub fn load_jwt_secrets(args: &Args) -> Option<(String, String)> {
    let access = load_secret("JWT_SECRET", args.jwt_secret_file.as_deref(), "--jwt-secret-file")?;
    let refresh = load_secret(
        "JWT_REFRESH_SECRET",
        args.jwt_refresh_secret_file.as_deref(),
        "--jwt-refresh-secret-file",
    )?;

    if access == refresh {
        error!("JWT_SECRET and JWT_REFRESH_SECRET must be different");
        return None;
    }

    Some((access, refresh))
}

/// Parse and validate the client URL.
/// Returns None and logs an error if validation fails.
pub fn validate_client_url(client_url: &str, production: bool) -> Option<Url> {
    let url = match Url::parse(client_url) {
        Ok(url) => url,
        Err(e) => {
            error!(url = %client_url, error = %e, "Invalid client URL");
            return None;
        }
    };

    if production && url.scheme() != "https" {
        error!("Client URL must use HTTPS in production");
        return None;
    }

    Some(url)
}

/// Build ServerConfig from validated arguments.
pub fn build_config(
    args: &Args,
    db: Database,
    client_url: Url,
    access_secret: String,
    refresh_secret: String,
) -> Option<ServerConfig> {
    let provider = match GoogleProvider::new(GoogleConfig {
        client_id: args.google_client_id.clone(),
        client_secret: args.google_client_secret.clone(),
        redirect_uri: args.google_redirect_uri.clone(),
    }) {
        Ok(provider) => provider,
        Err(e) => {
            error!(error = %e, "Failed to configure Google login");
            return None;
        }
    };

    let policy = SessionPolicy::default()
        .with_rotation_threshold(Duration::from_secs(args.rotation_threshold_secs));

    Some(ServerConfig {
        db,
        access_secret: access_secret.into_bytes(),
        refresh_secret: refresh_secret.into_bytes(),
        policy,
        cookies: CookiePolicy::for_environment(args.production),
        client_url,
        provider: Arc::new(provider),
        rate_limits: Arc::new(RateLimitConfig::new(args.trust_proxy)),
    })
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}
