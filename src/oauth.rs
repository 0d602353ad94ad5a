//! External identity providers.
//!
//! The login endpoints only see the [`IdentityProvider`] trait; the Google
//! implementation uses the authorization code flow with PKCE.

use async_trait::async_trait;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet, EndpointSet,
    PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, Scope, TokenResponse, TokenUrl,
};
use serde::Deserialize;

use crate::db::NewUser;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

type GoogleClient =
    oauth2::basic::BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Redirect target plus the secrets to keep until the callback.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub url: String,
    /// CSRF state echoed back by the provider
    pub state: String,
    /// PKCE verifier matching the challenge in `url`
    pub verifier: String,
}

/// Identity returned by a provider after a successful exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalProfile {
    /// Provider-specific stable subject id
    pub subject: String,
    pub name: String,
    pub email: String,
    pub avatar: Option<String>,
}

impl ExternalProfile {
    pub fn as_new_user(&self) -> NewUser<'_> {
        NewUser {
            google_id: &self.subject,
            name: &self.name,
            email: &self.email,
            avatar: self.avatar.as_deref(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Invalid provider configuration: {0}")]
    Config(String),
    #[error("Code exchange failed: {0}")]
    Exchange(String),
    #[error("Failed to fetch profile: {0}")]
    Profile(String),
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Start a login: build the provider URL with fresh state and PKCE challenge.
    fn begin(&self) -> AuthorizationRequest;

    /// Exchange the callback code and fetch the user's profile.
    async fn complete(&self, code: &str, verifier: &str) -> Result<ExternalProfile, ProviderError>;
}

/// Google OAuth settings.
#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

pub struct GoogleProvider {
    client: GoogleClient,
    http: reqwest::Client,
}

impl GoogleProvider {
    pub fn new(config: GoogleConfig) -> Result<Self, ProviderError> {
        let client = oauth2::basic::BasicClient::new(ClientId::new(config.client_id))
            .set_client_secret(ClientSecret::new(config.client_secret))
            .set_auth_uri(
                AuthUrl::new(GOOGLE_AUTH_URL.to_string())
                    .map_err(|e| ProviderError::Config(e.to_string()))?,
            )
            .set_token_uri(
                TokenUrl::new(GOOGLE_TOKEN_URL.to_string())
                    .map_err(|e| ProviderError::Config(e.to_string()))?,
            )
            .set_redirect_uri(
                RedirectUrl::new(config.redirect_uri)
                    .map_err(|e| ProviderError::Config(e.to_string()))?,
            );

        // Token and userinfo requests must not follow redirects.
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| ProviderError::Config(e.to_string()))?;

        Ok(Self { client, http })
    }
}

#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    id: String,
    email: String,
    name: Option<String>,
    picture: Option<String>,
}

#[async_trait]
impl IdentityProvider for GoogleProvider {
    fn begin(&self) -> AuthorizationRequest {
        let (challenge, verifier) = PkceCodeChallenge::new_random_sha256();
        let (url, csrf_token) = self
            .client
            .authorize_url(CsrfToken::new_random)
            .add_scope(Scope::new("email".to_string()))
            .add_scope(Scope::new("profile".to_string()))
            .set_pkce_challenge(challenge)
            .url();

        AuthorizationRequest {
            url: url.to_string(),
            state: csrf_token.secret().clone(),
            verifier: verifier.secret().clone(),
        }
    }

    async fn complete(&self, code: &str, verifier: &str) -> Result<ExternalProfile, ProviderError> {
        let token = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .set_pkce_verifier(PkceCodeVerifier::new(verifier.to_string()))
            .request_async(&self.http)
            .await
            .map_err(|e| ProviderError::Exchange(e.to_string()))?;

        let info: GoogleUserInfo = self
            .http
            .get(GOOGLE_USERINFO_URL)
            .bearer_auth(token.access_token().secret())
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ProviderError::Profile(e.to_string()))?
            .json()
            .await
            .map_err(|e| ProviderError::Profile(e.to_string()))?;

        Ok(ExternalProfile {
            name: info.name.unwrap_or_else(|| info.email.clone()),
            subject: info.id,
            email: info.email,
            avatar: info.picture,
        })
    }
}
