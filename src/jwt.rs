//! JWT token generation and validation.
//!
//! Access and refresh tokens are signed with two separate secrets, so a
//! token of one class can never validate as the other and leaking one key
//! does not compromise the other class.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::db::User;

/// Access token duration: 4 hours
pub const ACCESS_TOKEN_DURATION_SECS: u64 = 4 * 60 * 60;

/// Refresh token duration: 30 days
pub const REFRESH_TOKEN_DURATION_SECS: u64 = 30 * 24 * 60 * 60;

/// Remaining access lifetime below which a verified request rotates both tokens.
pub const DEFAULT_ROTATION_THRESHOLD_SECS: u64 = 15 * 60;

/// JWT claims for access tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// User UUID
    #[serde(rename = "userId")]
    pub user_id: String,
    pub email: String,
    pub name: String,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// JWT claims for refresh tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    /// User UUID
    #[serde(rename = "userId")]
    pub user_id: String,
    /// Snapshot of the user's token version at issuance
    #[serde(rename = "tokenVersion")]
    pub token_version: i64,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

impl AccessClaims {
    /// Seconds left before the token expires, zero once expired.
    pub fn remaining_secs(&self, now: u64) -> u64 {
        self.exp.saturating_sub(now)
    }
}

/// Token lifetimes and the proactive rotation threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionPolicy {
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub rotation_threshold: Duration,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            access_ttl: Duration::from_secs(ACCESS_TOKEN_DURATION_SECS),
            refresh_ttl: Duration::from_secs(REFRESH_TOKEN_DURATION_SECS),
            rotation_threshold: Duration::from_secs(DEFAULT_ROTATION_THRESHOLD_SECS),
        }
    }
}

impl SessionPolicy {
    pub fn with_rotation_threshold(mut self, threshold: Duration) -> Self {
        self.rotation_threshold = threshold;
        self
    }
}

/// A freshly signed token with its lifetime.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// The JWT token string
    pub token: String,
    /// Expiration timestamp (Unix seconds)
    pub expires_at: u64,
    /// Token duration in seconds
    pub duration: u64,
}

/// Access and refresh token issued together.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: IssuedToken,
    pub refresh: IssuedToken,
}

/// One signing context (key pair) per token class.
#[derive(Clone)]
struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKeys {
    fn new(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }
}

/// Configuration for JWT operations.
#[derive(Clone)]
pub struct JwtConfig {
    access: SigningKeys,
    refresh: SigningKeys,
    policy: SessionPolicy,
}

impl JwtConfig {
    /// Create a JWT configuration with the default session policy.
    pub fn new(access_secret: &[u8], refresh_secret: &[u8]) -> Self {
        Self::with_policy(access_secret, refresh_secret, SessionPolicy::default())
    }

    pub fn with_policy(access_secret: &[u8], refresh_secret: &[u8], policy: SessionPolicy) -> Self {
        Self {
            access: SigningKeys::new(access_secret),
            refresh: SigningKeys::new(refresh_secret),
            policy,
        }
    }

    pub fn policy(&self) -> &SessionPolicy {
        &self.policy
    }

    /// Issue both tokens for a user at the current time.
    pub fn issue_tokens(&self, user: &User) -> Result<TokenPair, JwtError> {
        self.issue_tokens_at(user, now_secs()?)
    }

    /// Issue both tokens for a user as if the clock read `now`.
    pub fn issue_tokens_at(&self, user: &User, now: u64) -> Result<TokenPair, JwtError> {
        Ok(TokenPair {
            access: self.generate_access_token_at(user, now)?,
            refresh: self.generate_refresh_token_at(user, now)?,
        })
    }

    pub fn generate_access_token_at(&self, user: &User, now: u64) -> Result<IssuedToken, JwtError> {
        let duration = self.policy.access_ttl.as_secs();
        let claims = AccessClaims {
            user_id: user.uuid.clone(),
            email: user.email.clone(),
            name: user.name.clone(),
            iat: now,
            exp: now + duration,
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &self.access.encoding)
            .map_err(JwtError::Encoding)?;

        Ok(IssuedToken {
            token,
            expires_at: claims.exp,
            duration,
        })
    }

    pub fn generate_refresh_token_at(
        &self,
        user: &User,
        now: u64,
    ) -> Result<IssuedToken, JwtError> {
        let duration = self.policy.refresh_ttl.as_secs();
        let claims = RefreshClaims {
            user_id: user.uuid.clone(),
            token_version: user.token_version,
            iat: now,
            exp: now + duration,
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &self.refresh.encoding)
            .map_err(JwtError::Encoding)?;

        Ok(IssuedToken {
            token,
            expires_at: claims.exp,
            duration,
        })
    }

    /// Validate and decode an access token.
    pub fn validate_access_token(&self, token: &str) -> Result<AccessClaims, JwtError> {
        self.validate_access_token_at(token, now_secs()?)
    }

    /// Validate an access token against an explicit clock reading.
    /// Accepted while `now < exp`.
    pub fn validate_access_token_at(&self, token: &str, now: u64) -> Result<AccessClaims, JwtError> {
        let claims: AccessClaims = decode(token, &self.access.decoding)?;
        if now >= claims.exp {
            return Err(JwtError::Expired);
        }
        Ok(claims)
    }

    /// Validate and decode a refresh token.
    pub fn validate_refresh_token(&self, token: &str) -> Result<RefreshClaims, JwtError> {
        self.validate_refresh_token_at(token, now_secs()?)
    }

    pub fn validate_refresh_token_at(
        &self,
        token: &str,
        now: u64,
    ) -> Result<RefreshClaims, JwtError> {
        let claims: RefreshClaims = decode(token, &self.refresh.decoding)?;
        if now >= claims.exp {
            return Err(JwtError::Expired);
        }
        Ok(claims)
    }
}

/// Signature check only; expiry is compared by the caller with zero leeway
/// so the validity window is exactly `[iat, exp)`.
fn decode<T: serde::de::DeserializeOwned>(token: &str, key: &DecodingKey) -> Result<T, JwtError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    validation.validate_exp = false;

    jsonwebtoken::decode::<T>(token, key, &validation)
        .map(|data| data.claims)
        .map_err(JwtError::Decoding)
}

/// Current Unix time in seconds.
pub fn now_secs() -> Result<u64, JwtError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|_| JwtError::TimeError)
}

/// Errors that can occur during JWT operations.
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("Failed to encode token: {0}")]
    Encoding(jsonwebtoken::errors::Error),
    #[error("Failed to decode token: {0}")]
    Decoding(jsonwebtoken::errors::Error),
    #[error("Token has expired")]
    Expired,
    #[error("System time error")]
    TimeError,
}
