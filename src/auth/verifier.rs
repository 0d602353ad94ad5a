//! Session verification with automatic token rotation.
//!
//! A request is classified by its cookies:
//!
//! 1. Neither cookie: rejected with [`AuthErrorKind::NoCredentials`].
//! 2. Valid access token for an existing user: accepted. If the access token
//!    is about to expire and a matching refresh token is present, both tokens
//!    are reissued.
//! 3. Otherwise a valid refresh token whose version matches the user's
//!    current token version: accepted and both tokens are reissued.
//! 4. Anything else: rejected.

use axum::http::HeaderMap;

use super::cookie::{ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME, get_cookie};
use super::errors::AuthErrorKind;
use super::state::HasAuthBackend;
use crate::db::User;
use crate::jwt::{self, TokenPair};

/// Outcome of a successful verification.
#[derive(Debug, Clone)]
pub struct Verified {
    pub user: User,
    /// Replacement tokens when the request triggered a rotation.
    pub rotated: Option<TokenPair>,
}

/// Verify the session cookies in `headers`.
pub async fn verify_session<S>(headers: &HeaderMap, state: &S) -> Result<Verified, AuthErrorKind>
where
    S: HasAuthBackend + Sync,
{
    let access_token = get_cookie(headers, ACCESS_COOKIE_NAME);
    let refresh_token = get_cookie(headers, REFRESH_COOKIE_NAME);

    if access_token.is_none() && refresh_token.is_none() {
        return Err(AuthErrorKind::NoCredentials);
    }

    let now = jwt::now_secs().map_err(|e| {
        tracing::error!("Failed to read clock: {}", e);
        AuthErrorKind::Signing
    })?;

    let mut access_failure = AuthErrorKind::InvalidAccess;

    if let Some(access_token) = access_token {
        if let Ok(claims) = state.jwt().validate_access_token_at(access_token, now) {
            match lookup_user(state, &claims.user_id).await? {
                Some(user) => {
                    let threshold = state.jwt().policy().rotation_threshold.as_secs();
                    let rotated = match refresh_token {
                        Some(refresh_token) if claims.remaining_secs(now) < threshold => {
                            rotate_near_expiry(state, refresh_token, &user, now)?
                        }
                        _ => None,
                    };
                    return Ok(Verified { user, rotated });
                }
                None => access_failure = AuthErrorKind::UserNotFound,
            }
        }
    }

    let refresh_token = refresh_token.ok_or(access_failure)?;
    let (user, pair) = refresh_session_at(state, refresh_token, now).await?;

    Ok(Verified {
        user,
        rotated: Some(pair),
    })
}

/// Validate a refresh token and issue a new pair for its user.
pub async fn refresh_session<S>(state: &S, refresh_token: &str) -> Result<(User, TokenPair), AuthErrorKind>
where
    S: HasAuthBackend + Sync,
{
    let now = jwt::now_secs().map_err(|e| {
        tracing::error!("Failed to read clock: {}", e);
        AuthErrorKind::Signing
    })?;
    refresh_session_at(state, refresh_token, now).await
}

async fn refresh_session_at<S>(
    state: &S,
    refresh_token: &str,
    now: u64,
) -> Result<(User, TokenPair), AuthErrorKind>
where
    S: HasAuthBackend + Sync,
{
    let claims = state
        .jwt()
        .validate_refresh_token_at(refresh_token, now)
        .map_err(|_| AuthErrorKind::InvalidRefresh)?;

    let user = lookup_user(state, &claims.user_id)
        .await?
        .ok_or(AuthErrorKind::UserNotFound)?;

    if claims.token_version != user.token_version {
        return Err(AuthErrorKind::Revoked);
    }

    let pair = issue(state, &user, now)?;
    tracing::debug!(user = %user.uuid, "Refreshed session tokens");
    Ok((user, pair))
}

/// Reissue both tokens for an already accepted access token. The refresh
/// token must belong to the same user and carry the current version;
/// otherwise the request proceeds without rotation.
fn rotate_near_expiry<S>(
    state: &S,
    refresh_token: &str,
    user: &User,
    now: u64,
) -> Result<Option<TokenPair>, AuthErrorKind>
where
    S: HasAuthBackend,
{
    let Ok(claims) = state.jwt().validate_refresh_token_at(refresh_token, now) else {
        return Ok(None);
    };
    if claims.user_id != user.uuid || claims.token_version != user.token_version {
        return Ok(None);
    }

    let pair = issue(state, user, now)?;
    tracing::debug!(user = %user.uuid, "Rotated tokens near access expiry");
    Ok(Some(pair))
}

fn issue<S: HasAuthBackend>(state: &S, user: &User, now: u64) -> Result<TokenPair, AuthErrorKind> {
    state.jwt().issue_tokens_at(user, now).map_err(|e| {
        tracing::error!("Failed to issue tokens: {}", e);
        AuthErrorKind::Signing
    })
}

async fn lookup_user<S>(state: &S, uuid: &str) -> Result<Option<User>, AuthErrorKind>
where
    S: HasAuthBackend + Sync,
{
    state.db().users().get_by_uuid(uuid).await.map_err(|e| {
        tracing::error!("Failed to get user: {}", e);
        AuthErrorKind::Store
    })
}
