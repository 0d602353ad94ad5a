//! Axum extractors and middleware for authentication.

use std::cell::RefCell;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, HeaderValue, header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::errors::{ApiAuthError, AuthErrorKind};
use super::state::{AuthState, HasAuthBackend};
use super::verifier::{Verified, verify_session};
use crate::db::User;

tokio::task_local! {
    /// Task-local storage for rotated session cookies.
    /// Used to pass the cookies from the auth extractor to the response middleware.
    pub static ROTATED_COOKIES: RefCell<Vec<String>>;
}

/// Request extension holding the user accepted by `require_auth`.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

/// Verify the request and hand rotated cookies to the response layer.
async fn authenticate_request<S>(headers: &HeaderMap, state: &S) -> Result<User, AuthErrorKind>
where
    S: HasAuthBackend + Sync,
{
    match verify_session(headers, state).await {
        Ok(Verified { user, rotated }) => {
            if let Some(pair) = rotated {
                let cookies = state.cookies().session_cookies(&pair);
                let stored = ROTATED_COOKIES.try_with(|cell| cell.borrow_mut().extend(cookies));
                if stored.is_err() {
                    tracing::warn!("Rotated cookies dropped: no response layer in scope");
                }
            }
            Ok(user)
        }
        Err(kind) => {
            tracing::debug!(kind = kind.as_str(), "Authentication rejected");
            Err(kind)
        }
    }
}

/// Extractor for endpoints that require authentication.
/// Returns JSON errors and clears stale cookies on failure.
pub struct Auth(pub User);

impl<S> FromRequestParts<S> for Auth
where
    S: HasAuthBackend + Send + Sync,
{
    type Rejection = ApiAuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(CurrentUser(user)) = parts.extensions.get::<CurrentUser>() {
            return Ok(Auth(user.clone()));
        }

        authenticate_request(&parts.headers, state)
            .await
            .map(Auth)
            .map_err(|kind| ApiAuthError::new(kind, state.cookies()))
    }
}

/// Optional authentication extractor - never fails.
/// Every rejection, internal errors included, becomes `None`.
pub struct OptionalAuth(pub Option<User>);

impl<S> FromRequestParts<S> for OptionalAuth
where
    S: HasAuthBackend + Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(CurrentUser(user)) = parts.extensions.get::<CurrentUser>() {
            return Ok(OptionalAuth(Some(user.clone())));
        }

        match authenticate_request(&parts.headers, state).await {
            Ok(user) => Ok(OptionalAuth(Some(user))),
            Err(kind) => {
                if !kind.is_credential_failure() {
                    tracing::warn!(kind = kind.as_str(), "Optional authentication failed internally");
                }
                Ok(OptionalAuth(None))
            }
        }
    }
}

/// Middleware that appends cookies queued by the auth extractors.
pub async fn add_rotated_cookies(request: Request, next: Next) -> Response {
    let (mut response, cookies) = ROTATED_COOKIES
        .scope(RefCell::new(Vec::new()), async move {
            let response = next.run(request).await;
            let cookies = ROTATED_COOKIES.with(|cell| cell.take());
            (response, cookies)
        })
        .await;

    append_cookies(response.headers_mut(), cookies);
    response
}

/// Middleware guarding mounted routes. Inserts [`CurrentUser`] on success.
pub async fn require_auth(
    State(state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Response {
    match verify_session(request.headers(), &state).await {
        Ok(Verified { user, rotated }) => {
            request.extensions_mut().insert(CurrentUser(user));
            let mut response = next.run(request).await;
            if let Some(pair) = rotated {
                append_cookies(response.headers_mut(), state.cookies.session_cookies(&pair));
            }
            response
        }
        Err(kind) => {
            tracing::debug!(kind = kind.as_str(), "Protected route rejected");
            ApiAuthError::new(kind, state.cookies).into_response()
        }
    }
}

fn append_cookies(headers: &mut HeaderMap, cookies: impl IntoIterator<Item = String>) {
    for cookie in cookies {
        if let Ok(value) = HeaderValue::from_str(&cookie) {
            headers.append(header::SET_COOKIE, value);
        }
    }
}
