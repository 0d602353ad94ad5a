//! Authentication error types.

use axum::{
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};

use super::cookie::CookiePolicy;

/// Every credential failure uses this message so responses never reveal
/// which part of the credential was rejected.
pub const NOT_AUTHENTICATED: &str = "Not authenticated";

/// Internal auth error kind. Distinguished only in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    /// Neither cookie was sent
    NoCredentials,
    /// Access token missing, malformed, badly signed or expired
    InvalidAccess,
    /// Refresh token missing, malformed, badly signed or expired
    InvalidRefresh,
    /// Refresh token version no longer matches the user's
    Revoked,
    UserNotFound,
    /// User lookup failed
    Store,
    /// Token signing failed
    Signing,
}

impl AuthErrorKind {
    /// Credential failures answer 401; the rest are server faults.
    pub fn is_credential_failure(self) -> bool {
        !matches!(self, AuthErrorKind::Store | AuthErrorKind::Signing)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AuthErrorKind::NoCredentials => "no_credentials",
            AuthErrorKind::InvalidAccess => "invalid_access",
            AuthErrorKind::InvalidRefresh => "invalid_refresh",
            AuthErrorKind::Revoked => "revoked",
            AuthErrorKind::UserNotFound => "user_not_found",
            AuthErrorKind::Store => "store",
            AuthErrorKind::Signing => "signing",
        }
    }
}

/// API authentication error. Renders as JSON and clears stale cookies.
#[derive(Debug)]
pub struct ApiAuthError {
    pub(super) kind: AuthErrorKind,
    cookies: CookiePolicy,
    clear_cookies: bool,
}

impl ApiAuthError {
    /// Rejection from the verifier. Clears both cookies unless none were sent
    /// or the failure was on the server side.
    pub fn new(kind: AuthErrorKind, cookies: CookiePolicy) -> Self {
        Self {
            kind,
            cookies,
            clear_cookies: kind.is_credential_failure() && kind != AuthErrorKind::NoCredentials,
        }
    }

    /// Rejection that leaves the client's cookies alone.
    pub fn keep_cookies(kind: AuthErrorKind, cookies: CookiePolicy) -> Self {
        Self {
            kind,
            cookies,
            clear_cookies: false,
        }
    }

    pub fn kind(&self) -> AuthErrorKind {
        self.kind
    }

    fn status_code(&self) -> StatusCode {
        if self.kind.is_credential_failure() {
            StatusCode::UNAUTHORIZED
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }

    fn message(&self) -> &'static str {
        if self.kind.is_credential_failure() {
            NOT_AUTHENTICATED
        } else {
            "Internal server error"
        }
    }
}

impl IntoResponse for ApiAuthError {
    fn into_response(self) -> Response {
        use axum::Json;
        use serde::Serialize;

        #[derive(Serialize)]
        struct ErrorResponse {
            error: &'static str,
        }

        let mut response = (
            self.status_code(),
            Json(ErrorResponse {
                error: self.message(),
            }),
        )
            .into_response();

        if self.clear_cookies {
            let headers = response.headers_mut();
            for cookie in self.cookies.clear_session_cookies() {
                if let Ok(value) = HeaderValue::from_str(&cookie) {
                    headers.append(header::SET_COOKIE, value);
                }
            }
        }

        response
    }
}
