//! Cookie parsing and `Set-Cookie` construction for the session tokens.

use axum::http::header;

use crate::jwt::{IssuedToken, TokenPair};

/// Cookie name for the access token (short-lived, 4 hours).
pub const ACCESS_COOKIE_NAME: &str = "accessToken";

/// Cookie name for the refresh token (long-lived, 30 days).
pub const REFRESH_COOKIE_NAME: &str = "refreshToken";

/// Extract a cookie value from the Cookie header.
/// Empty values (left behind by a cleared cookie) count as absent.
pub fn get_cookie<'a>(headers: &'a axum::http::HeaderMap, name: &str) -> Option<&'a str> {
    let cookie_header = headers.get(header::COOKIE)?.to_str().ok()?;
    for part in cookie_header.split(';') {
        let part = part.trim();
        if let Some((key, value)) = part.split_once('=') {
            if key.trim() == name {
                let value = value.trim();
                return (!value.is_empty()).then_some(value);
            }
        }
    }
    None
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Lax,
    None,
}

impl SameSite {
    fn as_str(self) -> &'static str {
        match self {
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

/// Attributes shared by both session cookies.
///
/// Production deployments serve the client from another origin, which needs
/// `SameSite=None`, and browsers only accept that together with `Secure`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CookiePolicy {
    pub secure: bool,
    pub same_site: SameSite,
}

impl CookiePolicy {
    pub fn production() -> Self {
        Self {
            secure: true,
            same_site: SameSite::None,
        }
    }

    pub fn development() -> Self {
        Self {
            secure: false,
            same_site: SameSite::Lax,
        }
    }

    pub fn for_environment(production: bool) -> Self {
        if production {
            Self::production()
        } else {
            Self::development()
        }
    }

    /// Build a `Set-Cookie` value for one token.
    pub fn set(&self, name: &str, token: &IssuedToken) -> String {
        format!(
            "{}={}; HttpOnly; SameSite={}; Path=/; Max-Age={}{}",
            name,
            token.token,
            self.same_site.as_str(),
            token.duration,
            self.secure_suffix()
        )
    }

    /// Build a `Set-Cookie` value that deletes a cookie.
    pub fn clear(&self, name: &str) -> String {
        format!(
            "{}=; HttpOnly; SameSite={}; Path=/; Max-Age=0{}",
            name,
            self.same_site.as_str(),
            self.secure_suffix()
        )
    }

    /// Both session cookies for a freshly issued pair.
    pub fn session_cookies(&self, pair: &TokenPair) -> [String; 2] {
        [
            self.set(ACCESS_COOKIE_NAME, &pair.access),
            self.set(REFRESH_COOKIE_NAME, &pair.refresh),
        ]
    }

    /// Cookies that clear both session tokens.
    pub fn clear_session_cookies(&self) -> [String; 2] {
        [
            self.clear(ACCESS_COOKIE_NAME),
            self.clear(REFRESH_COOKIE_NAME),
        ]
    }

    fn secure_suffix(&self) -> &'static str {
        if self.secure { "; Secure" } else { "" }
    }
}
