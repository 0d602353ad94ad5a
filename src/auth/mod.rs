//! Cookie-based session authentication.
//!
//! Dual-token system: short-lived access tokens (4 hours, stateless) and
//! long-lived refresh tokens (30 days) revoked by bumping the user's token
//! version. Tokens are rotated transparently by the extractors and the
//! `require_auth` middleware.

mod cookie;
mod errors;
mod extractors;
mod ip;
mod state;
mod verifier;

pub use cookie::{ACCESS_COOKIE_NAME, CookiePolicy, REFRESH_COOKIE_NAME, SameSite, get_cookie};
pub use errors::{ApiAuthError, AuthErrorKind, NOT_AUTHENTICATED};
pub use extractors::{
    Auth, CurrentUser, OptionalAuth, ROTATED_COOKIES, add_rotated_cookies, require_auth,
};
pub use ip::{FORWARDED_FOR_HEADER, HasHeadersAndExtensions, extract_client_ip};
pub use state::{AuthState, HasAuthBackend};
pub use verifier::{Verified, refresh_session, verify_session};
