//! Client half of the session protocol.
//!
//! [`AuthClient`] wraps a [`Transport`] and transparently refreshes the
//! session once per request on `401`, with at most one refresh in flight.
//! [`SessionStore`] tracks the current user on top of it.

mod error;
mod interceptor;
mod session;
mod transport;

#[cfg(test)]
mod fake;

pub use error::ClientError;
pub use interceptor::{AuthClient, ClientOptions, LoginRedirect, LogRedirect};
pub use session::{SessionOptions, SessionState, SessionStore};
pub use transport::{ApiRequest, ApiResponse, ReqwestTransport, Transport};

/// Current user's profile.
pub const USER_PATH: &str = "/api/auth/user";
/// Refresh endpoint; never retried by the interceptor.
pub const REFRESH_PATH: &str = "/api/auth/refresh";
pub const LOGOUT_PATH: &str = "/api/auth/logout";
/// Entry point of the browser login flow.
pub const LOGIN_PATH: &str = "/api/auth/google";
