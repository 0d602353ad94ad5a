//! Authentication state traits and macro.

use std::sync::Arc;

use super::cookie::CookiePolicy;
use crate::db::Database;
use crate::jwt::JwtConfig;

/// Trait for state types that provide database and JWT access for authentication.
pub trait HasAuthBackend {
    fn jwt(&self) -> &JwtConfig;
    fn db(&self) -> &Database;
    fn cookies(&self) -> CookiePolicy;
}

/// State for the `require_auth` middleware guarding mounted routes.
#[derive(Clone)]
pub struct AuthState {
    pub db: Database,
    pub jwt: Arc<JwtConfig>,
    pub cookies: CookiePolicy,
}

/// Macro to implement `HasAuthBackend` for state structs with the standard fields.
///
/// The struct must have these fields:
/// - `jwt: Arc<JwtConfig>`
/// - `db: Database`
/// - `cookies: CookiePolicy`
///
/// # Example
/// ```ignore
/// use crate::impl_has_auth_backend;
///
/// #[derive(Clone)]
/// pub struct MyState {
///     pub db: Database,
///     pub jwt: Arc<JwtConfig>,
///     pub cookies: CookiePolicy,
/// }
///
/// impl_has_auth_backend!(MyState);
/// ```
#[macro_export]
macro_rules! impl_has_auth_backend {
    ($state_type:ty) => {
        impl $crate::auth::HasAuthBackend for $state_type {
            fn jwt(&self) -> &$crate::jwt::JwtConfig {
                &self.jwt
            }
            fn db(&self) -> &$crate::db::Database {
                &self.db
            }
            fn cookies(&self) -> $crate::auth::CookiePolicy {
                self.cookies
            }
        }
    };
}

crate::impl_has_auth_backend!(AuthState);
