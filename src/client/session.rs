//! Client session store: the current user and its revalidation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::error::ClientError;
use super::interceptor::AuthClient;
use super::transport::ApiRequest;
use super::{LOGOUT_PATH, USER_PATH};
use crate::db::UserProfile;

/// Revalidation period while a user is present: 5 minutes
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Upper bound for one auth check: 10 seconds
pub const DEFAULT_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    pub poll_interval: Duration,
    pub check_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            check_timeout: DEFAULT_CHECK_TIMEOUT,
        }
    }
}

/// Snapshot published to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub user: Option<UserProfile>,
    /// True until the first check settles
    pub loading: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            user: None,
            loading: true,
        }
    }
}

pub struct SessionStore {
    client: Arc<AuthClient>,
    state: watch::Sender<SessionState>,
    options: SessionOptions,
    /// Bumped by every logout; checks started under an older value are discarded
    epoch: AtomicU64,
}

impl SessionStore {
    pub fn new(client: Arc<AuthClient>, options: SessionOptions) -> Arc<Self> {
        let (state, _) = watch::channel(SessionState::default());
        Arc::new(Self {
            client,
            state,
            options,
            epoch: AtomicU64::new(0),
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.state.borrow().user.clone()
    }

    pub fn loading(&self) -> bool {
        self.state.borrow().loading
    }

    /// Resolve the current user and publish it. `loading` ends here whatever
    /// the outcome. A check overtaken by [`SessionStore::logout`] publishes
    /// nothing and returns `None`.
    pub async fn check_auth_status(&self) -> Option<UserProfile> {
        let epoch = self.epoch.load(Ordering::Acquire);
        let user = match tokio::time::timeout(self.options.check_timeout, self.resolve_user()).await
        {
            Ok(Ok(user)) => Some(user),
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "Auth check failed");
                None
            }
            Err(_) => {
                tracing::warn!(error = %ClientError::Timeout, "Auth check failed");
                None
            }
        };

        // The epoch is compared under the watch lock, which logout also holds
        // while bumping it.
        let published = self.state.send_if_modified(|state| {
            if self.epoch.load(Ordering::Acquire) != epoch {
                return false;
            }
            state.user = user.clone();
            state.loading = false;
            true
        });
        if !published {
            tracing::debug!("Auth check discarded after logout");
            return None;
        }
        user
    }

    /// Fetch the profile; on `401` join one refresh and retry once.
    async fn resolve_user(&self) -> Result<UserProfile, ClientError> {
        let generation = self.client.generation();
        match self.fetch_user().await {
            Err(ClientError::Unauthorized) => {
                if !self.client.refresh_after(generation).await {
                    return Err(ClientError::Unauthorized);
                }
                let user = self.fetch_user().await?;
                self.client.reset_attempts();
                Ok(user)
            }
            other => other,
        }
    }

    async fn fetch_user(&self) -> Result<UserProfile, ClientError> {
        self.client.send_once(ApiRequest::get(USER_PATH)).await?.json()
    }

    /// Run the first check, then revalidate periodically while a user is
    /// present. The task ends once the store is dropped.
    pub async fn start(self: &Arc<Self>) -> JoinHandle<()> {
        self.check_auth_status().await;
        spawn_revalidation(Arc::downgrade(self), self.options.poll_interval)
    }

    /// Revalidate immediately, e.g. when the host regains focus.
    pub async fn on_foreground(&self) -> Option<UserProfile> {
        self.check_auth_status().await
    }

    /// Best-effort server logout. The local user is cleared regardless.
    pub async fn logout(&self) {
        match self.client.send_once(ApiRequest::post(LOGOUT_PATH)).await {
            Ok(response) if response.status.is_success() => {}
            Ok(response) => tracing::warn!(status = %response.status, "Logout rejected"),
            Err(e) => tracing::warn!(error = %e, "Logout request failed"),
        }

        self.client.reset_attempts();
        self.state.send_modify(|state| {
            self.epoch.fetch_add(1, Ordering::AcqRel);
            state.user = None;
            state.loading = false;
        });
    }
}

fn spawn_revalidation(store: Weak<SessionStore>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            let Some(session) = store.upgrade() else {
                break;
            };
            let present = session.user().is_some();
            if present {
                session.check_auth_status().await;
            }
        }
    })
}
