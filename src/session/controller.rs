//! Session lifecycle: restore, login, logout, and local user patches.
//!
//! STATE MACHINE
//! =============
//! `Unresolved` → `Restoring` → {`Authenticated`, `Unauthenticated`}, then
//! `Authenticated` ⇄ `Unauthenticated` through logout and login.
//!
//! CONCURRENCY
//! ===========
//! Identity-resolving operations (`restore`, `login`, `logout`) hold one
//! async mutex for their whole duration, so a late reply can never overwrite
//! the result of a newer operation. State is published through a
//! `tokio::sync::watch` channel; readers never wait on the mutex.
//!
//! ERROR HANDLING
//! ==============
//! No operation returns an error. Transport failures, rejected or malformed
//! replies, and storage failures are logged and degrade to the cached
//! snapshot or to `Unauthenticated`.

use std::sync::Arc;

use tokio::sync::{Mutex, watch};
use tracing::{debug, error, info, warn};

use super::api::AuthApi;
use super::storage::ClientStorage;
use super::types::{Credentials, LoginGrant, Role, User, UserPatch};

// =============================================================================
// STATE
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Unresolved,
    Restoring,
    Authenticated,
    Unauthenticated,
}

/// Snapshot of the session as seen by the rest of the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub user: Option<User>,
    pub is_loading: bool,
    pub phase: SessionPhase,
}

impl SessionState {
    /// True if and only if a user is present.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    fn settle(&mut self, user: Option<User>) {
        self.phase = if user.is_some() { SessionPhase::Authenticated } else { SessionPhase::Unauthenticated };
        self.user = user;
        self.is_loading = false;
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self { user: None, is_loading: true, phase: SessionPhase::Unresolved }
    }
}

// =============================================================================
// OPTIONS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Drop the persisted token when verification fails for any reason,
    /// including transport errors that say nothing about the token itself.
    pub clear_token_on_verify_failure: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self { clear_token_on_verify_failure: true }
    }
}

// =============================================================================
// CONTROLLER
// =============================================================================

/// Owns the session for one client. Build it at the application root and
/// share it by reference or `Arc`.
pub struct SessionController {
    api: Arc<dyn AuthApi>,
    storage: ClientStorage,
    options: SessionOptions,
    state: watch::Sender<SessionState>,
    op_lock: Mutex<()>,
}

impl SessionController {
    #[must_use]
    pub fn new(api: Arc<dyn AuthApi>, storage: ClientStorage) -> Self {
        Self::with_options(api, storage, SessionOptions::default())
    }

    #[must_use]
    pub fn with_options(api: Arc<dyn AuthApi>, storage: ClientStorage, options: SessionOptions) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        Self { api, storage, options, state, op_lock: Mutex::new(()) }
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn user(&self) -> Option<User> {
        self.state.borrow().user.clone()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated()
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.state.borrow().is_loading
    }

    /// Receiver that observes every state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn storage(&self) -> &ClientStorage {
        &self.storage
    }

    /// Determine the current user at startup. Runs once; later calls return
    /// the current state untouched.
    pub async fn restore(&self) -> SessionState {
        let _guard = self.op_lock.lock().await;

        if self.state.borrow().phase != SessionPhase::Unresolved {
            debug!("session already resolved; skipping restore");
            return self.state();
        }
        self.state.send_modify(|s| {
            s.phase = SessionPhase::Restoring;
            s.is_loading = true;
        });

        let user = match self.storage.token() {
            None => self.snapshot_fallback(),
            Some(token) => match self.api.current_user(&token).await {
                Ok(user) => {
                    self.refresh_snapshot(&user);
                    info!(user_id = %user.id, "session verified");
                    Some(user)
                }
                Err(e) => {
                    warn!(error = %e, "auth verification failed");
                    if self.options.clear_token_on_verify_failure {
                        self.storage.clear_token();
                    }
                    self.snapshot_fallback()
                }
            },
        };

        self.state.send_modify(|s| s.settle(user));
        self.state()
    }

    /// Submit credentials. Returns `true` only when the backend granted both a
    /// token and a user and the token was persisted.
    pub async fn login(&self, email: &str, password: &str, role: Role) -> bool {
        let _guard = self.op_lock.lock().await;
        let credentials = Credentials::new(email, password, role);

        self.state.send_modify(|s| s.is_loading = true);
        let outcome = match self.api.login(&credentials).await {
            Ok(grant) => self.adopt_grant(grant),
            Err(e) => {
                error!(error = %e, email = credentials.email(), "login failed");
                false
            }
        };
        self.state.send_modify(|s| s.is_loading = false);
        outcome
    }

    /// Best-effort backend logout, then unconditional local teardown.
    pub async fn logout(&self) {
        let _guard = self.op_lock.lock().await;

        if let Some(token) = self.storage.token() {
            if let Err(e) = self.api.logout(&token).await {
                warn!(error = %e, "backend logout failed");
            }
        }
        self.state.send_modify(|s| s.settle(None));
        self.storage.clear_auth();
        info!("logged out");
    }

    /// Merge `patch` into the current user without contacting the backend.
    /// Returns the merged user, or `None` when unauthenticated.
    pub fn update_user(&self, patch: &UserPatch) -> Option<User> {
        let mut merged = None;
        self.state.send_if_modified(|s| {
            let Some(current) = s.user.as_ref() else {
                return false;
            };
            let next = current.merged(patch);
            let changed = next != *current;
            // Written under the state lock so a concurrent logout clears it.
            self.refresh_snapshot(&next);
            merged = Some(next.clone());
            s.user = Some(next);
            changed
        });
        merged
    }

    fn adopt_grant(&self, grant: LoginGrant) -> bool {
        let LoginGrant { token, user } = grant;
        if let Err(e) = self.storage.set_token(&token) {
            error!(error = %e, "failed to persist token; login discarded");
            return false;
        }
        self.refresh_snapshot(&user);
        info!(user_id = %user.id, role = %user.role, "logged in");
        self.state.send_modify(|s| s.settle(Some(user)));
        true
    }

    fn snapshot_fallback(&self) -> Option<User> {
        let user = self.storage.cached_user();
        if let Some(user) = &user {
            info!(user_id = %user.id, "using cached session user");
        }
        user
    }

    fn refresh_snapshot(&self, user: &User) {
        if let Err(e) = self.storage.cache_user(user) {
            warn!(error = %e, "failed to cache session user");
        }
    }
}

#[cfg(test)]
#[path = "controller_test.rs"]
mod tests;
