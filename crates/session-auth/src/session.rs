//! Forced sign-out
//!
//! When the session can't be recovered (non-refreshable 401, refresh
//! failure, failed startup check) the client hands control to a
//! `SessionTerminator`. `ClearCredentials` wipes the store and publishes
//! `SessionState::SignedOut` so a front end can send the user back to the
//! unauthenticated entry point.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::constants::DEFAULT_ENTRY_POINT;
use crate::credentials::CredentialStore;

/// Whether the front end currently holds a usable session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Active,
    /// Credentials were wiped; navigate to `entry_point`.
    SignedOut { entry_point: String },
}

/// Ends the session. Nothing is returned to the caller.
pub trait SessionTerminator: Send + Sync {
    fn sign_out(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;

    /// Called after a successful sign-in.
    fn mark_active(&self) {}
}

/// Default terminator: clear credentials, then announce the redirect.
pub struct ClearCredentials {
    store: Arc<dyn CredentialStore>,
    entry_point: String,
    state: watch::Sender<SessionState>,
}

impl ClearCredentials {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self::with_entry_point(store, DEFAULT_ENTRY_POINT)
    }

    pub fn with_entry_point(store: Arc<dyn CredentialStore>, entry_point: impl Into<String>) -> Self {
        let (state, _) = watch::channel(SessionState::Active);
        Self {
            store,
            entry_point: entry_point.into(),
            state,
        }
    }

    /// Observe session transitions.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }
}

impl SessionTerminator for ClearCredentials {
    fn sign_out(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            if let Err(e) = self.store.clear().await {
                warn!(error = %e, "failed to clear credentials during sign-out");
            }
            info!(entry_point = %self.entry_point, "session ended, redirecting to sign-in");
            self.state.send_replace(SessionState::SignedOut {
                entry_point: self.entry_point.clone(),
            });
        })
    }

    fn mark_active(&self) {
        self.state.send_replace(SessionState::Active);
    }
}
