//! Single-flight session refresh
//!
//! The coordinator owns a two-state machine:
//!
//! - `Idle`: no refresh in progress.
//! - `Refreshing { queue }`: exactly one refresh call is in flight; later
//!   callers park a oneshot sender in `queue` instead of calling again.
//!
//! The first caller to see `Idle` flips the state and runs the refresh on a
//! spawned task, awaiting that task directly. When the call finishes, the
//! whole queue is resolved FIFO with the same outcome and the state returns
//! to `Idle` under a single lock hold, so nobody can observe `Idle` with
//! entries still parked. A failed refresh forces exactly one sign-out no
//! matter how many callers were waiting.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use session_auth::{CredentialStore, PersistOptions, SessionTerminator};
use tokio::sync::{Mutex, oneshot};
use tracing::{Instrument, debug, info, instrument, warn};
use transport::Transport;

use crate::authorization::DefaultAuthorization;
use crate::error::RefreshError;
use crate::metrics;

/// Refresh behaviour shared by the coordinator and the client.
#[derive(Debug, Clone)]
pub struct RefreshOptions {
    /// Upper bound on one refresh call. `None` waits as long as the transport does.
    pub timeout: Option<Duration>,
    /// Options used when storing the refreshed pair.
    pub persist: PersistOptions,
}

impl Default for RefreshOptions {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_secs(30)),
            persist: PersistOptions::default(),
        }
    }
}

/// A caller parked behind the in-flight refresh.
struct PendingRequest {
    resume: oneshot::Sender<Result<String, RefreshError>>,
}

impl PendingRequest {
    fn resolve(self, outcome: Result<String, RefreshError>) {
        if self.resume.send(outcome).is_err() {
            debug!("queued request went away before the refresh finished");
        }
    }
}

#[derive(Default)]
enum RefreshState {
    #[default]
    Idle,
    Refreshing {
        queue: VecDeque<PendingRequest>,
    },
}

struct Inner {
    state: Mutex<RefreshState>,
    store: Arc<dyn CredentialStore>,
    transport: Arc<dyn Transport>,
    terminator: Arc<dyn SessionTerminator>,
    authorization: Arc<DefaultAuthorization>,
    options: RefreshOptions,
}

/// Cheap to clone; clones share one state machine.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

impl RefreshCoordinator {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        transport: Arc<dyn Transport>,
        terminator: Arc<dyn SessionTerminator>,
        authorization: Arc<DefaultAuthorization>,
        options: RefreshOptions,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(RefreshState::Idle),
                store,
                transport,
                terminator,
                authorization,
                options,
            }),
        }
    }

    /// Wait for an access token newer than `stale`.
    ///
    /// `stale` is the token the failed request carried. If the coordinator
    /// is idle and the default Authorization already holds a different
    /// token, an earlier refresh has replaced it and that token is returned
    /// without another call. If it holds no token at all, the session already
    /// ended and the caller gets `SessionEnded` without a new refresh.
    #[instrument(skip_all)]
    pub async fn await_refreshed_token(&self, stale: Option<&str>) -> Result<String, RefreshError> {
        let parked = {
            let mut state = self.inner.state.lock().await;
            match &mut *state {
                RefreshState::Refreshing { queue } => {
                    let (resume, parked) = oneshot::channel();
                    queue.push_back(PendingRequest { resume });
                    metrics::record_queued();
                    debug!(position = queue.len(), "refresh in flight, request queued");
                    Some(parked)
                }
                RefreshState::Idle => {
                    match (self.inner.authorization.bearer(), stale) {
                        (Some(current), Some(stale)) if stale != current => {
                            debug!("access token already replaced, skipping refresh");
                            return Ok(current);
                        }
                        (None, Some(_)) => {
                            debug!("session already ended, skipping refresh");
                            return Err(RefreshError::SessionEnded);
                        }
                        _ => {}
                    }
                    *state = RefreshState::Refreshing {
                        queue: VecDeque::new(),
                    };
                    None
                }
            }
        };

        match parked {
            Some(parked) => parked.await.unwrap_or(Err(RefreshError::Interrupted)),
            None => {
                let inner = self.inner.clone();
                let refresh = async move { inner.run_refresh().await }.in_current_span();
                match tokio::spawn(refresh).await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        warn!(error = %e, "refresh task aborted");
                        self.inner.force_sign_out("refresh_failed").await;
                        self.inner.settle(Err(RefreshError::Interrupted)).await;
                        Err(RefreshError::Interrupted)
                    }
                }
            }
        }
    }

    /// Whether a refresh call is in flight.
    pub async fn is_refreshing(&self) -> bool {
        matches!(
            *self.inner.state.lock().await,
            RefreshState::Refreshing { .. }
        )
    }

    /// Number of requests parked behind the in-flight refresh.
    pub async fn queued(&self) -> usize {
        match &*self.inner.state.lock().await {
            RefreshState::Refreshing { queue } => queue.len(),
            RefreshState::Idle => 0,
        }
    }

    /// Clear the default Authorization and hand off to the terminator.
    pub async fn force_sign_out(&self, reason: &'static str) {
        self.inner.force_sign_out(reason).await;
    }
}

impl Inner {
    async fn run_refresh(&self) -> Result<String, RefreshError> {
        info!("access token expired, refreshing session");

        let outcome = match self.options.timeout {
            Some(limit) => tokio::time::timeout(limit, self.refresh_once())
                .await
                .unwrap_or(Err(RefreshError::TimedOut(limit))),
            None => self.refresh_once().await,
        };

        // Sign out before waking the queue so no waiter sees a live session
        // after a failed refresh.
        if let Err(e) = &outcome {
            metrics::record_refresh(e.label());
            warn!(error = %e, "session refresh failed");
            self.force_sign_out("refresh_failed").await;
        }

        let waiters = self.settle(outcome.clone()).await;
        if outcome.is_ok() {
            metrics::record_refresh("success");
            info!(waiters, "session refreshed");
        }

        outcome
    }

    async fn refresh_once(&self) -> Result<String, RefreshError> {
        let refresh_token = self
            .store
            .get()
            .await
            .map(|pair| pair.refresh_token)
            .ok_or(RefreshError::MissingRefreshToken)?;

        let pair = session_auth::refresh_session(self.transport.as_ref(), &refresh_token)
            .await
            .map_err(RefreshError::Rejected)?;

        self.store
            .set(pair.clone(), self.options.persist.clone())
            .await
            .map_err(|e| RefreshError::Persist(e.to_string()))?;
        self.authorization.set(&pair.access_token);

        Ok(pair.access_token)
    }

    /// Resolve every queued request in order and return to `Idle`.
    ///
    /// Returns how many queued requests were resolved.
    async fn settle(&self, outcome: Result<String, RefreshError>) -> usize {
        let mut state = self.state.lock().await;
        let queue = match std::mem::take(&mut *state) {
            RefreshState::Refreshing { queue } => queue,
            RefreshState::Idle => VecDeque::new(),
        };
        let resolved = queue.len();
        for pending in queue {
            pending.resolve(outcome.clone());
        }
        resolved
    }

    async fn force_sign_out(&self, reason: &'static str) {
        warn!(reason, "forcing sign-out");
        self.authorization.clear();
        metrics::record_sign_out(reason);
        self.terminator.sign_out().await;
    }
}
