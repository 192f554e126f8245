//! Authenticated client
//!
//! Wraps a `Transport`, attaching the current access token to every request.
//! A `401 token.expired` is handed to the `RefreshCoordinator` and the
//! original request is replayed once with the refreshed token. Any other
//! 401 ends the session.

use std::sync::Arc;

use reqwest::header::AUTHORIZATION;
use serde::Serialize;
use session_auth::{CredentialStore, SessionTerminator, User, WHOAMI_PATH};
use tracing::{Instrument, debug, info, info_span, warn};
use transport::{ApiRequest, ApiResponse, Transport, TransportError};

use crate::authorization::{DefaultAuthorization, bearer_value};
use crate::classify::{FailureKind, classify};
use crate::coordinator::{RefreshCoordinator, RefreshOptions};
use crate::error::{Error, Result};
use crate::metrics;

/// Cheap to clone; clones share the default Authorization and coordinator.
#[derive(Clone)]
pub struct AuthenticatedClient {
    transport: Arc<dyn Transport>,
    store: Arc<dyn CredentialStore>,
    terminator: Arc<dyn SessionTerminator>,
    authorization: Arc<DefaultAuthorization>,
    coordinator: RefreshCoordinator,
    options: RefreshOptions,
}

impl AuthenticatedClient {
    /// Build a client, seeding the default Authorization from `store`.
    pub async fn new(
        transport: Arc<dyn Transport>,
        store: Arc<dyn CredentialStore>,
        terminator: Arc<dyn SessionTerminator>,
        options: RefreshOptions,
    ) -> Self {
        let seeded = store.get().await.map(|pair| pair.access_token);
        let authorization = Arc::new(DefaultAuthorization::new(seeded));
        let coordinator = RefreshCoordinator::new(
            store.clone(),
            transport.clone(),
            terminator.clone(),
            authorization.clone(),
            options.clone(),
        );
        Self {
            transport,
            store,
            terminator,
            authorization,
            coordinator,
            options,
        }
    }

    /// Send `request` with the current access token.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let span = info_span!(
            "request",
            request_id = %format!("req_{}", uuid::Uuid::new_v4().simple()),
            method = %request.method,
            path = %request.path,
        );
        self.send_inner(request).instrument(span).await
    }

    async fn send_inner(&self, request: ApiRequest) -> Result<ApiResponse> {
        let token = self.current_token().await;

        let failure = match self.dispatch(request.clone(), token.as_deref()).await {
            Ok(response) => return Ok(response),
            Err(failure) => failure,
        };

        match classify(&failure) {
            FailureKind::Transport => Err(failure.into()),
            FailureKind::AuthInvalid => {
                self.reject(failure.code()).await;
                Err(failure.into())
            }
            FailureKind::TokenExpired => {
                debug!("access token expired");
                let fresh = self
                    .coordinator
                    .await_refreshed_token(token.as_deref())
                    .await?;

                metrics::record_retry();
                debug!("retrying with refreshed token");
                match self.dispatch(request, Some(&fresh)).await {
                    Ok(response) => Ok(response),
                    Err(failure) => {
                        if classify(&failure) == FailureKind::AuthInvalid {
                            self.reject(failure.code()).await;
                        }
                        Err(failure.into())
                    }
                }
            }
        }
    }

    pub async fn get(&self, path: &str) -> Result<ApiResponse> {
        self.send(ApiRequest::get(path)).await
    }

    pub async fn post(&self, path: &str, body: impl Serialize) -> Result<ApiResponse> {
        self.send(ApiRequest::post(path, body)?).await
    }

    /// Create a session and make it the client's default.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<User> {
        let session = session_auth::sign_in(self.transport.as_ref(), email, password).await?;

        self.store
            .set(session.tokens.clone(), self.options.persist.clone())
            .await?;
        self.authorization.set(&session.tokens.access_token);
        self.terminator.mark_active();

        info!(email, roles = ?session.user.roles, "signed in");
        Ok(session.user)
    }

    /// Startup check: confirm a stored session is still usable.
    ///
    /// Returns `Ok(None)` when nothing is stored. Otherwise asks the
    /// whoami endpoint; an expired access token is refreshed on the way.
    /// Any failure ends the session.
    pub async fn bootstrap(&self) -> Result<Option<User>> {
        if self.current_token().await.is_none() {
            debug!("no stored session");
            return Ok(None);
        }

        let outcome = match self.get(WHOAMI_PATH).await {
            Ok(response) => serde_json::from_value::<User>(response.body).map_err(|e| {
                Error::Session(session_auth::Error::InvalidResponse(format!(
                    "invalid whoami response: {e}"
                )))
            }),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(user) => {
                info!(email = %user.email, "session restored");
                Ok(Some(user))
            }
            Err(e) => {
                if !e.ended_session() {
                    warn!(error = %e, "startup session check failed");
                    self.coordinator.force_sign_out("bootstrap_failed").await;
                }
                Err(e)
            }
        }
    }

    /// Explicit logout.
    pub async fn sign_out(&self) {
        self.coordinator.force_sign_out("logout").await;
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    pub fn authorization(&self) -> &DefaultAuthorization {
        &self.authorization
    }

    /// Default Authorization, falling back to the store when unset.
    async fn current_token(&self) -> Option<String> {
        if let Some(token) = self.authorization.bearer() {
            return Some(token);
        }
        let token = self.store.get().await?.access_token;
        self.authorization.set(&token);
        Some(token)
    }

    async fn dispatch(
        &self,
        mut request: ApiRequest,
        token: Option<&str>,
    ) -> transport::Result<ApiResponse> {
        match token {
            Some(token) => {
                let value = bearer_value(token).ok_or_else(|| {
                    TransportError::InvalidRequest("access token is not a valid header value".into())
                })?;
                request.headers.insert(AUTHORIZATION, value);
            }
            None => {
                request.headers.remove(AUTHORIZATION);
            }
        }
        self.transport.send(request).await
    }

    async fn reject(&self, code: Option<&str>) {
        warn!(code = code.unwrap_or("none"), "session rejected by the server");
        self.coordinator.force_sign_out("auth_invalid").await;
    }
}
