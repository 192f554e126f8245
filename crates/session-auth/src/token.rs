//! Session endpoint calls: refresh and sign-in
//!
//! Both go straight through the `Transport`, never through the
//! authenticated client, so a failing refresh can't re-enter the refresh
//! path. The backend answers sign-in and refresh with `token` +
//! `refreshToken`; `TokenPair` accepts either `token` or `accessToken`.

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;
use transport::{ApiRequest, Transport};

use crate::constants::{REFRESH_PATH, SESSIONS_PATH};
use crate::credentials::TokenPair;
use crate::error::{Error, Result};

/// Authenticated user as returned by the whoami endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub email: String,
    #[serde(default, alias = "permission")]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Sign-in result: the new token pair plus the user's grants.
#[derive(Debug, Clone)]
pub struct SignIn {
    pub tokens: TokenPair,
    pub user: User,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
    #[serde(flatten)]
    tokens: TokenPair,
    #[serde(default, alias = "permission")]
    permissions: Vec<String>,
    #[serde(default)]
    roles: Vec<String>,
}

/// Exchange a refresh token for a new token pair.
///
/// A non-2xx answer (invalid or expired refresh token) surfaces as
/// `Error::Transport` with the endpoint's status.
pub async fn refresh_session(transport: &dyn Transport, refresh_token: &str) -> Result<TokenPair> {
    let request = ApiRequest::post(REFRESH_PATH, json!({ "refreshToken": refresh_token }))?;
    let response = transport.send(request).await?;

    debug!(status = response.status, "refresh endpoint answered");

    serde_json::from_value::<TokenPair>(response.body)
        .map_err(|e| Error::InvalidResponse(format!("invalid refresh response: {e}")))
}

/// Create a session from email/password credentials.
pub async fn sign_in(transport: &dyn Transport, email: &str, password: &str) -> Result<SignIn> {
    let request = ApiRequest::post(
        SESSIONS_PATH,
        json!({ "email": email, "password": password }),
    )?;
    let response = transport.send(request).await?;

    let session = serde_json::from_value::<SessionResponse>(response.body)
        .map_err(|e| Error::InvalidResponse(format!("invalid sign-in response: {e}")))?;

    Ok(SignIn {
        tokens: session.tokens,
        user: User {
            email: email.to_string(),
            permissions: session.permissions,
            roles: session.roles,
        },
    })
}
