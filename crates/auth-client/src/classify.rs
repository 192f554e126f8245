//! Failure classification for authenticated requests
//!
//! Only one failure is recoverable here: a 401 whose error code says the
//! access token expired. Any other 401 means the session itself is invalid
//! and ends in a forced sign-out. Everything else is passed through.

use transport::TransportError;

/// Error code the backend sends with a 401 for an expired access token.
pub const TOKEN_EXPIRED_CODE: &str = "token.expired";

/// How the client reacts to a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Refresh the session, then retry once.
    TokenExpired,
    /// Force sign-out, surface the failure.
    AuthInvalid,
    /// Surface the failure unchanged.
    Transport,
}

pub fn classify(failure: &TransportError) -> FailureKind {
    match failure {
        TransportError::Status { status: 401, code, .. } => {
            if code.as_deref() == Some(TOKEN_EXPIRED_CODE) {
                FailureKind::TokenExpired
            } else {
                FailureKind::AuthInvalid
            }
        }
        _ => FailureKind::Transport,
    }
}
