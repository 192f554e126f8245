//! Error types for authenticated requests

use std::time::Duration;

use transport::TransportError;

/// Why a refresh cycle failed.
///
/// Every request waiting on the cycle receives a clone of the same value.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RefreshError {
    #[error("no refresh token stored")]
    MissingRefreshToken,

    #[error("refresh rejected: {0}")]
    Rejected(session_auth::Error),

    #[error("failed to persist refreshed tokens: {0}")]
    Persist(String),

    #[error("refresh did not complete within {0:?}")]
    TimedOut(Duration),

    #[error("refresh ended without an outcome")]
    Interrupted,

    #[error("session already ended")]
    SessionEnded,
}

impl RefreshError {
    /// Metrics label for this failure.
    pub fn label(&self) -> &'static str {
        match self {
            RefreshError::MissingRefreshToken => "missing_token",
            RefreshError::Rejected(_) => "rejected",
            RefreshError::Persist(_) => "persist_failed",
            RefreshError::TimedOut(_) => "timeout",
            RefreshError::Interrupted => "interrupted",
            RefreshError::SessionEnded => "session_ended",
        }
    }
}

/// Errors surfaced to callers of the authenticated client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The request's own failure, unchanged.
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("session refresh failed: {0}")]
    Refresh(#[from] RefreshError),

    #[error(transparent)]
    Session(#[from] session_auth::Error),
}

impl Error {
    /// Whether producing this error already forced a sign-out.
    pub fn ended_session(&self) -> bool {
        match self {
            Error::Refresh(_) => true,
            Error::Transport(failure) => {
                crate::classify::classify(failure) == crate::classify::FailureKind::AuthInvalid
            }
            Error::Session(_) => false,
        }
    }
}

/// Result alias for authenticated requests.
pub type Result<T> = std::result::Result<T, Error>;
