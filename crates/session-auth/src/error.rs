//! Error types for session authentication operations

use transport::TransportError;

/// Errors from credential storage and session endpoint calls.
///
/// `Clone` so that one refresh failure can be handed to every caller
/// waiting on it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("session endpoint call failed: {0}")]
    Transport(#[from] TransportError),

    #[error("invalid response from session endpoint: {0}")]
    InvalidResponse(String),

    #[error("credential parse error: {0}")]
    CredentialParse(String),

    #[error("I/O error: {0}")]
    Io(String),
}

/// Result alias for session auth operations.
pub type Result<T> = std::result::Result<T, Error>;
