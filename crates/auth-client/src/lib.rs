//! Authenticated API client with single-flight session refresh
//!
//! `AuthenticatedClient` attaches the current access token to every request.
//! When the backend answers `401 token.expired`, the request goes through the
//! `RefreshCoordinator`. It issues at most one refresh call at a time, queues
//! other expired requests behind it, and replays each of them exactly once
//! with the new token. A failed refresh, or any other 401, ends the session
//! through the `SessionTerminator`.

pub mod authorization;
pub mod classify;
pub mod client;
pub mod coordinator;
pub mod error;
pub mod metrics;

#[cfg(test)]
mod test_support;

pub use authorization::DefaultAuthorization;
pub use classify::{FailureKind, TOKEN_EXPIRED_CODE, classify};
pub use client::AuthenticatedClient;
pub use coordinator::{RefreshCoordinator, RefreshOptions};
pub use error::{Error, RefreshError, Result};
