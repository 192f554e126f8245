//! Session API endpoints and credential defaults

/// Exchanges a refresh token for a new token pair.
pub const REFRESH_PATH: &str = "/refresh";

/// Email/password sign-in.
pub const SESSIONS_PATH: &str = "/sessions";

/// Returns the authenticated user; used for the startup validation check.
pub const WHOAMI_PATH: &str = "/me";

/// Credentials persist for 30 days unless cleared.
pub const DEFAULT_MAX_AGE_SECS: u64 = 60 * 60 * 24 * 30;

/// Longest persistence a caller may configure (400 days).
pub const MAX_AGE_LIMIT_SECS: u64 = 60 * 60 * 24 * 400;

/// Scope path stored with the credentials.
pub const DEFAULT_SCOPE_PATH: &str = "/";

/// Where a forced sign-out sends the user.
pub const DEFAULT_ENTRY_POINT: &str = "/";
