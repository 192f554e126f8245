//! Credential storage for the session token pair
//!
//! The store is the single source of truth for the access/refresh token
//! pair. `FileCredentialStore` persists it as JSON with atomic temp-file +
//! rename writes; `MemoryCredentialStore` keeps it in process. Both honour
//! the `max_age` of `PersistOptions`: an expired record reads as absent.

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::constants::{DEFAULT_MAX_AGE_SECS, DEFAULT_SCOPE_PATH};
use crate::error::{Error, Result};

/// Access token plus the refresh token that can replace it.
///
/// Replaced wholesale on refresh, never patched field by field.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    /// Bearer token for API calls. Older backends name it `token`.
    #[serde(alias = "token")]
    pub access_token: String,
    pub refresh_token: String,
}

impl TokenPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .finish()
    }
}

/// How long and under which scope path a pair is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistOptions {
    pub max_age: Duration,
    pub path: String,
}

impl Default for PersistOptions {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(DEFAULT_MAX_AGE_SECS),
            path: DEFAULT_SCOPE_PATH.to_string(),
        }
    }
}

/// Get/replace/clear access to the current token pair.
pub trait CredentialStore: Send + Sync {
    /// The current pair, or `None` when absent or expired.
    fn get(&self) -> Pin<Box<dyn Future<Output = Option<TokenPair>> + Send + '_>>;

    /// Replace the pair atomically.
    fn set(
        &self,
        pair: TokenPair,
        options: PersistOptions,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Remove the pair.
    fn clear(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// On-disk record: the pair plus its persistence metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredCredential {
    #[serde(flatten)]
    pair: TokenPair,
    /// Expiration as unix timestamp in milliseconds
    expires_at: u64,
    path: String,
}

impl StoredCredential {
    fn is_expired(&self, now_millis: u64) -> bool {
        self.expires_at <= now_millis
    }
}

fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Absolute expiry for a record written at `now`. Saturates instead of
/// wrapping, so an oversized `max_age` means "never" rather than "already".
fn expires_at_millis(now: u64, max_age: Duration) -> u64 {
    now.saturating_add(u64::try_from(max_age.as_millis()).unwrap_or(u64::MAX))
}

/// Deadline for an in-memory record; `None` when `max_age` runs past the clock's range.
fn deadline_after(max_age: Duration) -> Option<Instant> {
    Instant::now().checked_add(max_age)
}

/// File-backed credential store.
///
/// The Mutex serializes writes; reads clone the in-memory record.
pub struct FileCredentialStore {
    path: PathBuf,
    state: Mutex<Option<StoredCredential>>,
}

impl FileCredentialStore {
    /// Load credentials from the given file path. A missing file is an empty store.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Io(format!("reading credential file: {e}")))?;
            let stored: StoredCredential = serde_json::from_str(&contents)
                .map_err(|e| Error::CredentialParse(format!("parsing credential file: {e}")))?;
            info!(path = %path.display(), "loaded stored session");
            Some(stored)
        } else {
            info!(path = %path.display(), "no stored session");
            None
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn replace(&self, pair: TokenPair, options: PersistOptions) -> Result<()> {
        let stored = StoredCredential {
            pair,
            expires_at: expires_at_millis(now_millis(), options.max_age),
            path: options.path,
        };
        let mut state = self.state.lock().await;
        write_atomic(&self.path, &stored).await?;
        *state = Some(stored);
        debug!("stored session credentials");
        Ok(())
    }

    async fn remove(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        *state = None;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                debug!(path = %self.path.display(), "removed credential file");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io(format!("removing credential file: {e}"))),
        }
    }
}

impl CredentialStore for FileCredentialStore {
    fn get(&self) -> Pin<Box<dyn Future<Output = Option<TokenPair>> + Send + '_>> {
        Box::pin(async move {
            let state = self.state.lock().await;
            state
                .as_ref()
                .filter(|stored| !stored.is_expired(now_millis()))
                .map(|stored| stored.pair.clone())
        })
    }

    fn set(
        &self,
        pair: TokenPair,
        options: PersistOptions,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(self.replace(pair, options))
    }

    fn clear(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(self.remove())
    }
}

/// Replace the credential file without ever exposing a partial record.
///
/// The record goes to a sibling temp file created owner-only (0600 on unix),
/// is synced, then renamed over the target. Writers are serialized by the
/// store's lock, so one temp name per target is enough.
async fn write_atomic(path: &Path, data: &StoredCredential) -> Result<()> {
    let json = serde_json::to_vec_pretty(data)
        .map_err(|e| Error::CredentialParse(format!("serializing credentials: {e}")))?;

    let file_name = path
        .file_name()
        .ok_or_else(|| Error::Io("credential path has no file name".into()))?;
    let mut tmp_name = std::ffi::OsString::from(".");
    tmp_name.push(file_name);
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    if let Err(e) = write_owner_only(&tmp_path, &json).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(Error::Io(format!("writing temp credential file: {e}")));
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp credential file: {e}")))?;

    debug!(path = %path.display(), "persisted credentials");
    Ok(())
}

async fn write_owner_only(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await
}

/// In-process credential store.
///
/// Expiry uses tokio's clock, so paused-time tests can step past `max_age`.
#[derive(Default)]
pub struct MemoryCredentialStore {
    state: Mutex<Option<(TokenPair, Option<Instant>)>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store already holding `pair` with default options.
    pub fn with_pair(pair: TokenPair) -> Self {
        let deadline = deadline_after(PersistOptions::default().max_age);
        Self {
            state: Mutex::new(Some((pair, deadline))),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self) -> Pin<Box<dyn Future<Output = Option<TokenPair>> + Send + '_>> {
        Box::pin(async move {
            let state = self.state.lock().await;
            state
                .as_ref()
                .filter(|(_, deadline)| deadline.is_none_or(|d| Instant::now() < d))
                .map(|(pair, _)| pair.clone())
        })
    }

    fn set(
        &self,
        pair: TokenPair,
        options: PersistOptions,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let deadline = deadline_after(options.max_age);
            *self.state.lock().await = Some((pair, deadline));
            Ok(())
        })
    }

    fn clear(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            *self.state.lock().await = None;
            Ok(())
        })
    }
}
