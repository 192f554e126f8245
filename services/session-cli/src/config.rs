//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The login password is loaded from SESSION_PASSWORD or password_file,
//! never stored in the TOML directly.

use std::path::{Path, PathBuf};
use std::time::Duration;

use auth_client::RefreshOptions;
use common::Secret;
use serde::Deserialize;
use session_auth::{
    DEFAULT_ENTRY_POINT, DEFAULT_MAX_AGE_SECS, DEFAULT_SCOPE_PATH, MAX_AGE_LIMIT_SECS,
    PersistOptions,
};

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub headers: Vec<HeaderInjection>,
}

/// Backend API settings
#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// Session storage and refresh settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub credentials_path: PathBuf,
    /// 0 disables the refresh timeout.
    pub refresh_timeout_secs: u64,
    pub max_age_secs: u64,
    pub cookie_path: String,
    /// Where a signed-out user is sent.
    pub entry_point: String,
    /// Path to a file holding the login password (alternative to SESSION_PASSWORD)
    pub password_file: Option<PathBuf>,
    #[serde(skip)]
    pub password: Option<Secret<String>>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            credentials_path: PathBuf::from(".session.json"),
            refresh_timeout_secs: 30,
            max_age_secs: DEFAULT_MAX_AGE_SECS,
            cookie_path: DEFAULT_SCOPE_PATH.to_string(),
            entry_point: DEFAULT_ENTRY_POINT.to_string(),
            password_file: None,
            password: None,
        }
    }
}

/// Static header added to every API request
#[derive(Debug, Clone, Deserialize)]
pub struct HeaderInjection {
    pub name: String,
    pub value: String,
}

impl From<HeaderInjection> for transport::HeaderInjection {
    fn from(h: HeaderInjection) -> Self {
        transport::HeaderInjection {
            name: h.name,
            value: h.value,
        }
    }
}

fn default_timeout() -> u64 {
    30
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Password resolution order:
    /// 1. SESSION_PASSWORD env var
    /// 2. password_file path from config
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if let Ok(url) = std::env::var("SESSION_API_URL") {
            config.api.base_url = url;
        }

        if !config.api.base_url.starts_with("http://") && !config.api.base_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "base_url must start with http:// or https://, got: {}",
                config.api.base_url
            )));
        }

        if config.api.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        if config.session.max_age_secs == 0 {
            return Err(common::Error::Config(
                "max_age_secs must be greater than 0".into(),
            ));
        }

        if config.session.max_age_secs > MAX_AGE_LIMIT_SECS {
            return Err(common::Error::Config(format!(
                "max_age_secs must be at most {MAX_AGE_LIMIT_SECS}, got: {}",
                config.session.max_age_secs
            )));
        }

        if let Ok(password) = std::env::var("SESSION_PASSWORD") {
            config.session.password = Some(Secret::new(password));
        } else if let Some(ref password_file) = config.session.password_file {
            let password = std::fs::read_to_string(password_file).map_err(|e| {
                common::Error::Config(format!(
                    "failed to read password_file {}: {e}",
                    password_file.display()
                ))
            })?;
            let password = password.trim_end_matches(['\r', '\n']).to_owned();
            if !password.is_empty() {
                config.session.password = Some(Secret::new(password));
            }
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("session-cli.toml")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs)
    }

    pub fn refresh_options(&self) -> RefreshOptions {
        RefreshOptions {
            timeout: match self.session.refresh_timeout_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            persist: PersistOptions {
                max_age: Duration::from_secs(self.session.max_age_secs),
                path: self.session.cookie_path.clone(),
            },
        }
    }

    pub fn transport_headers(&self) -> Vec<transport::HeaderInjection> {
        self.headers.iter().cloned().map(Into::into).collect()
    }
}
