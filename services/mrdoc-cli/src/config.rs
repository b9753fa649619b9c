//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! Tokens never live in the TOML; they are kept in the credentials file
//! written by `mrdoc login`.

use serde::Deserialize;
use session_client::{DEFAULT_MAX_WAITERS, RefreshSettings};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default config file looked up in the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "mrdoc.toml";

/// Root configuration
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

/// MrDoc server settings
#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// Session settings
#[derive(Debug, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_credentials_path")]
    pub credentials_path: PathBuf,
    #[serde(default = "default_timeout")]
    pub refresh_timeout_secs: u64,
    #[serde(default = "default_max_waiters")]
    pub max_waiters: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            credentials_path: default_credentials_path(),
            refresh_timeout_secs: default_timeout(),
            max_waiters: default_max_waiters(),
        }
    }
}

fn default_base_url() -> String {
    session_auth::DEFAULT_API_BASE.to_string()
}

fn default_timeout() -> u64 {
    15
}

fn default_credentials_path() -> PathBuf {
    PathBuf::from("mrdoc-tokens.json")
}

fn default_max_waiters() -> usize {
    DEFAULT_MAX_WAITERS
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.finish()
    }

    /// Like `load`, but a missing file yields the defaults. Used when the
    /// path was not given explicitly.
    pub fn load_or_default(path: &Path) -> common::Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Config::default().finish()
        }
    }

    /// Apply `MRDOC_API_BASE` and validate.
    fn finish(mut self) -> common::Result<Self> {
        if let Ok(base) = std::env::var("MRDOC_API_BASE") {
            self.api.base_url = base;
        }

        if !self.api.base_url.starts_with("http://") && !self.api.base_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "api.base_url must start with http:// or https://, got: {}",
                self.api.base_url
            )));
        }

        if self.api.timeout_secs == 0 {
            return Err(common::Error::Config(
                "api.timeout_secs must be greater than 0".into(),
            ));
        }

        if self.auth.refresh_timeout_secs == 0 {
            return Err(common::Error::Config(
                "auth.refresh_timeout_secs must be greater than 0".into(),
            ));
        }

        if self.auth.max_waiters == 0 {
            return Err(common::Error::Config(
                "auth.max_waiters must be greater than 0".into(),
            ));
        }

        Ok(self)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs)
    }

    pub fn refresh_settings(&self) -> RefreshSettings {
        RefreshSettings {
            timeout: Duration::from_secs(self.auth.refresh_timeout_secs),
            max_waiters: self.auth.max_waiters,
        }
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    ///
    /// The flag is true when the path was chosen explicitly, in which case
    /// the file must exist.
    pub fn resolve_path(cli_path: Option<&str>) -> (PathBuf, bool) {
        if let Some(p) = cli_path {
            return (PathBuf::from(p), true);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return (PathBuf::from(p), true);
        }
        (PathBuf::from(DEFAULT_CONFIG_PATH), false)
    }
}
