//! Client configuration.
//!
//! Built in code with the `with_*` setters, or read from the environment
//! (after loading a `.env` file if one is present).

use std::path::PathBuf;
use std::time::Duration;

use reqwest::Url;
use rtchat_transport::HttpConfig;

/// Backend origin used in development mode.
pub const DEVELOPMENT_API_URL: &str = "http://localhost:5001";

/// Backend origin used in production mode.
pub const PRODUCTION_API_URL: &str = "https://rtbackend-6z7a.onrender.com";

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Which backend the client talks to by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Development,
    Production,
}

impl Mode {
    #[must_use]
    pub fn default_api_url(self) -> &'static str {
        match self {
            Self::Development => DEVELOPMENT_API_URL,
            Self::Production => PRODUCTION_API_URL,
        }
    }

    #[must_use]
    pub fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }

    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "development" | "dev" => Some(Self::Development),
            "production" | "prod" => Some(Self::Production),
            _ => None,
        }
    }
}

/// Everything needed to build a [`ChatClient`](crate::ChatClient).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub mode: Mode,

    /// Origin of the REST API, without the `/api` prefix.
    pub api_url: String,

    /// Origin of the presence WebSocket. Defaults to `api_url`.
    pub live_url: Option<String>,

    /// Where the credential is persisted. `None` keeps it in memory only,
    /// so every run starts signed out.
    pub credential_path: Option<PathBuf>,

    pub request_timeout: Duration,

    /// Keep a cookie jar for the backend's session cookie.
    pub cookies: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::for_mode(Mode::default())
    }
}

impl ClientConfig {
    /// Defaults for `mode`.
    #[must_use]
    pub fn for_mode(mode: Mode) -> Self {
        Self {
            mode,
            api_url: mode.default_api_url().to_owned(),
            live_url: None,
            credential_path: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            cookies: true,
        }
    }

    #[must_use]
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    #[must_use]
    pub fn with_live_url(mut self, url: impl Into<String>) -> Self {
        self.live_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_credential_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.credential_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_cookies(mut self, enabled: bool) -> Self {
        self.cookies = enabled;
        self
    }

    /// The presence WebSocket origin actually used.
    pub fn live_url(&self) -> &str {
        self.live_url.as_deref().unwrap_or(&self.api_url)
    }

    /// Settings for the REST client.
    pub fn http_config(&self) -> HttpConfig {
        HttpConfig {
            base_url: self.api_url.clone(),
            timeout: self.request_timeout,
            cookies: self.cookies,
        }
    }

    /// Loads configuration from `RTCHAT_*` environment variables.
    ///
    /// | Variable | Meaning |
    /// |----------|---------|
    /// | `RTCHAT_MODE` | `development` (default) or `production` |
    /// | `RTCHAT_API_URL` | REST origin; defaults per mode |
    /// | `RTCHAT_LIVE_URL` | presence origin; defaults to the API URL |
    /// | `RTCHAT_CREDENTIAL_PATH` | credential file; unset keeps it in memory |
    /// | `RTCHAT_REQUEST_TIMEOUT_SECS` | per-request timeout, default 30 |
    ///
    /// # Errors
    /// Returns [`ConfigError`] if a variable is set to something unusable.
    pub fn from_env() -> Result<Self, ConfigError> {
        // A missing .env file is normal.
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through
    /// `lookup` instead of the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mode = match var("RTCHAT_MODE") {
            Some(value) => Mode::parse(&value).ok_or(ConfigError::Invalid {
                key: "RTCHAT_MODE",
                value,
                reason: "expected development or production",
            })?,
            None => Mode::default(),
        };
        let mut config = Self::for_mode(mode);

        if let Some(url) = var("RTCHAT_API_URL") {
            config.api_url = checked_url("RTCHAT_API_URL", url)?;
        }
        if let Some(url) = var("RTCHAT_LIVE_URL") {
            config.live_url = Some(checked_url("RTCHAT_LIVE_URL", url)?);
        }
        if let Some(path) = var("RTCHAT_CREDENTIAL_PATH") {
            config.credential_path = Some(PathBuf::from(path));
        }
        if let Some(secs) = var("RTCHAT_REQUEST_TIMEOUT_SECS") {
            let parsed = secs.trim().parse::<u64>().ok().filter(|s| *s > 0);
            let Some(parsed) = parsed else {
                return Err(ConfigError::Invalid {
                    key: "RTCHAT_REQUEST_TIMEOUT_SECS",
                    value: secs,
                    reason: "expected a positive number of seconds",
                });
            };
            config.request_timeout = Duration::from_secs(parsed);
        }

        tracing::debug!(
            mode = ?config.mode,
            api_url = %config.api_url,
            live_url = %config.live_url(),
            "client configuration loaded"
        );
        Ok(config)
    }
}

fn checked_url(key: &'static str, value: String) -> Result<String, ConfigError> {
    match Url::parse(value.trim()) {
        Ok(_) => Ok(value.trim().trim_end_matches('/').to_owned()),
        Err(_) => Err(ConfigError::Invalid {
            key,
            value,
            reason: "not an absolute URL",
        }),
    }
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid {key}={value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: &'static str,
    },
}
