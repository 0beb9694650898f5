//! Client configuration
//!
//! Values are layered: built-in defaults, then an optional config file, then
//! `SMS_`-prefixed environment variables (`SMS_API__BASE_URL`,
//! `SMS_SESSION__POLL_INTERVAL_SECS`, ...). The legacy `NEXT_PUBLIC_API_URL`
//! variable is honoured as the default backend URL.

use crate::{CoreError, CoreResult, ExecutionContext};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Backend URL used when nothing else is configured
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api/v1";

/// Legacy environment variable carrying the backend URL
pub const LEGACY_BASE_URL_VAR: &str = "NEXT_PUBLIC_API_URL";

/// Main client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Backend API configuration
    pub api: ApiConfig,

    /// Session polling configuration
    pub session: SessionConfig,

    /// Route used when a request comes back unauthenticated
    pub login_route: String,

    /// Whether this process owns client storage
    pub context: ExecutionContext,

    /// Directory for persisted tokens and logs
    pub data_dir: PathBuf,
}

/// Backend API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL every request path is appended to
    pub base_url: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// User agent sent with every request
    pub user_agent: String,
}

/// Session validation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Seconds between health and session probes while a page is mounted
    pub poll_interval_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            session: SessionConfig::default(),
            login_route: "/login".to_string(),
            context: ExecutionContext::Client,
            data_dir: default_data_dir(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 30,
            user_agent: concat!("sms-client/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 60,
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl SessionConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

fn default_data_dir() -> PathBuf {
    std::env::var("SMS_STATE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("sms")
        })
}

impl ClientConfig {
    /// Load configuration from defaults, an optional file and the process environment
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or a value fails validation
    pub fn load(path: Option<&Path>) -> CoreResult<Self> {
        let legacy_url = std::env::var(LEGACY_BASE_URL_VAR).ok();
        Self::load_with_env(path, legacy_url, None)
    }

    /// Load configuration with an explicit environment.
    ///
    /// `env` replaces the process environment for the `SMS_` source when given.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or a value fails validation
    pub fn load_with_env(
        path: Option<&Path>,
        legacy_base_url: Option<String>,
        env: Option<HashMap<String, String>>,
    ) -> CoreResult<Self> {
        let defaults = Self::default();
        let base_url = legacy_base_url
            .filter(|url| !url.is_empty())
            .unwrap_or(defaults.api.base_url);

        let mut builder = config::Config::builder()
            .set_default("api.base_url", base_url)?
            .set_default("api.timeout_secs", defaults.api.timeout_secs)?
            .set_default("api.user_agent", defaults.api.user_agent)?
            .set_default(
                "session.poll_interval_secs",
                defaults.session.poll_interval_secs,
            )?
            .set_default("login_route", defaults.login_route)?
            .set_default("context", "client")?
            .set_default("data_dir", defaults.data_dir.to_string_lossy().to_string())?;

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix("SMS")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants that serde cannot express
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid value
    pub fn validate(&self) -> CoreResult<()> {
        let url = url::Url::parse(&self.api.base_url).map_err(|e| {
            CoreError::invalid_config(format!("api.base_url '{}': {e}", self.api.base_url))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(CoreError::invalid_config(format!(
                "api.base_url must be http or https, got '{}'",
                url.scheme()
            )));
        }
        if self.api.timeout_secs == 0 {
            return Err(CoreError::invalid_config("api.timeout_secs must be positive"));
        }
        if self.session.poll_interval_secs == 0 {
            return Err(CoreError::invalid_config(
                "session.poll_interval_secs must be positive",
            ));
        }
        if !self.login_route.starts_with('/') {
            return Err(CoreError::invalid_config("login_route must be an absolute path"));
        }
        Ok(())
    }
}
