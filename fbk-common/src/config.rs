//! Bootstrap configuration loading and resolution
//!
//! Configuration file resolution priority:
//! 1. Command-line argument (highest priority)
//! 2. `FBK_CONFIG` environment variable
//! 3. Platform config directory (`<config_dir>/fbk/config.toml`)
//! 4. Built-in defaults (fallback)
//!
//! A missing file at the platform location is not an error: a warning is
//! logged and built-in defaults are used. A file named explicitly (argument
//! or environment) must exist.
//!
//! After the file is loaded, `FBK_BACKEND_URL`, `FBK_API_KEY` and
//! `FBK_USER_ID` override the corresponding fields.

use crate::model::UserId;
use crate::time::millis_to_duration;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "FBK_CONFIG";
/// Environment override for `backend.base_url`
pub const BACKEND_URL_ENV_VAR: &str = "FBK_BACKEND_URL";
/// Environment override for `backend.api_key`
pub const API_KEY_ENV_VAR: &str = "FBK_API_KEY";
/// Environment override for `session.user_id`
pub const USER_ID_ENV_VAR: &str = "FBK_USER_ID";

/// Complete client configuration
///
/// Every section and field has a built-in default, so an empty file is valid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub backend: BackendConfig,
    pub session: SessionConfig,
    pub enrichment: EnrichmentConfig,
    pub resync: ResyncConfig,
    pub invalidation: InvalidationConfig,
    pub logging: LoggingConfig,
}

/// Remote store connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the backend (REST rows under `/rest/v1`)
    pub base_url: String,
    /// API key sent as `apikey` and bearer token
    pub api_key: Option<String>,
    /// Table holding feedback records
    pub table: String,
    /// Path of the SSE change feed, relative to `base_url`
    pub changes_path: String,
    /// Per-request timeout for REST calls
    pub request_timeout_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:54321".to_string(),
            api_key: None,
            table: "feedback".to_string(),
            changes_path: "realtime/v1/feedback/changes".to_string(),
            request_timeout_ms: 10_000,
        }
    }
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Duration {
        millis_to_duration(self.request_timeout_ms)
    }
}

/// Session collaborator settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Signed-in user; None means no session
    pub user_id: Option<UserId>,
}

/// Enrichment polling window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    /// Fetch attempts before falling back to a full resync
    pub max_attempts: u32,
    /// Delay between attempts
    pub poll_interval_ms: u64,
    /// Upper bound on a single fetch
    pub fetch_timeout_ms: u64,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            poll_interval_ms: 500,
            fetch_timeout_ms: 2_000,
        }
    }
}

impl EnrichmentConfig {
    pub fn poll_interval(&self) -> Duration {
        millis_to_duration(self.poll_interval_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        millis_to_duration(self.fetch_timeout_ms)
    }
}

/// Full-collection refetch retry settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResyncConfig {
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for ResyncConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay_ms: 500,
        }
    }
}

impl ResyncConfig {
    pub fn retry_delay(&self) -> Duration {
        millis_to_duration(self.retry_delay_ms)
    }
}

/// Change feed reconnect settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvalidationConfig {
    /// First reconnect delay; doubles per failed attempt
    pub reconnect_initial_ms: u64,
    /// Cap on the reconnect delay
    pub reconnect_max_ms: u64,
    /// Buffer size of in-process change channels
    pub channel_capacity: usize,
}

impl Default for InvalidationConfig {
    fn default() -> Self {
        Self {
            reconnect_initial_ms: 500,
            reconnect_max_ms: 30_000,
            channel_capacity: 64,
        }
    }
}

impl InvalidationConfig {
    pub fn reconnect_initial(&self) -> Duration {
        millis_to_duration(self.reconnect_initial_ms)
    }

    pub fn reconnect_max(&self) -> Duration {
        millis_to_duration(self.reconnect_max_ms)
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl ClientConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))
    }

    /// Load configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Apply `FBK_BACKEND_URL`, `FBK_API_KEY` and `FBK_USER_ID` overrides
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var(BACKEND_URL_ENV_VAR) {
            self.backend.base_url = url;
        }
        if let Ok(key) = std::env::var(API_KEY_ENV_VAR) {
            self.backend.api_key = Some(key);
        }
        if let Ok(user) = std::env::var(USER_ID_ENV_VAR) {
            let user_id = user
                .parse::<UserId>()
                .map_err(|e| Error::Config(format!("{}: {}", USER_ID_ENV_VAR, e)))?;
            self.session.user_id = Some(user_id);
        }
        Ok(())
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<()> {
        let url = reqwest::Url::parse(&self.backend.base_url).map_err(|e| {
            Error::Config(format!("backend.base_url `{}`: {}", self.backend.base_url, e))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "backend.base_url must use http or https, got `{}`",
                url.scheme()
            )));
        }
        if self.backend.table.trim().is_empty() {
            return Err(Error::Config("backend.table cannot be empty".to_string()));
        }
        if self.enrichment.max_attempts == 0 {
            return Err(Error::Config("enrichment.max_attempts must be at least 1".to_string()));
        }
        if self.resync.max_attempts == 0 {
            return Err(Error::Config("resync.max_attempts must be at least 1".to_string()));
        }
        if self.invalidation.reconnect_initial_ms > self.invalidation.reconnect_max_ms {
            return Err(Error::Config(
                "invalidation.reconnect_initial_ms exceeds reconnect_max_ms".to_string(),
            ));
        }
        if self.invalidation.channel_capacity == 0 {
            return Err(Error::Config(
                "invalidation.channel_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Resolves which config file to load and produces a validated config
#[derive(Debug, Clone, Default)]
pub struct ConfigResolver {
    cli_path: Option<PathBuf>,
}

impl ConfigResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Config path given on the command line
    pub fn with_cli_path(mut self, path: Option<PathBuf>) -> Self {
        self.cli_path = path;
        self
    }

    /// Config file to read, and whether it was named explicitly
    pub fn config_path(&self) -> Option<(PathBuf, bool)> {
        // Priority 1: Command-line argument
        if let Some(path) = &self.cli_path {
            return Some((path.clone(), true));
        }

        // Priority 2: Environment variable
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if !path.trim().is_empty() {
                return Some((PathBuf::from(path), true));
            }
        }

        // Priority 3: Platform config directory
        default_config_path().map(|path| (path, false))
    }

    /// Load, apply environment overrides and validate
    pub fn resolve(&self) -> Result<ClientConfig> {
        let mut config = match self.config_path() {
            Some((path, _)) if path.exists() => {
                info!("Loading configuration from {}", path.display());
                ClientConfig::load_from_file(&path)?
            }
            Some((path, true)) => {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            Some((path, false)) => {
                warn!(
                    "No config file at {}, using built-in defaults",
                    path.display()
                );
                ClientConfig::default()
            }
            None => {
                warn!("Could not determine config directory, using built-in defaults");
                ClientConfig::default()
            }
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }
}

/// Platform config file location (`<config_dir>/fbk/config.toml`)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("fbk").join("config.toml"))
}
