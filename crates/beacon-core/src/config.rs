//! Configuration module for Beacon.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

use crate::domain::Mode;

/// Default collection endpoint
pub const DEFAULT_API_ENDPOINT: &str = "https://api.rollbar.com/api/1/item/";

/// Upper bound accepted for `pool.capacity`.
const MAX_POOL_CAPACITY: usize = 1000;

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for Beacon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Project access token sent with every report.
    pub access_token: String,
    /// Environment name, e.g. `production`.
    pub environment: String,
    /// What to do with emitted reports.
    pub mode: Mode,
    /// URL reports are posted to.
    pub api_endpoint: String,
    /// Static custom fields merged into every report.
    pub custom: Map<String, Value>,
    /// Report panics through the client.
    pub enable_crash_reports: bool,
    pub pool: PoolConfig,
    pub logging: LoggingConfig,
}

/// Connection pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum number of concurrent requests.
    pub capacity: usize,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Optional HTTP(S) proxy URL.
    pub proxy: Option<String>,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/beacon/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("beacon")
            .join("config.yaml")
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for Config {
    fn default() -> Self {
        Self {
            access_token: String::new(),
            environment: "production".to_string(),
            mode: Mode::Enabled,
            api_endpoint: DEFAULT_API_ENDPOINT.to_string(),
            custom: Map::new(),
            enable_crash_reports: false,
            pool: PoolConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            capacity: 20,
            timeout_secs: 30,
            proxy: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"pool.capacity"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- reporting ---
        if self.mode != Mode::Disabled && self.access_token.trim().is_empty() {
            errors.push(ValidationError {
                field: "access_token".into(),
                message: format!("must not be empty when mode is {}", self.mode),
            });
        }
        if self.environment.trim().is_empty() {
            errors.push(ValidationError {
                field: "environment".into(),
                message: "must not be empty".into(),
            });
        }
        if let Err(message) = check_http_url(&self.api_endpoint) {
            errors.push(ValidationError {
                field: "api_endpoint".into(),
                message,
            });
        }

        // --- pool ---
        if self.pool.capacity == 0 || self.pool.capacity > MAX_POOL_CAPACITY {
            errors.push(ValidationError {
                field: "pool.capacity".into(),
                message: format!("must be in range 1..={MAX_POOL_CAPACITY}"),
            });
        }
        if self.pool.timeout_secs == 0 {
            errors.push(ValidationError {
                field: "pool.timeout_secs".into(),
                message: "must be greater than 0".into(),
            });
        }
        if let Some(proxy) = &self.pool.proxy {
            if let Err(message) = check_http_url(proxy) {
                errors.push(ValidationError {
                    field: "pool.proxy".into(),
                    message,
                });
            }
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        errors
    }
}

fn check_http_url(raw: &str) -> Result<(), String> {
    let url = Url::parse(raw).map_err(|e| format!("invalid URL '{raw}': {e}"))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(format!("unsupported scheme '{other}'; expected http or https")),
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use beacon_core::config::ConfigBuilder;
/// use beacon_core::domain::Mode;
///
/// let config = ConfigBuilder::new()
///     .access_token("post_server_item-token")
///     .environment("staging")
///     .mode(Mode::LogOnly)
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn access_token(mut self, token: impl Into<String>) -> Self {
        self.config.access_token = token.into();
        self
    }

    pub fn environment(mut self, environment: impl Into<String>) -> Self {
        self.config.environment = environment.into();
        self
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn api_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.api_endpoint = endpoint.into();
        self
    }

    pub fn custom(mut self, custom: Map<String, Value>) -> Self {
        self.config.custom = custom;
        self
    }

    pub fn enable_crash_reports(mut self, enabled: bool) -> Self {
        self.config.enable_crash_reports = enabled;
        self
    }

    // --- pool ---

    pub fn pool_capacity(mut self, capacity: usize) -> Self {
        self.config.pool.capacity = capacity;
        self
    }

    pub fn pool_timeout_secs(mut self, seconds: u64) -> Self {
        self.config.pool.timeout_secs = seconds;
        self
    }

    pub fn pool_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.config.pool.proxy = Some(proxy.into());
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
