//! Configuration management for Plume.
//!
//! Parses `plume.toml` files with serde. Two sections are understood:
//!
//! - `[plantuml]`: how to reach the rendering service
//! - `[cache]`: where rendered diagrams are kept between builds
//!
//! ```toml
//! [plantuml]
//! url = "https://www.plantuml.com/plantuml"
//! timeout = 60
//!
//! [cache]
//! backend = "local"
//!
//! [cache.local]
//! path = "~/.cache/plume/"
//! ```
//!
//! The cache path supports `~` and `$VAR` / `${VAR:-default}` expansion.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// Default per-request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Default number of diagrams requested in parallel.
const DEFAULT_MAX_CONCURRENCY: usize = 16;

/// Application configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Rendering service configuration.
    ///
    /// Required for rendering; use [`Config::require_plantuml`] to access it.
    pub plantuml: Option<PlantUmlConfig>,
    /// Cache configuration.
    pub cache: CacheConfig,
}

/// Rendering service configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PlantUmlConfig {
    /// Base URL of the `PlantUML` server (e.g., `https://www.plantuml.com/plantuml`).
    pub url: String,
    /// Whether TLS certificates of the server are verified.
    #[serde(default = "default_verify_ssl")]
    pub verify_ssl: bool,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// Output format path segment (`svg`, `dsvg`, ...).
    #[serde(default = "default_output_format")]
    pub output_format: String,
    /// Maximum number of requests in flight for one batch.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

impl PlantUmlConfig {
    /// Create a configuration for `url` with default settings.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            verify_ssl: default_verify_ssl(),
            timeout: default_timeout(),
            output_format: default_output_format(),
            max_concurrency: default_max_concurrency(),
        }
    }

    /// Set the per-request timeout.
    ///
    /// The timeout is kept in whole seconds like the config file, so partial
    /// seconds round up and the result is never below one second.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        let partial = u64::from(timeout.subsec_nanos() > 0);
        self.timeout = (timeout.as_secs() + partial).max(1);
        self
    }

    /// Set the output format.
    #[must_use]
    pub fn with_output_format(mut self, format: impl Into<String>) -> Self {
        self.output_format = format.into();
        self
    }

    /// Set the maximum number of parallel requests.
    #[must_use]
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    /// Enable or disable TLS certificate verification.
    #[must_use]
    pub fn with_verify_ssl(mut self, verify_ssl: bool) -> Self {
        self.verify_ssl = verify_ssl;
        self
    }

    /// Per-request timeout as a [`Duration`].
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// Validate that all fields are usable.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if the URL is empty or not http(s),
    /// the output format is empty, or timeout / concurrency are zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_non_empty(&self.url, "plantuml.url")?;
        require_http_url(&self.url, "plantuml.url")?;
        require_non_empty(&self.output_format, "plantuml.output_format")?;
        if self.output_format.contains('/') {
            return Err(ConfigError::Validation(
                "plantuml.output_format cannot contain '/'".to_owned(),
            ));
        }
        if self.timeout == 0 {
            return Err(ConfigError::Validation(
                "plantuml.timeout must be greater than 0".to_owned(),
            ));
        }
        if self.max_concurrency == 0 {
            return Err(ConfigError::Validation(
                "plantuml.max_concurrency must be greater than 0".to_owned(),
            ));
        }
        Ok(())
    }
}

fn default_verify_ssl() -> bool {
    true
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_output_format() -> String {
    "svg".to_owned()
}

fn default_max_concurrency() -> usize {
    DEFAULT_MAX_CONCURRENCY
}

/// Cache backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    /// Keep diagrams in memory for a single build.
    Disabled,
    /// Persist diagrams to a local file between builds.
    #[default]
    Local,
}

/// Cache configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Which store implementation to use.
    pub backend: CacheBackend,
    /// Settings for the `local` backend.
    pub local: LocalCacheConfig,
}

impl CacheConfig {
    /// Configuration for an in-memory store.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            backend: CacheBackend::Disabled,
            local: LocalCacheConfig::default(),
        }
    }

    /// Configuration for a file store rooted at `path` without project namespacing.
    #[must_use]
    pub fn local(path: impl Into<String>) -> Self {
        Self {
            backend: CacheBackend::Local,
            local: LocalCacheConfig {
                path: path.into(),
                join_project_name: false,
                ..LocalCacheConfig::default()
            },
        }
    }
}

/// Settings for the file-backed cache.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LocalCacheConfig {
    /// Cache root directory. Supports `~` and environment variables.
    pub path: String,
    /// Append the current working directory name to `path`.
    ///
    /// Lets a single cache root serve several projects.
    pub join_project_name: bool,
    /// Name of the storage file inside the cache directory.
    pub filename: String,
}

impl Default for LocalCacheConfig {
    fn default() -> Self {
        Self {
            path: "~/.cache/plume/".to_owned(),
            join_project_name: true,
            filename: "storage.mpack".to_owned(),
        }
    }
}

impl LocalCacheConfig {
    /// Resolve the cache directory.
    ///
    /// Expands `~` and environment variables in `path`, then appends the
    /// current directory name when `join_project_name` is set.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::EnvVar` if a referenced variable is unset, or
    /// `ConfigError::Io` if the current directory cannot be determined.
    pub fn resolved_dir(&self) -> Result<PathBuf, ConfigError> {
        let expanded = shellexpand::full(&self.path).map_err(|e| ConfigError::EnvVar {
            field: "cache.local.path".to_owned(),
            message: e.to_string(),
        })?;
        let mut dir = PathBuf::from(expanded.as_ref());

        if self.join_project_name {
            let cwd = std::env::current_dir()?;
            if let Some(name) = cwd.file_name() {
                dir.push(name);
            }
        }

        Ok(dir)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        require_non_empty(&self.path, "cache.local.path")?;
        require_non_empty(&self.filename, "cache.local.filename")?;
        Ok(())
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during path expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`cache.local.path`").
        field: String,
        /// Error message.
        message: String,
    },
}

/// Require a string field to be non-empty.
fn require_non_empty(value: &str, field: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

/// Require a URL field to use http:// or https:// scheme.
fn require_http_url(url: &str, field: &str) -> Result<(), ConfigError> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ConfigError::Validation(format!(
            "{field} must start with http:// or https://"
        )));
    }
    Ok(())
}

impl Config {
    /// Load and validate configuration from a file.
    ///
    /// # Errors
    ///
    /// Returns error if the file doesn't exist, can't be parsed, or fails validation.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns error if parsing or validation fails.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(plantuml) = &self.plantuml {
            plantuml.validate()?;
        }
        if self.cache.backend == CacheBackend::Local {
            self.cache.local.validate()?;
        }
        Ok(())
    }

    /// Get the rendering service configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if the `[plantuml]` section is missing.
    pub fn require_plantuml(&self) -> Result<&PlantUmlConfig, ConfigError> {
        self.plantuml.as_ref().ok_or_else(|| {
            ConfigError::Validation("[plantuml] section required in config".to_owned())
        })
    }
}
