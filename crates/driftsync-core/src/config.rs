//! Configuration module for driftsync.
//!
//! Typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder for programmatic use.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for driftsync.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sync: SyncConfig,
    pub api: ApiConfig,
    pub logging: LoggingConfig,
}

/// Synchronization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Local directory mirrored to the remote root.
    pub root: PathBuf,
    /// State directory (node database, last cursor, temp files).
    pub instance_dir: PathBuf,
    /// Seconds between passes in periodic mode.
    pub poll_interval: u64,
    /// Concurrent uploads/downloads.
    pub max_concurrent_connections: u32,
    /// Concurrent metadata actions (create, rename/move, remove).
    pub action_concurrency: u32,
    /// Name embedded in local conflict copies.
    pub username: String,
    /// Hash every file during the local scan instead of trusting mtime+size.
    pub always_hash: bool,
}

/// Remote service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the REST API.
    pub url: String,
    /// Bearer token; takes precedence over username/password.
    pub access_token: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Nodes requested per delta page.
    pub delta_page_size: u32,
    /// Size of each upload chunk (in MiB).
    pub chunk_size_mb: u64,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Output format: `text` or `json`.
    pub format: String,
}

/// How the local scan decides that file content changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentCheck {
    /// Unchanged mtime and size mean unchanged content; hash only otherwise
    Fast,
    /// Compare hashes whenever a stored hash exists
    Always,
}

// ---------------------------------------------------------------------------
// Loading
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
    /// Typically `$XDG_CONFIG_HOME/driftsync/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("driftsync")
            .join("config.yaml")
    }
}

impl SyncConfig {
    pub fn content_check(&self) -> ContentCheck {
        if self.always_hash {
            ContentCheck::Always
        } else {
            ContentCheck::Fast
        }
    }
}

impl ApiConfig {
    pub fn chunk_size_bytes(&self) -> usize {
        (self.chunk_size_mb as usize) * 1024 * 1024
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            root: dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("~"))
                .join("Driftsync"),
            instance_dir: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("~/.local/share"))
                .join("driftsync"),
            poll_interval: 60,
            max_concurrent_connections: 3,
            action_concurrency: 1,
            username: whoami_fallback(),
            always_hash: false,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            url: "https://localhost/api/v1".to_string(),
            access_token: None,
            username: None,
            password: None,
            delta_page_size: 500,
            chunk_size_mb: 4,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

fn whoami_fallback() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "user".to_string())
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"sync.poll_interval"`.
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

/// Valid values for `logging.format`.
const VALID_LOG_FORMATS: &[&str] = &["text", "json"];

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let mut push = |field: &str, message: String| {
            errors.push(ValidationError {
                field: field.into(),
                message,
            });
        };

        // --- sync ---
        if self.sync.root.as_os_str().is_empty() {
            push("sync.root", "must not be empty".into());
        } else if !self.sync.root.is_absolute() {
            push(
                "sync.root",
                format!("must be an absolute path: {}", self.sync.root.display()),
            );
        }
        if self.sync.instance_dir.as_os_str().is_empty() {
            push("sync.instance_dir", "must not be empty".into());
        }
        if self.sync.poll_interval == 0 {
            push("sync.poll_interval", "must be greater than 0".into());
        }
        if self.sync.max_concurrent_connections == 0 {
            push("sync.max_concurrent_connections", "must be greater than 0".into());
        }
        if self.sync.action_concurrency == 0 {
            push("sync.action_concurrency", "must be greater than 0".into());
        }
        if self.sync.username.trim().is_empty() {
            push("sync.username", "must not be empty".into());
        }

        // --- api ---
        if self.api.url.trim().is_empty() {
            push("api.url", "must not be empty".into());
        }
        let has_token = self.api.access_token.as_deref().is_some_and(|t| !t.is_empty());
        let has_basic = self.api.username.as_deref().is_some_and(|u| !u.is_empty())
            && self.api.password.is_some();
        if !has_token && !has_basic {
            push(
                "api.access_token",
                "either access_token or username/password is required".into(),
            );
        }
        if self.api.delta_page_size == 0 {
            push("api.delta_page_size", "must be greater than 0".into());
        }
        if self.api.chunk_size_mb == 0 {
            push("api.chunk_size_mb", "must be greater than 0".into());
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            push(
                "logging.level",
                format!(
                    "invalid level '{}', expected one of: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            );
        }
        if !VALID_LOG_FORMATS.contains(&self.logging.format.as_str()) {
            push(
                "logging.format",
                format!(
                    "invalid format '{}', expected one of: {}",
                    self.logging.format,
                    VALID_LOG_FORMATS.join(", ")
                ),
            );
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// ```
/// use driftsync_core::config::ConfigBuilder;
///
/// let config = ConfigBuilder::new()
///     .sync_root("/tmp/sync".into())
///     .access_token("secret")
///     .build();
/// assert_eq!(config.api.access_token.as_deref(), Some("secret"));
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Start from [`Config::default`].
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- sync ---

    pub fn sync_root(mut self, root: PathBuf) -> Self {
        self.config.sync.root = root;
        self
    }

    pub fn instance_dir(mut self, dir: PathBuf) -> Self {
        self.config.sync.instance_dir = dir;
        self
    }

    pub fn poll_interval(mut self, seconds: u64) -> Self {
        self.config.sync.poll_interval = seconds;
        self
    }

    pub fn max_concurrent_connections(mut self, n: u32) -> Self {
        self.config.sync.max_concurrent_connections = n;
        self
    }

    pub fn action_concurrency(mut self, n: u32) -> Self {
        self.config.sync.action_concurrency = n;
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.config.sync.username = username.into();
        self
    }

    pub fn always_hash(mut self, always: bool) -> Self {
        self.config.sync.always_hash = always;
        self
    }

    // --- api ---

    pub fn api_url(mut self, url: impl Into<String>) -> Self {
        self.config.api.url = url.into();
        self
    }

    pub fn access_token(mut self, token: impl Into<String>) -> Self {
        self.config.api.access_token = Some(token.into());
        self
    }

    pub fn chunk_size_mb(mut self, mb: u64) -> Self {
        self.config.api.chunk_size_mb = mb;
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
