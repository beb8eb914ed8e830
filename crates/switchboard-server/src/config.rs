//! Server configuration.
//!
//! Configuration can be loaded from:
//! - TOML configuration file
//! - Environment variables (`SWITCHBOARD_*`, nested keys joined with `__`)
//!
//! Environment variables win over the file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use switchboard_core::HubConfig;

const CONFIG_PATHS: [&str; 3] = [
    "switchboard.toml",
    "/etc/switchboard/switchboard.toml",
    "~/.config/switchboard/switchboard.toml",
];

const ENV_PREFIX: &str = "SWITCHBOARD";

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Path prefix for every route.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Hub tuning.
    #[serde(default)]
    pub hub: HubSection,

    /// Resource limits.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Backplane selection.
    #[serde(default)]
    pub backplane: BackplaneConfig,

    /// Static group membership.
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Authentication.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Hub tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubSection {
    /// Frames buffered per connection before new ones are dropped.
    #[serde(default = "default_queue_capacity")]
    pub outbound_queue_capacity: usize,

    /// First backplane retry delay in milliseconds.
    #[serde(default = "default_retry_initial")]
    pub retry_initial_ms: u64,

    /// Longest backplane retry delay in milliseconds.
    #[serde(default = "default_retry_max")]
    pub retry_max_ms: u64,

    /// Close connections silent for this many milliseconds; 0 disables.
    #[serde(default)]
    pub read_timeout_ms: u64,

    /// Close connections that take longer than this to accept a frame.
    #[serde(default = "default_write_timeout")]
    pub write_timeout_ms: u64,
}

/// Resource limits configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum inbound message size in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

/// Which backplane to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackplaneKind {
    /// Redis pub/sub; required for more than one process.
    #[default]
    Redis,
    /// In-process bus; single process only.
    Memory,
}

/// Backplane configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackplaneConfig {
    #[serde(default)]
    pub kind: BackplaneKind,

    /// Redis URL.
    #[serde(default = "default_redis_url")]
    pub url: String,
}

/// Static resolver configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// User id → group ids.
    #[serde(default)]
    pub groups: HashMap<String, Vec<String>>,
}

/// Authentication configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Header carrying the authenticated user id.
    #[serde(default = "default_user_header")]
    pub user_header: String,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_base_url() -> String {
    "/api".to_string()
}

fn default_queue_capacity() -> usize {
    256
}

fn default_retry_initial() -> u64 {
    100
}

fn default_retry_max() -> u64 {
    5_000
}

fn default_write_timeout() -> u64 {
    10_000
}

fn default_max_message_size() -> usize {
    64 * 1024 // 64 KB
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_user_header() -> String {
    "x-user-id".to_string()
}

fn default_true() -> bool {
    true
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            base_url: default_base_url(),
            hub: HubSection::default(),
            limits: LimitsConfig::default(),
            backplane: BackplaneConfig::default(),
            resolver: ResolverConfig::default(),
            auth: AuthConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for HubSection {
    fn default() -> Self {
        Self {
            outbound_queue_capacity: default_queue_capacity(),
            retry_initial_ms: default_retry_initial(),
            retry_max_ms: default_retry_max(),
            read_timeout_ms: 0,
            write_timeout_ms: default_write_timeout(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_message_size: default_max_message_size(),
        }
    }
}

impl Default for BackplaneConfig {
    fn default() -> Self {
        Self {
            kind: BackplaneKind::default(),
            url: default_redis_url(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            user_header: default_user_header(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load configuration from the first config file found, with
    /// environment overrides on top.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed, or an
    /// override has the wrong type.
    pub fn load() -> Result<Self> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = find_config_file() {
            builder = builder.add_source(::config::File::from(path.as_path()));
        }

        builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to load configuration")?
            .try_deserialize()
            .context("Invalid configuration")
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Get the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if `host:port` is not a valid socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid bind address {}:{}", self.host, self.port))
    }

    /// Route for `path` under the base URL.
    #[must_use]
    pub fn route(&self, path: &str) -> String {
        let base = self.base_url.trim_matches('/');
        if base.is_empty() {
            path.to_string()
        } else {
            format!("/{base}{path}")
        }
    }

    /// Map the `[hub]` section onto the core's config.
    #[must_use]
    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            outbound_queue_capacity: self.hub.outbound_queue_capacity.max(1),
            retry_initial: Duration::from_millis(self.hub.retry_initial_ms),
            retry_max: Duration::from_millis(self.hub.retry_max_ms),
            read_timeout: (self.hub.read_timeout_ms > 0)
                .then(|| Duration::from_millis(self.hub.read_timeout_ms)),
            write_timeout: Duration::from_millis(self.hub.write_timeout_ms),
        }
    }
}

fn find_config_file() -> Option<PathBuf> {
    CONFIG_PATHS.iter().find_map(|path| {
        let expanded = PathBuf::from(shellexpand::tilde(path).as_ref());
        expanded.exists().then_some(expanded)
    })
}
