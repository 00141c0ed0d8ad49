//! Configuration management for cgm-relay
//!
//! This module handles loading, parsing, and validating application configuration
//! from YAML files and environment variables. Each connector gets its own
//! [`ConnectorConfig`], which can be replaced at runtime through the scheduler
//! handle (hot reload) without restarting the process.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Connector configurations, keyed by connector name
    #[serde(default)]
    pub connectors: HashMap<String, ConnectorConfig>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileRead(format!("Failed to read config file: {}", e)))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        // First, expand environment variables in the YAML string
        let expanded = expand_env_vars(yaml);
        serde_yaml::from_str(&expanded)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse YAML: {}", e)))
    }

    /// Load configuration from environment variables with prefix CGM_RELAY_
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Ok(level) = std::env::var("CGM_RELAY_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(format) = std::env::var("CGM_RELAY_LOG_FORMAT") {
            config.logging.format = format;
        }

        Ok(config)
    }
}

/// Per-connector configuration
///
/// The `enabled` flag is the only field the scheduler reads on every cycle;
/// everything else is sampled when computing the next delay. The whole object
/// may be replaced at runtime via
/// [`SchedulerHandle::on_configuration_changed`](crate::sync::SchedulerHandle::on_configuration_changed).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectorConfig {
    /// Whether this connector is enabled; a disabled connector parks in standby
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Polling interval while the connection is healthy (seconds)
    #[serde(default = "default_normal_polling_interval")]
    pub normal_polling_interval_secs: u64,

    /// Fast polling interval after a failure (seconds)
    #[serde(default = "default_disconnected_polling_interval")]
    pub disconnected_polling_interval_secs: u64,

    /// Number of fast-poll cycles before escalating to exponential backoff
    #[serde(default = "default_max_fast_poll_attempts")]
    pub max_fast_poll_attempts: u32,

    /// Ceiling for the escalated backoff interval (seconds)
    #[serde(default = "default_max_backoff_interval")]
    pub max_backoff_interval_secs: u64,

    /// How often to re-check the enabled flag while in standby (seconds)
    #[serde(default = "default_standby_check_interval")]
    pub standby_check_interval_secs: u64,

    /// Retry configuration for calls made inside one sync attempt
    #[serde(default)]
    pub retry: RetryConfig,

    /// Backoff configuration for reusable backoff primitives
    #[serde(default)]
    pub backoff: BackoffConfig,

    /// Connector-specific options (vendor credentials path, endpoints, ...)
    #[serde(default)]
    pub options: HashMap<String, String>,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            normal_polling_interval_secs: default_normal_polling_interval(),
            disconnected_polling_interval_secs: default_disconnected_polling_interval(),
            max_fast_poll_attempts: default_max_fast_poll_attempts(),
            max_backoff_interval_secs: default_max_backoff_interval(),
            standby_check_interval_secs: default_standby_check_interval(),
            retry: RetryConfig::default(),
            backoff: BackoffConfig::default(),
            options: HashMap::new(),
        }
    }
}

impl ConnectorConfig {
    /// Polling interval while healthy
    pub fn normal_polling_interval(&self) -> Duration {
        Duration::from_secs(self.normal_polling_interval_secs)
    }

    /// Fast polling interval after a failure
    pub fn disconnected_polling_interval(&self) -> Duration {
        Duration::from_secs(self.disconnected_polling_interval_secs)
    }

    /// Ceiling for the escalated backoff interval
    pub fn max_backoff_interval(&self) -> Duration {
        Duration::from_secs(self.max_backoff_interval_secs)
    }

    /// Standby re-check interval
    pub fn standby_check_interval(&self) -> Duration {
        Duration::from_secs(self.standby_check_interval_secs)
    }
}

fn default_enabled() -> bool {
    true
}

fn default_normal_polling_interval() -> u64 {
    300 // 5 minutes
}

fn default_disconnected_polling_interval() -> u64 {
    10
}

fn default_max_fast_poll_attempts() -> u32 {
    30
}

fn default_max_backoff_interval() -> u64 {
    300 // 5 minutes
}

fn default_standby_check_interval() -> u64 {
    30
}

/// Retry configuration for transient failures inside one sync attempt
///
/// Consumed by [`RetryExecutor`](crate::sync::RetryExecutor). Note the
/// distinction from [`BackoffConfig`]: this curve is plain exponential with
/// no jitter and a per-call attempt budget.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay between attempts in milliseconds
    #[serde(default = "default_retry_base_delay")]
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_retry_base_delay(),
        }
    }
}

impl RetryConfig {
    /// Base delay between attempts
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_base_delay() -> u64 {
    2000 // 2 seconds
}

/// Backoff configuration for [`BackoffCalculator`](crate::sync::BackoffCalculator)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackoffConfig {
    /// Base interval in milliseconds
    #[serde(default = "default_base_interval")]
    pub base_interval_ms: u64,

    /// Attempt count at which the delay pins to the ceiling
    #[serde(default = "default_backoff_max_retries")]
    pub max_retries: u32,

    /// Exponential growth base
    #[serde(default = "default_exponential_base")]
    pub exponential_base: f64,

    /// Maximum delay in milliseconds
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Whether to perturb delays by a random +/-25%
    #[serde(default = "default_use_jitter")]
    pub use_jitter: bool,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_interval_ms: default_base_interval(),
            max_retries: default_backoff_max_retries(),
            exponential_base: default_exponential_base(),
            max_delay_ms: default_max_delay(),
            use_jitter: default_use_jitter(),
        }
    }
}

fn default_base_interval() -> u64 {
    5000
}

fn default_backoff_max_retries() -> u32 {
    10
}

fn default_exponential_base() -> f64 {
    2.0
}

fn default_max_delay() -> u64 {
    300_000 // 5 minutes
}

fn default_use_jitter() -> bool {
    true
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

/// Configuration error types
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum ConfigError {
    /// Error reading configuration file
    #[error("Failed to read configuration file: {0}")]
    FileRead(String),

    /// Error parsing configuration
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    /// Invalid configuration value
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// Missing required configuration
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

/// Expand environment variables in a string
///
/// Supports `${VAR_NAME}` syntax
fn expand_env_vars(input: &str) -> String {
    let re = regex_lite::Regex::new(r"\$\{([^}]+)\}")
        .expect("Invalid regex pattern for environment variable expansion");

    re.replace_all(input, |caps: &regex_lite::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_else(|_| caps[0].to_string())
    })
    .into_owned()
}
