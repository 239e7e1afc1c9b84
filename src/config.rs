// Configuration File Support
//
// TOML configuration for the gradeguard service with environment variable
// overrides. The default location is the platform config directory, e.g.
// ~/.config/gradeguard/config.toml on Linux.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::CacheConfig;
use crate::execution::timeout::DEFAULT_EXECUTION_TIMEOUT_SECS;
use crate::rate_limit::RateLimitConfig;

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "GRADEGUARD_";

/// Upper bound for TTLs and rate-limit windows (100 years)
pub const MAX_DURATION_SECS: u64 = 100 * 365 * 24 * 3600;

/// Convert configured seconds to a signed duration, saturating at the
/// largest representable span
pub fn seconds_to_delta(secs: u64) -> chrono::Duration {
    i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .unwrap_or(chrono::Duration::MAX)
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Per-user admission limits
    pub rate_limit: RateLimitConfig,

    /// Result cache
    pub cache: CacheConfig,

    /// Execution service
    pub execution: ExecutionConfig,

    /// Grading policy
    pub grading: GradingConfig,

    /// HTTP API
    pub server: ServerConfig,

    /// Identity directory
    pub auth: AuthConfig,

    /// Metrics configuration
    pub metrics: MetricsConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

/// Execution service configuration
#[derive(Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Execution endpoint
    pub url: String,

    /// API client id
    pub client_id: String,

    /// API client secret
    pub client_secret: String,

    /// Per-call timeout in seconds
    pub timeout_secs: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            url: "https://api.jdoodle.com/v1/execute".to_string(),
            client_id: String::new(),
            client_secret: String::new(),
            timeout_secs: DEFAULT_EXECUTION_TIMEOUT_SECS,
        }
    }
}

impl ExecutionConfig {
    /// Get the per-call timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Whether API credentials are present
    pub fn has_credentials(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty()
    }
}

// Keeps the client secret out of logs
impl std::fmt::Debug for ExecutionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionConfig")
            .field("url", &self.url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Grading policy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GradingConfig {
    /// Whether a cache hit consumes quota
    pub count_cache_hits: bool,
}

impl Default for GradingConfig {
    fn default() -> Self {
        Self {
            count_cache_hits: true,
        }
    }
}

/// HTTP API configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    pub host: String,

    /// Listen port
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Identity directory configuration
#[derive(Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct AuthConfig {
    /// Bearer token -> user id
    pub tokens: HashMap<String, String>,

    /// Users holding the admin capability
    pub admin_users: Vec<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("tokens", &self.tokens.len())
            .field("admin_users", &self.admin_users)
            .finish()
    }
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MetricsConfig {
    /// Whether to serve /metrics
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Config {
    /// Load configuration from the default config directory
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed, or
    /// if the resulting configuration is invalid.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    ///
    /// A missing file yields the defaults. Environment overrides are applied
    /// in both cases, then the result is validated.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let config = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file from {:?}", path))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file from {:?}", path))?;
            tracing::info!("Loaded configuration from {:?}", path);
            config
        } else {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            Self::default()
        };

        let config = config.apply_env_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path
    pub fn config_path() -> PathBuf {
        if let Some(proj_dirs) = directories::ProjectDirs::from("com", "gradeguard", "GradeGuard") {
            proj_dirs.config_dir().join("config.toml")
        } else {
            // Fallback if XDG dirs cannot be determined
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".config").join("gradeguard").join("config.toml")
        }
    }

    /// Apply environment variable overrides
    ///
    /// `lookup` receives the full variable name (e.g. `GRADEGUARD_DAILY_LIMIT`).
    /// Values that fail to parse are ignored.
    pub fn apply_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));
        let parsed = |name: &str| var(name).and_then(|v| v.parse::<u64>().ok());

        // Logging overrides
        if let Some(level) = var("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = var("LOG_FORMAT") {
            self.logging.format = format;
        }

        // Rate limit overrides
        if let Some(enabled) = var("RATE_LIMIT_ENABLED").and_then(|v| v.parse().ok()) {
            self.rate_limit.enabled = enabled;
        }
        if let Some(limit) = var("DAILY_LIMIT").and_then(|v| v.parse().ok()) {
            self.rate_limit.max_requests_per_day = limit;
        }
        if let Some(limit) = var("MINUTE_LIMIT").and_then(|v| v.parse().ok()) {
            self.rate_limit.max_requests_per_minute = limit;
        }

        // Cache overrides
        if let Some(ttl) = parsed("CACHE_TTL_SECS") {
            self.cache.ttl_secs = ttl;
        }
        if let Some(max) = var("CACHE_MAX_ENTRIES").and_then(|v| v.parse().ok()) {
            self.cache.max_entries = max;
        }

        // Execution overrides
        if let Some(url) = var("EXECUTION_URL") {
            self.execution.url = url;
        }
        if let Some(id) = var("EXECUTION_CLIENT_ID") {
            self.execution.client_id = id;
        }
        if let Some(secret) = var("EXECUTION_CLIENT_SECRET") {
            self.execution.client_secret = secret;
        }
        if let Some(timeout) = parsed("EXECUTION_TIMEOUT_SECS") {
            self.execution.timeout_secs = timeout;
        }

        // Grading and server overrides
        if let Some(count) = var("COUNT_CACHE_HITS").and_then(|v| v.parse().ok()) {
            self.grading.count_cache_hits = count;
        }
        if let Some(port) = var("SERVER_PORT").and_then(|v| v.parse().ok()) {
            self.server.port = port;
        }

        self
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                self.logging.level
            ),
        }

        match self.logging.format.to_lowercase().as_str() {
            "json" | "pretty" | "compact" => {}
            _ => anyhow::bail!(
                "Invalid log format: {}. Must be one of: json, pretty, compact",
                self.logging.format
            ),
        }

        if self.rate_limit.max_requests_per_day == 0 {
            anyhow::bail!("Daily request limit must be > 0");
        }
        if self.rate_limit.max_requests_per_minute == 0 {
            anyhow::bail!("Per-minute request limit must be > 0");
        }
        if self.rate_limit.daily_window_secs == 0 || self.rate_limit.minute_window_secs == 0 {
            anyhow::bail!("Rate limit windows must be > 0 seconds");
        }
        if self.rate_limit.daily_window_secs > MAX_DURATION_SECS
            || self.rate_limit.minute_window_secs > MAX_DURATION_SECS
        {
            anyhow::bail!("Rate limit windows must be <= {} seconds", MAX_DURATION_SECS);
        }

        if self.cache.ttl_secs == 0 {
            anyhow::bail!("Cache TTL must be > 0 seconds");
        }
        if self.cache.ttl_secs > MAX_DURATION_SECS {
            anyhow::bail!("Cache TTL must be <= {} seconds", MAX_DURATION_SECS);
        }
        if self.cache.max_entries == 0 {
            anyhow::bail!("Cache capacity must be > 0");
        }

        if self.execution.url.trim().is_empty() {
            anyhow::bail!("Execution service URL must not be empty");
        }
        if self.execution.timeout_secs == 0 {
            anyhow::bail!("Execution timeout must be > 0 seconds");
        }

        for user in &self.auth.admin_users {
            if user.trim().is_empty() {
                anyhow::bail!("Admin user ids must not be empty");
            }
        }

        Ok(())
    }

    /// Convert log level string to tracing::Level
    pub fn log_level(&self) -> Result<tracing::Level> {
        self.logging
            .level
            .to_lowercase()
            .parse()
            .map_err(|e| anyhow::anyhow!("Failed to parse log level: {}", e))
    }

    /// Copy safe to print: secrets and tokens are masked
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if !copy.execution.client_secret.is_empty() {
            copy.execution.client_secret = "***".to_string();
        }
        copy.auth.tokens = copy
            .auth
            .tokens
            .into_iter()
            .map(|(_, user)| (format!("***{}", user), user))
            .collect();
        copy
    }
}
