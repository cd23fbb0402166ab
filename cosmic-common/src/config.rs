//! Configuration management for Cosmic Watch.
//!
//! The service reads a single JSON file at `~/.cosmic-watch/config.json`.
//! Every section is optional and falls back to defaults.
//!
//! # Configuration Priority
//!
//! 1. Environment variables
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `NASA_API_KEY` → feed.api_key
//! - `TELEGRAM_BOT_TOKEN` → telegram.bot_token
//! - `TELEGRAM_CHAT_ID` → telegram.group_chat_id
//! - `COSMIC_LOG_LEVEL` → observability.log_level
//! - `COSMIC_PORT` → server.port
//! - `COSMIC_BIND_ADDRESS` → server.host

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".cosmic-watch"),
        |dirs| dirs.home_dir().join(".cosmic-watch"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration for the Cosmic Watch service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// NEO feed source
    #[serde(default)]
    pub feed: FeedConfig,

    /// Telegram transport and inbound listener
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// Monitor loop thresholds and pacing
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Durable thread store
    #[serde(default)]
    pub store: StoreConfig,

    /// HTTP trigger surface
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the default path.
    ///
    /// A missing file yields the default configuration.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration with environment variable overrides applied.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    ///
    /// A numeric variable that does not parse is an error.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("NASA_API_KEY") {
            self.feed.api_key = Some(key);
        }

        if let Some(token) = lookup("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = Some(token);
        }
        if let Some(chat_id) = lookup("TELEGRAM_CHAT_ID") {
            match chat_id.trim().parse() {
                Ok(id) => self.telegram.group_chat_id = Some(id),
                Err(_) => bail!("TELEGRAM_CHAT_ID must be numeric, got '{chat_id}'"),
            }
        }

        if let Some(level) = lookup("COSMIC_LOG_LEVEL") {
            self.observability.log_level = level;
        }

        if let Some(port) = lookup("COSMIC_PORT") {
            match port.trim().parse() {
                Ok(p) => self.server.port = p,
                Err(_) => bail!("COSMIC_PORT must be a port number, got '{port}'"),
            }
        }
        if let Some(bind) = lookup("COSMIC_BIND_ADDRESS") {
            self.server.host = bind;
        }

        Ok(())
    }

    /// Resolved path of the SQLite thread store.
    pub fn store_path(&self) -> PathBuf {
        self.store
            .path
            .clone()
            .unwrap_or_else(|| config_dir().join("threads.db"))
    }
}

// ============================================================================
// Feed Configuration
// ============================================================================

/// NASA NeoWs feed configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Base URL of the NeoWs REST API
    #[serde(default = "default_feed_base_url")]
    pub base_url: String,

    /// API key (required at startup)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Number of days after today included in each fetch window
    #[serde(default = "default_window_days")]
    pub window_days: u32,

    /// Per-request timeout in seconds
    #[serde(default = "default_feed_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: default_feed_base_url(),
            api_key: None,
            window_days: default_window_days(),
            timeout_secs: default_feed_timeout_secs(),
        }
    }
}

// ============================================================================
// Telegram Configuration
// ============================================================================

/// Telegram Bot API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot API base URL (overridable for tests and proxies)
    #[serde(default = "default_telegram_api_base")]
    pub api_base: String,

    /// Bot token (required at startup)
    #[serde(default)]
    pub bot_token: Option<String>,

    /// Group chat that hosts the discussion threads (required at startup)
    #[serde(default)]
    pub group_chat_id: Option<i64>,

    /// Long-poll timeout for `getUpdates`
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,

    /// Request timeout for `sendMessage`
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,

    /// Run the inbound update listener
    #[serde(default = "default_true")]
    pub listen: bool,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            api_base: default_telegram_api_base(),
            bot_token: None,
            group_chat_id: None,
            poll_timeout_secs: default_poll_timeout_secs(),
            send_timeout_secs: default_send_timeout_secs(),
            listen: true,
        }
    }
}

// ============================================================================
// Monitor Configuration
// ============================================================================

/// Monitor loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Seconds between cycles
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Score at or above which a discussion thread is anchored
    #[serde(default = "default_creation_threshold")]
    pub creation_threshold: f64,

    /// Score at or above which a positive delta raises an alert
    #[serde(default = "default_alert_threshold")]
    pub alert_threshold: f64,

    /// Maximum alerts per cycle (0 = unbounded)
    #[serde(default = "default_max_alerts")]
    pub max_alerts: usize,

    /// Concurrent per-recipient deliveries during a broadcast
    #[serde(default = "default_delivery_concurrency")]
    pub delivery_concurrency: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            creation_threshold: default_creation_threshold(),
            alert_threshold: default_alert_threshold(),
            max_alerts: default_max_alerts(),
            delivery_concurrency: default_delivery_concurrency(),
        }
    }
}

// ============================================================================
// Store / Server / Observability
// ============================================================================

/// Thread store configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite database path; defaults to `~/.cosmic-watch/threads.db`
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address. Default "127.0.0.1" (local only)
    #[serde(default = "default_bind_address")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_bind_address(),
            port: default_port(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,

    /// Additional module targets forced to `warn`.
    #[serde(default)]
    pub excluded_targets: Vec<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            excluded_targets: Vec::new(),
        }
    }
}

// ============================================================================
// Defaults
// ============================================================================

fn default_feed_base_url() -> String {
    "https://api.nasa.gov/neo/rest/v1".into()
}
fn default_window_days() -> u32 {
    1
}
fn default_feed_timeout_secs() -> u64 {
    30
}
fn default_telegram_api_base() -> String {
    "https://api.telegram.org".into()
}
fn default_poll_timeout_secs() -> u64 {
    30
}

fn default_send_timeout_secs() -> u64 {
    10
}
fn default_interval_secs() -> u64 {
    60
}
fn default_creation_threshold() -> f64 {
    50.0
}
fn default_alert_threshold() -> f64 {
    50.0
}
fn default_max_alerts() -> usize {
    4
}
fn default_delivery_concurrency() -> usize {
    4
}
fn default_bind_address() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    4480
}
fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "pretty".into()
}
fn default_true() -> bool {
    true
}
