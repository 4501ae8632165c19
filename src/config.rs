//! Service configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Data directory holding the SQLite database
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// Monitor loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Whether the scheduled loop runs (manual scans work either way)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Seconds between scheduler ticks
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Delay between groups within a tick, to respect upstream rate limits
    #[serde(default = "default_inter_group_delay")]
    pub inter_group_delay_ms: u64,

    /// First-run window when a group has no watermark yet
    #[serde(default = "default_bootstrap_window")]
    pub bootstrap_window_hours: u64,
}

impl MonitorConfig {
    /// Tick period, clamped to at least one second; a zero-duration ticker
    /// panics at runtime
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Base URL of the social-content provider
    #[serde(default = "default_feed_base_url")]
    pub base_url: String,

    /// API key sent with every feed request
    #[serde(default)]
    pub api_key: String,

    /// Posts requested per member per scan
    #[serde(default = "default_page_limit")]
    pub page_limit: u32,

    /// Upstream request timeout; must stay short relative to the tick interval
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// HTTP API port
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

// Defaults
fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/stakewatch")
}
fn default_true() -> bool {
    true
}
fn default_poll_interval() -> u64 {
    30
}
fn default_inter_group_delay() -> u64 {
    1000
}
fn default_bootstrap_window() -> u64 {
    24
}
fn default_feed_base_url() -> String {
    "https://api.neynar.com/v2".to_string()
}
fn default_page_limit() -> u32 {
    25
}
fn default_request_timeout() -> u64 {
    10
}
fn default_http_port() -> u16 {
    8080
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_secs: default_poll_interval(),
            inter_group_delay_ms: default_inter_group_delay(),
            bootstrap_window_hours: default_bootstrap_window(),
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: default_feed_base_url(),
            api_key: String::new(),
            page_limit: default_page_limit(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            http_port: default_http_port(),
        }
    }
}
