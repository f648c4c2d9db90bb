//! Configuration for WaPulse

use crate::types::SessionContext;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// WhatsApp Business provider configuration
    #[serde(default)]
    pub whatsapp: WhatsAppConfig,

    /// Dispatch pacing
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Delivery report polling
    #[serde(default)]
    pub reports: ReportsConfig,

    /// Background scheduler
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database backend: "postgres" or "memory"
    #[serde(default = "default_db_backend")]
    pub backend: String,

    /// Database URL (for postgres)
    pub url: Option<String>,

    /// Maximum connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: default_db_backend(),
            url: None,
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
        }
    }
}

fn default_db_backend() -> String {
    "postgres".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

/// API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// API port
    #[serde(default = "default_api_port")]
    pub port: u16,

    /// CORS allowed origins
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: default_api_port(),
            cors_origins: Vec::new(),
        }
    }
}

fn default_api_port() -> u16 {
    8080
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "json" or "text"
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

/// WhatsApp Business provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsAppConfig {
    /// Provider API base URL
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Business account id used for sends and report queries
    #[serde(default)]
    pub owner_id: String,

    /// Bearer token for the provider API
    #[serde(default)]
    pub access_token: String,

    /// Request timeout in milliseconds
    #[serde(default = "default_http_timeout_ms")]
    pub timeout_ms: u64,

    /// Message type sent with every campaign message
    #[serde(default = "default_message_type")]
    pub message_type: String,
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            owner_id: String::new(),
            access_token: String::new(),
            timeout_ms: default_http_timeout_ms(),
            message_type: default_message_type(),
        }
    }
}

impl WhatsAppConfig {
    /// Build the explicit session context for provider calls
    pub fn session_context(&self) -> SessionContext {
        SessionContext::new(self.owner_id.clone(), self.access_token.clone())
    }
}

fn default_api_base() -> String {
    "https://api.whatsapp-business.example.com/v1".to_string()
}

fn default_http_timeout_ms() -> u64 {
    15_000
}

fn default_message_type() -> String {
    "template".to_string()
}

/// Dispatch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Fixed delay between consecutive sends in milliseconds
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            pacing_ms: default_pacing_ms(),
        }
    }
}

impl DispatchConfig {
    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }
}

fn default_pacing_ms() -> u64 {
    1_000
}

/// Delivery report polling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportsConfig {
    /// Delay after a "send now" dispatch before the first report poll
    #[serde(default = "default_post_dispatch_delay")]
    pub post_dispatch_delay_secs: u64,

    /// Interval of the monitor that looks for campaigns without reports
    #[serde(default = "default_monitor_interval")]
    pub monitor_interval_secs: u64,

    /// Page size requested from the report feed
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Maximum pages followed per poll
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,

    /// Start of the search window, relative to campaign creation
    #[serde(default = "default_window_before")]
    pub window_before_secs: i64,

    /// End of the search window, relative to campaign creation
    #[serde(default = "default_window_after")]
    pub window_after_secs: i64,
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            post_dispatch_delay_secs: default_post_dispatch_delay(),
            monitor_interval_secs: default_monitor_interval(),
            page_size: default_page_size(),
            max_pages: default_max_pages(),
            window_before_secs: default_window_before(),
            window_after_secs: default_window_after(),
        }
    }
}

fn default_post_dispatch_delay() -> u64 {
    25
}

fn default_monitor_interval() -> u64 {
    20
}

fn default_page_size() -> u32 {
    100
}

fn default_max_pages() -> u32 {
    1
}

fn default_window_before() -> i64 {
    5 * 60
}

fn default_window_after() -> i64 {
    60 * 60
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Interval of the scheduled-send sweep
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Redispatch campaigns left in `sending` when the server starts
    #[serde(default = "default_recover_on_start")]
    pub recover_on_start: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval(),
            recover_on_start: default_recover_on_start(),
        }
    }
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_recover_on_start() -> bool {
    true
}

impl Config {
    /// Load configuration from file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> crate::Result<Self> {
        toml::from_str(content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Load configuration from `WAPULSE_CONFIG` or the default locations
    pub fn load() -> crate::Result<Self> {
        if let Ok(path) = std::env::var("WAPULSE_CONFIG") {
            return Self::from_file(&PathBuf::from(path));
        }

        let paths = [
            PathBuf::from("./config.toml"),
            PathBuf::from("/etc/wapulse/config.toml"),
        ];

        for path in paths {
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        Err(crate::Error::Config(
            "No configuration file found".to_string(),
        ))
    }
}
