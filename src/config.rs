use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub bybit: Option<BybitConfig>,
    #[serde(default)]
    pub bitget: Option<BitgetConfig>,
    pub retry: RetryConfig,
    #[serde(default)]
    pub notification: NotificationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the webhook server
    #[serde(default = "default_host")]
    pub host: String,
    /// Webhook server port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Shared secret every inbound alert must carry
    pub webhook_key: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

#[derive(Debug, Clone, Deserialize)]
pub struct BybitConfig {
    /// REST API endpoint
    #[serde(default = "default_bybit_rest_url")]
    pub rest_url: String,
    pub api_key: String,
    pub api_secret: String,
    /// Tolerance window (ms) the exchange allows between signing and receipt
    #[serde(default = "default_recv_window_ms")]
    pub recv_window_ms: u64,
}

fn default_bybit_rest_url() -> String {
    "https://api.bybit.com".to_string()
}

fn default_recv_window_ms() -> u64 {
    5000
}

#[derive(Debug, Clone, Deserialize)]
pub struct BitgetConfig {
    /// REST API endpoint
    #[serde(default = "default_bitget_rest_url")]
    pub rest_url: String,
    pub api_key: String,
    pub api_secret: String,
    pub passphrase: String,
}

fn default_bitget_rest_url() -> String {
    "https://api.bitget.com".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Fixed delay between close attempts in milliseconds
    #[serde(default = "default_attempt_interval_ms")]
    pub attempt_interval_ms: u64,
    /// Attempt counts at which a sustained-failure notification is emitted
    #[serde(default = "default_escalation_milestones")]
    pub escalation_milestones: Vec<u64>,
    /// Consecutive well-formed rejections before the loop gives up
    #[serde(default = "default_reject_cutoff")]
    pub reject_cutoff: u32,
    /// Optional hard cap on attempts (None = retry until confirmed)
    #[serde(default)]
    pub max_attempts: Option<u64>,
    /// Optional hard cap on wall-clock duration (None = unbounded)
    #[serde(default)]
    pub max_duration_secs: Option<u64>,
}

fn default_attempt_interval_ms() -> u64 {
    200
}

fn default_escalation_milestones() -> Vec<u64> {
    vec![50, 500, 1000, 5000]
}

fn default_reject_cutoff() -> u32 {
    3
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempt_interval_ms: default_attempt_interval_ms(),
            escalation_milestones: default_escalation_milestones(),
            reject_cutoff: default_reject_cutoff(),
            max_attempts: None,
            max_duration_secs: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct NotificationConfig {
    /// Telegram bot token; notifications disabled when unset
    #[serde(default)]
    pub telegram_bot_token: Option<String>,
    /// Telegram chat to deliver operator messages to
    #[serde(default)]
    pub telegram_chat_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default values
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080_i64)?
            .set_default("retry.attempt_interval_ms", 200_i64)?
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g. config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("RELAY_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (RELAY_SERVER__WEBHOOK_KEY, etc.)
            .add_source(
                Environment::with_prefix("RELAY")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.server.webhook_key.trim().is_empty() {
            errors.push("server.webhook_key must not be empty".to_string());
        }

        if self.retry.attempt_interval_ms == 0 {
            errors.push("retry.attempt_interval_ms must be positive".to_string());
        }

        if self.retry.reject_cutoff == 0 {
            errors.push("retry.reject_cutoff must be positive".to_string());
        }

        if !self
            .retry
            .escalation_milestones
            .windows(2)
            .all(|w| w[0] < w[1])
        {
            errors.push("retry.escalation_milestones must be strictly ascending".to_string());
        }

        if self.bybit.is_none() && self.bitget.is_none() {
            errors.push("at least one exchange (bybit or bitget) must be configured".to_string());
        }

        if let Some(bybit) = &self.bybit {
            if bybit.api_key.trim().is_empty() || bybit.api_secret.trim().is_empty() {
                errors.push("bybit.api_key and bybit.api_secret must not be empty".to_string());
            }
        }

        if let Some(bitget) = &self.bitget {
            if bitget.api_key.trim().is_empty()
                || bitget.api_secret.trim().is_empty()
                || bitget.passphrase.trim().is_empty()
            {
                errors.push(
                    "bitget.api_key, bitget.api_secret and bitget.passphrase must not be empty"
                        .to_string(),
                );
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
