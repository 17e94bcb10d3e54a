use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable pointing at an optional TOML configuration file
pub const CONFIG_PATH_ENV: &str = "ENRICHER_CONFIG";

/// Longest accepted query window (30 days)
pub const MAX_LOOKBACK_MINUTES: i64 = 30 * 24 * 60;

/// Errors raised while loading or validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Missing required secret: {0}")]
    MissingSecret(&'static str),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Configuration for the alarm enricher
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Telegram delivery settings
    #[serde(default)]
    pub telegram: TelegramConfig,
    /// Log query policy
    #[serde(default)]
    pub log_query: LogQueryConfig,
    /// Geolocation backend settings
    #[serde(default)]
    pub geolocation: GeolocationConfig,
    /// Message layout settings
    #[serde(default)]
    pub message: MessageConfig,
}

/// Telegram bot configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Bot token (overridden by `BOT_TOKEN`)
    pub bot_token: String,
    /// Target chat id (overridden by `CHAT_ID`)
    pub chat_id: String,
    /// Bot API base URL
    pub api_base: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

/// Log query policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogQueryConfig {
    /// Log group to query (overridden by `LOG_GROUP_NAME`)
    pub log_group: String,
    /// Literal pattern the message must contain
    pub filter_pattern: String,
    /// How far back the query window reaches, in minutes
    pub lookback_minutes: i64,
    /// Maximum number of records returned
    pub result_limit: usize,
    /// Number of status polls before giving up
    pub poll_attempts: u32,
    /// Delay before each poll, in milliseconds
    pub poll_interval_ms: u64,
}

/// Which geolocation backend resolves public addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GeoProvider {
    IpApi,
    Maxmind,
}

/// Geolocation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeolocationConfig {
    pub provider: GeoProvider,
    /// Base URL of the ip-api compatible lookup service
    pub endpoint: String,
    /// Per-lookup timeout in milliseconds
    pub timeout_ms: u64,
    /// GeoLite2-City database (maxmind provider only)
    pub database_path: Option<PathBuf>,
}

/// What the findings section shows when the alarm is not in ALARM state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NonAlarmFindings {
    /// Static "fetching" line, no log query
    Placeholder,
    /// Drop the findings section entirely
    Omit,
    /// Query the logs as for ALARM
    Query,
}

/// Message layout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageConfig {
    pub host_label: String,
    pub threshold_label: String,
    /// Hours added to UTC log timestamps for display
    pub utc_offset_hours: i32,
    /// Suffix shown after each local time
    pub timezone_label: String,
    /// Prefix of the clickable IP link
    pub ip_link_base: String,
    pub non_alarm_findings: NonAlarmFindings,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        TelegramConfig {
            bot_token: String::new(),
            chat_id: String::new(),
            api_base: "https://api.telegram.org".to_string(),
            timeout_secs: 30,
        }
    }
}

impl Default for LogQueryConfig {
    fn default() -> Self {
        LogQueryConfig {
            log_group: "Hybrid-Server-Logs".to_string(),
            filter_pattern: "Failed password".to_string(),
            lookback_minutes: 15,
            result_limit: 5,
            poll_attempts: 5,
            poll_interval_ms: 1000,
        }
    }
}

impl Default for GeolocationConfig {
    fn default() -> Self {
        GeolocationConfig {
            provider: GeoProvider::IpApi,
            endpoint: "http://ip-api.com".to_string(),
            timeout_ms: 1000,
            database_path: None,
        }
    }
}

impl Default for MessageConfig {
    fn default() -> Self {
        MessageConfig {
            host_label: "On-Premise VM".to_string(),
            threshold_label: "> 3 Fails / 1 Min".to_string(),
            utc_offset_hours: 7,
            timezone_label: "WIB".to_string(),
            ip_link_base: "https://whatismyipaddress.com/ip/".to_string(),
            non_alarm_findings: NonAlarmFindings::Placeholder,
        }
    }
}

impl LogQueryConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Insights query string for the configured pattern and limit
    pub fn query_string(&self) -> String {
        format!(
            "fields @timestamp, @message | filter @message like /{}/ | sort @timestamp desc | limit {}",
            self.filter_pattern, self.result_limit
        )
    }
}

impl GeolocationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Config {
    /// Load configuration from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Load from `ENRICHER_CONFIG` (or defaults), overlay secrets from the
    /// environment and validate.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var_os(CONFIG_PATH_ENV) {
            Some(path) => Config::from_file(PathBuf::from(path))?,
            None => Config::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Overlay values from environment-style lookups. Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = get("BOT_TOKEN") {
            self.telegram.bot_token = token;
        }
        if let Some(chat_id) = get("CHAT_ID") {
            self.telegram.chat_id = chat_id;
        }
        if let Some(group) = get("LOG_GROUP_NAME") {
            self.log_query.log_group = group;
        }
    }

    /// Check the configuration is usable for a live invocation
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.telegram.bot_token.is_empty() {
            return Err(ConfigError::MissingSecret("BOT_TOKEN"));
        }
        if self.telegram.chat_id.is_empty() {
            return Err(ConfigError::MissingSecret("CHAT_ID"));
        }
        self.validate_policy()
    }

    /// Validation that does not depend on secrets (used by dry runs)
    pub fn validate_policy(&self) -> Result<(), ConfigError> {
        if self.log_query.poll_attempts == 0 {
            return Err(ConfigError::Invalid("log_query.poll_attempts must be at least 1".into()));
        }
        if self.log_query.result_limit == 0 {
            return Err(ConfigError::Invalid("log_query.result_limit must be at least 1".into()));
        }
        if !(1..=MAX_LOOKBACK_MINUTES).contains(&self.log_query.lookback_minutes) {
            return Err(ConfigError::Invalid(format!(
                "log_query.lookback_minutes must be between 1 and {}",
                MAX_LOOKBACK_MINUTES
            )));
        }
        if !(-23..=23).contains(&self.message.utc_offset_hours) {
            return Err(ConfigError::Invalid(format!(
                "message.utc_offset_hours out of range: {}",
                self.message.utc_offset_hours
            )));
        }
        if self.geolocation.provider == GeoProvider::Maxmind && self.geolocation.database_path.is_none() {
            return Err(ConfigError::Invalid(
                "geolocation.database_path is required for the maxmind provider".into(),
            ));
        }
        Ok(())
    }
}
