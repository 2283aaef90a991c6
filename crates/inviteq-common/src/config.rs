//! Configuration for InviteQ

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Database configuration
    pub database: DatabaseConfig,

    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Engine policy configuration
    #[serde(default)]
    pub engine: EngineConfig,

    /// Send integration (Unipile) configuration
    pub unipile: UnipileConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database URL
    pub url: String,

    /// Maximum connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_max_connections() -> u32 {
    20
}

fn default_min_connections() -> u32 {
    5
}

/// API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Bind address
    #[serde(default = "default_api_bind")]
    pub bind: String,

    /// API port
    #[serde(default = "default_api_port")]
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: default_api_bind(),
            port: default_api_port(),
        }
    }
}

fn default_api_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

/// Engine policy configuration
///
/// All pacing, retry, and expiry values are policy constants exposed as
/// configuration rather than hard-coded behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Interval between dispatcher polls (seconds)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Interval between scheduling passes (seconds)
    #[serde(default = "default_schedule_interval")]
    pub schedule_interval_secs: u64,

    /// Interval between expiry sweeps (seconds)
    #[serde(default = "default_expiry_sweep_interval")]
    pub expiry_sweep_interval_secs: u64,

    /// Batch size for fetching due invites
    #[serde(default = "default_batch_size")]
    pub batch_size: i64,

    /// Maximum concurrent sends per process
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,

    /// Claim lease for a dispatched invite (seconds); a worker that dies
    /// mid-send releases its claim after this long
    #[serde(default = "default_claim_lease")]
    pub claim_lease_secs: i64,

    /// Minimum spacing between two sends on one account (seconds)
    #[serde(default = "default_min_interval")]
    pub min_interval_secs: i64,

    /// Upper bound for random jitter added to each slot (seconds)
    #[serde(default = "default_jitter")]
    pub jitter_secs: i64,

    /// Start of the daily send window (hour of day, UTC)
    #[serde(default = "default_send_start_hour")]
    pub send_start_hour: u32,

    /// End of the daily send window (hour of day, UTC)
    #[serde(default = "default_send_end_hour")]
    pub send_end_hour: u32,

    /// How many days ahead the scheduler will reserve slots
    #[serde(default = "default_max_horizon_days")]
    pub max_horizon_days: i64,

    /// Base delay for retry backoff (seconds)
    #[serde(default = "default_retry_base")]
    pub retry_base_secs: i64,

    /// Cap for retry backoff (seconds)
    #[serde(default = "default_backoff_cap")]
    pub backoff_cap_secs: i64,

    /// Maximum transient retries before an invite fails
    #[serde(default = "default_max_retries")]
    pub max_retries: i32,

    /// Days after sending before an unanswered invite expires
    #[serde(default = "default_expiry_days")]
    pub expiry_days: i64,

    /// Re-space remaining scheduled invites from "now" on resume
    #[serde(default)]
    pub respace_on_resume: bool,

    /// Days to keep daily usage counter rows
    #[serde(default = "default_usage_retention_days")]
    pub usage_retention_days: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            schedule_interval_secs: default_schedule_interval(),
            expiry_sweep_interval_secs: default_expiry_sweep_interval(),
            batch_size: default_batch_size(),
            concurrency_limit: default_concurrency_limit(),
            claim_lease_secs: default_claim_lease(),
            min_interval_secs: default_min_interval(),
            jitter_secs: default_jitter(),
            send_start_hour: default_send_start_hour(),
            send_end_hour: default_send_end_hour(),
            max_horizon_days: default_max_horizon_days(),
            retry_base_secs: default_retry_base(),
            backoff_cap_secs: default_backoff_cap(),
            max_retries: default_max_retries(),
            expiry_days: default_expiry_days(),
            respace_on_resume: false,
            usage_retention_days: default_usage_retention_days(),
        }
    }
}

fn default_poll_interval() -> u64 {
    5
}

fn default_schedule_interval() -> u64 {
    60
}

fn default_expiry_sweep_interval() -> u64 {
    3600
}

fn default_batch_size() -> i64 {
    50
}

fn default_concurrency_limit() -> usize {
    4
}

fn default_claim_lease() -> i64 {
    120
}

fn default_min_interval() -> i64 {
    180
}

fn default_jitter() -> i64 {
    120
}

fn default_send_start_hour() -> u32 {
    9
}

fn default_send_end_hour() -> u32 {
    18
}

fn default_max_horizon_days() -> i64 {
    14
}

fn default_retry_base() -> i64 {
    60
}

fn default_backoff_cap() -> i64 {
    3600
}

fn default_max_retries() -> i32 {
    5
}

fn default_expiry_days() -> i64 {
    14
}

fn default_usage_retention_days() -> i64 {
    7
}

/// Send integration (Unipile) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnipileConfig {
    /// Base URL of the Unipile DSN, e.g. https://api1.unipile.com:13111
    pub base_url: String,

    /// API key
    pub api_key: String,

    /// Request timeout in seconds
    #[serde(default = "default_send_timeout")]
    pub timeout_secs: u64,
}

fn default_send_timeout() -> u64 {
    30
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
    "text".to_string()
}

impl Config {
    /// Load configuration from file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default locations
    pub fn load() -> crate::Result<Self> {
        let paths = [
            std::path::PathBuf::from("./config.toml"),
            std::path::PathBuf::from("/etc/inviteq/config.toml"),
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

    fn validate(&self) -> crate::Result<()> {
        let engine = &self.engine;
        if engine.send_start_hour >= engine.send_end_hour || engine.send_end_hour > 24 {
            return Err(crate::Error::Config(format!(
                "Invalid send window: {}..{}",
                engine.send_start_hour, engine.send_end_hour
            )));
        }
        if engine.max_horizon_days < 1 {
            return Err(crate::Error::Config(
                "max_horizon_days must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_engine_config() {
        let engine = EngineConfig::default();
        assert_eq!(engine.poll_interval_secs, 5);
        assert_eq!(engine.max_retries, 5);
        assert_eq!(engine.expiry_days, 14);
        assert_eq!(engine.send_start_hour, 9);
        assert_eq!(engine.send_end_hour, 18);
        assert!(!engine.respace_on_resume);
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[database]
url = "postgres://localhost/inviteq"

[api]
port = 9090

[engine]
min_interval_secs = 240
max_retries = 3

[unipile]
base_url = "https://api1.unipile.com:13111"
api_key = "test-key"
"#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.database.url, "postgres://localhost/inviteq");
        assert_eq!(config.api.port, 9090);
        assert_eq!(config.engine.min_interval_secs, 240);
        assert_eq!(config.engine.max_retries, 3);
        assert_eq!(config.engine.poll_interval_secs, 5);
        assert_eq!(config.unipile.timeout_secs, 30);
    }

    fn config_with_window(start: u32, end: u32) -> Config {
        let toml = format!(
            r#"
[database]
url = "postgres://localhost/inviteq"

[engine]
send_start_hour = {}
send_end_hour = {}

[unipile]
base_url = "https://api1.unipile.com:13111"
api_key = "test-key"
"#,
            start, end
        );
        toml::from_str(&toml).unwrap()
    }

    #[test]
    fn test_validate_send_window() {
        assert!(config_with_window(9, 18).validate().is_ok());
        // 24 is a valid end: the window runs to midnight.
        assert!(config_with_window(9, 24).validate().is_ok());
        assert!(config_with_window(18, 9).validate().is_err());
        assert!(config_with_window(9, 9).validate().is_err());
        assert!(config_with_window(9, 25).validate().is_err());
    }
}
