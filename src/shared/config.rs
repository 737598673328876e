use std::str::FromStr;
use std::time::Duration;

use crate::retry::RetryConfig;
use crate::status::{Thresholds, DEFAULT_ALERT_THRESHOLD, DEFAULT_DANGER_THRESHOLD};

/// DynamoDB caps a single TransactWriteItems call at 100 items
pub const MAX_BATCH_SIZE: usize = 100;

pub const DEFAULT_DEVICES_TABLE: &str = "devices";
pub const DEFAULT_READINGS_TABLE: &str = "sensor_logs";
pub const DEFAULT_TARGET_SECTOR: &str = "Sector A";
pub const DEFAULT_READING_KIND: &str = "real-time-read";
pub const DEFAULT_REGION: &str = "us-east-1";

/// Inclusive range for synthetic reading values
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

impl Default for ValueRange {
    fn default() -> Self {
        Self {
            min: 20.0,
            max: 100.0,
        }
    }
}

/// Process configuration shared by the producer, dashboard and seeder
#[derive(Debug, Clone)]
pub struct Settings {
    /// Custom store endpoint (e.g. DynamoDB Local); AWS defaults when unset
    pub store_endpoint: Option<String>,
    pub aws_region: String,
    pub devices_table: String,
    pub readings_table: String,
    /// Sector shown by the dashboard
    pub target_sector: String,
    pub batch_size: usize,
    pub producer_interval: Duration,
    pub dashboard_interval: Duration,
    pub thresholds: Thresholds,
    pub value_range: ValueRange,
    pub reading_kind: String,
    /// Upper bound on every store call
    pub store_timeout: Duration,
    pub retry: RetryConfig,
    pub dashboard_color: bool,
    pub seed_device_count: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            store_endpoint: None,
            aws_region: DEFAULT_REGION.to_string(),
            devices_table: DEFAULT_DEVICES_TABLE.to_string(),
            readings_table: DEFAULT_READINGS_TABLE.to_string(),
            target_sector: DEFAULT_TARGET_SECTOR.to_string(),
            batch_size: 10,
            producer_interval: Duration::from_millis(500),
            dashboard_interval: Duration::from_millis(2000),
            thresholds: Thresholds::default(),
            value_range: ValueRange::default(),
            reading_kind: DEFAULT_READING_KIND.to_string(),
            store_timeout: Duration::from_millis(5000),
            retry: RetryConfig::default(),
            dashboard_color: true,
            seed_device_count: 50,
        }
    }
}

impl Settings {
    /// Create Settings from environment variables
    ///
    /// Loads a `.env` file first when present. Unset variables fall back to
    /// the defaults; malformed ones are an error.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build Settings from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Settings::default();

        let store_endpoint = lookup("STORE_ENDPOINT").filter(|v| !v.trim().is_empty());
        let aws_region = lookup("AWS_REGION").unwrap_or(defaults.aws_region);
        let devices_table = lookup("DEVICES_TABLE").unwrap_or(defaults.devices_table);
        let readings_table = lookup("READINGS_TABLE").unwrap_or(defaults.readings_table);
        let target_sector = lookup("TARGET_SECTOR").unwrap_or(defaults.target_sector);
        let reading_kind = lookup("READING_KIND").unwrap_or(defaults.reading_kind);

        let batch_size = parse_or(&lookup, "BATCH_SIZE", defaults.batch_size)?;
        let producer_interval_ms = parse_or(&lookup, "PRODUCER_INTERVAL_MS", 500u64)?;
        let dashboard_interval_ms = parse_or(&lookup, "DASHBOARD_INTERVAL_MS", 2000u64)?;
        let alert = parse_or(&lookup, "ALERT_THRESHOLD", DEFAULT_ALERT_THRESHOLD)?;
        let danger = parse_or(&lookup, "DANGER_THRESHOLD", DEFAULT_DANGER_THRESHOLD)?;
        let value_min = parse_or(&lookup, "VALUE_RANGE_MIN", defaults.value_range.min)?;
        let value_max = parse_or(&lookup, "VALUE_RANGE_MAX", defaults.value_range.max)?;
        let store_timeout_ms = parse_or(&lookup, "STORE_TIMEOUT_MS", 5000u64)?;
        let retry_initial_ms = parse_or(&lookup, "RETRY_INITIAL_MS", 1000u64)?;
        let retry_max_ms = parse_or(&lookup, "RETRY_MAX_MS", 30_000u64)?;
        let dashboard_color = parse_or(&lookup, "DASHBOARD_COLOR", defaults.dashboard_color)?;
        let seed_device_count = parse_or(&lookup, "SEED_DEVICE_COUNT", defaults.seed_device_count)?;

        let settings = Settings {
            store_endpoint,
            aws_region,
            devices_table,
            readings_table,
            target_sector,
            batch_size,
            producer_interval: Duration::from_millis(producer_interval_ms),
            dashboard_interval: Duration::from_millis(dashboard_interval_ms),
            thresholds: Thresholds { alert, danger },
            value_range: ValueRange {
                min: value_min,
                max: value_max,
            },
            reading_kind,
            store_timeout: Duration::from_millis(store_timeout_ms),
            retry: RetryConfig {
                initial_delay: Duration::from_millis(retry_initial_ms),
                max_delay: Duration::from_millis(retry_max_ms),
                ..RetryConfig::default()
            },
            dashboard_color,
            seed_device_count,
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 || self.batch_size > MAX_BATCH_SIZE {
            return Err(ConfigError::InvalidValue {
                key: "BATCH_SIZE".to_string(),
                reason: format!("must be between 1 and {}", MAX_BATCH_SIZE),
            });
        }

        if !self.value_range.min.is_finite()
            || !self.value_range.max.is_finite()
            || self.value_range.min >= self.value_range.max
        {
            return Err(ConfigError::InvalidValue {
                key: "VALUE_RANGE_MIN".to_string(),
                reason: "must be finite and below VALUE_RANGE_MAX".to_string(),
            });
        }

        if !self.thresholds.alert.is_finite() || !self.thresholds.danger.is_finite() {
            return Err(ConfigError::InvalidValue {
                key: "ALERT_THRESHOLD".to_string(),
                reason: "thresholds must be finite numbers".to_string(),
            });
        }

        if self.thresholds.alert > self.thresholds.danger {
            return Err(ConfigError::InvalidValue {
                key: "ALERT_THRESHOLD".to_string(),
                reason: "must not exceed DANGER_THRESHOLD".to_string(),
            });
        }

        for (key, value) in [
            ("PRODUCER_INTERVAL_MS", self.producer_interval),
            ("DASHBOARD_INTERVAL_MS", self.dashboard_interval),
            ("STORE_TIMEOUT_MS", self.store_timeout),
            ("RETRY_INITIAL_MS", self.retry.initial_delay),
        ] {
            if value.is_zero() {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    reason: "must be greater than zero".to_string(),
                });
            }
        }

        if self.retry.max_delay < self.retry.initial_delay {
            return Err(ConfigError::InvalidValue {
                key: "RETRY_MAX_MS".to_string(),
                reason: "must not be below RETRY_INITIAL_MS".to_string(),
            });
        }

        if self.target_sector.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "TARGET_SECTOR".to_string(),
                reason: "must not be empty".to_string(),
            });
        }

        Ok(())
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            reason: format!("cannot parse '{}'", raw),
        }),
        None => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
}
