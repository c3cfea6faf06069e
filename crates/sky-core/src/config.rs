use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Add an error
    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Add a warning
    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a user-friendly message summarizing all errors
    pub fn error_summary(&self) -> String {
        if self.errors.is_empty() {
            return String::new();
        }
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application configuration directory
    pub config_dir: PathBuf,

    /// SQLite file holding targets and cached forecasts, relative to `config_dir`
    #[serde(default = "default_database_file")]
    pub database_file: String,

    /// Forecast feed settings
    #[serde(default)]
    pub feed: FeedConfig,

    /// Geocoding settings
    #[serde(default)]
    pub geocode: GeocodeConfig,

    /// Background refresh scheduling
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

fn default_database_file() -> String {
    "forecasts.db".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Base URL of the forecast webservice
    pub base_url: String,

    /// Number of days requested per forecast
    pub forecast_days: u32,

    /// Request timeout in seconds. We run in the background, so waiting for
    /// good data is fine.
    pub timeout_secs: u64,

    /// Feed the built-in sample document instead of calling the network
    #[serde(default)]
    pub use_embedded_fixture: bool,

    /// Language used for targets saved without one
    #[serde(default = "default_language")]
    pub default_language: String,

    /// Response encoding used for targets saved without one
    #[serde(default = "default_encoding")]
    pub default_encoding: String,
}

fn default_language() -> String {
    "en".to_string()
}

fn default_encoding() -> String {
    "UTF-8".to_string()
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.google.com/ig/api".to_string(),
            forecast_days: 4,
            timeout_secs: 30,
            use_embedded_fixture: false,
            default_language: default_language(),
            default_encoding: default_encoding(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocodeConfig {
    /// Base URL of the Nominatim instance
    pub base_url: String,

    /// Full resolve attempts before giving up
    pub max_attempts: u32,

    /// Pause between attempts in milliseconds (0 retries immediately)
    #[serde(default)]
    pub retry_delay_ms: u64,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for GeocodeConfig {
    fn default() -> Self {
        Self {
            base_url: "https://nominatim.openstreetmap.org".to_string(),
            max_attempts: 3,
            retry_delay_ms: 0,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Minimum delay before the next scheduled wake-up
    #[serde(default = "default_throttle_minutes")]
    pub throttle_minutes: u32,

    /// The refresh interval is divided by this after a failed cycle
    #[serde(default = "default_failure_divisor")]
    pub failure_divisor: u32,
}

fn default_throttle_minutes() -> u32 {
    10
}

fn default_failure_divisor() -> u32 {
    10
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            throttle_minutes: default_throttle_minutes(),
            failure_divisor: default_failure_divisor(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sky");

        Self {
            config_dir,
            database_file: default_database_file(),
            feed: FeedConfig::default(),
            geocode: GeocodeConfig::default(),
            schedule: ScheduleConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file, creating default if it doesn't exist
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from an explicit path, writing defaults there if
    /// the file is missing.
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            let config = Self::default();
            config.save_to(config_path)?;
            return Ok(config);
        }

        let contents = std::fs::read_to_string(config_path)
            .context("Failed to read config file")?;

        let config: Config = toml::from_str(&contents)
            .context("Failed to parse config file")?;

        Ok(config)
    }

    /// Load configuration and validate it
    ///
    /// Returns the config along with any validation warnings.
    /// Returns an error if validation fails with critical errors.
    pub fn load_validated() -> Result<(Self, ValidationResult)> {
        let config = Self::load()?;
        let validation = config.validate();

        if !validation.is_valid() {
            anyhow::bail!(
                "Configuration validation failed: {}",
                validation.error_summary()
            );
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok((config, validation))
    }

    /// Validate the configuration
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        self.validate_url(&self.feed.base_url, "feed.base_url", &mut result);
        self.validate_url(&self.geocode.base_url, "geocode.base_url", &mut result);

        if self.database_file.trim().is_empty() {
            result.add_error("database_file", "Database file name must not be empty");
        }

        if self.feed.forecast_days == 0 {
            result.add_error("feed.forecast_days", "At least one forecast day is required");
        } else if self.feed.forecast_days < 4 {
            result.add_warning(
                "feed.forecast_days",
                "Fewer than 4 days requested; later widget slots will stay empty",
            );
        }

        if self.feed.timeout_secs == 0 {
            result.add_error("feed.timeout_secs", "Feed timeout must be greater than 0");
        }

        if self.feed.use_embedded_fixture {
            result.add_warning(
                "feed.use_embedded_fixture",
                "Embedded sample feed enabled - forecasts are not live",
            );
        }

        if self.geocode.max_attempts == 0 {
            result.add_error(
                "geocode.max_attempts",
                "Geocoding needs at least one attempt",
            );
        }

        if self.schedule.failure_divisor == 0 {
            result.add_error(
                "schedule.failure_divisor",
                "Failure divisor must be greater than 0",
            );
        }

        if self.schedule.throttle_minutes == 0 {
            result.add_warning(
                "schedule.throttle_minutes",
                "Update throttle disabled (0 minutes)",
            );
        }

        result
    }

    /// Validate a URL field
    fn validate_url(&self, url_str: &str, field_name: &str, result: &mut ValidationResult) {
        match Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    result.add_error(
                        field_name,
                        format!("URL must use http or https scheme, got: {}", url.scheme()),
                    );
                }

                if url.host().is_none() {
                    result.add_error(field_name, "URL must have a host");
                }
            }
            Err(e) => {
                result.add_error(field_name, format!("Invalid URL: {}", e));
            }
        }
    }

    /// Full path of the forecast database
    pub fn database_path(&self) -> PathBuf {
        self.config_dir.join(&self.database_file)
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to an explicit path
    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;

        std::fs::write(config_path, contents)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Get the path to the configuration file
    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("sky");

        Ok(config_dir.join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_default_config() {
        let config = Config::default();
        let result = config.validate();
        assert!(result.is_valid(), "Default config should be valid: {:?}", result.errors);
    }

    #[test]
    fn test_default_feed_settings() {
        let config = Config::default();
        assert_eq!(config.feed.forecast_days, 4);
        assert_eq!(config.feed.timeout_secs, 30);
        assert!(!config.feed.use_embedded_fixture);
        assert_eq!(config.geocode.max_attempts, 3);
        assert_eq!(config.geocode.retry_delay_ms, 0);
        assert_eq!(config.schedule.throttle_minutes, 10);
        assert_eq!(config.schedule.failure_divisor, 10);
    }

    #[test]
    fn test_invalid_url() {
        let mut config = Config::default();
        config.feed.base_url = "not-a-url".to_string();
        let result = config.validate();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.field == "feed.base_url"));
    }

    #[test]
    fn test_invalid_url_scheme() {
        let mut config = Config::default();
        config.geocode.base_url = "ftp://localhost:8080".to_string();
        let result = config.validate();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.message.contains("http or https")));
    }

    #[test]
    fn test_zero_attempts_is_error() {
        let mut config = Config::default();
        config.geocode.max_attempts = 0;
        let result = config.validate();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.field == "geocode.max_attempts"));
    }

    #[test]
    fn test_fixture_mode_is_warning() {
        let mut config = Config::default();
        config.feed.use_embedded_fixture = true;
        let result = config.validate();
        assert!(result.is_valid());
        assert!(result
            .warnings
            .iter()
            .any(|w| w.field == "feed.use_embedded_fixture"));
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.config_dir = dir.path().to_path_buf();
        config.feed.use_embedded_fixture = true;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert!(loaded.feed.use_embedded_fixture);
        assert_eq!(loaded.database_path(), dir.path().join("forecasts.db"));
    }

    #[test]
    fn test_load_creates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.feed.forecast_days, 4);
    }

    #[test]
    fn test_validation_result_error_summary() {
        let mut result = ValidationResult::default();
        result.add_error("field1", "error1");
        result.add_error("field2", "error2");
        let summary = result.error_summary();
        assert!(summary.contains("field1"));
        assert!(summary.contains("field2"));
    }
}
