//! Legal client configuration.
//!
//! # Example (TOML)
//!
//! ```toml
//! base_url = "https://legal.example.com"
//! publisher_namespace = "publisher"
//! refresh_interval = "60s"
//! debug = false
//!
//! [retry]
//! initial_interval = "1s"
//! max_elapsed_time = "60s"
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default refresh interval, also used as the cache TTL.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Root configuration for [`DefaultLegalClient`](crate::client::DefaultLegalClient).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LegalConfig {
    /// Base URL of the policy service.
    pub base_url: String,

    /// Top-level namespace of the service operator.
    /// Users in any other namespace inherit this namespace's crucial policies.
    pub publisher_namespace: String,

    /// How often the background loop refreshes the cache.
    /// Also the lifetime of every cache entry. Zero selects the default.
    #[serde(with = "humantime_serde")]
    pub refresh_interval: Duration,

    /// Emit per-request verdicts at debug level.
    pub debug: bool,

    /// Timeout for one HTTP attempt.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Retry policy inside a single fetch.
    pub retry: RetryConfig,

    /// Backoff of the background refresh loop after failures.
    pub refresh_backoff: RefreshBackoffConfig,
}

impl Default for LegalConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            publisher_namespace: String::new(),
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            debug: false,
            request_timeout: Duration::from_secs(10),
            retry: RetryConfig::default(),
            refresh_backoff: RefreshBackoffConfig::default(),
        }
    }
}

impl LegalConfig {
    /// Creates a configuration for the policy service at `base_url`.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Sets the publisher namespace.
    #[must_use]
    pub fn with_publisher_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.publisher_namespace = namespace.into();
        self
    }

    /// Sets the refresh interval (and cache TTL).
    #[must_use]
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    /// Enables or disables per-request debug logging.
    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Sets the per-attempt HTTP timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the fetch retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the refresh loop backoff.
    #[must_use]
    pub fn with_refresh_backoff(mut self, backoff: RefreshBackoffConfig) -> Self {
        self.refresh_backoff = backoff;
        self
    }

    /// Refresh interval with the zero value replaced by the default.
    #[must_use]
    pub fn effective_refresh_interval(&self) -> Duration {
        if self.refresh_interval.is_zero() {
            DEFAULT_REFRESH_INTERVAL
        } else {
            self.refresh_interval
        }
    }

    /// Lifetime of a cache entry.
    #[must_use]
    pub fn cache_ttl(&self) -> Duration {
        self.effective_refresh_interval()
    }

    /// How often expired cache entries are swept.
    #[must_use]
    pub fn cleanup_interval(&self) -> Duration {
        self.cache_ttl() * 2
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if `base_url` is empty, and
    /// `ConfigError::InvalidValue` if it is not an http(s) URL or a retry or
    /// backoff setting is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::Missing("base_url".to_string()));
        }

        match url::Url::parse(&self.base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => {
                return Err(ConfigError::InvalidValue(format!(
                    "base_url must use http or https, got '{}'",
                    url.scheme()
                )));
            }
            Err(e) => {
                return Err(ConfigError::InvalidValue(format!(
                    "base_url '{}' is not a valid URL: {}",
                    self.base_url, e
                )));
            }
        }

        if self.request_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "request_timeout must be > 0".to_string(),
            ));
        }

        self.retry.validate()?;
        self.refresh_backoff.validate()?;

        Ok(())
    }
}

/// Exponential backoff applied to 5xx responses within one fetch.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Delay before the first retry.
    #[serde(with = "humantime_serde")]
    pub initial_interval: Duration,

    /// Growth factor between retries.
    pub multiplier: f64,

    /// Upper bound on a single delay.
    #[serde(with = "humantime_serde")]
    pub max_interval: Duration,

    /// Total time budget for retries. Zero disables retrying.
    #[serde(with = "humantime_serde")]
    pub max_elapsed_time: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(1),
            multiplier: 2.0,
            max_interval: Duration::from_secs(60),
            max_elapsed_time: Duration::from_secs(60),
        }
    }
}

impl RetryConfig {
    /// Validates the retry policy.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if an interval is zero or
    /// inverted, or the multiplier is not a finite number >= 1.0.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_interval.is_zero() {
            return Err(ConfigError::InvalidValue(
                "retry.initial_interval must be > 0".to_string(),
            ));
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(ConfigError::InvalidValue(format!(
                "retry.multiplier must be a finite number >= 1.0, got {}",
                self.multiplier
            )));
        }
        if self.max_interval < self.initial_interval {
            return Err(ConfigError::InvalidValue(
                "retry.max_interval must be >= retry.initial_interval".to_string(),
            ));
        }
        Ok(())
    }
}

/// Sleep schedule of the refresh loop after consecutive failures.
///
/// The first failure sleeps `initial`, each further failure doubles the
/// sleep up to `max`. A success resets it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RefreshBackoffConfig {
    /// Sleep after the first failure.
    #[serde(with = "humantime_serde")]
    pub initial: Duration,

    /// Cap on the sleep.
    #[serde(with = "humantime_serde")]
    pub max: Duration,
}

impl Default for RefreshBackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(60),
        }
    }
}

impl RefreshBackoffConfig {
    /// Validates the backoff schedule.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if `initial` is zero or `max` is
    /// below it.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.initial.is_zero() {
            return Err(ConfigError::InvalidValue(
                "refresh_backoff.initial must be > 0".to_string(),
            ));
        }
        if self.max < self.initial {
            return Err(ConfigError::InvalidValue(
                "refresh_backoff.max must be >= refresh_backoff.initial".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A configuration value is invalid.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),

    /// The configuration sources could not be read or merged.
    #[error("Failed to load configuration: {0}")]
    Load(String),
}

/// Loading [`LegalConfig`] from a TOML file plus `LEGAL__*` environment overrides.
pub mod loader {
    use super::{ConfigError, LegalConfig};
    use ::config::{Config, Environment, File};
    use std::path::PathBuf;

    /// Default configuration file, looked up in the working directory.
    pub const DEFAULT_CONFIG_PATH: &str = "legal.toml";

    /// Loads and validates the configuration.
    ///
    /// `path` is optional; when absent `legal.toml` is used if it exists.
    /// Environment variables override file values, e.g.
    /// `LEGAL__BASE_URL=https://legal.example.com` or
    /// `LEGAL__RETRY__MAX_ELAPSED_TIME=30s`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Load` if a source cannot be read or deserialized,
    /// and the errors of [`LegalConfig::validate`] otherwise.
    pub fn load_config(path: Option<&str>) -> Result<LegalConfig, ConfigError> {
        let config = build(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Like [`load_config`] but without validation, so callers can apply
    /// further overrides first.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Load` if a source cannot be read or deserialized.
    pub fn build(path: Option<&str>) -> Result<LegalConfig, ConfigError> {
        let mut builder = Config::builder();

        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_PATH));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        } else if let Some(p) = path {
            return Err(ConfigError::Load(format!("config file not found: {p}")));
        }

        builder = builder.add_source(
            Environment::with_prefix("LEGAL")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        builder
            .build()
            .map_err(|e| ConfigError::Load(format!("config build error: {e}")))?
            .try_deserialize()
            .map_err(|e| ConfigError::Load(format!("config deserialize error: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LegalConfig::default();
        assert_eq!(config.refresh_interval, Duration::from_secs(60));
        assert_eq!(config.retry.initial_interval, Duration::from_secs(1));
        assert_eq!(config.retry.max_elapsed_time, Duration::from_secs(60));
        assert_eq!(config.refresh_backoff.max, Duration::from_secs(60));
        assert!(config.publisher_namespace.is_empty());
        assert!(!config.debug);
    }

    #[test]
    fn test_builder() {
        let config = LegalConfig::new("https://legal.example.com")
            .with_publisher_namespace("publisher")
            .with_refresh_interval(Duration::from_secs(30))
            .with_debug(true)
            .with_request_timeout(Duration::from_secs(2));

        assert_eq!(config.base_url, "https://legal.example.com");
        assert_eq!(config.publisher_namespace, "publisher");
        assert_eq!(config.cache_ttl(), Duration::from_secs(30));
        assert_eq!(config.cleanup_interval(), Duration::from_secs(60));
        assert!(config.debug);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_refresh_interval_uses_default() {
        let config = LegalConfig::new("https://legal.example.com").with_refresh_interval(Duration::ZERO);
        assert_eq!(config.effective_refresh_interval(), DEFAULT_REFRESH_INTERVAL);
        assert_eq!(config.cleanup_interval(), Duration::from_secs(120));
    }

    #[test]
    fn test_validate_base_url() {
        assert!(matches!(
            LegalConfig::default().validate(),
            Err(ConfigError::Missing(_))
        ));
        assert!(matches!(
            LegalConfig::new("legal.example.com").validate(),
            Err(ConfigError::InvalidValue(_))
        ));
        assert!(matches!(
            LegalConfig::new("ftp://legal.example.com").validate(),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_validate_retry_and_backoff() {
        let mut config = LegalConfig::new("http://localhost:8080");
        config.retry.multiplier = 0.5;
        assert!(config.validate().is_err());

        let mut config = LegalConfig::new("http://localhost:8080");
        config.refresh_backoff.max = Duration::from_millis(1);
        assert!(config.validate().is_err());

        let mut config = LegalConfig::new("http://localhost:8080");
        config.retry.max_elapsed_time = Duration::ZERO;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialize_humantime() {
        let json = r#"{
            "base_url": "https://legal.example.com",
            "refresh_interval": "2m",
            "retry": {"initial_interval": "500ms"}
        }"#;
        let config: LegalConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.refresh_interval, Duration::from_secs(120));
        assert_eq!(config.retry.initial_interval, Duration::from_millis(500));
        assert_eq!(config.retry.multiplier, 2.0);
        assert_eq!(config.request_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legal.toml");
        std::fs::write(
            &path,
            "base_url = \"https://legal.example.com\"\npublisher_namespace = \"pub\"\nrefresh_interval = \"45s\"\n",
        )
        .unwrap();

        let config = loader::load_config(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(config.publisher_namespace, "pub");
        assert_eq!(config.refresh_interval, Duration::from_secs(45));
    }

    #[test]
    fn test_load_config_missing_explicit_file() {
        let err = loader::load_config(Some("/definitely/not/here/legal.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Load(_)));
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::InvalidValue("test error".to_string());
        assert_eq!(err.to_string(), "Invalid configuration value: test error");

        let err = ConfigError::Missing("base_url".to_string());
        assert_eq!(err.to_string(), "Missing required configuration: base_url");
    }
}
