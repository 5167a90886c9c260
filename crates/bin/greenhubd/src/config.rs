//! Configuration loading: TOML file with environment variable overrides.
//!
//! Looks for `greenhub.toml` in the working directory, or the file named by
//! `GREENHUB_CONFIG`. Every field has a sensible default so the file is
//! optional. Environment variables take precedence over file values.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use chrono::FixedOffset;
use serde::Deserialize;

use greenhub_app::evaluation_loop::EngineSettings;
use greenhub_app::failsafe::DEFAULT_FAILURE_THRESHOLD;
use greenhub_app::services::logic_version_service::DEFAULT_MAX_VERSIONS;
use greenhub_domain::channel::{ActuatorChannel, ActuatorKind};
use greenhub_domain::id::DeviceId;
use greenhub_domain::logic::{DEFAULT_INTERVAL_MS, DEFAULT_STALENESS_SECS, MIN_INTERVAL_MS};

const DEFAULT_PATH: &str = "greenhub.toml";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Evaluation engine settings.
    pub engine: EngineConfig,
    /// Database settings.
    pub database: DatabaseConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Actuator channels to drive.
    pub channels: Vec<ChannelConfig>,
}

/// Evaluation engine configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Tick interval for channels whose logic does not set one.
    pub default_interval_ms: u64,
    /// Readings older than this many seconds fail their conditions.
    pub staleness_secs: u64,
    /// Consecutive failed ticks before a channel falls back to failsafe.
    pub failsafe_threshold: u32,
    /// Versions kept per channel.
    pub max_versions: usize,
    /// Capacity of the claim intake queue.
    pub claim_queue: usize,
    /// Offset used for timer windows, e.g. `+02:00`. Host local time when
    /// unset.
    pub utc_offset: Option<String>,
}

/// `SQLite` database configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `SQLite` connection URL or file path.
    pub url: String,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

/// One actuator channel.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelConfig {
    pub device_id: DeviceId,
    pub gpio: u8,
    pub kind: ActuatorKind,
    /// Logic document imported at startup.
    #[serde(default)]
    pub logic: Option<PathBuf>,
}

impl ChannelConfig {
    #[must_use]
    pub fn actuator(&self) -> ActuatorChannel {
        ActuatorChannel::new(self.device_id.clone(), self.gpio, self.kind)
    }
}

impl Config {
    /// Load configuration from `greenhub.toml` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if the
    /// resulting configuration is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("GREENHUB_CONFIG").unwrap_or_else(|_| DEFAULT_PATH.to_string());
        let mut config = Self::from_file(&path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("GREENHUB_DATABASE_URL") {
            self.database.url = val;
        }
        if let Ok(val) = std::env::var("GREENHUB_LOG") {
            self.logging.filter = val;
        }
        if let Ok(val) = std::env::var("RUST_LOG") {
            self.logging.filter = val;
        }
        if let Ok(val) = std::env::var("GREENHUB_INTERVAL_MS")
            && let Ok(interval) = val.parse()
        {
            self.engine.default_interval_ms = interval;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let engine = &self.engine;
        if engine.default_interval_ms < MIN_INTERVAL_MS {
            return Err(ConfigError::Validation(format!(
                "default_interval_ms must be at least {MIN_INTERVAL_MS}"
            )));
        }
        if engine.staleness_secs == 0 {
            return Err(ConfigError::Validation(
                "staleness_secs must be non-zero".to_string(),
            ));
        }
        if engine.failsafe_threshold == 0 {
            return Err(ConfigError::Validation(
                "failsafe_threshold must be non-zero".to_string(),
            ));
        }
        if engine.max_versions == 0 {
            return Err(ConfigError::Validation(
                "max_versions must be non-zero".to_string(),
            ));
        }
        if engine.claim_queue == 0 {
            return Err(ConfigError::Validation(
                "claim_queue must be non-zero".to_string(),
            ));
        }
        self.utc_offset()?;

        let mut seen = HashSet::new();
        for channel in &self.channels {
            if !seen.insert((&channel.device_id, channel.gpio)) {
                return Err(ConfigError::Validation(format!(
                    "channel {}:{} is configured twice",
                    channel.device_id, channel.gpio
                )));
            }
        }
        Ok(())
    }

    fn utc_offset(&self) -> Result<Option<FixedOffset>, ConfigError> {
        self.engine
            .utc_offset
            .as_deref()
            .map(|raw| {
                raw.parse()
                    .map_err(|_| ConfigError::Validation(format!("invalid utc_offset `{raw}`")))
            })
            .transpose()
    }

    /// Settings for the evaluation loop.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if `utc_offset` cannot be parsed.
    pub fn engine_settings(&self) -> Result<EngineSettings, ConfigError> {
        let staleness = i64::try_from(self.engine.staleness_secs).unwrap_or(i64::MAX);
        Ok(EngineSettings {
            default_interval: Duration::from_millis(self.engine.default_interval_ms),
            staleness: chrono::Duration::seconds(staleness),
            failsafe_threshold: self.engine.failsafe_threshold,
            utc_offset: self.utc_offset()?,
        })
    }

    /// Return the database URL in `sqlx`-compatible format.
    #[must_use]
    pub fn database_url(&self) -> &str {
        &self.database.url
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_interval_ms: DEFAULT_INTERVAL_MS,
            staleness_secs: DEFAULT_STALENESS_SECS.unsigned_abs(),
            failsafe_threshold: DEFAULT_FAILURE_THRESHOLD,
            max_versions: DEFAULT_MAX_VERSIONS,
            claim_queue: 256,
            utc_offset: None,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:greenhub.db?mode=rwc".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "greenhubd=info,greenhub_app=info,sqlx=warn".to_string(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_produce_sensible_defaults() {
        let config = Config::default();
        assert_eq!(config.engine.default_interval_ms, 30_000);
        assert_eq!(config.engine.staleness_secs, 300);
        assert_eq!(config.engine.failsafe_threshold, 3);
        assert_eq!(config.engine.max_versions, 50);
        assert_eq!(config.engine.claim_queue, 256);
        assert_eq!(config.database.url, "sqlite:greenhub.db?mode=rwc");
        assert!(config.channels.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn should_parse_minimal_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.engine.default_interval_ms, 30_000);
    }

    #[test]
    fn should_parse_full_toml() {
        let toml = "
            [engine]
            default_interval_ms = 1000
            staleness_secs = 60
            failsafe_threshold = 5
            max_versions = 10
            claim_queue = 32
            utc_offset = '+02:00'

            [database]
            url = 'sqlite:test.db'

            [logging]
            filter = 'debug'

            [[channels]]
            device_id = 'esp32-a'
            gpio = 5
            kind = 'pump'
            logic = 'logic/pump.json'

            [[channels]]
            device_id = 'esp32-a'
            gpio = 18
            kind = 'led'
        ";
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.engine.default_interval_ms, 1000);
        assert_eq!(config.engine.failsafe_threshold, 5);
        assert_eq!(config.database.url, "sqlite:test.db");
        assert_eq!(config.logging.filter, "debug");
        assert_eq!(config.channels.len(), 2);
        assert_eq!(config.channels[0].kind, ActuatorKind::Pump);
        assert_eq!(
            config.channels[0].logic,
            Some(PathBuf::from("logic/pump.json"))
        );
        assert_eq!(config.channels[1].logic, None);
        assert_eq!(config.channels[1].actuator().id.gpio, 18);

        let settings = config.engine_settings().unwrap();
        assert_eq!(settings.default_interval, Duration::from_secs(1));
        assert_eq!(settings.staleness, chrono::Duration::seconds(60));
        assert_eq!(settings.utc_offset, FixedOffset::east_opt(2 * 3600));
    }

    #[test]
    fn should_return_default_when_file_not_found() {
        let config = Config::from_file("nonexistent.toml").unwrap();
        assert_eq!(config.engine.default_interval_ms, 30_000);
    }

    #[test]
    fn should_reject_zero_failsafe_threshold() {
        let mut config = Config::default();
        config.engine.failsafe_threshold = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn should_reject_interval_below_minimum() {
        let mut config = Config::default();
        config.engine.default_interval_ms = 0;
        assert!(config.validate().is_err());
        config.engine.default_interval_ms = MIN_INTERVAL_MS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn should_reject_duplicate_channels() {
        let toml = "
            [[channels]]
            device_id = 'esp32-a'
            gpio = 5
            kind = 'pump'

            [[channels]]
            device_id = 'esp32-a'
            gpio = 5
            kind = 'valve'
        ";
        let config: Config = toml::from_str(toml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("esp32-a:5"));
    }

    #[test]
    fn should_reject_invalid_utc_offset() {
        let mut config = Config::default();
        config.engine.utc_offset = Some("noon".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn should_reject_unknown_actuator_kind() {
        let toml = "
            [[channels]]
            device_id = 'esp32-a'
            gpio = 5
            kind = 'toaster'
        ";
        let result: Result<Config, _> = toml::from_str(toml);
        assert!(result.is_err());
    }

    #[test]
    fn should_report_parse_error_for_invalid_toml() {
        let result: Result<Config, _> = toml::from_str("invalid {{{");
        assert!(result.is_err());
    }
}
