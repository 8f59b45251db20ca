//! Configuration management with hierarchical overrides using figment.
//!
//! Supports multiple configuration sources with precedence:
//! 1. Command-line flags (highest precedence, applied by each binary)
//! 2. Environment variables (`FALLWATCH_CONSOLE_*`, `FALLSIM_*`, `FALLWATCH_CLI_*`)
//! 3. An explicit `--config` file, when given
//! 4. User configuration file (~/.config/fallwatch/config.toml)
//! 5. System configuration file (/etc/fallwatch/config.toml)
//! 6. Embedded defaults (lowest precedence)

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Invalid configuration format: {0}")]
    InvalidFormat(#[from] figment::Error),

    #[error("IO error reading configuration: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration validation failed: {message}")]
    ValidationError { message: String },
}

/// Main configuration structure for FallWatch components.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Config {
    /// Message broker connection
    pub broker: BrokerConfig,
    /// Patient datastore
    pub database: DatabaseConfig,
    /// Operator console pipeline
    pub console: ConsoleConfig,
    /// Device simulator
    pub simulator: SimulatorConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Message broker connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BrokerConfig {
    /// Broker host name
    pub host: String,
    /// Broker TCP port
    pub port: u16,
    /// Prefix for generated MQTT client ids
    pub client_id_prefix: String,
    /// Prefix for every telemetry topic
    pub topic_prefix: String,
    /// MQTT keep-alive in seconds
    pub keep_alive_secs: u64,
    /// Upper bound for a single connect attempt
    pub connect_timeout_ms: u64,
    /// Connect attempts before giving up
    pub connect_attempts: u32,
    /// Initial retry delay, doubled per failed attempt
    pub retry_backoff_ms: u64,
    /// Outgoing request buffer of the MQTT client
    pub request_capacity: usize,
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// Database file path
    pub path: PathBuf,
}

/// Operator console pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConsoleConfig {
    /// Reconciliation tick period
    pub sync_interval_ms: u64,
    /// Pending datastore updates before new ones are dropped
    pub persistence_queue_capacity: usize,
    /// How often the known patient set is re-read for subscriptions
    pub patient_refresh_interval_ms: u64,
    /// Decode the whole id segment of a topic instead of its first character
    pub full_id_decode: bool,
}

/// Device simulator settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SimulatorConfig {
    /// Number of simulated devices
    pub devices: u32,
    /// Acceleration publish period while enabled
    pub acceleration_interval_ms: u64,
    /// Heart-rate publish period while enabled
    pub heartrate_interval_ms: u64,
    /// Location publish period while enabled
    pub location_interval_ms: u64,
    /// Poll period of a disabled device
    pub disabled_poll_interval_ms: u64,
    /// Lowest simulated heart rate, inclusive
    pub heartrate_min: u32,
    /// Highest simulated heart rate, inclusive
    pub heartrate_max: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, human)
    pub format: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "broker.mqttdashboard.com".to_owned(),
            port: 1883,
            client_id_prefix: "fallwatch".to_owned(),
            topic_prefix: "BS2203FD".to_owned(),
            keep_alive_secs: 30,
            connect_timeout_ms: 5000,
            connect_attempts: 5,
            retry_backoff_ms: 500,
            request_capacity: 64,
        }
    }
}

impl BrokerConfig {
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./clients.redb"),
        }
    }
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            sync_interval_ms: 300,
            persistence_queue_capacity: 1024,
            patient_refresh_interval_ms: 10_000,
            full_id_decode: false,
        }
    }
}

impl ConsoleConfig {
    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms)
    }

    pub fn patient_refresh_interval(&self) -> Duration {
        Duration::from_millis(self.patient_refresh_interval_ms)
    }
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            devices: 4,
            acceleration_interval_ms: 1000,
            heartrate_interval_ms: 5000,
            location_interval_ms: 30_000,
            disabled_poll_interval_ms: 1000,
            heartrate_min: 50,
            heartrate_max: 80,
        }
    }
}

impl SimulatorConfig {
    pub fn acceleration_interval(&self) -> Duration {
        Duration::from_millis(self.acceleration_interval_ms)
    }

    pub fn heartrate_interval(&self) -> Duration {
        Duration::from_millis(self.heartrate_interval_ms)
    }

    pub fn location_interval(&self) -> Duration {
        Duration::from_millis(self.location_interval_ms)
    }

    pub fn disabled_poll_interval(&self) -> Duration {
        Duration::from_millis(self.disabled_poll_interval_ms)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "human".to_owned(),
        }
    }
}

/// Configuration loader with hierarchical override support.
pub struct ConfigLoader {
    component: String,
    explicit_file: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new configuration loader for the specified component.
    pub fn new(component: &str) -> Self {
        Self {
            component: component.to_owned(),
            explicit_file: None,
        }
    }

    /// Layer an explicit configuration file above the system and user files.
    #[must_use]
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.explicit_file = Some(path.into());
        self
    }

    /// Load configuration with hierarchical overrides using figment.
    pub fn load(&self) -> Result<Config, ConfigError> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        let system_config_path = Path::new("/etc/fallwatch/config.toml");
        if system_config_path.exists() {
            figment = figment.merge(Toml::file(system_config_path));
        }

        let user_config_path = Self::user_config_path();
        if user_config_path.exists() {
            figment = figment.merge(Toml::file(&user_config_path));
        }

        if let Some(path) = &self.explicit_file {
            if !path.exists() {
                return Err(ConfigError::FileNotFound { path: path.clone() });
            }
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(Env::prefixed(&self.env_prefix()).split("__"));

        let config = figment.extract()?;
        Self::validate_config(&config)?;
        Ok(config)
    }

    /// Environment variable prefix for this component, e.g. `FALLSIM_`.
    fn env_prefix(&self) -> String {
        format!("{}_", self.component.replace('-', "_").to_uppercase())
    }

    /// Get the user configuration file path using platform-aware directory lookup.
    fn user_config_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            return config_dir.join("fallwatch").join("config.toml");
        }

        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join(".config")
                .join("fallwatch")
                .join("config.toml");
        }

        PathBuf::from("/tmp")
            .join(".config")
            .join("fallwatch")
            .join("config.toml")
    }

    /// Validate the final configuration.
    pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
        let fail = |message: &str| {
            Err(ConfigError::ValidationError {
                message: message.to_owned(),
            })
        };

        if config.broker.topic_prefix.is_empty() {
            return fail("broker.topic_prefix must not be empty");
        }
        if config.broker.topic_prefix.contains(['?', '/', '+', '#']) {
            return fail("broker.topic_prefix must not contain '?', '/', '+' or '#'");
        }
        if config.broker.connect_attempts == 0 {
            return fail("broker.connect_attempts must be greater than 0");
        }
        if config.broker.request_capacity == 0 {
            return fail("broker.request_capacity must be greater than 0");
        }
        if config.console.sync_interval_ms == 0 {
            return fail("console.sync_interval_ms must be greater than 0");
        }
        if config.console.persistence_queue_capacity == 0 {
            return fail("console.persistence_queue_capacity must be greater than 0");
        }
        if config.console.patient_refresh_interval_ms == 0 {
            return fail("console.patient_refresh_interval_ms must be greater than 0");
        }

        let sim = &config.simulator;
        if sim.acceleration_interval_ms == 0
            || sim.heartrate_interval_ms == 0
            || sim.location_interval_ms == 0
            || sim.disabled_poll_interval_ms == 0
        {
            return fail("simulator intervals must be greater than 0");
        }
        if sim.heartrate_min > sim.heartrate_max {
            return fail("simulator.heartrate_min must not exceed simulator.heartrate_max");
        }

        Ok(())
    }
}
