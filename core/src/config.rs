//! Configuration loading
//!
//! Layers, lowest priority first:
//! 1. Built-in defaults
//! 2. TOML file (`hexlogic.toml`, or `HEXLOGIC_CONFIG_PATH`)
//! 3. Environment variables (`HEXLOGIC_SERVICE__URL`, `HEXLOGIC_RUN__SPEED`, ...)
//! 4. Explicit builder overrides

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "hexlogic.toml";
pub const CONFIG_PATH_ENV: &str = "HEXLOGIC_CONFIG_PATH";
const ENV_PREFIX: &str = "HEXLOGIC";

pub const MIN_SPEED: u8 = 1;
pub const MAX_SPEED: u8 = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("config file not found: {}", .0.display())]
    MissingFile(PathBuf),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Simulator service connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_service_url")]
    pub url: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

/// Run loop pacing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// 1 (slowest) to 10 (fastest)
    #[serde(default = "default_speed")]
    pub speed: u8,
    /// Floor for the delay between steps
    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,
    /// Consecutive steps before a run gives up; 0 means no limit
    #[serde(default = "default_max_steps")]
    pub max_steps: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_command_buffer")]
    pub command_buffer: usize,
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
    #[serde(default = "default_console_history")]
    pub console_history: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

fn default_service_url() -> String {
    "http://127.0.0.1:5000".to_string()
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_speed() -> u8 {
    6
}

fn default_min_delay_ms() -> u64 {
    15
}

fn default_max_steps() -> u64 {
    100_000
}

fn default_command_buffer() -> usize {
    32
}

fn default_event_buffer() -> usize {
    256
}

fn default_console_history() -> usize {
    500
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            url: default_service_url(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            speed: default_speed(),
            min_delay_ms: default_min_delay_ms(),
            max_steps: default_max_steps(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            command_buffer: default_command_buffer(),
            event_buffer: default_event_buffer(),
            console_history: default_console_history(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

impl ServiceConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl RunConfig {
    /// Delay between run loop steps for the configured speed
    pub fn step_delay(&self) -> Duration {
        step_delay(self.speed, self.min_delay_ms)
    }

    /// `None` when the step cap is disabled
    pub fn step_limit(&self) -> Option<u64> {
        (self.max_steps > 0).then_some(self.max_steps)
    }
}

/// `max(min_delay, 420 - 38 * speed)` milliseconds, with speed clamped to 1..=10
pub fn step_delay(speed: u8, min_delay_ms: u64) -> Duration {
    let speed = speed.clamp(MIN_SPEED, MAX_SPEED) as u64;
    let scaled = 420u64.saturating_sub(speed * 38);
    Duration::from_millis(scaled.max(min_delay_ms))
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Load from the default sources with no overrides
    pub fn load() -> Result<Self, ConfigError> {
        Self::builder().build()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service.url.trim().is_empty() {
            return Err(ConfigError::Invalid("service.url must not be empty".into()));
        }
        if !(MIN_SPEED..=MAX_SPEED).contains(&self.run.speed) {
            return Err(ConfigError::Invalid(format!(
                "run.speed must be between {} and {}, got {}",
                MIN_SPEED, MAX_SPEED, self.run.speed
            )));
        }
        if self.session.command_buffer == 0 || self.session.event_buffer == 0 {
            return Err(ConfigError::Invalid(
                "session buffers must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

/// Builder for loading configuration with explicit overrides
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    service_url: Option<String>,
    config_path: Option<PathBuf>,
}

impl ConfigBuilder {
    pub fn service_url(mut self, url: Option<String>) -> Self {
        self.service_url = url;
        self
    }

    pub fn config_path(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    pub fn build(self) -> Result<Config, ConfigError> {
        dotenvy::dotenv().ok();

        let explicit_path = self
            .config_path
            .or_else(|| std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from));

        let mut builder = config::Config::builder();

        match explicit_path {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::MissingFile(path));
                }
                builder = builder.add_source(config::File::from(path.as_path()));
            }
            None => {
                builder = builder
                    .add_source(config::File::from(Path::new(DEFAULT_CONFIG_FILE)).required(false));
            }
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        builder = builder.set_override_option("service.url", self.service_url)?;

        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }
}
