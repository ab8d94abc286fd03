//! Configuration loading and typed config structures.
//!
//! A harness configuration is a small YAML document:
//!
//! ```yaml
//! clock:
//!   start_time: 86400.0
//! poll:
//!   default_interest: [pollin, pollpri, pollout]
//! logging:
//!   level: info
//! ```
//!
//! Every field is optional. The `TIME_TRAVEL_START_TIME` environment
//! variable overrides `clock.start_time`.

use std::path::Path;

use serde::Deserialize;
use time_travel_types::PollFlags;

use crate::clock::DEFAULT_START_TIME;

/// Environment variable overriding [`ClockConfig::start_time`].
pub const START_TIME_ENV: &str = "TIME_TRAVEL_START_TIME";

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// The configuration parsed but holds an unusable value.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// Explanation of what is wrong with the configuration.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level harness configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TimeTravelConfig {
    /// Virtual clock settings.
    #[serde(default)]
    pub clock: ClockConfig,

    /// Poll resolver settings.
    #[serde(default)]
    pub poll: PollConfig,

    /// Logging settings (read by binaries that install a subscriber).
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl TimeTravelConfig {
    /// Load and validate configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if it is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value fails validation.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse and validate configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value fails validation.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yml::from_str(yaml)?;
        config.clock.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Check every value for consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.clock.validate()?;
        self.poll.interest_mask()?;
        Ok(())
    }
}

/// Virtual clock configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ClockConfig {
    /// Initial virtual time in seconds since the Unix epoch.
    #[serde(default = "default_start_time")]
    pub start_time: f64,
}

impl ClockConfig {
    /// Override `start_time` from the environment, if set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the variable is not a number.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(val) = std::env::var(START_TIME_ENV) {
            self.start_time = val.trim().parse().map_err(|err| ConfigError::Invalid {
                reason: format!("{START_TIME_ENV}={val:?} is not a number: {err}"),
            })?;
        }
        Ok(())
    }

    /// Check that `start_time` is a usable start for a clock.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if it is not finite or is before
    /// [`DEFAULT_START_TIME`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.start_time.is_finite() {
            return Err(ConfigError::Invalid {
                reason: format!(
                    "clock.start_time must be a finite number (got {})",
                    self.start_time
                ),
            });
        }
        if self.start_time < DEFAULT_START_TIME {
            return Err(ConfigError::Invalid {
                reason: format!(
                    "clock.start_time must be at least {DEFAULT_START_TIME} (got {})",
                    self.start_time
                ),
            });
        }
        Ok(())
    }
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            start_time: default_start_time(),
        }
    }
}

/// Poll resolver configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PollConfig {
    /// Flag names used when a descriptor is registered without a mask.
    #[serde(default = "default_interest")]
    pub default_interest: Vec<String>,
}

impl PollConfig {
    /// Resolve [`default_interest`](Self::default_interest) into flags.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for an empty list or an unknown
    /// flag name.
    pub fn interest_mask(&self) -> Result<PollFlags, ConfigError> {
        if self.default_interest.is_empty() {
            return Err(ConfigError::Invalid {
                reason: "poll.default_interest must name at least one flag".to_owned(),
            });
        }
        self.default_interest
            .iter()
            .try_fold(PollFlags::empty(), |mask, name| {
                PollFlags::from_flag_name(name)
                    .map(|flag| mask | flag)
                    .ok_or_else(|| ConfigError::Invalid {
                        reason: format!("unknown poll flag: {name}"),
                    })
            })
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            default_interest: default_interest(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Default `tracing` filter directive when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions (serde default requires named functions)
// ---------------------------------------------------------------------------

const fn default_start_time() -> f64 {
    DEFAULT_START_TIME
}

fn default_interest() -> Vec<String> {
    vec![
        "pollin".to_owned(),
        "pollpri".to_owned(),
        "pollout".to_owned(),
    ]
}

fn default_log_level() -> String {
    "info".to_owned()
}
