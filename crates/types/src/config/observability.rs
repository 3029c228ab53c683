//! Logging configuration.

use std::{fmt, str::FromStr};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Output format for log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON when the log output is not a terminal, text otherwise.
    #[default]
    Auto,
    /// One JSON object per event.
    Json,
    /// Human-readable text.
    Text,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Auto => write!(f, "auto"),
            LogFormat::Json => write!(f, "json"),
            LogFormat::Text => write!(f, "text"),
        }
    }
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(LogFormat::Auto),
            "json" => Ok(LogFormat::Json),
            "text" => Ok(LogFormat::Text),
            other => Err(ConfigError::Validation {
                message: format!("unknown log format {other:?}, expected auto, json, or text"),
            }),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

/// Logging configuration.
///
/// `level` is an `EnvFilter` directive used when `RUST_LOG` is unset.
///
/// # Example
///
/// ```no_run
/// # use modgarden_types::config::{LogFormat, LoggingConfig};
/// let config = LoggingConfig::builder()
///     .level("modgarden_schema=debug,info".to_string())
///     .format(LogFormat::Json)
///     .build()
///     .expect("valid logging config");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct LoggingConfig {
    /// Default filter directive.
    #[serde(default = "default_level")]
    pub level: String,
    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_level(), format: LogFormat::default() }
    }
}

#[bon::bon]
impl LoggingConfig {
    /// Creates a new logging configuration with validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if `level` is empty.
    #[builder]
    pub fn new(
        #[builder(default = default_level())] level: String,
        #[builder(default)] format: LogFormat,
    ) -> Result<Self, ConfigError> {
        let config = Self { level, format };
        config.validate()?;
        Ok(config)
    }
}

impl LoggingConfig {
    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if `level` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.level.trim().is_empty() {
            return Err(ConfigError::Validation {
                message: "logging level must not be empty".to_string(),
            });
        }
        Ok(())
    }
}
