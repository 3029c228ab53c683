//! Configuration types for the Mod Garden record pipeline.
//!
//! Configuration is loaded from a TOML file, with selected values overridable
//! from the command line and environment. Each section validates its values
//! at construction time via a fallible builder; `validate()` covers values
//! that arrived through deserialization instead.

// The schemars `JsonSchema` derive expands to code using `.unwrap()`.
#![allow(clippy::disallowed_methods)]

mod credential;
mod document;
mod identity;
mod observability;

pub use credential::*;
pub use document::*;
pub use identity::*;
pub use observability::*;
use snafu::Snafu;

/// Configuration error.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// A configuration value is invalid.
    #[snafu(display("invalid config: {message}"))]
    Validation {
        /// Description of the validation failure.
        message: String,
    },

    /// The configuration document could not be parsed.
    #[snafu(display("config parse error: {message}"))]
    Parse {
        /// Parser diagnostic.
        message: String,
    },
}

/// Duration serialization using humantime format ("15m", "1h 30m").
mod humantime_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
