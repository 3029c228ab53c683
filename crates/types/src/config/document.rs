//! Top-level configuration file layout.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{ConfigError, CredentialConfig, IdentityConfig, LoggingConfig};

/// Complete configuration loaded from a TOML file.
///
/// ```toml
/// [identity]
/// worker_id = 3
///
/// [credentials]
/// max_ttl = "1h"
/// default_ttl = "15m"
/// signing_key = { key = "..." }
///
/// [logging]
/// level = "info"
/// format = "json"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CoreConfig {
    /// Identifier issuer settings.
    #[serde(default)]
    pub identity: IdentityConfig,
    /// Access token settings.
    pub credentials: CredentialConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl CoreConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML and
    /// [`ConfigError::Validation`] for out-of-range values.
    pub fn from_toml(source: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(source).map_err(|e| ConfigError::Parse { message: e.to_string() })?;
        config.validate()?;
        Ok(config)
    }

    /// Validates every section.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError::Validation`] encountered.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.identity.validate()?;
        self.credentials.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}
