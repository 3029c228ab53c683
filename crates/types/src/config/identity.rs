use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::snowflake::WORKER_MASK;

/// Identifier issuer configuration.
///
/// # Validation Rules
///
/// - `worker_id`, when set, must fit in 12 bits (0-4095)
///
/// # Example
///
/// ```no_run
/// # use modgarden_types::config::IdentityConfig;
/// let config = IdentityConfig::builder()
///     .worker_id(7)
///     .build()
///     .expect("valid identity config");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct IdentityConfig {
    /// Worker discriminator embedded in every issued identifier.
    ///
    /// Processes sharing a store should use distinct values. When unset, a
    /// value is derived from OS entropy and the process ID at startup.
    #[serde(default)]
    pub worker_id: Option<u16>,
}

#[bon::bon]
impl IdentityConfig {
    /// Creates a new identity configuration with validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if `worker_id` exceeds 4095.
    #[builder]
    pub fn new(worker_id: Option<u16>) -> Result<Self, ConfigError> {
        let config = Self { worker_id };
        config.validate()?;
        Ok(config)
    }
}

impl IdentityConfig {
    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if any value is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(worker_id) = self.worker_id
            && u64::from(worker_id) > WORKER_MASK
        {
            return Err(ConfigError::Validation {
                message: format!("worker_id must be <= {WORKER_MASK}, got {worker_id}"),
            });
        }
        Ok(())
    }
}
