use std::{fmt, time::Duration};

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Minimum decoded signing key length in bytes.
pub const MIN_SIGNING_KEY_BYTES: usize = 32;

/// Upper bound for `max_ttl` (30 days).
const MAX_TTL_CEILING: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Default maximum token lifetime (1 hour).
fn default_max_ttl() -> Duration {
    Duration::from_secs(60 * 60)
}

/// Default token lifetime when the caller does not ask for one (15 minutes).
fn default_default_ttl() -> Duration {
    Duration::from_secs(15 * 60)
}

/// Signing key material.
///
/// The key is base64 (URL-safe alphabet, no padding) and must decode to at
/// least 32 bytes. `Debug` never prints the key.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SecretKeyConfig {
    /// Base64url-encoded key bytes.
    pub key: String,
    /// When the key stopped being the current signing key.
    ///
    /// Only meaningful for previous keys; once `retired_at + max_ttl` has
    /// passed no live token can carry the key and it is dropped.
    #[serde(default)]
    #[schemars(with = "Option<String>")]
    pub retired_at: Option<DateTime<Utc>>,
}

impl SecretKeyConfig {
    /// Creates key configuration from raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self { key: URL_SAFE_NO_PAD.encode(bytes), retired_at: None }
    }

    /// Decodes the key bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if the key is not base64url or
    /// decodes to fewer than [`MIN_SIGNING_KEY_BYTES`] bytes.
    pub fn decode(&self) -> Result<Vec<u8>, ConfigError> {
        let bytes = URL_SAFE_NO_PAD.decode(self.key.trim()).map_err(|e| {
            ConfigError::Validation { message: format!("signing key is not base64url: {e}") }
        })?;
        if bytes.len() < MIN_SIGNING_KEY_BYTES {
            return Err(ConfigError::Validation {
                message: format!(
                    "signing key must decode to at least {MIN_SIGNING_KEY_BYTES} bytes, got {}",
                    bytes.len()
                ),
            });
        }
        Ok(bytes)
    }
}

impl fmt::Debug for SecretKeyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretKeyConfig")
            .field("key", &"<redacted>")
            .field("retired_at", &self.retired_at)
            .finish()
    }
}

/// Access token issuance configuration.
///
/// # Validation Rules
///
/// - `max_ttl` must be > 0 and <= 30 days
/// - `default_ttl` must be > 0 and <= `max_ttl`
/// - every key must decode to at least 32 bytes
///
/// # Example
///
/// ```no_run
/// # use std::time::Duration;
/// # use modgarden_types::config::{CredentialConfig, SecretKeyConfig};
/// let config = CredentialConfig::builder()
///     .signing_key(SecretKeyConfig::from_bytes(&[7u8; 32]))
///     .max_ttl(Duration::from_secs(3600))
///     .build()
///     .expect("valid credential config");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CredentialConfig {
    /// Longest lifetime a token may be issued with.
    #[serde(default = "default_max_ttl")]
    #[serde(with = "super::humantime_serde")]
    #[schemars(with = "String")]
    pub max_ttl: Duration,
    /// Lifetime used when the caller does not request one.
    #[serde(default = "default_default_ttl")]
    #[serde(with = "super::humantime_serde")]
    #[schemars(with = "String")]
    pub default_ttl: Duration,
    /// Key new tokens are signed with.
    pub signing_key: SecretKeyConfig,
    /// Retired keys still accepted for verification.
    #[serde(default)]
    pub previous_keys: Vec<SecretKeyConfig>,
}

#[bon::bon]
impl CredentialConfig {
    /// Creates a new credential configuration with validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if any rule listed on the type is
    /// violated.
    #[builder]
    pub fn new(
        signing_key: SecretKeyConfig,
        #[builder(default)] previous_keys: Vec<SecretKeyConfig>,
        #[builder(default = default_max_ttl())] max_ttl: Duration,
        #[builder(default = default_default_ttl())] default_ttl: Duration,
    ) -> Result<Self, ConfigError> {
        let config = Self { max_ttl, default_ttl, signing_key, previous_keys };
        config.validate()?;
        Ok(config)
    }
}

impl CredentialConfig {
    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if any value is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_ttl.is_zero() || self.max_ttl > MAX_TTL_CEILING {
            return Err(ConfigError::Validation {
                message: format!(
                    "max_ttl must be > 0 and <= {}, got {}",
                    humantime::format_duration(MAX_TTL_CEILING),
                    humantime::format_duration(self.max_ttl)
                ),
            });
        }
        if self.default_ttl.is_zero() || self.default_ttl > self.max_ttl {
            return Err(ConfigError::Validation {
                message: format!(
                    "default_ttl ({}) must be > 0 and <= max_ttl ({})",
                    humantime::format_duration(self.default_ttl),
                    humantime::format_duration(self.max_ttl)
                ),
            });
        }
        self.signing_key.decode()?;
        for (index, key) in self.previous_keys.iter().enumerate() {
            key.decode().map_err(|e| ConfigError::Validation {
                message: format!("previous_keys[{index}]: {e}"),
            })?;
        }
        Ok(())
    }
}
