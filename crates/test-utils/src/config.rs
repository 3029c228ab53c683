//! Configuration fixtures.

// Fixtures are valid by construction; a failure is a bug in the fixture.
#![allow(clippy::expect_used)]

use std::time::Duration;

use modgarden_types::config::{CoreConfig, CredentialConfig, IdentityConfig, SecretKeyConfig};

/// Current signing key used by [`test_credential_config`].
pub const TEST_SIGNING_KEY: [u8; 32] = [7; 32];

/// Retired signing key used by [`test_credential_config`].
pub const TEST_PREVIOUS_KEY: [u8; 32] = [9; 32];

/// Credential settings with fixed keys, a 1h maximum TTL and a 15m default.
#[must_use]
pub fn test_credential_config() -> CredentialConfig {
    TestCredentialConfig::builder().build().into_config()
}

/// Full core configuration on worker 1 using [`test_credential_config`].
#[must_use]
pub fn test_core_config() -> CoreConfig {
    CoreConfig {
        identity: IdentityConfig::builder().worker_id(1).build().expect("valid identity config"),
        credentials: test_credential_config(),
        logging: Default::default(),
    }
}

/// Overridable credential fixture.
///
/// ```
/// use std::time::Duration;
/// use modgarden_test_utils::TestCredentialConfig;
///
/// let config =
///     TestCredentialConfig::builder().max_ttl(Duration::from_secs(60)).build().into_config();
/// assert_eq!(config.max_ttl, Duration::from_secs(60));
/// ```
#[derive(Debug, Clone, bon::Builder)]
pub struct TestCredentialConfig {
    /// Longest TTL a token may be issued with.
    #[builder(default = Duration::from_secs(3600))]
    pub max_ttl: Duration,
    /// TTL used when a caller does not ask for one; clamped to `max_ttl`.
    #[builder(default = Duration::from_secs(900))]
    pub default_ttl: Duration,
    /// Raw current signing key.
    #[builder(default = TEST_SIGNING_KEY.to_vec())]
    pub signing_key: Vec<u8>,
    /// Raw retired keys still accepted for verification.
    #[builder(default = vec![TEST_PREVIOUS_KEY.to_vec()])]
    pub previous_keys: Vec<Vec<u8>>,
}

impl TestCredentialConfig {
    /// Converts the fixture into a validated [`CredentialConfig`].
    ///
    /// # Panics
    ///
    /// Panics if the overrides do not form a valid configuration.
    #[must_use]
    pub fn into_config(self) -> CredentialConfig {
        CredentialConfig::builder()
            .max_ttl(self.max_ttl)
            .default_ttl(self.default_ttl.min(self.max_ttl))
            .signing_key(SecretKeyConfig::from_bytes(&self.signing_key))
            .previous_keys(
                self.previous_keys.iter().map(|key| SecretKeyConfig::from_bytes(key)).collect(),
            )
            .build()
            .expect("valid credential config")
    }
}
