//! Signed, expiring access tokens.
//!
//! A token is the base64url (no padding) postcard encoding of
//!
//! ```text
//! version: u8 | key_id: [u8; 8] | claims | tag: [u8; 32]
//! ```
//!
//! where `tag` is HMAC-SHA256, under the key named by `key_id`, of the
//! postcard bytes of `version | key_id | claims`. The key id lets the
//! verifier pick the signing key out of the keyring, so tokens signed before
//! a rotation keep verifying while their key is still held.

use std::{fmt, sync::Arc, time::Duration};

use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use modgarden_types::{
    AccountId, Clock, CredentialError, IdIssuer, KeyId, TokenId, codec,
    config::{ConfigError, CredentialConfig},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::{capability::CapabilitySet, keyring::Keyring};

/// Wire format version written into every token.
pub const TOKEN_FORMAT_VERSION: u8 = 1;

const BEARER_SCHEME: &str = "Bearer";

/// What a verified token asserts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Unique token id.
    pub token_id: TokenId,
    /// Account the token was issued to.
    pub subject: AccountId,
    /// Capabilities granted to the bearer.
    pub capabilities: CapabilitySet,
    /// Issuance instant, millisecond precision.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub issued_at: DateTime<Utc>,
    /// The token is rejected once the clock reads past this instant.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub expires_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct SignedPart<'a> {
    version: u8,
    key_id: KeyId,
    claims: &'a Claims,
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    version: u8,
    key_id: KeyId,
    claims: Claims,
    tag: [u8; 32],
}

/// An encoded access token as presented by a client.
///
/// `Debug` does not print the token.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    /// Wraps an encoded token.
    pub fn new(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    /// Extracts the token from an `Authorization: Bearer <token>` value.
    ///
    /// The scheme is matched case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::TokenMalformed`] if the value does not use
    /// the bearer scheme or carries no token.
    pub fn from_authorization_header(value: &str) -> Result<Self, CredentialError> {
        let value = value.trim();
        let (scheme, token) = value.split_once(' ').unwrap_or((value, ""));
        if !scheme.eq_ignore_ascii_case(BEARER_SCHEME) {
            return Err(malformed("authorization scheme is not Bearer"));
        }
        let token = token.trim();
        if token.is_empty() {
            return Err(malformed("bearer token is empty"));
        }
        Ok(Self(token.to_string()))
    }

    /// The encoded token.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}

/// A freshly issued token and the claims it carries.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: AccessToken,
    pub claims: Claims,
}

/// Mints and verifies access tokens.
///
/// Owns the keyring for the life of the process. Both operations are
/// lock-free apart from the identifier issuer's brief critical section.
#[derive(Debug)]
pub struct CredentialIssuer {
    keyring: Arc<Keyring>,
    ids: Arc<IdIssuer>,
    clock: Arc<dyn Clock>,
    max_ttl: Duration,
    default_ttl: Duration,
}

impl CredentialIssuer {
    /// Creates an issuer over an existing keyring.
    pub fn new(
        keyring: Arc<Keyring>,
        ids: Arc<IdIssuer>,
        clock: Arc<dyn Clock>,
        max_ttl: Duration,
        default_ttl: Duration,
    ) -> Self {
        Self { keyring, ids, clock, max_ttl, default_ttl: default_ttl.min(max_ttl) }
    }

    /// Creates an issuer from credential configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if the configuration is invalid or
    /// a key does not decode.
    pub fn from_config(
        config: &CredentialConfig,
        ids: Arc<IdIssuer>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let keyring = Arc::new(Keyring::from_config(config)?);
        Ok(Self::new(keyring, ids, clock, config.max_ttl, config.default_ttl))
    }

    /// Keyring used for signing and verification.
    pub fn keyring(&self) -> &Arc<Keyring> {
        &self.keyring
    }

    pub fn max_ttl(&self) -> Duration {
        self.max_ttl
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Issues a token for `subject` valid for `ttl`.
    ///
    /// # Errors
    ///
    /// - [`CredentialError::InvalidTtl`] if `ttl` is zero or above the
    ///   configured maximum.
    /// - [`CredentialError::TokenIdUnavailable`] if the identifier issuer
    ///   fails.
    #[instrument(skip_all, fields(subject = %subject, ttl = ?ttl))]
    pub fn issue(
        &self,
        subject: &AccountId,
        capabilities: CapabilitySet,
        ttl: Duration,
    ) -> Result<IssuedToken, CredentialError> {
        let invalid_ttl = || CredentialError::InvalidTtl { requested: ttl, max: self.max_ttl };
        if ttl.is_zero() || ttl > self.max_ttl {
            return Err(invalid_ttl());
        }

        let issued_at = self.clock.now().trunc_subsecs(3);
        let expires_at = TimeDelta::from_std(ttl)
            .ok()
            .and_then(|ttl| issued_at.checked_add_signed(ttl))
            .ok_or_else(invalid_ttl)?;
        let token_id = self
            .ids
            .next_token_id()
            .map_err(|source| CredentialError::TokenIdUnavailable { source })?;

        let claims =
            Claims { token_id, subject: subject.clone(), capabilities, issued_at, expires_at };

        let keys = self.keyring.load();
        let key = keys.current();
        let payload = signed_bytes(key.id(), &claims)?;
        let tag = key.sign(&payload);
        let envelope = Envelope { version: TOKEN_FORMAT_VERSION, key_id: key.id(), claims, tag };
        let token = codec::encode_text(&envelope).map_err(|e| malformed(e.to_string()))?;

        debug!(token_id = %envelope.claims.token_id, key_id = %key.id(), "Issued access token");
        Ok(IssuedToken { token: AccessToken(token), claims: envelope.claims })
    }

    /// Issues a token with the configured default lifetime.
    ///
    /// # Errors
    ///
    /// See [`issue`](Self::issue).
    pub fn issue_default(
        &self,
        subject: &AccountId,
        capabilities: CapabilitySet,
    ) -> Result<IssuedToken, CredentialError> {
        self.issue(subject, capabilities, self.default_ttl)
    }

    /// Checks a token's signature, then its expiry.
    ///
    /// # Errors
    ///
    /// - [`CredentialError::TokenMalformed`] if the token does not decode or
    ///   uses an unknown format version.
    /// - [`CredentialError::SignatureInvalid`] if no held key produced the
    ///   tag.
    /// - [`CredentialError::TokenExpired`] if the signature is valid but the
    ///   clock reads past the expiry instant.
    #[instrument(skip_all)]
    pub fn verify(&self, token: &AccessToken) -> Result<Claims, CredentialError> {
        self.check(token).inspect_err(|e| {
            warn!(error = %e, code = e.code().as_u16(), "Rejected access token");
        })
    }

    fn check(&self, token: &AccessToken) -> Result<Claims, CredentialError> {
        let envelope: Envelope =
            codec::decode_text(token.as_str()).map_err(|e| malformed(e.to_string()))?;
        if envelope.version != TOKEN_FORMAT_VERSION {
            return Err(malformed(format!("unsupported token version {}", envelope.version)));
        }

        let keys = self.keyring.load();
        let key = keys.find(&envelope.key_id).ok_or(CredentialError::SignatureInvalid)?;
        let payload = signed_bytes(envelope.key_id, &envelope.claims)?;
        if !key.verify(&payload, &envelope.tag) {
            return Err(CredentialError::SignatureInvalid);
        }

        if self.clock.now() > envelope.claims.expires_at {
            return Err(CredentialError::TokenExpired { expired_at: envelope.claims.expires_at });
        }
        Ok(envelope.claims)
    }
}

fn signed_bytes(key_id: KeyId, claims: &Claims) -> Result<Vec<u8>, CredentialError> {
    codec::encode(&SignedPart { version: TOKEN_FORMAT_VERSION, key_id, claims })
        .map_err(|e| malformed(e.to_string()))
}

fn malformed(reason: impl Into<String>) -> CredentialError {
    CredentialError::TokenMalformed { reason: reason.into() }
}
