//! Signing keys with lock-free rotation.
//!
//! Verification reads the key set through [`ArcSwap::load`] and never blocks.
//! Rotation and pruning build a new [`KeySet`] and swap it in whole, so a
//! reader sees either the old set or the new one.

use std::{fmt, sync::Arc, time::Duration};

use arc_swap::{ArcSwap, Guard};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use modgarden_types::{
    KeyId,
    config::{ConfigError, CredentialConfig, MIN_SIGNING_KEY_BYTES, SecretKeyConfig},
};
use sha2::Sha256;
use tracing::info;

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 key plus its public fingerprint.
#[derive(Clone)]
pub struct SigningKey {
    id: KeyId,
    mac: HmacSha256,
    retired_at: Option<DateTime<Utc>>,
}

impl SigningKey {
    /// Prepares a key from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if `secret` is shorter than
    /// [`MIN_SIGNING_KEY_BYTES`].
    pub fn new(secret: &[u8]) -> Result<Self, ConfigError> {
        if secret.len() < MIN_SIGNING_KEY_BYTES {
            return Err(ConfigError::Validation {
                message: format!(
                    "signing key is {} bytes, need at least {MIN_SIGNING_KEY_BYTES}",
                    secret.len()
                ),
            });
        }
        let mac = HmacSha256::new_from_slice(secret).map_err(|e| ConfigError::Validation {
            message: format!("signing key rejected: {e}"),
        })?;
        Ok(Self { id: KeyId::fingerprint(secret), mac, retired_at: None })
    }

    /// Decodes configured key material.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if the key does not decode.
    pub fn from_config(config: &SecretKeyConfig) -> Result<Self, ConfigError> {
        let mut key = Self::new(&config.decode()?)?;
        key.retired_at = config.retired_at;
        Ok(key)
    }

    /// Fingerprint carried in tokens signed by this key.
    pub fn id(&self) -> KeyId {
        self.id
    }

    /// When the key stopped signing, if it has.
    pub fn retired_at(&self) -> Option<DateTime<Utc>> {
        self.retired_at
    }

    pub(crate) fn sign(&self, payload: &[u8]) -> [u8; 32] {
        let mut mac = self.mac.clone();
        mac.update(payload);
        mac.finalize().into_bytes().into()
    }

    /// Constant-time tag comparison.
    pub(crate) fn verify(&self, payload: &[u8], tag: &[u8]) -> bool {
        let mut mac = self.mac.clone();
        mac.update(payload);
        mac.verify_slice(tag).is_ok()
    }

    /// Whether a token signed by this key could still be live at `now`.
    fn may_verify_at(&self, now: DateTime<Utc>, max_ttl: Duration) -> bool {
        let Some(retired_at) = self.retired_at else { return true };
        match chrono::Duration::from_std(max_ttl) {
            Ok(ttl) => retired_at.checked_add_signed(ttl).is_none_or(|until| now <= until),
            Err(_) => true,
        }
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("id", &self.id)
            .field("retired_at", &self.retired_at)
            .finish_non_exhaustive()
    }
}

/// The current signing key and the previous keys still accepted for
/// verification.
#[derive(Debug, Clone)]
pub struct KeySet {
    current: SigningKey,
    previous: Vec<SigningKey>,
}

impl KeySet {
    /// Creates a set. A previous key with the current key's fingerprint is
    /// dropped.
    pub fn new(current: SigningKey, previous: Vec<SigningKey>) -> Self {
        let previous = previous.into_iter().filter(|k| k.id != current.id).collect();
        Self { current, previous }
    }

    /// Builds the set described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] naming the first key that does
    /// not decode.
    pub fn from_config(config: &CredentialConfig) -> Result<Self, ConfigError> {
        let current = SigningKey::from_config(&config.signing_key)?;
        let previous = config
            .previous_keys
            .iter()
            .enumerate()
            .map(|(i, key)| {
                SigningKey::from_config(key).map_err(|e| ConfigError::Validation {
                    message: format!("previous_keys[{i}]: {e}"),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(current, previous))
    }

    /// Key new tokens are signed with.
    pub fn current(&self) -> &SigningKey {
        &self.current
    }

    /// Retired keys, most recently retired first.
    pub fn previous(&self) -> &[SigningKey] {
        &self.previous
    }

    /// Looks up the key a token names.
    pub fn find(&self, id: &KeyId) -> Option<&SigningKey> {
        if self.current.id == *id {
            return Some(&self.current);
        }
        self.previous.iter().find(|k| k.id == *id)
    }

    fn rotated(&self, next: &SigningKey, now: DateTime<Utc>) -> Self {
        if next.id == self.current.id {
            return self.clone();
        }
        let mut retired = self.current.clone();
        retired.retired_at = Some(now);
        let mut promoted = next.clone();
        promoted.retired_at = None;

        let previous = std::iter::once(retired)
            .chain(self.previous.iter().filter(|k| k.id != next.id).cloned())
            .collect();
        Self { current: promoted, previous }
    }

    fn pruned(&self, now: DateTime<Utc>, max_ttl: Duration) -> Self {
        let previous =
            self.previous.iter().filter(|k| k.may_verify_at(now, max_ttl)).cloned().collect();
        Self { current: self.current.clone(), previous }
    }
}

/// Shared handle to the live [`KeySet`].
#[derive(Debug)]
pub struct Keyring {
    keys: ArcSwap<KeySet>,
}

impl Keyring {
    /// Wraps an initial key set.
    pub fn new(keys: KeySet) -> Self {
        Self { keys: ArcSwap::from_pointee(keys) }
    }

    /// Builds the keyring described by `config`.
    ///
    /// # Errors
    ///
    /// See [`KeySet::from_config`].
    pub fn from_config(config: &CredentialConfig) -> Result<Self, ConfigError> {
        KeySet::from_config(config).map(Self::new)
    }

    /// Snapshot of the key set. Lock-free.
    pub fn load(&self) -> Guard<Arc<KeySet>> {
        self.keys.load()
    }

    /// Fingerprint of the current signing key.
    pub fn current_id(&self) -> KeyId {
        self.keys.load().current.id
    }

    /// Promotes `next` to current and retires the old current key at `now`.
    ///
    /// Rotating to the key that is already current changes nothing.
    pub fn rotate(&self, next: SigningKey, now: DateTime<Utc>) -> KeyId {
        let old = self.keys.rcu(|keys| keys.rotated(&next, now));
        if old.current.id != next.id {
            info!(retired = %old.current.id, current = %next.id, "Signing key rotated");
        }
        next.id
    }

    /// Drops previous keys retired more than `max_ttl` before `now`.
    ///
    /// Returns the number of keys dropped.
    pub fn prune(&self, now: DateTime<Utc>, max_ttl: Duration) -> usize {
        let old = self.keys.rcu(|keys| keys.pruned(now, max_ttl));
        let dropped = old.previous.iter().filter(|k| !k.may_verify_at(now, max_ttl)).count();
        if dropped > 0 {
            info!(dropped, "Pruned retired signing keys");
        }
        dropped
    }

    /// Replaces the whole key set, as after a configuration reload.
    pub fn store(&self, keys: KeySet) {
        info!(current = %keys.current.id, previous = keys.previous.len(), "Signing keys replaced");
        self.keys.store(Arc::new(keys));
    }
}
