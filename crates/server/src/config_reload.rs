//! SIGHUP-driven signing key reload.
//!
//! On `SIGHUP` the configuration file is re-read and the `[credentials]`
//! keys are swapped into the live [`Keyring`]. Tokens already issued under a
//! key listed in `previous_keys` keep verifying. Other settings need a
//! restart.

use std::{path::Path, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
#[cfg(unix)]
use modgarden_types::Clock;
use modgarden_auth::{KeySet, Keyring};
use modgarden_types::{KeyId, config::CoreConfig};
#[cfg(unix)]
use tracing::{error, info, warn};

/// Spawns a background task that reloads signing keys on SIGHUP.
///
/// The task runs until the process exits. If the file cannot be read or
/// fails validation, the current keys stay in place.
#[cfg(unix)]
pub fn spawn_sighup_handler(
    config_path: std::path::PathBuf,
    keyring: Arc<Keyring>,
    clock: Arc<dyn Clock>,
    max_ttl: Duration,
) {
    tokio::spawn(async move {
        use tokio::signal::unix::{SignalKind, signal};

        let mut hangup = match signal(SignalKind::hangup()) {
            Ok(s) => s,
            Err(e) => {
                error!(error = %e, "Failed to install SIGHUP handler for key reload");
                return;
            },
        };

        info!(config_path = %config_path.display(), "SIGHUP key reload handler started");

        while hangup.recv().await.is_some() {
            info!("Received SIGHUP, reloading signing keys");
            match reload_keys(&config_path, &keyring, clock.now(), max_ttl) {
                Ok(current) => info!(current = %current, "SIGHUP reload: signing keys updated"),
                Err(e) => warn!(error = %e, "SIGHUP reload failed, keeping current keys"),
            }
        }
    });
}

/// Reads the configuration file and installs its signing keys.
///
/// Previous keys retired more than `max_ttl` before `now` are dropped
/// straight away. Returns the id of the new current key.
///
/// # Errors
///
/// Returns an error string if the file cannot be read, is invalid TOML, or
/// fails validation.
pub fn reload_keys(
    config_path: &Path,
    keyring: &Arc<Keyring>,
    now: DateTime<Utc>,
    max_ttl: Duration,
) -> Result<KeyId, String> {
    let contents = std::fs::read_to_string(config_path)
        .map_err(|e| format!("Failed to read config file: {e}"))?;
    let config = CoreConfig::from_toml(&contents)
        .map_err(|e| format!("Failed to load config file: {e}"))?;
    let keys =
        KeySet::from_config(&config.credentials).map_err(|e| format!("Invalid signing keys: {e}"))?;

    keyring.store(keys);
    keyring.prune(now, max_ttl);
    Ok(keyring.current_id())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use std::io::Write;

    use chrono::TimeZone;
    use modgarden_test_utils::{TEST_PREVIOUS_KEY, TEST_SIGNING_KEY, test_credential_config};
    use modgarden_types::config::SecretKeyConfig;
    use tempfile::NamedTempFile;

    use super::*;

    const MAX_TTL: Duration = Duration::from_secs(3600);

    fn keyring() -> Arc<Keyring> {
        Arc::new(Keyring::from_config(&test_credential_config()).unwrap())
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn config_file(current: &[u8], previous: &[u8], retired_at: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[credentials]
signing_key = {{ key = "{}" }}
previous_keys = [{{ key = "{}", retired_at = "{retired_at}" }}]
"#,
            SecretKeyConfig::from_bytes(current).key,
            SecretKeyConfig::from_bytes(previous).key,
        )
        .unwrap();
        file
    }

    #[test]
    fn test_reload_rotates_keys() {
        let keyring = keyring();
        let next = [42u8; 32];
        let file = config_file(&next, &TEST_SIGNING_KEY, "2025-06-01T11:30:00Z");

        let current = reload_keys(file.path(), &keyring, now(), MAX_TTL).unwrap();

        assert_eq!(current, KeyId::fingerprint(&next));
        let keys = keyring.load();
        assert!(keys.find(&KeyId::fingerprint(&TEST_SIGNING_KEY)).is_some());
        assert!(keys.find(&KeyId::fingerprint(&TEST_PREVIOUS_KEY)).is_none());
    }

    #[test]
    fn test_reload_prunes_expired_previous_keys() {
        let keyring = keyring();
        let file = config_file(&[42u8; 32], &TEST_SIGNING_KEY, "2025-06-01T10:00:00Z");

        reload_keys(file.path(), &keyring, now(), MAX_TTL).unwrap();

        assert!(keyring.load().previous().is_empty());
    }

    #[test]
    fn test_reload_rejects_short_key() {
        let keyring = keyring();
        let before = keyring.current_id();
        let file = config_file(&[1u8; 8], &TEST_SIGNING_KEY, "2025-06-01T11:30:00Z");

        let err = reload_keys(file.path(), &keyring, now(), MAX_TTL).unwrap_err();

        assert!(err.contains("config file"), "{err}");
        assert_eq!(keyring.current_id(), before);
    }

    #[test]
    fn test_reload_handles_missing_file() {
        let keyring = keyring();
        let err = reload_keys(Path::new("/nonexistent/core.toml"), &keyring, now(), MAX_TTL)
            .unwrap_err();
        assert!(err.contains("read config file"));
    }

    #[test]
    fn test_reload_handles_invalid_toml() {
        let keyring = keyring();
        let before = keyring.current_id();
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "this is {{ not valid toml").unwrap();

        let err = reload_keys(file.path(), &keyring, now(), MAX_TTL).unwrap_err();

        assert!(err.contains("load config file"));
        assert_eq!(keyring.current_id(), before);
    }
}
