//! Shared test helpers for Mod Garden crates.
//!
//! - [`ManualClock`] - a [`Clock`](modgarden_types::Clock) tests move by hand
//! - [`TestDir`] - temporary directory with file helpers
//! - [`assert_eventually`] - poll a condition until it holds or times out
//! - [`test_credential_config`] / [`test_core_config`] - fixed-key configuration
//! - [`strategies`] - proptest generators

#![deny(unsafe_code)]
#![cfg_attr(test, allow(clippy::disallowed_methods))]

mod assertions;
pub use assertions::assert_eventually;

mod clock;
pub use clock::ManualClock;

mod config;
pub use config::{
    TEST_PREVIOUS_KEY, TEST_SIGNING_KEY, TestCredentialConfig, test_core_config,
    test_credential_config,
};

pub mod strategies;

mod test_dir;
pub use test_dir::TestDir;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use modgarden_types::Clock;

    use super::*;

    #[test]
    fn test_dir_write_creates_parents() {
        let dir = TestDir::new();
        let path = dir.write("keys/current.key", "secret");
        assert!(path.starts_with(dir.path()));
        assert_eq!(std::fs::read_to_string(path).unwrap(), "secret");
    }

    #[test]
    fn test_dir_cleanup_on_drop() {
        let path = {
            let dir = TestDir::new();
            dir.write("file.txt", "data");
            dir.path().to_path_buf()
        };
        assert!(!path.exists(), "temp directory should be cleaned up on drop");
    }

    #[test]
    fn test_manual_clock_moves_only_when_told() {
        let clock = ManualClock::at_ms(1_000);
        assert_eq!(clock.now_ms(), 1_000);
        clock.advance(Duration::from_millis(250));
        assert_eq!(clock.now_ms(), 1_250);
        clock.set_ms(900);
        assert_eq!(clock.now_ms(), 900);
        assert_eq!(clock.now().timestamp_millis(), 900);
    }

    #[test]
    fn test_manual_clock_sleep_jumps_forward() {
        let clock = ManualClock::at_ms(10);
        let shared = clock.clone();
        clock.sleep_until_ms(5);
        assert_eq!(clock.sleeps(), 0);
        clock.sleep_until_ms(42);
        assert_eq!(shared.now_ms(), 42);
        assert_eq!(shared.sleeps(), 1);
    }

    #[tokio::test]
    async fn test_assert_eventually_delayed_success() {
        let counter = AtomicUsize::new(0);
        let result = assert_eventually(Duration::from_millis(500), || {
            counter.fetch_add(1, Ordering::SeqCst) >= 3
        })
        .await;
        assert!(result);
    }

    #[tokio::test]
    async fn test_assert_eventually_timeout() {
        assert!(!assert_eventually(Duration::from_millis(30), || false).await);
    }

    #[test]
    fn test_credential_fixture_is_valid() {
        let config = test_credential_config();
        assert_eq!(config.max_ttl, Duration::from_secs(3600));
        assert_eq!(config.signing_key.decode().unwrap(), TEST_SIGNING_KEY.to_vec());
        assert_eq!(config.previous_keys.len(), 1);
    }

    #[test]
    fn test_credential_fixture_clamps_default_ttl() {
        let config = TestCredentialConfig::builder()
            .max_ttl(Duration::from_secs(60))
            .build()
            .into_config();
        assert_eq!(config.default_ttl, Duration::from_secs(60));
    }

    #[test]
    fn test_core_fixture_validates() {
        let config = test_core_config();
        assert_eq!(config.identity.worker_id, Some(1));
        config.validate().unwrap();
    }
}
