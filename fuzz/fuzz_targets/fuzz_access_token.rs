//! Fuzz target for access token verification.
//!
//! `CredentialIssuer::verify` must never panic on arbitrary input, and a
//! token it issued must verify under its own key and fail under any other.

#![no_main]

use std::{sync::Arc, time::Duration};

use libfuzzer_sys::fuzz_target;
use modgarden_auth::{
    AccessToken, CapabilitySet, CredentialIssuer, KeySet, Keyring, SigningKey, capability,
};
use modgarden_types::{AccountId, IdIssuer, SystemClock};

const TTL: Duration = Duration::from_secs(600);

fn issuer(secret: &[u8]) -> Option<CredentialIssuer> {
    let key = SigningKey::new(secret).ok()?;
    let keyring = Arc::new(Keyring::new(KeySet::new(key, Vec::new())));
    let clock = Arc::new(SystemClock);
    let ids = Arc::new(IdIssuer::new(1, clock.clone()));
    Some(CredentialIssuer::new(keyring, ids, clock, TTL, TTL))
}

fuzz_target!(|data: &[u8]| {
    let Some((&selector, payload)) = data.split_first() else {
        return;
    };

    match selector % 3 {
        0 => verify_arbitrary(payload),
        1 => verify_base64(payload),
        _ => roundtrip(payload),
    }
});

fn verify_arbitrary(data: &[u8]) {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    if let Some(issuer) = issuer(&[0u8; 32]) {
        let _ = issuer.verify(&AccessToken::new(text));
        let _ = AccessToken::from_authorization_header(text);
    }
}

fn verify_base64(data: &[u8]) {
    use base64::Engine;
    // Validly encoded but tampered payloads.
    let encoded = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(data);
    if let Some(issuer) = issuer(&[0u8; 32]) {
        let _ = issuer.verify(&AccessToken::new(encoded));
    }
}

fn roundtrip(data: &[u8]) {
    if data.len() < 32 {
        return;
    }
    let (secret, rest) = data.split_at(32);
    let Some(issuer) = issuer(secret) else {
        return;
    };

    let mut capabilities = CapabilitySet::new();
    for (bit, name) in [(1, capability::SUBMIT), (2, capability::READ)] {
        if rest.first().is_some_and(|b| b & bit != 0)
            && let Ok(cap) = name.parse()
        {
            capabilities.insert(cap);
        }
    }
    let Ok(subject) = AccountId::parse("fuzzz") else {
        return;
    };

    let issued = issuer.issue(&subject, capabilities, TTL).expect("issue with valid ttl");
    let claims = issuer.verify(&issued.token).expect("own token verifies");
    assert_eq!(claims, issued.claims);

    let mut other_secret = secret.to_vec();
    other_secret[0] ^= 0xff;
    if let Some(other) = issuer(&other_secret) {
        assert!(other.verify(&issued.token).is_err(), "foreign key accepted token");
    }
}
