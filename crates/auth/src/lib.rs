//! Access credentials for Mod Garden.
//!
//! - [`CapabilitySet`]: named permissions, with the legacy bitfield mapping
//! - [`Keyring`]: current and previous HMAC signing keys, swapped atomically
//! - [`CredentialIssuer`]: issues and verifies signed, expiring [`AccessToken`]s

#![deny(unsafe_code)]

pub mod capability;
pub mod keyring;
pub mod token;

pub use capability::{Capability, CapabilitySet};
pub use keyring::{KeySet, Keyring, SigningKey};
pub use token::{AccessToken, Claims, CredentialIssuer, IssuedToken};
