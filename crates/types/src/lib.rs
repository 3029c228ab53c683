//! Core types, errors, configuration and identifier issuance for the
//! Mod Garden record pipeline.
//!
//! This crate provides the foundations shared by every other crate:
//! - Identifier newtypes (`RecordId`, `TokenId`, `AccountId`, `SchemaVersion`)
//! - The snowflake [`IdIssuer`] and the [`Clock`] it reads time through
//! - Postcard/base64url encoding for signed payloads
//! - Key fingerprints (SHA-256)
//! - Error types using snafu, each mapped to an [`ErrorCode`]

pub mod clock;
pub mod codec;
pub mod config;
pub mod error;
pub mod hash;
pub mod snowflake;
pub mod types;
pub mod validation;

// Re-export commonly used types at crate root
pub use clock::{Clock, SystemClock};
pub use error::{
    AuthorizationError, CredentialError, ErrorCode, FieldViolation, IdentityError, Result,
    SchemaError,
};
pub use hash::{Hash, KeyId, sha256};
pub use snowflake::{IdIssuer, Snowflake};
pub use types::*;
