//! Error types for the Mod Garden record pipeline using snafu.
//!
//! Defines one error enum per subsystem:
//! - [`SchemaError`]: codec registry, migration chain and migration engine
//! - [`CredentialError`]: access token issuance and verification
//! - [`AuthorizationError`]: capability checks
//! - [`IdentityError`]: identifier issuance
//!
//! Each error variant maps to an [`ErrorCode`] with a unique numeric identifier,
//! retryability classification, and suggested recovery action.
//! See [`ErrorCode`] for the full catalog.

use core::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use snafu::Snafu;

use crate::types::SchemaVersion;

/// Unified result type for schema operations.
pub type Result<T, E = SchemaError> = std::result::Result<T, E>;

/// Machine-readable error codes for programmatic error handling.
///
/// Codes are organized into ranges:
///
/// | Range       | Domain        | Examples                                      |
/// |-------------|---------------|-----------------------------------------------|
/// | 1000–1099   | Schema        | Unknown version, missing migration, contract  |
/// | 2000–2099   | Credential    | TTL, expiry, malformed token, bad signature   |
/// | 3000–3099   | Authorization | Missing capability                            |
/// | 4000–4099   | Identity      | Clock regression                              |
/// | 5000–5099   | Storage       | Storage collaborator failure                  |
/// | 6000–6099   | Configuration | Invalid configuration value                   |
///
/// # Wire Format
///
/// Error codes are transmitted as the string representation of their numeric
/// value (e.g., `"2001"`). Use [`ErrorCode::as_u16`] for serialization and
/// [`ErrorCode::from_u16`] for deserialization. Mapping codes to HTTP status
/// codes is left to the HTTP layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    // --- Schema errors (1000–1099) ---
    /// No contract is registered for the version.
    SchemaUnknownVersion = 1000,
    /// A contract was registered twice for the same version.
    SchemaDuplicateVersion = 1001,
    /// No migration path reaches the requested version.
    SchemaNoMigrationPath = 1002,
    /// The migration chain has a gap between the base and current version.
    SchemaIncompleteMigrationChain = 1003,
    /// The record is newer than the target version.
    SchemaFutureVersion = 1004,
    /// A record violates the contract of its version.
    SchemaContractViolation = 1005,
    /// The payload is not a tagged record.
    SchemaMalformedRecord = 1006,
    /// A migration step was registered twice for the same source version.
    SchemaDuplicateStep = 1007,
    /// The registry has no versions.
    SchemaEmptyRegistry = 1008,
    /// The registered versions are not contiguous.
    SchemaVersionGap = 1009,
    /// A shape contract declaration is invalid.
    SchemaInvalidContract = 1010,

    // --- Credential errors (2000–2099) ---
    /// Requested token lifetime is zero or above the configured maximum.
    CredentialInvalidTtl = 2000,
    /// The token's expiry instant has passed.
    CredentialTokenExpired = 2001,
    /// The token could not be decoded.
    CredentialTokenMalformed = 2002,
    /// The token signature does not verify against any known key.
    CredentialSignatureInvalid = 2003,
    /// A token id could not be issued.
    CredentialTokenIdUnavailable = 2004,

    // --- Authorization errors (3000–3099) ---
    /// The credential lacks the required capability.
    AuthorizationForbidden = 3000,

    // --- Identity errors (4000–4099) ---
    /// The clock moved backwards relative to the last issued identifier.
    IdentityClockRegression = 4000,
    /// The clock reads before the identifier epoch.
    IdentitySystemClock = 4001,

    // --- Storage errors (5000–5099) ---
    /// The storage collaborator rejected or failed the write.
    StorageWrite = 5000,

    // --- Configuration errors (6000–6099) ---
    /// A configuration value is invalid.
    Config = 6000,
}

impl ErrorCode {
    /// Returns the numeric code value.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Converts a numeric code to an `ErrorCode`, returning `None` for unknown values.
    #[must_use]
    pub fn from_u16(code: u16) -> Option<Self> {
        match code {
            1000 => Some(Self::SchemaUnknownVersion),
            1001 => Some(Self::SchemaDuplicateVersion),
            1002 => Some(Self::SchemaNoMigrationPath),
            1003 => Some(Self::SchemaIncompleteMigrationChain),
            1004 => Some(Self::SchemaFutureVersion),
            1005 => Some(Self::SchemaContractViolation),
            1006 => Some(Self::SchemaMalformedRecord),
            1007 => Some(Self::SchemaDuplicateStep),
            1008 => Some(Self::SchemaEmptyRegistry),
            1009 => Some(Self::SchemaVersionGap),
            1010 => Some(Self::SchemaInvalidContract),
            2000 => Some(Self::CredentialInvalidTtl),
            2001 => Some(Self::CredentialTokenExpired),
            2002 => Some(Self::CredentialTokenMalformed),
            2003 => Some(Self::CredentialSignatureInvalid),
            2004 => Some(Self::CredentialTokenIdUnavailable),
            3000 => Some(Self::AuthorizationForbidden),
            4000 => Some(Self::IdentityClockRegression),
            4001 => Some(Self::IdentitySystemClock),
            5000 => Some(Self::StorageWrite),
            6000 => Some(Self::Config),
            _ => None,
        }
    }

    /// Whether this error is retryable.
    ///
    /// Nothing in the core retries on its own. A retryable code tells the
    /// caller that resubmitting (with a fresh token where relevant) can succeed
    /// without anyone fixing anything first.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::CredentialTokenExpired | Self::StorageWrite)
    }

    /// Suggested recovery action for this error code.
    ///
    /// Returns a human-readable string that is stable and safe to display in
    /// UIs or log to operator dashboards.
    #[must_use]
    pub const fn suggested_action(self) -> &'static str {
        match self {
            Self::SchemaUnknownVersion => {
                "Tag the record with a schema version this server registers."
            },
            Self::SchemaDuplicateVersion => {
                "Startup bug: each schema version may be registered only once."
            },
            Self::SchemaNoMigrationPath => {
                "Register the missing migration step or target a registered version."
            },
            Self::SchemaIncompleteMigrationChain => {
                "Startup bug: register a step for every version below current."
            },
            Self::SchemaFutureVersion => {
                "The record was authored against a newer schema. Upgrade the server; downgrades are never attempted."
            },
            Self::SchemaContractViolation => {
                "Fix the listed fields. If the input was valid, the migration step is faulty; report it."
            },
            Self::SchemaMalformedRecord => {
                "Send a JSON object carrying a non-negative integer schema_version."
            },
            Self::SchemaDuplicateStep => {
                "Startup bug: each source version may have only one migration step."
            },
            Self::SchemaEmptyRegistry => "Startup bug: register at least one schema version.",
            Self::SchemaVersionGap => {
                "Startup bug: registered schema versions must be contiguous."
            },
            Self::SchemaInvalidContract => {
                "Startup bug: fix the field name or default in the shape contract."
            },
            Self::CredentialInvalidTtl => {
                "Request a positive token lifetime no longer than the configured maximum."
            },
            Self::CredentialTokenExpired => "Obtain a fresh token and retry.",
            Self::CredentialTokenMalformed => "Reject the request. The token is not decodable.",
            Self::CredentialSignatureInvalid => {
                "Reject the request. The token was not issued by this server or its key was retired."
            },
            Self::CredentialTokenIdUnavailable => {
                "Check the host clock. Token ids could not be issued."
            },
            Self::AuthorizationForbidden => {
                "Request a token carrying the required capability."
            },
            Self::IdentityClockRegression => {
                "The host clock moved backwards. Fix clock synchronisation before resubmitting."
            },
            Self::IdentitySystemClock => {
                "The host clock reads before the identifier epoch. Fix the system time."
            },
            Self::StorageWrite => {
                "The storage layer failed the write. Check its health; the submission may be retried."
            },
            Self::Config => "Fix the configuration value and restart the server.",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u16())
    }
}

/// A single field that is missing or invalid under a shape contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldViolation {
    /// Field path (`integrations.modrinth.project_id` for nested fields).
    pub field: String,
    /// What is wrong with it.
    pub reason: String,
}

impl FieldViolation {
    /// Creates a violation for `field`.
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self { field: field.into(), reason: reason.into() }
    }
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

fn join_violations(violations: &[FieldViolation]) -> String {
    violations.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

/// Errors from the codec registry, migration chain and migration engine.
///
/// # Recovery Guide
///
/// | Variant                      | Retryable | Recovery Action                               |
/// | ---------------------------- | --------- | --------------------------------------------- |
/// | `UnknownVersion`             | No        | Tag the record with a registered version      |
/// | `DuplicateVersion`           | No        | Startup bug; register each version once       |
/// | `NoMigrationPath`            | No        | Register the step or target a known version   |
/// | `IncompleteMigrationChain`   | No        | Startup bug; close the gap in the chain       |
/// | `FutureVersion`              | No        | Upgrade the server                            |
/// | `MigrationContractViolation` | No        | Fix the input or the faulty step              |
/// | `MalformedRecord`            | No        | Send a tagged JSON object                     |
/// | `DuplicateStep`              | No        | Startup bug; one step per source version      |
/// | `EmptyRegistry`              | No        | Startup bug; register a version               |
/// | `VersionGap`                 | No        | Startup bug; register the missing version     |
/// | `InvalidContract`            | No        | Startup bug; fix the contract declaration     |
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub))]
pub enum SchemaError {
    /// No shape contract is registered for the version.
    #[snafu(display("Unknown schema version {version}"))]
    UnknownVersion {
        /// Requested version.
        version: SchemaVersion,
    },

    /// A shape contract is already registered for the version.
    #[snafu(display("Schema version {version} is already registered"))]
    DuplicateVersion {
        /// Version registered twice.
        version: SchemaVersion,
    },

    /// No registered step advances `from` towards `to`.
    #[snafu(display("No migration path from {from} to {to}"))]
    NoMigrationPath {
        /// Version the walk is stuck at.
        from: SchemaVersion,
        /// Requested target version.
        to: SchemaVersion,
    },

    /// The chain is missing the step out of `missing_from`.
    ///
    /// Raised at startup, never at request time.
    #[snafu(display(
        "Incomplete migration chain: no step from {missing_from} (current version {current})"
    ))]
    IncompleteMigrationChain {
        /// Source version without a step.
        missing_from: SchemaVersion,
        /// Current (maximum registered) version.
        current: SchemaVersion,
    },

    /// The record is tagged with a version above the target.
    ///
    /// Downgrades are never attempted.
    #[snafu(display("Record version {version} is newer than target version {target}"))]
    FutureVersion {
        /// Version the record is tagged with.
        version: SchemaVersion,
        /// Requested target version.
        target: SchemaVersion,
    },

    /// A record does not satisfy the contract of `version`.
    ///
    /// Aborts the whole migration; no partially migrated record is returned.
    #[snafu(display(
        "Record violates the {version} contract: {}",
        join_violations(violations)
    ))]
    MigrationContractViolation {
        /// Version whose contract was violated.
        version: SchemaVersion,
        /// Every missing or invalid field.
        violations: Vec<FieldViolation>,
    },

    /// The payload is not a schema-tagged record.
    #[snafu(display("Malformed record: {reason}"))]
    MalformedRecord {
        /// What is wrong with the payload.
        reason: String,
    },

    /// Two migration steps share a source version.
    #[snafu(display("A migration step from {from} is already registered"))]
    DuplicateStep {
        /// Source version registered twice.
        from: SchemaVersion,
    },

    /// The registry was built without any versions.
    #[snafu(display("Schema registry has no versions"))]
    EmptyRegistry,

    /// Registered versions skip `missing`.
    #[snafu(display("Schema registry skips version {missing}"))]
    VersionGap {
        /// First unregistered version between the base and current version.
        missing: SchemaVersion,
    },

    /// A shape contract declares an invalid field.
    #[snafu(display("Invalid contract field {field:?}: {reason}"))]
    InvalidContract {
        /// Offending field name.
        field: String,
        /// What is wrong with the declaration.
        reason: String,
    },
}

impl SchemaError {
    /// Returns the machine-readable error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::UnknownVersion { .. } => ErrorCode::SchemaUnknownVersion,
            Self::DuplicateVersion { .. } => ErrorCode::SchemaDuplicateVersion,
            Self::NoMigrationPath { .. } => ErrorCode::SchemaNoMigrationPath,
            Self::IncompleteMigrationChain { .. } => ErrorCode::SchemaIncompleteMigrationChain,
            Self::FutureVersion { .. } => ErrorCode::SchemaFutureVersion,
            Self::MigrationContractViolation { .. } => ErrorCode::SchemaContractViolation,
            Self::MalformedRecord { .. } => ErrorCode::SchemaMalformedRecord,
            Self::DuplicateStep { .. } => ErrorCode::SchemaDuplicateStep,
            Self::EmptyRegistry => ErrorCode::SchemaEmptyRegistry,
            Self::VersionGap { .. } => ErrorCode::SchemaVersionGap,
            Self::InvalidContract { .. } => ErrorCode::SchemaInvalidContract,
        }
    }

    /// Whether this error is retryable. Delegates to [`ErrorCode::is_retryable`].
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.code().is_retryable()
    }
}

/// Errors from the identifier issuer.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub))]
pub enum IdentityError {
    /// The clock reads earlier than the last issued identifier's timestamp.
    ///
    /// **Recovery**: Not retryable. Issuing would break monotonicity; fix the
    /// host clock first.
    #[snafu(display("Clock moved backwards: last issued at {last_ms}ms, now {observed_ms}ms"))]
    ClockRegression {
        /// Timestamp (ms since Unix epoch) of the last issued identifier.
        last_ms: i64,
        /// Timestamp (ms since Unix epoch) the clock reported.
        observed_ms: i64,
    },

    /// The clock reads before the identifier epoch.
    #[snafu(display("System clock reads {observed_ms}ms, before the identifier epoch"))]
    SystemClock {
        /// Timestamp (ms since Unix epoch) the clock reported.
        observed_ms: i64,
    },
}

impl IdentityError {
    /// Returns the machine-readable error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::ClockRegression { .. } => ErrorCode::IdentityClockRegression,
            Self::SystemClock { .. } => ErrorCode::IdentitySystemClock,
        }
    }
}

/// Errors from access token issuance and verification.
///
/// `TokenExpired` means "retry with a fresh token"; every other verification
/// failure means "reject the request".
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub))]
pub enum CredentialError {
    /// Requested lifetime is zero or exceeds the configured maximum.
    #[snafu(display("Invalid token TTL {requested:?}: must be positive and at most {max:?}"))]
    InvalidTtl {
        /// Requested lifetime.
        requested: Duration,
        /// Configured maximum lifetime.
        max: Duration,
    },

    /// The token verified but its expiry instant has passed.
    #[snafu(display("Token expired at {expired_at}"))]
    TokenExpired {
        /// Expiry instant carried by the token.
        expired_at: DateTime<Utc>,
    },

    /// The token could not be decoded.
    #[snafu(display("Malformed token: {reason}"))]
    TokenMalformed {
        /// What failed to decode.
        reason: String,
    },

    /// The token signature does not verify against any known signing key.
    #[snafu(display("Token signature is invalid"))]
    SignatureInvalid,

    /// The identifier issuer could not provide a token id.
    #[snafu(display("Token id unavailable: {source}"))]
    TokenIdUnavailable {
        /// Underlying identity error.
        source: IdentityError,
    },
}

impl CredentialError {
    /// Returns the machine-readable error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidTtl { .. } => ErrorCode::CredentialInvalidTtl,
            Self::TokenExpired { .. } => ErrorCode::CredentialTokenExpired,
            Self::TokenMalformed { .. } => ErrorCode::CredentialTokenMalformed,
            Self::SignatureInvalid => ErrorCode::CredentialSignatureInvalid,
            Self::TokenIdUnavailable { .. } => ErrorCode::CredentialTokenIdUnavailable,
        }
    }

    /// Whether this error is retryable. Delegates to [`ErrorCode::is_retryable`].
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.code().is_retryable()
    }
}

/// Errors from capability checks.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub))]
pub enum AuthorizationError {
    /// The verified credential does not grant the required capability.
    #[snafu(display("Forbidden: {subject} lacks capability {required:?}"))]
    Forbidden {
        /// Capability the operation requires.
        required: String,
        /// Account the credential was issued to.
        subject: String,
    },
}

impl AuthorizationError {
    /// Returns the machine-readable error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Forbidden { .. } => ErrorCode::AuthorizationForbidden,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use super::*;

    const ALL_CODES: &[ErrorCode] = &[
        ErrorCode::SchemaUnknownVersion,
        ErrorCode::SchemaDuplicateVersion,
        ErrorCode::SchemaNoMigrationPath,
        ErrorCode::SchemaIncompleteMigrationChain,
        ErrorCode::SchemaFutureVersion,
        ErrorCode::SchemaContractViolation,
        ErrorCode::SchemaMalformedRecord,
        ErrorCode::SchemaDuplicateStep,
        ErrorCode::SchemaEmptyRegistry,
        ErrorCode::SchemaVersionGap,
        ErrorCode::SchemaInvalidContract,
        ErrorCode::CredentialInvalidTtl,
        ErrorCode::CredentialTokenExpired,
        ErrorCode::CredentialTokenMalformed,
        ErrorCode::CredentialSignatureInvalid,
        ErrorCode::CredentialTokenIdUnavailable,
        ErrorCode::AuthorizationForbidden,
        ErrorCode::IdentityClockRegression,
        ErrorCode::IdentitySystemClock,
        ErrorCode::StorageWrite,
        ErrorCode::Config,
    ];

    #[test]
    fn test_error_code_roundtrip() {
        for code in ALL_CODES {
            assert_eq!(ErrorCode::from_u16(code.as_u16()), Some(*code), "code {code}");
        }
    }

    #[test]
    fn test_error_codes_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for code in ALL_CODES {
            assert!(seen.insert(code.as_u16()), "duplicate code {code}");
        }
    }

    #[test]
    fn test_unknown_code_returns_none() {
        assert_eq!(ErrorCode::from_u16(0), None);
        assert_eq!(ErrorCode::from_u16(9999), None);
    }

    #[test]
    fn test_suggested_actions_are_nonempty() {
        for code in ALL_CODES {
            assert!(!code.suggested_action().is_empty(), "code {code}");
        }
    }

    #[test]
    fn test_only_expiry_and_storage_are_retryable() {
        let retryable: Vec<_> = ALL_CODES.iter().filter(|c| c.is_retryable()).collect();
        assert_eq!(retryable, vec![&ErrorCode::CredentialTokenExpired, &ErrorCode::StorageWrite]);
    }

    #[test]
    fn test_fatal_conditions_are_not_retryable() {
        let regression = IdentityError::ClockRegression { last_ms: 10, observed_ms: 5 };
        assert!(!regression.code().is_retryable());

        let violation = SchemaError::MigrationContractViolation {
            version: SchemaVersion::new(2),
            violations: vec![FieldViolation::new("name", "missing")],
        };
        assert!(!violation.is_retryable());
    }

    #[test]
    fn test_contract_violation_display_lists_fields() {
        let err = SchemaError::MigrationContractViolation {
            version: SchemaVersion::new(3),
            violations: vec![
                FieldViolation::new("title", "missing required field"),
                FieldViolation::new("category", "expected string, found number"),
            ],
        };
        let display = err.to_string();
        assert!(display.contains("v:3"), "{display}");
        assert!(display.contains("title: missing required field"), "{display}");
        assert!(display.contains("category: expected string"), "{display}");
    }

    #[test]
    fn test_credential_errors_map_to_distinct_codes() {
        let expired = CredentialError::TokenExpired { expired_at: Utc::now() };
        let malformed = CredentialError::TokenMalformed { reason: "bad base64".into() };
        let forged = CredentialError::SignatureInvalid;
        assert_ne!(expired.code(), malformed.code());
        assert_ne!(malformed.code(), forged.code());
        assert!(expired.is_retryable());
        assert!(!forged.is_retryable());
    }

    #[test]
    fn test_token_id_unavailable_keeps_source() {
        use std::error::Error;

        let err = CredentialError::TokenIdUnavailable {
            source: IdentityError::ClockRegression { last_ms: 2, observed_ms: 1 },
        };
        let source = err.source().expect("source");
        assert!(source.to_string().contains("Clock moved backwards"));
    }

    #[test]
    fn test_forbidden_display() {
        let err = AuthorizationError::Forbidden {
            required: "submit".into(),
            subject: "acct:abcde".into(),
        };
        assert_eq!(err.to_string(), "Forbidden: acct:abcde lacks capability \"submit\"");
        assert_eq!(err.code(), ErrorCode::AuthorizationForbidden);
    }
}
