//! Core type definitions for the Mod Garden record pipeline.
//!
//! - Identifier newtypes (`RecordId`, `TokenId`, `AccountId`)
//! - Schema version tags

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::validation::{self, ValidationError};

// ============================================================================
// Identifier Types
// ============================================================================

/// Generates a newtype wrapper around a numeric type for type-safe identifiers.
///
/// Each generated type provides:
/// - Standard derives: Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord
/// - Serde with `#[serde(transparent)]` for wire format compatibility
/// - `From<inner>` and `Into<inner>` conversions
/// - `Display` with a semantic prefix (e.g., `rec:123`)
/// - `new()` constructor and `value()` accessor
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident, $inner:ty, $prefix:expr
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
            Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name($inner);

        impl $name {
            /// Creates a new identifier from a raw value.
            #[inline]
            pub const fn new(value: $inner) -> Self {
                Self(value)
            }

            /// Returns the raw numeric value.
            #[inline]
            pub const fn value(self) -> $inner {
                self.0
            }
        }

        impl From<$inner> for $name {
            #[inline]
            fn from(value: $inner) -> Self {
                Self(value)
            }
        }

        impl From<$name> for $inner {
            #[inline]
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}:{}", $prefix, self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = <$inner as std::str::FromStr>::Err;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                s.parse::<$inner>().map(Self)
            }
        }
    };
}

define_id!(
    /// Permanent identifier of a persisted record.
    ///
    /// Issued from a [`Snowflake`](crate::snowflake::Snowflake) the first time a
    /// record is submitted and never reassigned afterwards.
    ///
    /// # Display
    ///
    /// Formats with `rec:` prefix: `rec:42`.
    RecordId, u64, "rec"
);

define_id!(
    /// Unique identifier embedded in every access token.
    ///
    /// # Display
    ///
    /// Formats with `tok:` prefix: `tok:42`.
    TokenId, u64, "tok"
);

define_id!(
    /// Schema version a record was authored against.
    ///
    /// Versions are strictly increasing and never reused. A registry holds a
    /// contiguous run of them, starting at 0 or 1.
    ///
    /// # Display
    ///
    /// Formats with `v` prefix: `v:3`.
    SchemaVersion, u32, "v"
);

impl SchemaVersion {
    /// Returns the version immediately after this one, or `None` at `u32::MAX`.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self.0.checked_add(1) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }
}

/// Identifier of a member account.
///
/// Account ids are natural ids: five lowercase ASCII letters (`abcde`).
/// Older accounts may still carry an all-digit id, which is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountId(String);

impl AccountId {
    /// Parses and validates an account id.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] if `id` is neither a natural id nor a
    /// legacy numeric id.
    pub fn parse(id: impl Into<String>) -> Result<Self, ValidationError> {
        let id = id.into();
        validation::validate_account_id(&id)?;
        Ok(Self(id))
    }

    /// Generates a fresh natural id.
    pub fn generate<R: rand::Rng + ?Sized>(rng: &mut R) -> Self {
        Self(validation::generate_natural_id(rng))
    }

    /// Returns the id as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for AccountId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<AccountId> for String {
    fn from(id: AccountId) -> Self {
        id.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "acct:{}", self.0)
    }
}

impl std::str::FromStr for AccountId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use super::*;

    #[test]
    fn test_id_display_uses_prefix() {
        assert_eq!(RecordId::new(42).to_string(), "rec:42");
        assert_eq!(TokenId::new(7).to_string(), "tok:7");
        assert_eq!(SchemaVersion::new(3).to_string(), "v:3");
    }

    #[test]
    fn test_id_from_str_parses_raw_value() {
        let id: RecordId = "12345".parse().unwrap();
        assert_eq!(id.value(), 12345);
        assert!("rec:1".parse::<RecordId>().is_err());
    }

    #[test]
    fn test_schema_version_next() {
        assert_eq!(SchemaVersion::new(1).next(), Some(SchemaVersion::new(2)));
        assert_eq!(SchemaVersion::new(u32::MAX).next(), None);
    }

    #[test]
    fn test_schema_version_ordering() {
        assert!(SchemaVersion::new(2) > SchemaVersion::new(1));
    }

    #[test]
    fn test_record_id_serde_is_transparent() {
        let json = serde_json::to_string(&RecordId::new(99)).unwrap();
        assert_eq!(json, "99");
    }

    #[test]
    fn test_account_id_accepts_natural_and_legacy() {
        assert_eq!(AccountId::parse("abcde").unwrap().as_str(), "abcde");
        assert_eq!(AccountId::parse("1234").unwrap().as_str(), "1234");
    }

    #[test]
    fn test_account_id_rejects_invalid() {
        assert!(AccountId::parse("").is_err());
        assert!(AccountId::parse("ABCDE").is_err());
        assert!(AccountId::parse("abcdef").is_err());
        assert!(AccountId::parse("ab1de").is_err());
    }

    #[test]
    fn test_account_id_generate_is_natural() {
        use rand::SeedableRng;
        let mut rng = rand::rngs::StdRng::seed_from_u64(5);
        let id = AccountId::generate(&mut rng);
        assert!(validation::is_natural_id(id.as_str()));
    }

    #[test]
    fn test_account_id_serde_validates() {
        let id: AccountId = serde_json::from_str("\"grbot\"").unwrap();
        assert_eq!(id.to_string(), "acct:grbot");
        assert!(serde_json::from_str::<AccountId>("\"not valid\"").is_err());
    }
}
