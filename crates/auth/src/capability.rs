//! Named permissions carried by access tokens.
//!
//! Account permissions were historically stored as a bitfield. The five
//! legacy bits map onto named capabilities; `submit` and `read` exist only
//! by name.
//!
//! | Bit    | Capability          |
//! |--------|---------------------|
//! | `0x01` | `administrator`     |
//! | `0x02` | `edit_profiles`     |
//! | `0x04` | `moderate_users`    |
//! | `0x08` | `edit_projects`     |
//! | `0x10` | `moderate_projects` |

use std::{collections::BTreeSet, fmt, str::FromStr};

use modgarden_types::validation::{self, ValidationError};
use serde::{Deserialize, Serialize};

/// Implies every other capability.
pub const ADMINISTRATOR: &str = "administrator";
/// Required to submit records.
pub const SUBMIT: &str = "submit";
/// Read-only access.
pub const READ: &str = "read";

const LEGACY_BITS: [(u64, &str); 5] = [
    (0x01, ADMINISTRATOR),
    (0x02, "edit_profiles"),
    (0x04, "moderate_users"),
    (0x08, "edit_projects"),
    (0x10, "moderate_projects"),
];

/// A validated capability name, `[a-z][a-z_]{0,31}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Capability(String);

impl Capability {
    /// Validates `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] if `name` is not a valid capability name.
    pub fn new(name: impl Into<String>) -> Result<Self, ValidationError> {
        let name = name.into();
        validation::validate_capability_name(&name)?;
        Ok(Self(name))
    }

    /// The name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Capability {
    type Error = ValidationError;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        Self::new(name)
    }
}

impl From<Capability> for String {
    fn from(capability: Capability) -> Self {
        capability.0
    }
}

impl FromStr for Capability {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The capabilities granted to a credential.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilitySet(BTreeSet<Capability>);

impl CapabilitySet {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a list of names.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] among `names`.
    pub fn from_names<I, S>(names: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        names.into_iter().map(Capability::new).collect()
    }

    /// Expands a legacy permission bitfield. Unknown bits are ignored.
    pub fn from_permission_bits(bits: u64) -> Self {
        LEGACY_BITS
            .iter()
            .filter(|(bit, _)| bits & bit != 0)
            .map(|(_, name)| Capability((*name).to_string()))
            .collect()
    }

    /// Folds the legacy capabilities back into a bitfield. Named-only
    /// capabilities have no bit and are dropped.
    pub fn to_permission_bits(&self) -> u64 {
        LEGACY_BITS
            .iter()
            .filter(|(_, name)| self.0.iter().any(|c| c.as_str() == *name))
            .fold(0, |bits, (bit, _)| bits | bit)
    }

    /// Adds a capability; returns whether it was new.
    pub fn insert(&mut self, capability: Capability) -> bool {
        self.0.insert(capability)
    }

    /// Whether `name` is literally present.
    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|c| c.as_str() == name)
    }

    /// Whether the set carries `administrator`.
    pub fn is_administrator(&self) -> bool {
        self.contains(ADMINISTRATOR)
    }

    /// Whether the set authorizes `name`, directly or through `administrator`.
    pub fn grants(&self, name: &str) -> bool {
        self.is_administrator() || self.contains(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Capability> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<T: IntoIterator<Item = Capability>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, capability) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(capability.as_str())?;
        }
        f.write_str("}")
    }
}
