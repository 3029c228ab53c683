//! Migration chain: one step per source version, `vN -> vN+1`.
//!
//! Steps may be registered in any order. [`ChainBuilder::build`] checks the
//! chain against the registry and refuses to produce a [`MigrationChain`]
//! with a gap between the base and current version.

use std::{collections::BTreeMap, fmt, sync::Arc};

use modgarden_types::{FieldViolation, SchemaError, SchemaVersion};

use crate::{record::Fields, registry::CodecRegistry};

/// Structural failure reported by a migration step.
///
/// A step is total over inputs that satisfy its source contract. It only
/// fails when the input does not, and says which fields were at fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepError {
    /// Fields the step could not transform.
    pub violations: Vec<FieldViolation>,
}

impl StepError {
    /// Single-field failure.
    pub fn field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self { violations: vec![FieldViolation::new(field, reason)] }
    }
}

impl fmt::Display for StepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, violation) in self.violations.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{violation}")?;
        }
        Ok(())
    }
}

impl std::error::Error for StepError {}

type StepFn = dyn Fn(Fields) -> Result<Fields, StepError> + Send + Sync;

/// A pure transformation advancing a record body by one version.
#[derive(Clone)]
pub struct MigrationStep {
    from: SchemaVersion,
    name: &'static str,
    apply: Arc<StepFn>,
}

impl MigrationStep {
    /// Source version.
    #[inline]
    pub fn from(&self) -> SchemaVersion {
        self.from
    }

    /// Target version, `from + 1`.
    #[inline]
    pub fn to(&self) -> SchemaVersion {
        // Steps out of u32::MAX are rejected at registration.
        SchemaVersion::new(self.from.value() + 1)
    }

    /// Short description used in logs.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Runs the step.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::MigrationContractViolation`] tagged with the
    /// source version if the step reports a structural failure.
    pub fn apply(&self, fields: Fields) -> Result<Fields, SchemaError> {
        (self.apply)(fields).map_err(|e| SchemaError::MigrationContractViolation {
            version: self.from,
            violations: e.violations,
        })
    }
}

impl fmt::Debug for MigrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationStep")
            .field("from", &self.from)
            .field("to", &self.to())
            .field("name", &self.name)
            .finish()
    }
}

/// Startup-time builder for [`MigrationChain`].
#[derive(Debug, Default)]
pub struct ChainBuilder {
    steps: BTreeMap<SchemaVersion, MigrationStep>,
}

impl ChainBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the step advancing `from -> from + 1`.
    ///
    /// # Errors
    ///
    /// - [`SchemaError::DuplicateStep`] if `from` already has a step.
    /// - [`SchemaError::UnknownVersion`] if `from` is `u32::MAX`.
    pub fn step<F>(
        &mut self,
        from: SchemaVersion,
        name: &'static str,
        apply: F,
    ) -> Result<&mut Self, SchemaError>
    where
        F: Fn(Fields) -> Result<Fields, StepError> + Send + Sync + 'static,
    {
        if from.next().is_none() {
            return Err(SchemaError::UnknownVersion { version: from });
        }
        if self.steps.contains_key(&from) {
            return Err(SchemaError::DuplicateStep { from });
        }
        self.steps.insert(from, MigrationStep { from, name, apply: Arc::new(apply) });
        Ok(self)
    }

    /// Validates the chain against `registry` and freezes it.
    ///
    /// # Errors
    ///
    /// - [`SchemaError::UnknownVersion`] if a step starts at or targets a
    ///   version the registry does not know.
    /// - [`SchemaError::IncompleteMigrationChain`] if some version below
    ///   current has no step.
    pub fn build(self, registry: &CodecRegistry) -> Result<MigrationChain, SchemaError> {
        for step in self.steps.values() {
            if !registry.contains(step.from()) {
                return Err(SchemaError::UnknownVersion { version: step.from() });
            }
            if !registry.contains(step.to()) {
                return Err(SchemaError::UnknownVersion { version: step.to() });
            }
        }

        let current = registry.current_version();
        for version in registry.versions().take_while(|v| *v < current) {
            if !self.steps.contains_key(&version) {
                return Err(SchemaError::IncompleteMigrationChain {
                    missing_from: version,
                    current,
                });
            }
        }

        Ok(MigrationChain { current, steps: self.steps })
    }
}

/// Frozen, gap-free sequence of migration steps.
#[derive(Debug, Clone)]
pub struct MigrationChain {
    current: SchemaVersion,
    steps: BTreeMap<SchemaVersion, MigrationStep>,
}

impl MigrationChain {
    /// Starts a new chain.
    pub fn builder() -> ChainBuilder {
        ChainBuilder::new()
    }

    /// Returns the step advancing `from -> from + 1`.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::NoMigrationPath`] if `from` is already current
    /// or has no step.
    pub fn step_for(&self, from: SchemaVersion) -> Result<&MigrationStep, SchemaError> {
        let to = from.next().unwrap_or(from);
        if from >= self.current {
            return Err(SchemaError::NoMigrationPath { from, to });
        }
        self.steps.get(&from).ok_or(SchemaError::NoMigrationPath { from, to })
    }

    /// Version the chain leads to.
    #[inline]
    pub fn current_version(&self) -> SchemaVersion {
        self.current
    }

    /// Number of registered steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the chain has no steps (a single-version registry).
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use super::*;
    use crate::contract::ShapeContract;

    fn v(n: u32) -> SchemaVersion {
        SchemaVersion::new(n)
    }

    fn registry(versions: &[u32]) -> CodecRegistry {
        let mut builder = CodecRegistry::builder();
        for &n in versions {
            let open = ShapeContract::builder().allow_unknown_fields(true).build().unwrap();
            builder.register(v(n), open).unwrap();
        }
        builder.build().unwrap()
    }

    fn identity(fields: Fields) -> Result<Fields, StepError> {
        Ok(fields)
    }

    #[test]
    fn test_out_of_order_registration_is_allowed() {
        let mut builder = MigrationChain::builder();
        builder.step(v(2), "second", identity).unwrap().step(v(1), "first", identity).unwrap();
        let chain = builder.build(&registry(&[1, 2, 3])).unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.step_for(v(1)).unwrap().name(), "first");
        assert_eq!(chain.step_for(v(2)).unwrap().to(), v(3));
    }

    #[test]
    fn test_gap_fails_fast() {
        let mut builder = MigrationChain::builder();
        builder.step(v(2), "second", identity).unwrap();
        let err = builder.build(&registry(&[1, 2, 3])).unwrap_err();
        assert_eq!(
            err,
            SchemaError::IncompleteMigrationChain { missing_from: v(1), current: v(3) }
        );
    }

    #[test]
    fn test_duplicate_step_rejected() {
        let mut builder = MigrationChain::builder();
        builder.step(v(1), "a", identity).unwrap();
        let err = builder.step(v(1), "b", identity).unwrap_err();
        assert_eq!(err, SchemaError::DuplicateStep { from: v(1) });
    }

    #[test]
    fn test_step_beyond_registry_rejected() {
        let mut builder = MigrationChain::builder();
        builder.step(v(1), "a", identity).unwrap().step(v(2), "b", identity).unwrap();
        let err = builder.build(&registry(&[1, 2])).unwrap_err();
        assert_eq!(err, SchemaError::UnknownVersion { version: v(3) });
    }

    #[test]
    fn test_step_from_max_version_rejected() {
        let mut builder = MigrationChain::builder();
        let err = builder.step(v(u32::MAX), "overflow", identity).unwrap_err();
        assert_eq!(err, SchemaError::UnknownVersion { version: v(u32::MAX) });
    }

    #[test]
    fn test_step_for_current_is_no_path() {
        let mut builder = MigrationChain::builder();
        builder.step(v(1), "a", identity).unwrap();
        let chain = builder.build(&registry(&[1, 2])).unwrap();
        assert_eq!(
            chain.step_for(v(2)).unwrap_err(),
            SchemaError::NoMigrationPath { from: v(2), to: v(3) }
        );
        assert_eq!(
            chain.step_for(v(0)).unwrap_err(),
            SchemaError::NoMigrationPath { from: v(0), to: v(1) }
        );
    }

    #[test]
    fn test_single_version_chain_is_empty() {
        let chain = MigrationChain::builder().build(&registry(&[0])).unwrap();
        assert!(chain.is_empty());
        assert_eq!(chain.current_version(), v(0));
    }

    #[test]
    fn test_step_failure_becomes_contract_violation() {
        let mut builder = MigrationChain::builder();
        builder
            .step(v(1), "needs name", |_| Err(StepError::field("name", "missing required field")))
            .unwrap();
        let chain = builder.build(&registry(&[1, 2])).unwrap();
        let err = chain.step_for(v(1)).unwrap().apply(Fields::new()).unwrap_err();
        assert_eq!(
            err,
            SchemaError::MigrationContractViolation {
                version: v(1),
                violations: vec![FieldViolation::new("name", "missing required field")],
            }
        );
    }
}
