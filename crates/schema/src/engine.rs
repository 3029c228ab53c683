//! Migration engine: walks a record forward through the chain.
//!
//! # Algorithm
//!
//! 1. A record already at the target version is validated and returned as is.
//! 2. A record above the target fails with `FutureVersion`; nothing is
//!    ever downgraded.
//! 3. The record is validated against its own version's contract, since
//!    steps are only total over valid input.
//! 4. The full step path is resolved before any step runs.
//! 5. Steps run one version at a time and the output of each is validated
//!    against the contract of the version it produced.
//!
//! Any failure aborts the whole migration. The engine holds no mutable state
//! and performs no I/O, so concurrent calls never block each other and a
//! failed call can be retried as is.

use std::sync::Arc;

use modgarden_types::{SchemaError, SchemaVersion};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::{
    chain::{ChainBuilder, MigrationChain, MigrationStep},
    record::{Fields, VersionedRecord},
    registry::CodecRegistry,
};

/// Upgrades records to a target schema version.
///
/// Cheap to clone; the registry and chain are shared.
#[derive(Debug, Clone)]
pub struct MigrationEngine {
    registry: Arc<CodecRegistry>,
    chain: Arc<MigrationChain>,
}

impl MigrationEngine {
    /// Validates `steps` against `registry` and assembles the engine.
    ///
    /// # Errors
    ///
    /// Returns any error from [`ChainBuilder::build`].
    pub fn new(registry: CodecRegistry, steps: ChainBuilder) -> Result<Self, SchemaError> {
        let chain = steps.build(&registry)?;
        Ok(Self { registry: Arc::new(registry), chain: Arc::new(chain) })
    }

    /// The codec registry.
    pub fn registry(&self) -> &CodecRegistry {
        &self.registry
    }

    /// The migration chain.
    pub fn chain(&self) -> &MigrationChain {
        &self.chain
    }

    /// Highest registered schema version.
    pub fn current_version(&self) -> SchemaVersion {
        self.registry.current_version()
    }

    /// Parses a tagged JSON record and fills in its version's defaults.
    ///
    /// # Errors
    ///
    /// See [`CodecRegistry::ingest`].
    pub fn ingest(&self, value: Value) -> Result<VersionedRecord, SchemaError> {
        self.registry.ingest(value)
    }

    /// Resolves the steps leading from `from` to `to`.
    ///
    /// An empty plan means `from == to`.
    ///
    /// # Errors
    ///
    /// - [`SchemaError::FutureVersion`] if `from > to`.
    /// - [`SchemaError::NoMigrationPath`] if some version on the way has no
    ///   step, including when `to` is above the current version.
    pub fn plan(
        &self,
        from: SchemaVersion,
        to: SchemaVersion,
    ) -> Result<Vec<&MigrationStep>, SchemaError> {
        if from > to {
            return Err(SchemaError::FutureVersion { version: from, target: to });
        }
        let mut steps = Vec::with_capacity(self.chain.len());
        let mut version = from;
        while version < to {
            let step = self
                .chain
                .step_for(version)
                .map_err(|_| SchemaError::NoMigrationPath { from: version, to })?;
            version = step.to();
            steps.push(step);
        }
        Ok(steps)
    }

    /// Migrates `record` to `target`.
    ///
    /// Returns a new record tagged `target` carrying the same id, or an
    /// error. A partially migrated record is never returned.
    ///
    /// # Errors
    ///
    /// - [`SchemaError::FutureVersion`] if the record is newer than `target`.
    /// - [`SchemaError::UnknownVersion`] if the record's version is not registered.
    /// - [`SchemaError::NoMigrationPath`] if `target` cannot be reached.
    /// - [`SchemaError::MigrationContractViolation`] if the input or any
    ///   intermediate result violates its version's contract.
    #[instrument(skip_all, fields(from = %record.version(), to = %target))]
    pub fn migrate(
        &self,
        record: VersionedRecord,
        target: SchemaVersion,
    ) -> Result<VersionedRecord, SchemaError> {
        let (from, id, fields) = record.into_parts();

        if from > target {
            return Err(SchemaError::FutureVersion { version: from, target });
        }
        self.validate(from, &fields)?;

        let mut fields = fields;
        for step in self.plan(from, target)? {
            debug!(
                from = %step.from(),
                to = %step.to(),
                step = step.name(),
                "Applying migration step"
            );
            fields = step.apply(fields).inspect_err(|e| {
                warn!(step = step.name(), error = %e, "Migration step failed");
            })?;
            self.validate(step.to(), &fields)?;
        }

        let migrated = VersionedRecord::new(target, fields);
        Ok(match id {
            Some(id) => migrated.with_id(id),
            None => migrated,
        })
    }

    /// Migrates `record` to the current version.
    ///
    /// # Errors
    ///
    /// See [`migrate`](Self::migrate).
    pub fn migrate_to_current(
        &self,
        record: VersionedRecord,
    ) -> Result<VersionedRecord, SchemaError> {
        self.migrate(record, self.current_version())
    }

    /// Checks a record body against the contract of `version`.
    ///
    /// # Errors
    ///
    /// - [`SchemaError::UnknownVersion`] if `version` is not registered.
    /// - [`SchemaError::MigrationContractViolation`] listing every violation.
    pub fn validate(&self, version: SchemaVersion, fields: &Fields) -> Result<(), SchemaError> {
        self.registry.contract_for(version)?.validate(fields).map_err(|violations| {
            warn!(%version, violations = violations.len(), "Record violates contract");
            SchemaError::MigrationContractViolation { version, violations }
        })
    }
}
