//! Codec registry: the shape contract valid at each schema version.
//!
//! Built once at startup through [`RegistryBuilder`] and frozen into a
//! [`CodecRegistry`], which has no mutation API and is shared behind `Arc`.

use std::collections::BTreeMap;

use modgarden_types::{SchemaError, SchemaVersion};
use serde_json::Value;

use crate::{contract::ShapeContract, record::VersionedRecord};

/// Startup-time builder for [`CodecRegistry`].
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    contracts: BTreeMap<SchemaVersion, ShapeContract>,
}

impl RegistryBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the contract for `version`.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::DuplicateVersion`] if `version` already has a
    /// contract.
    pub fn register(
        &mut self,
        version: SchemaVersion,
        contract: ShapeContract,
    ) -> Result<&mut Self, SchemaError> {
        if self.contracts.contains_key(&version) {
            return Err(SchemaError::DuplicateVersion { version });
        }
        self.contracts.insert(version, contract);
        Ok(self)
    }

    /// Freezes the registry.
    ///
    /// # Errors
    ///
    /// - [`SchemaError::EmptyRegistry`] if nothing was registered.
    /// - [`SchemaError::VersionGap`] if registered versions are not
    ///   contiguous, or the lowest version is above 1.
    pub fn build(self) -> Result<CodecRegistry, SchemaError> {
        let (Some(base), Some(current)) =
            (self.contracts.keys().next().copied(), self.contracts.keys().next_back().copied())
        else {
            return Err(SchemaError::EmptyRegistry);
        };

        if base.value() > 1 {
            return Err(SchemaError::VersionGap { missing: SchemaVersion::new(base.value() - 1) });
        }
        let mut expected = base.value();
        for version in self.contracts.keys() {
            if version.value() != expected {
                return Err(SchemaError::VersionGap { missing: SchemaVersion::new(expected) });
            }
            expected = expected.saturating_add(1);
        }

        Ok(CodecRegistry { base, current, contracts: self.contracts })
    }
}

/// Frozen map from schema version to shape contract.
///
/// Versions form a contiguous run from [`base_version`](Self::base_version)
/// (0 or 1) to [`current_version`](Self::current_version).
#[derive(Debug, Clone)]
pub struct CodecRegistry {
    base: SchemaVersion,
    current: SchemaVersion,
    contracts: BTreeMap<SchemaVersion, ShapeContract>,
}

impl CodecRegistry {
    /// Starts a new registry.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Returns the contract registered for `version`.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::UnknownVersion`] if `version` is not registered.
    pub fn contract_for(&self, version: SchemaVersion) -> Result<&ShapeContract, SchemaError> {
        self.contracts.get(&version).ok_or(SchemaError::UnknownVersion { version })
    }

    /// Highest registered version.
    #[inline]
    pub fn current_version(&self) -> SchemaVersion {
        self.current
    }

    /// Lowest registered version.
    #[inline]
    pub fn base_version(&self) -> SchemaVersion {
        self.base
    }

    /// Whether `version` is registered.
    pub fn contains(&self, version: SchemaVersion) -> bool {
        self.contracts.contains_key(&version)
    }

    /// Iterates registered versions in ascending order.
    pub fn versions(&self) -> impl Iterator<Item = SchemaVersion> + '_ {
        self.contracts.keys().copied()
    }

    /// Parses a tagged record and fills in the defaults of its declared
    /// version. The record is not validated here.
    ///
    /// # Errors
    ///
    /// - [`SchemaError::MalformedRecord`] if `value` is not a tagged record.
    /// - [`SchemaError::FutureVersion`] if the tag is above the current version.
    /// - [`SchemaError::UnknownVersion`] if the tag is below the base version.
    pub fn ingest(&self, value: Value) -> Result<VersionedRecord, SchemaError> {
        let record = VersionedRecord::from_json(value)?;
        let current = self.current_version();
        if record.version() > current {
            return Err(SchemaError::FutureVersion { version: record.version(), target: current });
        }
        let contract = self.contract_for(record.version())?;
        let (version, id, fields) = record.into_parts();
        let record = VersionedRecord::new(version, contract.with_defaults(fields));
        Ok(match id {
            Some(id) => record.with_id(id),
            None => record,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::contract::FieldKind;

    fn v(n: u32) -> SchemaVersion {
        SchemaVersion::new(n)
    }

    fn any() -> ShapeContract {
        ShapeContract::builder().allow_unknown_fields(true).build().unwrap()
    }

    fn registry(versions: &[u32]) -> Result<CodecRegistry, SchemaError> {
        let mut builder = CodecRegistry::builder();
        for &n in versions {
            builder.register(v(n), any())?;
        }
        builder.build()
    }

    #[test]
    fn test_contiguous_from_one() {
        let registry = registry(&[1, 2, 3]).unwrap();
        assert_eq!(registry.base_version(), v(1));
        assert_eq!(registry.current_version(), v(3));
        assert_eq!(registry.versions().collect::<Vec<_>>(), vec![v(1), v(2), v(3)]);
    }

    #[test]
    fn test_contiguous_from_zero() {
        let registry = registry(&[2, 0, 1]).unwrap();
        assert_eq!(registry.base_version(), v(0));
        assert_eq!(registry.current_version(), v(2));
    }

    #[test]
    fn test_duplicate_version_rejected() {
        let mut builder = CodecRegistry::builder();
        builder.register(v(1), any()).unwrap();
        let err = builder.register(v(1), any()).unwrap_err();
        assert_eq!(err, SchemaError::DuplicateVersion { version: v(1) });
    }

    #[test]
    fn test_empty_registry_rejected() {
        assert_eq!(registry(&[]).unwrap_err(), SchemaError::EmptyRegistry);
    }

    #[test]
    fn test_gap_rejected() {
        assert_eq!(registry(&[1, 2, 4]).unwrap_err(), SchemaError::VersionGap { missing: v(3) });
        assert_eq!(registry(&[3, 4]).unwrap_err(), SchemaError::VersionGap { missing: v(2) });
    }

    #[test]
    fn test_unknown_version() {
        let registry = registry(&[1, 2]).unwrap();
        assert!(registry.contract_for(v(2)).is_ok());
        assert!(registry.contains(v(1)));
        assert_eq!(
            registry.contract_for(v(3)).unwrap_err(),
            SchemaError::UnknownVersion { version: v(3) }
        );
    }

    #[test]
    fn test_ingest_applies_declared_version_defaults() {
        let mut builder = CodecRegistry::builder();
        builder
            .register(
                v(1),
                ShapeContract::builder()
                    .required("name", FieldKind::String)
                    .defaulted("downloads", FieldKind::Integer, json!(0))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        let registry = builder.build().unwrap();

        let record = registry.ingest(json!({"schema_version": 1, "id": 4, "name": "Foo"})).unwrap();
        assert_eq!(record.get("downloads"), Some(&json!(0)));
        assert_eq!(record.id().map(|id| id.value()), Some(4));
    }

    #[test]
    fn test_ingest_below_base_is_unknown() {
        let registry = registry(&[1, 2]).unwrap();
        let err = registry.ingest(json!({"schema_version": 0})).unwrap_err();
        assert_eq!(err, SchemaError::UnknownVersion { version: v(0) });
    }

    #[test]
    fn test_ingest_above_current_is_future_version() {
        let registry = registry(&[1, 2, 3]).unwrap();
        let err = registry.ingest(json!({"schema_version": 5, "title": "Foo"})).unwrap_err();
        assert_eq!(err, SchemaError::FutureVersion { version: v(5), target: v(3) });

        let err = registry.ingest(json!({"schema_version": u32::MAX})).unwrap_err();
        assert_eq!(err, SchemaError::FutureVersion { version: v(u32::MAX), target: v(3) });
    }
}
