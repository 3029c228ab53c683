//! Fuzz target for record parsing and migration.
//!
//! Arbitrary bytes go through `VersionedRecord::from_slice` and the project
//! engine. Nothing may panic, and any record that migrates must come out at
//! the current version and validate there.

#![no_main]

use libfuzzer_sys::fuzz_target;
use modgarden_schema::{VersionedRecord, builtin};

fuzz_target!(|data: &[u8]| {
    let _ = VersionedRecord::from_slice(data);

    let Ok(value) = serde_json::from_slice::<serde_json::Value>(data) else {
        return;
    };
    let Ok(engine) = builtin::project_engine() else {
        return;
    };
    let Ok(record) = engine.ingest(value) else {
        return;
    };
    let id = record.id();
    if let Ok(migrated) = engine.migrate_to_current(record) {
        assert_eq!(migrated.version(), engine.current_version());
        assert_eq!(migrated.id(), id);
        assert!(engine.validate(migrated.version(), migrated.fields()).is_ok());
    }
});
