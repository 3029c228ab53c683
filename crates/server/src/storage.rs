//! Storage collaborator seam.
//!
//! The orchestrator hands fully migrated, identified records to a
//! [`RecordStore`] and surfaces its failures unchanged. [`MemoryStore`] backs
//! the CLI and tests.

use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use modgarden_schema::VersionedRecord;
use modgarden_types::{AccountId, ErrorCode, RecordId};
use parking_lot::RwLock;
use snafu::Snafu;

/// Failure reported by a storage collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub))]
pub enum StoreError {
    /// The write was not accepted.
    #[snafu(display("Storage write failed for {id}: {message}"))]
    Write {
        /// Record that failed to persist.
        id: RecordId,
        /// Collaborator-supplied detail.
        message: String,
    },

    /// The record body does not carry the id it is stored under.
    #[snafu(display("Record body id does not match {id}"))]
    IdMismatch {
        /// Id the record was stored under.
        id: RecordId,
    },
}

impl StoreError {
    /// Returns the machine-readable error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        ErrorCode::StorageWrite
    }
}

/// A record as persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    /// Permanent id; equals `record.id()`.
    pub id: RecordId,
    /// Current-version record body.
    pub record: VersionedRecord,
    /// Account whose token authorized the write.
    pub submitted_by: AccountId,
    /// When the orchestrator handed the record over.
    pub stored_at: DateTime<Utc>,
}

/// Persists submitted records.
///
/// Writing a record whose id already exists replaces it.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Persists `record`.
    async fn put(&self, record: StoredRecord) -> Result<(), StoreError>;

    /// Fetches a record by id.
    async fn get(&self, id: RecordId) -> Result<Option<StoredRecord>, StoreError>;
}

/// In-process [`RecordStore`].
///
/// Clones share the same records.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: Arc<RwLock<BTreeMap<RecordId, StoredRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// All records in id order.
    pub fn records(&self) -> Vec<StoredRecord> {
        self.records.read().values().cloned().collect()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn put(&self, record: StoredRecord) -> Result<(), StoreError> {
        if record.record.id() != Some(record.id) {
            return Err(StoreError::IdMismatch { id: record.id });
        }
        self.records.write().insert(record.id, record);
        Ok(())
    }

    async fn get(&self, id: RecordId) -> Result<Option<StoredRecord>, StoreError> {
        Ok(self.records.read().get(&id).cloned())
    }
}
