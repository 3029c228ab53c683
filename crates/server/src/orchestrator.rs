//! Submission orchestrator.
//!
//! `submit` is the one place where failures from several subsystems meet.
//! Each arrives wrapped in the [`SubmissionError`] variant naming its
//! subsystem with the original error untouched as `source`, so callers can
//! still branch on the exact kind and its [`ErrorCode`].

use std::sync::Arc;

use modgarden_auth::{AccessToken, CredentialIssuer, capability::SUBMIT};
use modgarden_schema::MigrationEngine;
use modgarden_types::{
    AuthorizationError, Clock, CredentialError, ErrorCode, IdIssuer, IdentityError, RecordId,
    SchemaError,
};
use serde_json::Value;
use snafu::{ResultExt, Snafu};
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::{Span, field, info, instrument, warn};

use crate::storage::{RecordStore, StoreError, StoredRecord};

/// Why a submission was not stored.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub))]
pub enum SubmissionError {
    /// The token did not verify.
    #[snafu(display("{source}"))]
    Credential { source: CredentialError },

    /// The token verified but does not grant `submit`.
    #[snafu(display("{source}"))]
    Authorization { source: AuthorizationError },

    /// The record could not be brought to the current schema version.
    #[snafu(display("{source}"))]
    Schema { source: SchemaError },

    /// No record id could be issued.
    #[snafu(display("{source}"))]
    Identity { source: IdentityError },

    /// The storage collaborator rejected the write.
    #[snafu(display("{source}"))]
    Storage { source: StoreError },
}

impl SubmissionError {
    /// Code of the underlying error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Credential { source } => source.code(),
            Self::Authorization { source } => source.code(),
            Self::Schema { source } => source.code(),
            Self::Identity { source } => source.code(),
            Self::Storage { source } => source.code(),
        }
    }

    /// Whether resubmitting could succeed. Delegates to [`ErrorCode::is_retryable`].
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.code().is_retryable()
    }
}

/// Verifies, authorizes, migrates, identifies and stores submitted records.
pub struct SubmissionOrchestrator {
    credentials: Arc<CredentialIssuer>,
    engine: MigrationEngine,
    ids: Arc<IdIssuer>,
    clock: Arc<dyn Clock>,
    store: Arc<dyn RecordStore>,
}

#[bon::bon]
impl SubmissionOrchestrator {
    #[builder]
    pub fn new(
        credentials: Arc<CredentialIssuer>,
        engine: MigrationEngine,
        ids: Arc<IdIssuer>,
        clock: Arc<dyn Clock>,
        store: Arc<dyn RecordStore>,
    ) -> Self {
        Self { credentials, engine, ids, clock, store }
    }
}

impl SubmissionOrchestrator {
    /// Stores `raw` on behalf of the bearer of `token` and returns its id.
    ///
    /// In order: verify the token, require the `submit` capability, migrate
    /// the record to the current version, assign an id unless it already
    /// has one, persist. Nothing is written unless every earlier stage
    /// succeeded.
    ///
    /// Issuing an id can block for up to a millisecond when the issuer's
    /// per-millisecond sequence is exhausted. On a multi-thread runtime that
    /// wait runs under [`tokio::task::block_in_place`].
    ///
    /// # Errors
    ///
    /// Returns the [`SubmissionError`] variant of the first stage that
    /// failed, carrying that stage's error unchanged.
    #[instrument(skip_all, fields(subject = field::Empty, from = field::Empty))]
    pub async fn submit(
        &self,
        token: &AccessToken,
        raw: Value,
    ) -> Result<RecordId, SubmissionError> {
        let claims = self.credentials.verify(token).context(CredentialSnafu)?;
        let span = Span::current();
        span.record("subject", field::display(&claims.subject));

        if !claims.capabilities.grants(SUBMIT) {
            warn!(capabilities = %claims.capabilities, "Submission forbidden");
            return Err(SubmissionError::Authorization {
                source: AuthorizationError::Forbidden {
                    required: SUBMIT.to_string(),
                    subject: claims.subject.to_string(),
                },
            });
        }

        let record = self.engine.ingest(raw).context(SchemaSnafu)?;
        span.record("from", field::display(record.version()));
        let record = self.engine.migrate_to_current(record).context(SchemaSnafu)?;

        let (id, record) = match record.id() {
            Some(id) => (id, record),
            None => {
                let id = self.issue_record_id().context(IdentitySnafu)?;
                (id, record.with_id(id))
            },
        };

        let version = record.version();
        let stored =
            StoredRecord { id, record, submitted_by: claims.subject, stored_at: self.clock.now() };
        self.store.put(stored).await.context(StorageSnafu)?;

        info!(record_id = %id, version = %version, "Record stored");
        Ok(id)
    }

    fn issue_record_id(&self) -> Result<RecordId, IdentityError> {
        match Handle::try_current().map(|handle| handle.runtime_flavor()) {
            Ok(RuntimeFlavor::MultiThread) => {
                tokio::task::block_in_place(|| self.ids.next_record_id())
            },
            _ => self.ids.next_record_id(),
        }
    }

    /// Engine used to migrate submissions.
    pub fn engine(&self) -> &MigrationEngine {
        &self.engine
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use modgarden_auth::{CapabilitySet, capability::READ};
    use modgarden_schema::{
        CodecRegistry, FieldKind, MigrationChain, ShapeContract, StepError, ops, record::Fields,
    };
    use modgarden_test_utils::{ManualClock, test_credential_config};
    use modgarden_types::{AccountId, SchemaVersion};
    use serde_json::json;

    use super::*;
    use crate::storage::MemoryStore;

    struct Fixture {
        clock: ManualClock,
        credentials: Arc<CredentialIssuer>,
        store: MemoryStore,
        orchestrator: SubmissionOrchestrator,
    }

    /// v1 `{name}` -> v2 adds `category` -> v3 renames `name` to `title`.
    fn engine() -> MigrationEngine {
        let v = SchemaVersion::new;
        let mut registry = CodecRegistry::builder();
        registry
            .register(
                v(1),
                ShapeContract::builder().required("name", FieldKind::String).build().unwrap(),
            )
            .unwrap()
            .register(
                v(2),
                ShapeContract::builder()
                    .required("name", FieldKind::String)
                    .required("category", FieldKind::String)
                    .build()
                    .unwrap(),
            )
            .unwrap()
            .register(
                v(3),
                ShapeContract::builder()
                    .required("title", FieldKind::String)
                    .required("category", FieldKind::String)
                    .build()
                    .unwrap(),
            )
            .unwrap();

        let mut steps = MigrationChain::builder();
        steps
            .step(v(1), "add category", |mut f: Fields| {
                ops::add_field(&mut f, "category", json!("unknown"));
                Ok(f)
            })
            .unwrap()
            .step(v(2), "rename name", |mut f: Fields| -> Result<Fields, StepError> {
                ops::rename_field(&mut f, "name", "title")?;
                Ok(f)
            })
            .unwrap();
        MigrationEngine::new(registry.build().unwrap(), steps).unwrap()
    }

    fn fixture_with_store(store: Arc<dyn RecordStore>, memory: MemoryStore) -> Fixture {
        let clock = ManualClock::default();
        let ids = Arc::new(IdIssuer::new(1, Arc::new(clock.clone())));
        let credentials = Arc::new(
            CredentialIssuer::from_config(
                &test_credential_config(),
                Arc::clone(&ids),
                Arc::new(clock.clone()),
            )
            .unwrap(),
        );
        let orchestrator = SubmissionOrchestrator::builder()
            .credentials(Arc::clone(&credentials))
            .engine(engine())
            .ids(ids)
            .clock(Arc::new(clock.clone()))
            .store(store)
            .build();
        Fixture { clock, credentials, store: memory, orchestrator }
    }

    fn fixture() -> Fixture {
        let store = MemoryStore::new();
        fixture_with_store(Arc::new(store.clone()), store)
    }

    fn token(f: &Fixture, capabilities: &[&str]) -> AccessToken {
        let account = AccountId::parse("abcde").unwrap();
        let caps = CapabilitySet::from_names(capabilities.iter().copied()).unwrap();
        f.credentials.issue(&account, caps, Duration::from_secs(60)).unwrap().token
    }

    #[tokio::test]
    async fn test_submit_migrates_identifies_and_stores() {
        let f = fixture();
        let id = f
            .orchestrator
            .submit(&token(&f, &[SUBMIT]), json!({"schema_version": 1, "name": "Foo"}))
            .await
            .unwrap();

        let stored = f.store.get(id).await.unwrap().unwrap();
        assert_eq!(stored.submitted_by.as_str(), "abcde");
        assert_eq!(
            stored.record.to_json(),
            json!({
                "schema_version": 3,
                "id": id.value().to_string(),
                "title": "Foo",
                "category": "unknown",
            })
        );
    }

    #[tokio::test]
    async fn test_read_token_is_forbidden() {
        let f = fixture();
        let raw = json!({"schema_version": 3, "title": "Foo", "category": "x"});
        let err = f.orchestrator.submit(&token(&f, &[READ]), raw).await.unwrap_err();
        assert_eq!(
            err,
            SubmissionError::Authorization {
                source: AuthorizationError::Forbidden {
                    required: "submit".into(),
                    subject: "acct:abcde".into(),
                },
            }
        );
        assert_eq!(err.code(), ErrorCode::AuthorizationForbidden);
        assert!(f.store.is_empty());
    }

    #[tokio::test]
    async fn test_administrator_may_submit() {
        let f = fixture();
        let raw = json!({"schema_version": 2, "name": "Foo", "category": "tools"});
        assert!(f.orchestrator.submit(&token(&f, &["administrator"]), raw).await.is_ok());
    }

    #[tokio::test]
    async fn test_expired_token_passes_through() {
        let f = fixture();
        let token = token(&f, &[SUBMIT]);
        f.clock.advance(Duration::from_secs(61));
        let err = f
            .orchestrator
            .submit(&token, json!({"schema_version": 1, "name": "Foo"}))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SubmissionError::Credential { source: CredentialError::TokenExpired { .. } }
        ));
        assert!(err.is_retryable());
        assert!(f.store.is_empty());
    }

    #[tokio::test]
    async fn test_credentials_checked_before_record() {
        let f = fixture();
        let err = f
            .orchestrator
            .submit(&AccessToken::new("garbage"), json!("not even a record"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::CredentialTokenMalformed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_sequence_exhaustion_on_worker_thread() {
        let f = fixture();
        let token = token(&f, &[SUBMIT]);
        let mut ids = std::collections::BTreeSet::new();
        for n in 0..1100 {
            let raw = json!({"schema_version": 1, "name": format!("mod {n}")});
            ids.insert(f.orchestrator.submit(&token, raw).await.unwrap());
        }
        assert_eq!(ids.len(), 1100);
        assert_eq!(f.store.len(), 1100);
        assert!(f.clock.sleeps() >= 1);
    }

    #[tokio::test]
    async fn test_future_version_passes_through() {
        let f = fixture();
        let err = f
            .orchestrator
            .submit(&token(&f, &[SUBMIT]), json!({"schema_version": 5, "title": "Foo"}))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            SubmissionError::Schema {
                source: SchemaError::FutureVersion {
                    version: SchemaVersion::new(5),
                    target: SchemaVersion::new(3),
                },
            }
        );
        assert!(f.store.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_record_is_not_stored() {
        let f = fixture();
        let err = f
            .orchestrator
            .submit(&token(&f, &[SUBMIT]), json!({"schema_version": 1, "name": 7}))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::SchemaContractViolation);
        assert!(!err.is_retryable());
        assert!(f.store.is_empty());
    }

    #[tokio::test]
    async fn test_existing_id_is_kept() {
        let f = fixture();
        let raw = json!({"schema_version": 1, "id": "42", "name": "Foo"});
        let id = f.orchestrator.submit(&token(&f, &[SUBMIT]), raw).await.unwrap();
        assert_eq!(id, RecordId::new(42));
        assert_eq!(f.store.len(), 1);
    }

    #[tokio::test]
    async fn test_ids_increase_across_submissions() {
        let f = fixture();
        let token = token(&f, &[SUBMIT]);
        let mut last = None;
        for _ in 0..5 {
            let raw = json!({"schema_version": 1, "name": "Foo"});
            let id = f.orchestrator.submit(&token, raw).await.unwrap();
            assert!(last.is_none_or(|prev| id > prev));
            last = Some(id);
        }
        assert_eq!(f.store.len(), 5);
    }

    #[tokio::test]
    async fn test_clock_regression_passes_through() {
        let f = fixture();
        let token = token(&f, &[SUBMIT]);
        f.clock.set_ms(f.clock.now_ms() - 10);
        let err = f
            .orchestrator
            .submit(&token, json!({"schema_version": 1, "name": "Foo"}))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SubmissionError::Identity { source: IdentityError::ClockRegression { .. } }
        ));
        assert!(f.store.is_empty());
    }

    struct RejectingStore;

    #[async_trait]
    impl RecordStore for RejectingStore {
        async fn put(&self, record: StoredRecord) -> Result<(), StoreError> {
            Err(StoreError::Write { id: record.id, message: "disk full".into() })
        }

        async fn get(&self, _id: RecordId) -> Result<Option<StoredRecord>, StoreError> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_storage_failure_passes_through() {
        let f = fixture_with_store(Arc::new(RejectingStore), MemoryStore::new());
        let err = f
            .orchestrator
            .submit(&token(&f, &[SUBMIT]), json!({"schema_version": 1, "id": 9, "name": "Foo"}))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            SubmissionError::Storage {
                source: StoreError::Write { id: RecordId::new(9), message: "disk full".into() },
            }
        );
        assert_eq!(err.code(), ErrorCode::StorageWrite);
    }
}
