//! Wires the core components together from configuration.
//!
//! Startup is single-threaded and ordered: validate configuration, build the
//! schema registry and migration chain, create the identifier issuer and the
//! credential issuer, then the orchestrator over the given store. Any
//! inconsistency fails here rather than on the first request.

use std::sync::Arc;

use modgarden_auth::CredentialIssuer;
use modgarden_schema::{MigrationEngine, builtin};
use modgarden_types::{
    Clock, IdIssuer, SchemaError,
    config::{ConfigError, CoreConfig},
};
use snafu::{ResultExt, Snafu};
use tracing::info;

use crate::{orchestrator::SubmissionOrchestrator, storage::RecordStore};

/// Error type for startup.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum BootstrapError {
    /// The configuration is invalid.
    #[snafu(display("Invalid configuration: {source}"))]
    Config { source: ConfigError },

    /// The built-in schema declarations are inconsistent.
    #[snafu(display("Schema setup failed: {source}"))]
    Schema { source: SchemaError },
}

/// The assembled core.
pub struct Core {
    pub clock: Arc<dyn Clock>,
    pub ids: Arc<IdIssuer>,
    pub credentials: Arc<CredentialIssuer>,
    pub orchestrator: Arc<SubmissionOrchestrator>,
}

/// Builds the core for the built-in project schema.
///
/// # Errors
///
/// Returns [`BootstrapError`] if `config` is invalid or the schema does not
/// assemble.
pub fn bootstrap(
    config: &CoreConfig,
    clock: Arc<dyn Clock>,
    store: Arc<dyn RecordStore>,
) -> Result<Core, BootstrapError> {
    let engine = builtin::project_engine().context(SchemaSnafu)?;
    bootstrap_with_engine(config, engine, clock, store)
}

/// Builds the core around a caller-supplied migration engine.
///
/// # Errors
///
/// Returns [`BootstrapError::Config`] if `config` is invalid.
pub fn bootstrap_with_engine(
    config: &CoreConfig,
    engine: MigrationEngine,
    clock: Arc<dyn Clock>,
    store: Arc<dyn RecordStore>,
) -> Result<Core, BootstrapError> {
    config.validate().context(ConfigSnafu)?;

    let ids = Arc::new(IdIssuer::from_config_with_clock(&config.identity, Arc::clone(&clock)));
    let credentials = Arc::new(
        CredentialIssuer::from_config(&config.credentials, Arc::clone(&ids), Arc::clone(&clock))
            .context(ConfigSnafu)?,
    );

    info!(
        worker = ids.worker(),
        schema_version = %engine.current_version(),
        signing_key = %credentials.keyring().current_id(),
        previous_keys = credentials.keyring().load().previous().len(),
        "Core initialized"
    );

    let orchestrator = Arc::new(
        SubmissionOrchestrator::builder()
            .credentials(Arc::clone(&credentials))
            .engine(engine)
            .ids(Arc::clone(&ids))
            .clock(Arc::clone(&clock))
            .store(store)
            .build(),
    );

    Ok(Core { clock, ids, credentials, orchestrator })
}
