//! Mod Garden record core binary.
//!
//! # Usage
//!
//! ```bash
//! # Print an example configuration
//! modgarden-core config example > core.toml
//!
//! # Bring a stored record up to the current schema
//! modgarden-core migrate --input project.json
//!
//! # Issue a token and submit with it
//! TOKEN=$(modgarden-core --config core.toml token issue --account abcde --capability submit)
//! modgarden-core --config core.toml submit --token "$TOKEN" --input project.json
//!
//! # Line-delimited JSON intake on stdin; SIGHUP reloads signing keys
//! modgarden-core --config core.toml serve < requests.ndjson
//! ```

use std::{
    io::IsTerminal,
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
    time::Duration,
};

use clap::Parser;
use modgarden_auth::{AccessToken, CapabilitySet, CredentialIssuer};
use modgarden_schema::builtin;
use modgarden_server::{
    bootstrap::{self, BootstrapError},
    config::{self, Cli, CliCommand, ConfigAction, TokenAction},
    intake,
    orchestrator::SubmissionError,
    shutdown,
    storage::MemoryStore,
};
use modgarden_types::{
    AccountId, Clock, CredentialError, IdIssuer, SchemaError, SystemClock,
    config::{ConfigError, CoreConfig, LogFormat, LoggingConfig},
    validation::ValidationError,
};
use serde_json::Value;
use snafu::{ResultExt, Snafu};
use tokio::io::{AsyncReadExt, BufReader};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Top-level error type for the binary.
#[derive(Debug, Snafu)]
enum CliError {
    #[snafu(display("{source}"))]
    Config { source: ConfigError },

    #[snafu(display("{source}"))]
    Bootstrap { source: BootstrapError },

    #[snafu(display("{source}"))]
    Schema { source: SchemaError },

    #[snafu(display("{source}"))]
    Credential { source: CredentialError },

    #[snafu(display("{source}"))]
    Submission { source: SubmissionError },

    #[snafu(display("invalid {what}: {source}"))]
    Argument { what: &'static str, source: ValidationError },

    #[snafu(display("failed to read {}: {source}", path.display()))]
    Input { path: PathBuf, source: std::io::Error },

    #[snafu(display("invalid JSON in {}: {source}", path.display()))]
    Json { path: PathBuf, source: serde_json::Error },

    #[snafu(display("I/O error: {source}"))]
    Io { source: std::io::Error },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        },
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match &cli.command {
        CliCommand::Config { action: ConfigAction::Schema } => {
            print!("{}", config::generate_config_schema());
            return Ok(());
        },
        CliCommand::Config { action: ConfigAction::Example } => {
            print!("{}", config::generate_config_example());
            return Ok(());
        },
        CliCommand::Migrate { input } => {
            init_logging(&cli_logging(&cli));
            return migrate(input).await;
        },
        _ => {},
    }

    let config = cli.load_config().context(ConfigSnafu)?;
    init_logging(&config.logging);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    match cli.command {
        CliCommand::Token { action: TokenAction::Issue { account, capabilities, ttl } } => {
            issue_token(&config, clock, &account, capabilities, ttl)
        },
        CliCommand::Token { action: TokenAction::Verify { token } } => {
            verify_token(&config, clock, token)
        },
        CliCommand::Submit { token, input } => {
            let raw = read_json(&input).await?;
            let core = bootstrap::bootstrap(&config, clock, Arc::new(MemoryStore::new()))
                .context(BootstrapSnafu)?;
            let id = core
                .orchestrator
                .submit(&AccessToken::new(token), raw)
                .await
                .context(SubmissionSnafu)?;
            println!("{}", id.value());
            Ok(())
        },
        CliCommand::Serve => serve(&config, cli.config.as_deref(), clock).await,
        CliCommand::Config { .. } | CliCommand::Migrate { .. } => Ok(()),
    }
}

async fn migrate(input: &Path) -> Result<(), CliError> {
    let raw = read_json(input).await?;
    let engine = builtin::project_engine().context(SchemaSnafu)?;
    let record = engine.ingest(raw).context(SchemaSnafu)?;
    let from = record.version();
    let record = engine.migrate_to_current(record).context(SchemaSnafu)?;
    tracing::info!(from = %from, to = %record.version(), "Record migrated");
    println!("{}", serde_json::to_string_pretty(&record.to_json()).unwrap_or_default());
    Ok(())
}

fn issue_token(
    config: &CoreConfig,
    clock: Arc<dyn Clock>,
    account: &str,
    capabilities: Vec<String>,
    ttl: Option<Duration>,
) -> Result<(), CliError> {
    let subject = AccountId::parse(account).context(ArgumentSnafu { what: "account" })?;
    let capabilities =
        CapabilitySet::from_names(capabilities).context(ArgumentSnafu { what: "capability" })?;
    let credentials = credential_issuer(config, clock)?;
    let issued = credentials
        .issue(&subject, capabilities, ttl.unwrap_or(credentials.default_ttl()))
        .context(CredentialSnafu)?;
    tracing::info!(
        token_id = %issued.claims.token_id,
        subject = %issued.claims.subject,
        expires_at = %issued.claims.expires_at,
        "Token issued"
    );
    println!("{}", issued.token.as_str());
    Ok(())
}

fn verify_token(
    config: &CoreConfig,
    clock: Arc<dyn Clock>,
    token: String,
) -> Result<(), CliError> {
    let credentials = credential_issuer(config, clock)?;
    let claims = credentials.verify(&AccessToken::new(token)).context(CredentialSnafu)?;
    println!("{}", serde_json::to_string_pretty(&claims).unwrap_or_default());
    Ok(())
}

fn credential_issuer(
    config: &CoreConfig,
    clock: Arc<dyn Clock>,
) -> Result<CredentialIssuer, CliError> {
    let ids = Arc::new(IdIssuer::from_config_with_clock(&config.identity, Arc::clone(&clock)));
    CredentialIssuer::from_config(&config.credentials, ids, clock).context(ConfigSnafu)
}

async fn serve(
    config: &CoreConfig,
    config_path: Option<&Path>,
    clock: Arc<dyn Clock>,
) -> Result<(), CliError> {
    let store = MemoryStore::new();
    let core = bootstrap::bootstrap(config, Arc::clone(&clock), Arc::new(store.clone()))
        .context(BootstrapSnafu)?;

    #[cfg(unix)]
    if let Some(path) = config_path {
        modgarden_server::config_reload::spawn_sighup_handler(
            path.to_path_buf(),
            Arc::clone(core.credentials.keyring()),
            Arc::clone(&core.clock),
            core.credentials.max_ttl(),
        );
    }
    #[cfg(not(unix))]
    let _ = config_path;

    tracing::info!("Intake ready, reading submissions from stdin");
    let answered = intake::serve_lines(
        &core.orchestrator,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        shutdown::shutdown_signal(),
    )
    .await
    .context(IoSnafu)?;

    tracing::info!(answered, stored = store.len(), "Intake shutdown complete");
    Ok(())
}

async fn read_json(path: &Path) -> Result<Value, CliError> {
    let mut bytes = Vec::new();
    if path == Path::new("-") {
        tokio::io::stdin().read_to_end(&mut bytes).await.context(InputSnafu { path })?;
    } else {
        bytes = tokio::fs::read(path).await.context(InputSnafu { path })?;
    }
    serde_json::from_slice(&bytes).context(JsonSnafu { path })
}

/// Logging settings for commands that run without a configuration file.
fn cli_logging(cli: &Cli) -> LoggingConfig {
    let mut logging = LoggingConfig::default();
    if let Some(level) = &cli.log_level {
        logging.level = level.clone();
    }
    if let Some(format) = cli.log_format {
        logging.format = format;
    }
    logging
}

/// Initializes logging to stderr; stdout carries command output.
///
/// `RUST_LOG` takes precedence over `logging.level`.
fn init_logging(config: &LoggingConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let use_json = match config.format {
        LogFormat::Json => true,
        LogFormat::Text => false,
        LogFormat::Auto => !std::io::stderr().is_terminal(),
    };

    if use_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_current_span(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
