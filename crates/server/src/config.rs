//! Command line and configuration loading.
//!
//! Settings come from a TOML file (`--config`) with individual values
//! overridable by flags or `MODGARDEN__*` environment variables. Flags win
//! over the file.
//!
//! ```bash
//! # File plus an override
//! MODGARDEN__WORKER_ID=7 modgarden-core --config core.toml serve
//!
//! # No file: the signing key is enough
//! export MODGARDEN__SIGNING_KEY=AAECAwQF...
//! modgarden-core token issue --account abcde --capability submit
//! ```

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use clap::{Parser, Subcommand};
use modgarden_types::config::{
    ConfigError, CoreConfig, CredentialConfig, IdentityConfig, LogFormat, LoggingConfig,
    SecretKeyConfig,
};

/// Mod Garden record core: schema migration, identifiers and access tokens.
#[derive(Debug, Parser)]
#[command(name = "modgarden-core", version)]
pub struct Cli {
    /// TOML configuration file.
    #[arg(long, global = true, env = "MODGARDEN__CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Identifier worker id (0-4095); overrides `identity.worker_id`.
    #[arg(long, global = true, env = "MODGARDEN__WORKER_ID")]
    pub worker_id: Option<u16>,

    /// Base64url signing key; overrides `credentials.signing_key`.
    #[arg(long, global = true, env = "MODGARDEN__SIGNING_KEY", hide_env_values = true)]
    pub signing_key: Option<String>,

    /// Longest token lifetime, e.g. `30m`; overrides `credentials.max_ttl`.
    #[arg(
        long,
        global = true,
        env = "MODGARDEN__MAX_TTL",
        value_parser = humantime::parse_duration
    )]
    pub max_ttl: Option<Duration>,

    /// Default log filter when `RUST_LOG` is unset; overrides `logging.level`.
    #[arg(long, global = true, env = "MODGARDEN__LOG_LEVEL")]
    pub log_level: Option<String>,

    /// `auto`, `json` or `text`; overrides `logging.format`.
    #[arg(long, global = true, env = "MODGARDEN__LOG_FORMAT")]
    pub log_format: Option<LogFormat>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Configuration helpers.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Migrate a JSON record file to the current schema and print it.
    Migrate {
        /// Record file; `-` reads stdin.
        #[arg(long, value_name = "PATH")]
        input: PathBuf,
    },

    /// Access token helpers.
    Token {
        #[command(subcommand)]
        action: TokenAction,
    },

    /// Submit a JSON record file and print the assigned id.
    Submit {
        /// Access token.
        #[arg(long, env = "MODGARDEN__TOKEN", hide_env_values = true)]
        token: String,
        /// Record file; `-` reads stdin.
        #[arg(long, value_name = "PATH")]
        input: PathBuf,
    },

    /// Read submissions as JSON lines on stdin until EOF or a shutdown signal.
    ///
    /// Each line is `{"token": "...", "record": {...}}`; each reply line is
    /// `{"id": "..."}` or `{"error": {"code": ..., "message": "..."}}`.
    /// SIGHUP reloads signing keys from the configuration file.
    Serve,
}

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Print the JSON schema of the configuration file.
    Schema,
    /// Print an example configuration file.
    Example,
}

#[derive(Debug, Subcommand)]
pub enum TokenAction {
    /// Issue a token.
    Issue {
        /// Account id (five lowercase letters, or a legacy numeric id).
        #[arg(long)]
        account: String,
        /// Granted capability; repeatable.
        #[arg(long = "capability", value_name = "NAME")]
        capabilities: Vec<String>,
        /// Lifetime, e.g. `10m`; defaults to `credentials.default_ttl`.
        #[arg(long, value_parser = humantime::parse_duration)]
        ttl: Option<Duration>,
    },
    /// Verify a token and print its claims.
    Verify {
        /// Access token.
        token: String,
    },
}

impl Cli {
    /// Resolves the effective configuration: file, then overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed, no
    /// signing key is available, or the result fails validation.
    pub fn load_config(&self) -> Result<CoreConfig, ConfigError> {
        let mut config = match (&self.config, &self.signing_key) {
            (Some(path), _) => read_config(path)?,
            (None, Some(key)) => CoreConfig {
                identity: IdentityConfig::default(),
                credentials: CredentialConfig::builder()
                    .signing_key(SecretKeyConfig { key: key.clone(), retired_at: None })
                    .build()?,
                logging: LoggingConfig::default(),
            },
            (None, None) => {
                return Err(ConfigError::Validation {
                    message: "no signing key: pass --config or --signing-key".to_string(),
                });
            },
        };

        if let Some(worker_id) = self.worker_id {
            config.identity.worker_id = Some(worker_id);
        }
        if let Some(key) = &self.signing_key {
            config.credentials.signing_key = SecretKeyConfig { key: key.clone(), retired_at: None };
        }
        if let Some(max_ttl) = self.max_ttl {
            config.credentials.max_ttl = max_ttl;
            config.credentials.default_ttl = config.credentials.default_ttl.min(max_ttl);
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if let Some(format) = self.log_format {
            config.logging.format = format;
        }

        config.validate()?;
        Ok(config)
    }
}

/// Reads and validates a configuration file.
///
/// # Errors
///
/// Returns [`ConfigError::Parse`] if the file cannot be read or parsed and
/// [`ConfigError::Validation`] if a value is out of range.
pub fn read_config(path: &Path) -> Result<CoreConfig, ConfigError> {
    let source = std::fs::read_to_string(path).map_err(|e| ConfigError::Parse {
        message: format!("failed to read {}: {e}", path.display()),
    })?;
    CoreConfig::from_toml(&source)
}

/// JSON schema of the configuration file.
pub fn generate_config_schema() -> String {
    let schema = schemars::schema_for!(CoreConfig);
    let mut out = serde_json::to_string_pretty(&schema).unwrap_or_default();
    out.push('\n');
    out
}

/// Example configuration file.
pub fn generate_config_example() -> &'static str {
    EXAMPLE_CONFIG
}

const EXAMPLE_CONFIG: &str = r#"# modgarden-core configuration

[identity]
# 0-4095. Omit to derive one from OS entropy at startup.
worker_id = 1

[credentials]
max_ttl = "1h"
default_ttl = "15m"

# Base64url (no padding), at least 32 bytes decoded.
[credentials.signing_key]
key = "AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8"

# Keys still accepted for verification after a rotation. Dropped once
# retired_at + max_ttl has passed.
[[credentials.previous_keys]]
key = "ZGVmZ2hpamtsbW5vcHFyc3R1dnd4eXp7fH1-f4CBgoM"
retired_at = "2025-01-01T00:00:00Z"

[logging]
# Used when RUST_LOG is unset.
level = "info"
# auto | json | text
format = "auto"
"#;
