//! Application configuration: parsing, env fallbacks, and validation.
//!
//! The whole process is driven by one TOML file, loaded once into an immutable
//! [`AppConfig`] and passed by reference. Every section is optional.
//!
//! Credentials fall back to the process environment when the file leaves them
//! out: `APCA_API_KEY_ID`, `APCA_API_SECRET_KEY`, `APCA_API_BASE_URL`, and
//! `APCA_RUN_MODE` for the mode itself.
//!
//! Entrypoints:
//! - Parse + validate from a TOML string: [`load_config_str`]
//! - Parse + validate from a file path: [`load_config_path`] (or [`AppConfig::load`])

use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use chrono::NaiveDate;
use market_data_ingestor::{
    models::request_params::Adjustment,
    providers::alpaca_rest::{
        params::{Feed, MAX_LIMIT},
        provider::{AlpacaCredentials, DATA_URL},
    },
};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use shared_utils::env::{MissingEnvVarError, get_env_var, value_or_env};
use thiserror::Error;

use crate::{
    backfill::{BackfillSettings, DEFAULT_PAGE_SIZE},
    bar::Bar,
    key::{DEFAULT_ATTRIBUTE_GROUP, resolve_timeframe},
    record::{Field, RecordSchema},
    store::RetryPolicy,
    trim::RetentionPolicy,
    writer::DEFAULT_STREAM_TIMEFRAME,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("unknown run mode {0:?} (expected paper or live)")]
    InvalidMode(String),

    #[error(transparent)]
    MissingCredential(#[from] MissingEnvVarError),

    #[error("[{section}] {message}")]
    Invalid {
        section: &'static str,
        message: String,
    },
}

fn invalid(section: &'static str, message: impl fmt::Display) -> ConfigError {
    ConfigError::Invalid {
        section,
        message: message.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    #[default]
    Paper,
    Live,
}

impl FromStr for RunMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "paper" => Ok(RunMode::Paper),
            "live" => Ok(RunMode::Live),
            _ => Err(ConfigError::InvalidMode(s.to_string())),
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunMode::Paper => "paper",
            RunMode::Live => "live",
        })
    }
}

/// Credentials and endpoint for one run mode.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccountConfig {
    pub api_key: Option<SecretString>,
    pub secret_key: Option<SecretString>,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FeedConfig {
    pub data_url: String,
    pub feed: Feed,
    pub page_size: u32,
    pub adjustment: Adjustment,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            data_url: DATA_URL.to_string(),
            feed: Feed::default(),
            page_size: DEFAULT_PAGE_SIZE,
            adjustment: Adjustment::Raw,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    pub backend: Backend,
    pub database_url: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Sqlite,
            database_url: "ohlcv.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IngestConfig {
    pub stream_timeframe: String,
    pub attribute_group: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            stream_timeframe: DEFAULT_STREAM_TIMEFRAME.to_string(),
            attribute_group: DEFAULT_ATTRIBUTE_GROUP.to_string(),
        }
    }
}

/// Either a named preset or an explicit field list, not both.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchemaConfig {
    pub preset: Option<String>,
    pub fields: Option<Vec<Field>>,
}

impl SchemaConfig {
    /// The configured schema; `ohlcv` when nothing is set.
    pub fn build(&self) -> Result<RecordSchema, ConfigError> {
        match (&self.preset, &self.fields) {
            (Some(_), Some(_)) => Err(invalid("schema", "set either preset or fields, not both")),
            (Some(name), None) => RecordSchema::preset(name)
                .ok_or_else(|| invalid("schema", format!("unknown preset {name:?}"))),
            (None, Some(fields)) => {
                let schema = RecordSchema::new(fields.clone()).map_err(|e| invalid("schema", e))?;
                Bar::check_schema(&schema).map_err(|e| invalid("schema", e))?;
                Ok(schema)
            }
            (None, None) => Ok(RecordSchema::ohlcv()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackfillConfig {
    pub symbols: Vec<String>,
    pub timeframes: Vec<String>,
    pub start: NaiveDate,
    pub concurrency: usize,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            symbols: Vec::new(),
            timeframes: vec!["1D".to_string()],
            start: NaiveDate::from_ymd_opt(2021, 12, 15).unwrap_or_default(),
            concurrency: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1_000,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// `EnvFilter` directive; `RUST_LOG` wins when set.
    pub level: String,
    /// Root for log files. Output goes to `<directory>/<YYYY-MM-DD>/`.
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub mode: Option<RunMode>,
    pub paper: AccountConfig,
    pub live: AccountConfig,
    pub feed: FeedConfig,
    pub store: StoreConfig,
    pub ingest: IngestConfig,
    pub schema: SchemaConfig,
    pub retention: RetentionPolicy,
    pub backfill: BackfillConfig,
    pub retry: RetryConfig,
    pub logging: LoggingConfig,
}

/// Resolved credentials for the active run mode.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub mode: RunMode,
    pub api_key: SecretString,
    pub secret_key: SecretString,
    pub base_url: Option<String>,
}

impl From<&Credentials> for AlpacaCredentials {
    fn from(c: &Credentials) -> Self {
        AlpacaCredentials {
            api_key: c.api_key.clone(),
            secret_key: c.secret_key.clone(),
        }
    }
}

fn exposed(s: &Option<SecretString>) -> Option<String> {
    s.as_ref().map(|s| s.expose_secret().to_string())
}

impl AppConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        load_config_path(path)
    }

    /// Mode from the file, else `APCA_RUN_MODE`, else paper.
    pub fn run_mode(&self) -> Result<RunMode, ConfigError> {
        match self.mode {
            Some(mode) => Ok(mode),
            None => get_env_var("APCA_RUN_MODE").map_or(Ok(RunMode::Paper), |m| m.parse()),
        }
    }

    pub fn account(&self, mode: RunMode) -> &AccountConfig {
        match mode {
            RunMode::Paper => &self.paper,
            RunMode::Live => &self.live,
        }
    }

    /// Credentials of the active mode with env fallbacks applied.
    ///
    /// Only commands that talk to the feed need these, so a missing key is not a
    /// load-time error.
    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        let mode = self.run_mode()?;
        let account = self.account(mode);
        let api_key = value_or_env(exposed(&account.api_key), "APCA_API_KEY_ID")
            .ok_or_else(|| MissingEnvVarError("APCA_API_KEY_ID".to_string()))?;
        let secret_key = value_or_env(exposed(&account.secret_key), "APCA_API_SECRET_KEY")
            .ok_or_else(|| MissingEnvVarError("APCA_API_SECRET_KEY".to_string()))?;
        Ok(Credentials {
            mode,
            api_key: SecretString::from(api_key),
            secret_key: SecretString::from(secret_key),
            base_url: value_or_env(account.base_url.clone(), "APCA_API_BASE_URL"),
        })
    }

    pub fn record_schema(&self) -> Result<RecordSchema, ConfigError> {
        self.schema.build()
    }

    pub fn backfill_settings(&self) -> BackfillSettings {
        BackfillSettings {
            page_size: self.feed.page_size,
            adjustment: self.feed.adjustment,
            concurrency: self.backfill.concurrency,
        }
    }

    /// Checks everything that can be checked without the network.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.run_mode()?;
        self.schema.build()?;
        self.retention.validate().map_err(|e| invalid("retention", e))?;
        resolve_timeframe(&self.ingest.stream_timeframe).map_err(|e| invalid("ingest", e))?;
        if self.ingest.attribute_group.is_empty() || self.ingest.attribute_group.contains('/') {
            return Err(invalid("ingest", "attribute_group must be non-empty without '/'"));
        }
        for tf in &self.backfill.timeframes {
            resolve_timeframe(tf).map_err(|e| invalid("backfill", e))?;
        }
        if self.backfill.concurrency == 0 {
            return Err(invalid("backfill", "concurrency must be at least 1"));
        }
        if self.feed.page_size == 0 || self.feed.page_size > MAX_LIMIT {
            return Err(invalid(
                "feed",
                format!("page_size must be within 1..={MAX_LIMIT}"),
            ));
        }
        Ok(())
    }
}

/// Parses and validates a config from TOML text.
pub fn load_config_str(s: &str) -> Result<AppConfig, ConfigError> {
    let cfg: AppConfig = toml::from_str(s)?;
    cfg.validate()?;
    Ok(cfg)
}

/// Reads, parses and validates a config file.
pub fn load_config_path(path: impl AsRef<Path>) -> Result<AppConfig, ConfigError> {
    let path = path.as_ref();
    let s = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    load_config_str(&s)
}
