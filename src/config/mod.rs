//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{fmt, path::PathBuf, str::FromStr};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

mod cli;

pub use cli::{
    CliArgs, Command, CreateArgs, DeleteArgs, ListArgs, SettingsOverrides, ShowArgs,
};

use crate::infra::storage::blob::DEFAULT_CONTAINER;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "blogstore";
const ENV_PREFIX: &str = "BLOGSTORE";
const DEFAULT_POSTS_DIRECTORY: &str = "posts";

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub storage: StorageSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Disk,
    Blob,
}

impl StorageBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disk => "disk",
            Self::Blob => "blob",
        }
    }
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "disk" | "file" | "filesystem" => Ok(Self::Disk),
            "blob" | "azure" => Ok(Self::Blob),
            other => Err(format!("unknown backend `{other}`; expected `disk` or `blob`")),
        }
    }
}

#[derive(Clone)]
pub struct StorageSettings {
    pub backend: StorageBackend,
    pub posts_directory: PathBuf,
    /// Credentials for the blob backend; validated when the backend is first used.
    pub blob_connection_string: Option<String>,
    pub blob_container: String,
}

impl fmt::Debug for StorageSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageSettings")
            .field("backend", &self.backend)
            .field("posts_directory", &self.posts_directory)
            .field(
                "blob_connection_string",
                &self.blob_connection_string.as_ref().map(|_| "<redacted>"),
            )
            .field("blob_container", &self.blob_container)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

/// Resolve configuration using the process arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    storage: RawStorageSettings,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawStorageSettings {
    backend: Option<String>,
    use_blob_storage: Option<bool>,
    posts_directory: Option<PathBuf>,
    blob_connection_string: Option<String>,
    blob_container: Option<String>,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &SettingsOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(backend) = overrides.backend.as_ref() {
            self.storage.backend = Some(backend.clone());
        }
        if let Some(directory) = overrides.posts_directory.as_ref() {
            self.storage.posts_directory = Some(directory.clone());
        }
        if let Some(connection) = overrides.blob_connection_string.as_ref() {
            self.storage.blob_connection_string = Some(connection.clone());
        }
        if let Some(container) = overrides.blob_container.as_ref() {
            self.storage.blob_container = Some(container.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings { logging, storage } = raw;

        let logging = build_logging_settings(logging)?;
        let storage = build_storage_settings(storage)?;

        Ok(Self { logging, storage })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_storage_settings(storage: RawStorageSettings) -> Result<StorageSettings, LoadError> {
    let backend = match non_blank(storage.backend) {
        Some(value) => StorageBackend::from_str(&value)
            .map_err(|reason| LoadError::invalid("storage.backend", reason))?,
        None if storage.use_blob_storage.unwrap_or(false) => StorageBackend::Blob,
        None => StorageBackend::Disk,
    };

    let posts_directory = storage
        .posts_directory
        .unwrap_or_else(|| PathBuf::from(DEFAULT_POSTS_DIRECTORY));
    if posts_directory.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "storage.posts_directory",
            "must not be empty",
        ));
    }

    let blob_container = match storage.blob_container {
        Some(value) => non_blank(Some(value)).ok_or_else(|| {
            LoadError::invalid("storage.blob_container", "must not be blank")
        })?,
        None => DEFAULT_CONTAINER.to_string(),
    };

    Ok(StorageSettings {
        backend,
        posts_directory,
        blob_connection_string: non_blank(storage.blob_connection_string),
        blob_container,
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}
