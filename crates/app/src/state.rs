use std::{fs, path::PathBuf, str::FromStr};

use common::archive::{ExportOptions, ImportOptions, DEFAULT_CHUNK_SIZE, DEFAULT_CONCURRENCY};
use common::store::{BlobsStore, BlobsStoreError};
use serde::{Deserialize, Serialize};

pub const APP_NAME: &str = "dagtar";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const BLOBS_DIR_NAME: &str = "blobs";

/// Where imported blocks are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    /// iroh-blobs FsStore under the dagtar directory
    #[default]
    Fs,
    /// In-memory store; nothing outlives the process
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Maximum leaf size in bytes
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Maximum number of store operations in flight
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Default log level, overridden by RUST_LOG
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub store: StoreKind,
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            concurrency: default_concurrency(),
            log_level: default_log_level(),
            store: StoreKind::default(),
        }
    }
}

impl AppConfig {
    pub fn log_level(&self) -> Result<tracing::Level, StateError> {
        tracing::Level::from_str(&self.log_level)
            .map_err(|_| StateError::InvalidConfig(format!("unknown log level {}", self.log_level)))
    }

    pub fn import_options(&self) -> ImportOptions {
        ImportOptions {
            chunk_size: self.chunk_size,
            concurrency: self.concurrency,
        }
    }

    pub fn export_options(&self) -> ExportOptions {
        ExportOptions {
            concurrency: self.concurrency,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    /// Path to the dagtar directory (~/.dagtar)
    pub dagtar_dir: PathBuf,
    /// Path to the blobs directory
    pub blobs_path: PathBuf,
    /// Path to the config file
    pub config_path: PathBuf,
    /// Loaded configuration
    pub config: AppConfig,
}

impl AppState {
    /// Get the dagtar directory path (custom or default ~/.dagtar)
    pub fn dagtar_dir(custom_path: Option<PathBuf>) -> Result<PathBuf, StateError> {
        if let Some(path) = custom_path {
            return Ok(path);
        }

        let home = dirs::home_dir().ok_or(StateError::NoHomeDirectory)?;
        Ok(home.join(format!(".{}", APP_NAME)))
    }

    /// Initialize a new dagtar state directory
    pub fn init(
        custom_path: Option<PathBuf>,
        config: Option<AppConfig>,
    ) -> Result<Self, StateError> {
        let dagtar_dir = Self::dagtar_dir(custom_path)?;

        if dagtar_dir.exists() {
            return Err(StateError::AlreadyInitialized);
        }

        let config = config.unwrap_or_default();
        config.log_level()?;

        fs::create_dir_all(&dagtar_dir)?;

        let blobs_path = dagtar_dir.join(BLOBS_DIR_NAME);
        fs::create_dir_all(&blobs_path)?;

        let config_path = dagtar_dir.join(CONFIG_FILE_NAME);
        let config_toml = toml::to_string_pretty(&config)?;
        fs::write(&config_path, config_toml)?;

        Ok(Self {
            dagtar_dir,
            blobs_path,
            config_path,
            config,
        })
    }

    /// Load existing state from the dagtar directory.
    ///  A missing config file means the defaults.
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, StateError> {
        let dagtar_dir = Self::dagtar_dir(custom_path)?;

        if !dagtar_dir.exists() {
            return Err(StateError::NotInitialized);
        }

        let blobs_path = dagtar_dir.join(BLOBS_DIR_NAME);
        let config_path = dagtar_dir.join(CONFIG_FILE_NAME);

        if !blobs_path.exists() {
            return Err(StateError::MissingFile("blobs/".to_string()));
        }

        let config = if config_path.exists() {
            let config_toml = fs::read_to_string(&config_path)?;
            toml::from_str(&config_toml)?
        } else {
            AppConfig::default()
        };

        Ok(Self {
            dagtar_dir,
            blobs_path,
            config_path,
            config,
        })
    }

    /// Open the configured block store
    pub async fn blobs(&self) -> Result<BlobsStore, BlobsStoreError> {
        match self.config.store {
            StoreKind::Fs => BlobsStore::fs(&self.blobs_path).await,
            StoreKind::Memory => BlobsStore::memory().await,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("dagtar directory not initialized. Run 'dagtar init' first")]
    NotInitialized,

    #[error("dagtar directory already initialized")]
    AlreadyInitialized,

    #[error("no home directory found")]
    NoHomeDirectory,

    #[error("missing required file: {0}")]
    MissingFile(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}
