use clap::Args;

use common::archive::{DEFAULT_CHUNK_SIZE, DEFAULT_CONCURRENCY};

use crate::state::{AppConfig, AppState, StoreKind};

#[derive(Args, Debug, Clone)]
pub struct Init {
    /// Maximum leaf size in bytes
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,

    /// Maximum number of store operations in flight
    #[arg(long, default_value_t = DEFAULT_CONCURRENCY)]
    pub concurrency: usize,

    /// Default log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    pub log_level: String,

    /// Keep blocks in memory only (useful to compute a root without storing)
    #[arg(long)]
    pub memory: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("init failed: {0}")]
    StateFailed(#[from] crate::state::StateError),
    #[error("invalid option: {0}")]
    InvalidOption(String),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Init {
    type Error = InitError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        if self.chunk_size == 0 {
            return Err(InitError::InvalidOption(
                "chunk size must be greater than zero".to_string(),
            ));
        }
        if self.concurrency == 0 {
            return Err(InitError::InvalidOption(
                "concurrency must be greater than zero".to_string(),
            ));
        }

        let config = AppConfig {
            chunk_size: self.chunk_size,
            concurrency: self.concurrency,
            log_level: self.log_level.clone(),
            store: if self.memory {
                StoreKind::Memory
            } else {
                StoreKind::Fs
            },
        };

        let state = AppState::init(ctx.config_path.clone(), Some(config))?;

        let output = format!(
            "Initialized dagtar directory at: {}\n\
             - Blobs: {}\n\
             - Config: {}\n\
             - Chunk size: {}\n\
             - Concurrency: {}\n\
             - Store: {:?}",
            state.dagtar_dir.display(),
            state.blobs_path.display(),
            state.config_path.display(),
            state.config.chunk_size,
            state.config.concurrency,
            state.config.store,
        );

        Ok(output)
    }
}
