use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;

use common::archive::{ArchiveError, Importer};
use common::store::BlobsStoreError;

#[derive(Args, Debug, Clone)]
pub struct Add {
    /// Tar archive to import, or `-` for stdin
    pub path: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum AddError {
    #[error("state error: {0}")]
    State(#[from] crate::state::StateError),
    #[error("failed to open archive: {0}")]
    Open(#[from] std::io::Error),
    #[error("failed to open block store: {0}")]
    Store(#[from] BlobsStoreError),
    #[error("import failed: {0}")]
    Archive(#[from] ArchiveError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Add {
    type Error = AddError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.state()?;
        let store = Arc::new(state.blobs().await?);

        let reader: Box<dyn Read + Send> = if self.path.as_os_str() == "-" {
            Box::new(std::io::stdin())
        } else {
            Box::new(File::open(&self.path)?)
        };

        let summary = Importer::new(store, state.config.import_options())
            .import_with_summary(reader, ctx.cancel.clone())
            .await?;
        tracing::info!(
            "added {}: {} entries, {} bytes of content",
            self.path.display(),
            summary.entries,
            summary.bytes
        );

        Ok(summary.root.to_string())
    }
}
