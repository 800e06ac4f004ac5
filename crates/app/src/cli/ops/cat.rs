use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Args;
use tempfile::NamedTempFile;
use tokio_util::sync::CancellationToken;

use common::archive::{ArchiveError, Exporter};
use common::linked_data::Link;
use common::store::{BlobsStoreError, BlockStore};

#[derive(Args, Debug, Clone)]
pub struct Cat {
    /// Root CID printed by `dagtar add`
    pub root: Link,

    /// Write the archive here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum CatError {
    #[error("state error: {0}")]
    State(#[from] crate::state::StateError),
    #[error("failed to write output: {0}")]
    Output(#[from] std::io::Error),
    #[error("failed to open block store: {0}")]
    Store(#[from] BlobsStoreError),
    #[error("export failed: {0}")]
    Archive(#[from] ArchiveError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Cat {
    type Error = CatError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.state()?;
        let store = Arc::new(state.blobs().await?);
        let exporter = Exporter::new(store, state.config.export_options());

        match &self.output {
            Some(path) => {
                let written = export_to_file(&exporter, &self.root, path, ctx.cancel.clone()).await?;
                Ok(format!("wrote {} bytes to {}", written, path.display()))
            }
            None => {
                let mut stdout = tokio::io::stdout();
                exporter
                    .export_to_writer(&self.root, &mut stdout, ctx.cancel.clone())
                    .await?;
                Ok(String::new())
            }
        }
    }
}

/// Export into a temp file next to `path` and move it into place
///  once the whole archive is written. A failed export leaves
///  `path` as it was.
async fn export_to_file<S: BlockStore + 'static>(
    exporter: &Exporter<S>,
    root: &Link,
    path: &Path,
    cancel: CancellationToken,
) -> Result<u64, CatError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let (file, temp_path) = NamedTempFile::new_in(dir)?.into_parts();
    let mut file = tokio::fs::File::from_std(file);

    let written = exporter.export_to_writer(root, &mut file, cancel).await?;
    file.sync_all().await?;
    drop(file);

    temp_path.persist(path).map_err(|e| e.error)?;
    Ok(written)
}
