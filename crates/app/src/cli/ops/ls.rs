use std::sync::Arc;

use clap::Args;

use common::archive::{ArchiveError, EntryHeader, Exporter};
use common::linked_data::Link;
use common::store::BlobsStoreError;

#[derive(Args, Debug, Clone)]
pub struct Ls {
    /// Root CID printed by `dagtar add`
    pub root: Link,
}

#[derive(Debug, thiserror::Error)]
pub enum LsError {
    #[error("state error: {0}")]
    State(#[from] crate::state::StateError),
    #[error("failed to open block store: {0}")]
    Store(#[from] BlobsStoreError),
    #[error("listing failed: {0}")]
    Archive(#[from] ArchiveError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Ls {
    type Error = LsError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.state()?;
        let store = Arc::new(state.blobs().await?);
        let entries = Exporter::new(store, state.config.export_options())
            .list(&self.root, ctx.cancel.clone())
            .await?;

        Ok(entries
            .iter()
            .map(format_entry)
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

/// One `tar tv` style line
fn format_entry(entry: &EntryHeader) -> String {
    let owner = match (entry.uname.is_empty(), entry.gname.is_empty()) {
        (false, false) => format!("{}/{}", entry.uname, entry.gname),
        _ => format!("{}/{}", entry.uid, entry.gid),
    };
    let size = match entry.device {
        Some((major, minor)) => format!("{},{}", major, minor),
        None => entry.size.to_string(),
    };
    let mtime = i64::try_from(entry.mtime)
        .ok()
        .and_then(|t| chrono::DateTime::from_timestamp(t, 0))
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| entry.mtime.to_string());
    let mut line = format!(
        "{}{} {} {:>8} {} {}",
        entry.kind.symbol(),
        permissions(entry.mode),
        owner,
        size,
        mtime,
        entry.name
    );
    if let Some(target) = &entry.link_target {
        line.push_str(" -> ");
        line.push_str(target);
    }
    line
}

fn permissions(mode: u32) -> String {
    const BITS: [(u32, char); 9] = [
        (0o400, 'r'),
        (0o200, 'w'),
        (0o100, 'x'),
        (0o040, 'r'),
        (0o020, 'w'),
        (0o010, 'x'),
        (0o004, 'r'),
        (0o002, 'w'),
        (0o001, 'x'),
    ];
    BITS.iter()
        .map(|(bit, c)| if mode & bit != 0 { *c } else { '-' })
        .collect()
}
