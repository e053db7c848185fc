use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use futures_util::{StreamExt, future, stream};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use walkdir::WalkDir;

use super::engine::Destination;
use super::export::MimeTable;
use super::paths::logical_dir_for;
use super::transfer::{TransferClient, is_partial};

#[derive(Debug, Error)]
pub enum LocalScanError {
    #[error("failed to walk {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
    #[error("scan task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// A file found below the local data root, ready for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub path: PathBuf,
    pub folder_path: String,
    pub file_name: String,
    pub modified: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalUploadSummary {
    pub seen: usize,
    pub uploaded: usize,
    pub failed: usize,
    pub cancelled: bool,
}

pub async fn scan_local_tree(local_root: &Path) -> Result<Vec<LocalFile>, LocalScanError> {
    let root = local_root.to_path_buf();
    tokio::task::spawn_blocking(move || scan_blocking(&root)).await?
}

fn scan_blocking(root: &Path) -> Result<Vec<LocalFile>, LocalScanError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|source| LocalScanError::Walk {
            path: root.to_path_buf(),
            source,
        })?;
        if !entry.file_type().is_file() || is_partial(entry.path()) {
            continue;
        }
        let Some(parent) = entry.path().parent() else {
            continue;
        };
        let (Some(folder_path), Some(file_name)) =
            (logical_dir_for(root, parent), entry.file_name().to_str())
        else {
            warn!(path = %entry.path().display(), "skipping file with non UTF-8 path");
            continue;
        };
        let modified = entry
            .metadata()
            .ok()
            .and_then(|meta| meta.modified().ok())
            .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
            .and_then(|elapsed| i64::try_from(elapsed.as_secs()).ok());
        files.push(LocalFile {
            path: entry.path().to_path_buf(),
            folder_path,
            file_name: file_name.to_string(),
            modified,
        });
    }
    Ok(files)
}

/// Uploads previously downloaded files, mirroring their directories.
pub struct LocalUploader<'a> {
    destination: &'a Destination,
    transfer: TransferClient,
    mime: &'a MimeTable,
    cleanup: bool,
}

impl<'a> LocalUploader<'a> {
    pub fn new(destination: &'a Destination, mime: &'a MimeTable) -> Self {
        Self {
            destination,
            transfer: TransferClient::new(),
            mime,
            cleanup: false,
        }
    }

    pub fn with_transfer(mut self, transfer: TransferClient) -> Self {
        self.transfer = transfer;
        self
    }

    pub fn with_cleanup(mut self, cleanup: bool) -> Self {
        self.cleanup = cleanup;
        self
    }

    pub async fn upload_file(&self, file: &LocalFile) -> bool {
        let content_type = self.mime.content_type_for_path(&file.path);
        let result = self
            .destination
            .upload_file(
                &self.transfer,
                &file.path,
                &file.folder_path,
                &file.file_name,
                content_type,
                file.modified,
            )
            .await;
        match result {
            Ok(document_id) => {
                info!(path = %file.path.display(), document = %document_id, content_type, "uploaded");
                if self.cleanup
                    && let Err(err) = tokio::fs::remove_file(&file.path).await
                {
                    warn!(path = %file.path.display(), "failed to remove local copy: {err}");
                }
                true
            }
            Err(err) => {
                error!(path = %file.path.display(), "upload failed: {err}");
                false
            }
        }
    }

    pub async fn upload_all(
        &self,
        files: Vec<LocalFile>,
        concurrency: usize,
        cancel: &CancellationToken,
    ) -> LocalUploadSummary {
        let mut summary = LocalUploadSummary {
            seen: files.len(),
            ..LocalUploadSummary::default()
        };
        let mut results = stream::iter(files)
            .take_while(|_| future::ready(!cancel.is_cancelled()))
            .map(|file| async move { self.upload_file(&file).await })
            .buffer_unordered(concurrency.max(1));
        while let Some(uploaded) = results.next().await {
            if uploaded {
                summary.uploaded += 1;
            } else {
                summary.failed += 1;
            }
        }
        summary.cancelled = cancel.is_cancelled();
        summary
    }
}
