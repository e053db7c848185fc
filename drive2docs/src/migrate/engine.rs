use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use drive2docs_core::{
    DocStoreClient, DocStoreError, DriveClient, DriveError, DriveFile, FOLDER_MIME_TYPE,
    UploadRequest,
};
use futures_util::{StreamExt, future, stream};
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::export::{ExportSelector, Representation};
use super::folders::{FolderMaterializer, MaterializeError};
use super::guard::DeleteGuard;
use super::hierarchy::FolderPaths;
use super::paths::{PathError, document_name, local_file_path};
use super::transfer::{TransferClient, TransferError, system_time_from_unix};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("drive error: {0}")]
    Drive(#[from] DriveError),
    #[error("document store error: {0}")]
    Store(#[from] DocStoreError),
    #[error("folder error: {0}")]
    Materialize(#[from] MaterializeError),
    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),
    #[error("path error: {0}")]
    Path(#[from] PathError),
    #[error("no file extension known for {0}")]
    UnknownExtension(String),
}

impl EngineError {
    fn is_range_not_satisfiable(&self) -> bool {
        matches!(self, EngineError::Drive(err) if err.is_range_not_satisfiable())
    }
}

/// One source file, snapshotted at enumeration time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceItem {
    pub id: String,
    pub name: String,
    pub parent_id: Option<String>,
    pub content_type: String,
    pub size: Option<u64>,
    /// Unix seconds.
    pub modified: Option<i64>,
}

impl From<&DriveFile> for SourceItem {
    fn from(file: &DriveFile) -> Self {
        Self {
            id: file.id.clone(),
            name: file.name.clone(),
            parent_id: file.first_parent().map(str::to_string),
            content_type: file.mime_type.clone(),
            size: file.size_bytes(),
            modified: parse_modified(file.modified_time.as_deref()),
        }
    }
}

fn parse_modified(value: Option<&str>) -> Option<i64> {
    let parsed = OffsetDateTime::parse(value?, &Rfc3339).ok()?;
    Some(parsed.unix_timestamp())
}

pub struct Destination {
    pub store: DocStoreClient,
    pub folders: Arc<FolderMaterializer>,
    /// Value of the server-side encryption header sent with every upload.
    pub encryption: String,
}

impl Destination {
    /// Uploads `local` as a new active document under `folder_path` and
    /// returns its document id.
    pub async fn upload_file(
        &self,
        transfer: &TransferClient,
        local: &Path,
        folder_path: &str,
        file_name: &str,
        content_type: &str,
        modified: Option<i64>,
    ) -> Result<String, EngineError> {
        let folder_id = self.folders.ensure_folder(folder_path).await?;
        let modified = modified.filter(|stamp| *stamp > 0);
        let request = UploadRequest {
            parent_folder_id: folder_id,
            name: document_name(file_name),
            content_type: content_type.to_string(),
            content_created_timestamp: modified,
            content_modified_timestamp: modified,
        };
        let session = self.store.initiate_upload(&request).await?;
        transfer
            .upload_from_path(&session, local, content_type, &self.encryption)
            .await?;
        self.store
            .activate_version(&session.document_id, &session.version_id)
            .await?;
        Ok(session.document_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepresentationOutcome {
    Succeeded,
    /// The source had no bytes to give (range not satisfiable).
    Skipped,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepresentationReport {
    pub content_type: String,
    pub file_name: Option<String>,
    pub outcome: RepresentationOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Deletion {
    Disabled,
    NotEligible,
    Protected { prefix: String },
    Deleted,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    NotTransferable,
    Processed {
        parent_path: String,
        representations: Vec<RepresentationReport>,
        deletion: Deletion,
    },
}

/// Every representation succeeded or was skipped, and at least one succeeded.
pub fn is_deletion_eligible(reports: &[RepresentationReport]) -> bool {
    let mut produced = false;
    for report in reports {
        match report.outcome {
            RepresentationOutcome::Succeeded => produced = true,
            RepresentationOutcome::Skipped => {}
            RepresentationOutcome::Failed(_) => return false,
        }
    }
    produced
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub seen: usize,
    pub not_transferable: usize,
    pub transferred: usize,
    pub skipped: usize,
    pub failed: usize,
    pub deleted: usize,
    pub delete_protected: usize,
    pub delete_failed: usize,
    pub cancelled: bool,
}

impl RunSummary {
    pub fn record(&mut self, outcome: &ItemOutcome) {
        let ItemOutcome::Processed {
            representations,
            deletion,
            ..
        } = outcome
        else {
            self.not_transferable += 1;
            return;
        };
        for report in representations {
            match report.outcome {
                RepresentationOutcome::Succeeded => self.transferred += 1,
                RepresentationOutcome::Skipped => self.skipped += 1,
                RepresentationOutcome::Failed(_) => self.failed += 1,
            }
        }
        match deletion {
            Deletion::Deleted => self.deleted += 1,
            Deletion::Protected { .. } => self.delete_protected += 1,
            Deletion::Failed(_) => self.delete_failed += 1,
            Deletion::Disabled | Deletion::NotEligible => {}
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} files seen, {} not transferable, {} transferred, {} skipped, {} failed, \
             {} deleted, {} delete-protected, {} delete failures",
            self.seen,
            self.not_transferable,
            self.transferred,
            self.skipped,
            self.failed,
            self.deleted,
            self.delete_protected,
            self.delete_failed,
        )?;
        if self.cancelled {
            write!(f, " (cancelled)")?;
        }
        Ok(())
    }
}

pub struct MigrationEngine {
    drive: DriveClient,
    source_paths: FolderPaths,
    root_path: String,
    selector: ExportSelector,
    transfer: TransferClient,
    local_root: PathBuf,
    destination: Option<Destination>,
    cleanup: bool,
    guard: DeleteGuard,
    local_locks: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
}

impl MigrationEngine {
    pub fn new(
        drive: DriveClient,
        source_paths: FolderPaths,
        root_path: &str,
        selector: ExportSelector,
        local_root: PathBuf,
    ) -> Self {
        Self {
            drive,
            source_paths,
            root_path: root_path.to_string(),
            selector,
            transfer: TransferClient::new(),
            local_root,
            destination: None,
            cleanup: false,
            guard: DeleteGuard::default(),
            local_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = Some(destination);
        self
    }

    pub fn with_cleanup(mut self, cleanup: bool, guard: DeleteGuard) -> Self {
        self.cleanup = cleanup;
        self.guard = guard;
        self
    }

    pub fn with_transfer(mut self, transfer: TransferClient) -> Self {
        self.transfer = transfer;
        self
    }

    pub fn parent_path(&self, item: &SourceItem) -> &str {
        item.parent_id
            .as_deref()
            .and_then(|id| self.source_paths.path_of(id))
            .unwrap_or(self.root_path.as_str())
    }

    pub async fn process_item(&self, item: &SourceItem) -> ItemOutcome {
        if item.content_type == FOLDER_MIME_TYPE {
            return ItemOutcome::NotTransferable;
        }
        let parent_path = self.parent_path(item).to_string();
        let mut representations = self.selector.representations(&item.content_type);
        if representations.is_empty() {
            representations.push(Representation::verbatim(&item.content_type));
        }
        info!(
            path = %parent_path,
            name = %item.name,
            content_type = %item.content_type,
            "processing"
        );

        let mut reports = Vec::with_capacity(representations.len());
        for representation in &representations {
            reports.push(
                self.transfer_representation(item, &parent_path, representation)
                    .await,
            );
        }

        let deletion = self.delete_if_eligible(item, &parent_path, &reports).await;
        ItemOutcome::Processed {
            parent_path,
            representations: reports,
            deletion,
        }
    }

    /// Processes items with at most `concurrency` in flight. No new item starts
    /// once `cancel` fires.
    pub async fn process_all(
        &self,
        items: Vec<SourceItem>,
        concurrency: usize,
        cancel: &CancellationToken,
    ) -> RunSummary {
        let mut summary = RunSummary {
            seen: items.len(),
            ..RunSummary::default()
        };
        let mut outcomes = stream::iter(items)
            .take_while(|_| future::ready(!cancel.is_cancelled()))
            .map(|item| async move { self.process_item(&item).await })
            .buffer_unordered(concurrency.max(1));
        while let Some(outcome) = outcomes.next().await {
            summary.record(&outcome);
        }
        summary.cancelled = cancel.is_cancelled();
        summary
    }

    async fn transfer_representation(
        &self,
        item: &SourceItem,
        parent_path: &str,
        representation: &Representation,
    ) -> RepresentationReport {
        let file_name = self.selector.file_name(&item.name, representation);
        let outcome = match self
            .try_transfer(item, parent_path, representation, file_name.as_deref())
            .await
        {
            Ok(()) => RepresentationOutcome::Succeeded,
            Err(err) if err.is_range_not_satisfiable() => {
                warn!(name = %item.name, content_type = %representation.content_type, "skipped: {err}");
                RepresentationOutcome::Skipped
            }
            Err(err) => {
                error!(name = %item.name, content_type = %representation.content_type, "transfer failed: {err}");
                RepresentationOutcome::Failed(err.to_string())
            }
        };
        RepresentationReport {
            content_type: representation.content_type.clone(),
            file_name,
            outcome,
        }
    }

    async fn try_transfer(
        &self,
        item: &SourceItem,
        parent_path: &str,
        representation: &Representation,
        file_name: Option<&str>,
    ) -> Result<(), EngineError> {
        let file_name = file_name
            .ok_or_else(|| EngineError::UnknownExtension(representation.content_type.clone()))?;
        let local = local_file_path(&self.local_root, parent_path, file_name)?;
        // Same-named siblings share a local path; hold it until the upload is done.
        let lock = self.local_lock(&local);
        let _held = lock.lock().await;

        let response = if representation.verbatim {
            self.drive.open_media(&item.id).await?
        } else {
            self.drive
                .open_export(&item.id, &representation.content_type)
                .await?
        };
        let written = self
            .transfer
            .download_to_path(response, &local, system_time_from_unix(item.modified))
            .await?;
        info!(path = %local.display(), bytes = written, "downloaded");

        let Some(destination) = &self.destination else {
            return Ok(());
        };
        let document_id = destination
            .upload_file(
                &self.transfer,
                &local,
                parent_path,
                file_name,
                &representation.content_type,
                item.modified,
            )
            .await?;
        info!(path = %parent_path, name = file_name, document = %document_id, "uploaded");

        if self.cleanup
            && let Err(err) = tokio::fs::remove_file(&local).await
        {
            warn!(path = %local.display(), "failed to remove local copy: {err}");
        }
        Ok(())
    }

    fn local_lock(&self, path: &Path) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.local_locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(path.to_path_buf()).or_default().clone()
    }

    async fn delete_if_eligible(
        &self,
        item: &SourceItem,
        parent_path: &str,
        reports: &[RepresentationReport],
    ) -> Deletion {
        if !self.cleanup || self.destination.is_none() {
            return Deletion::Disabled;
        }
        if !is_deletion_eligible(reports) {
            return Deletion::NotEligible;
        }
        if let Some(prefix) = self.guard.protecting_prefix(parent_path) {
            warn!(path = %parent_path, name = %item.name, prefix, "delete-protected, keeping source");
            return Deletion::Protected {
                prefix: prefix.to_string(),
            };
        }
        match self.drive.delete_file(&item.id).await {
            Ok(()) => {
                info!(path = %parent_path, name = %item.name, "deleted source");
                Deletion::Deleted
            }
            Err(err) => {
                error!(path = %parent_path, name = %item.name, "delete failed: {err}");
                Deletion::Failed(err.to_string())
            }
        }
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
