use std::sync::Arc;

use anyhow::Context;
use drive2docs_core::DocStoreClient;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span};

use crate::config::{DestinationConfig, Settings, SourceConfig};
use crate::migrate::engine::{Destination, MigrationEngine, RunSummary, SourceItem};
use crate::migrate::folders::FolderMaterializer;
use crate::migrate::hierarchy::{FolderNode, PathResolver};
use crate::migrate::local::{LocalUploadSummary, LocalUploader, scan_local_tree};
use crate::migrate::transfer::{TransferClient, TransferConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Migrate,
    UploadLocal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceReport {
    Migrated(RunSummary),
    Uploaded(LocalUploadSummary),
}

/// Runs every configured source (or only `only`) and returns how many failed
/// to bootstrap. A failing instance never stops the others.
pub async fn run_all(
    settings: &Settings,
    only: Option<&str>,
    mode: RunMode,
    cancel: &CancellationToken,
) -> anyhow::Result<usize> {
    let sources: Vec<&SourceConfig> = match only {
        Some(name) => vec![
            settings
                .source(name)
                .with_context(|| format!("no source named {name}"))?,
        ],
        None => settings.sources.iter().collect(),
    };
    if sources.is_empty() {
        anyhow::bail!("no sources configured");
    }

    let mut failures = 0;
    for source in sources {
        if cancel.is_cancelled() {
            break;
        }
        let span = info_span!("instance", name = %source.name);
        if let Err(err) = run_instance(settings, source, mode, cancel)
            .instrument(span.clone())
            .await
        {
            span.in_scope(|| error!("instance failed: {err:#}"));
            failures += 1;
        }
    }
    Ok(failures)
}

pub async fn run_instance(
    settings: &Settings,
    source: &SourceConfig,
    mode: RunMode,
    cancel: &CancellationToken,
) -> anyhow::Result<InstanceReport> {
    let destination_config = settings.validate_source(source)?;
    let drive = source.client().context("invalid drive api url")?;
    let mime = settings.mime_table();
    let local_root = source.local_root(&settings.data_dir());
    tokio::fs::create_dir_all(&local_root)
        .await
        .with_context(|| format!("failed to create data directory {:?}", local_root))?;
    let transfer = TransferClient::with_config(TransferConfig::for_workers(source.concurrency));

    let destination = match destination_config {
        Some(config) => Some(connect_destination(config).await?),
        None => None,
    };

    if mode == RunMode::UploadLocal {
        let destination = destination
            .as_ref()
            .context("uploading local files requires a destination")?;
        let files = scan_local_tree(&local_root).await?;
        info!(root = %local_root.display(), files = files.len(), "uploading local files");
        let summary = LocalUploader::new(destination, &mime)
            .with_transfer(transfer)
            .with_cleanup(source.cleanup)
            .upload_all(files, source.concurrency, cancel)
            .await;
        info!(
            seen = summary.seen,
            uploaded = summary.uploaded,
            failed = summary.failed,
            cancelled = summary.cancelled,
            "local upload finished"
        );
        return Ok(InstanceReport::Uploaded(summary));
    }

    let root = drive
        .get_root_folder()
        .await
        .context("failed to fetch drive root")?;
    let mut folders = drive
        .list_folders_all(source.folder_hierarchy_fetch_size)
        .await
        .context("failed to list drive folders")?;
    folders.push(root);
    let nodes: Vec<FolderNode> = folders.iter().map(FolderNode::from).collect();
    let root_path = source.root_path();
    let paths = PathResolver::new(&root_path).resolve(&nodes);
    info!(folders = paths.len(), "source folders resolved");

    let files = drive
        .list_files_all(source.file_fetch_size)
        .await
        .context("failed to list drive files")?;
    let items: Vec<SourceItem> = files.iter().map(SourceItem::from).collect();
    info!(files = items.len(), "source files listed");

    let selector = source.export_selector(mime);
    let mut engine = MigrationEngine::new(drive, paths, &root_path, selector, local_root)
        .with_transfer(transfer)
        .with_cleanup(source.cleanup, source.delete_guard());
    if let Some(destination) = destination {
        engine = engine.with_destination(destination);
    }

    let summary = engine
        .process_all(items, source.concurrency, cancel)
        .await;
    info!("{summary}");
    Ok(InstanceReport::Migrated(summary))
}

async fn connect_destination(config: &DestinationConfig) -> anyhow::Result<Destination> {
    let store = config
        .client()
        .with_context(|| format!("invalid endpoint for destination {}", config.name))?;
    let root_id = resolve_root_folder(&store, config).await?;
    let folders = FolderMaterializer::load(store.clone(), &root_id)
        .await
        .context("failed to list destination folders")?;
    Ok(Destination {
        store,
        folders: Arc::new(folders),
        encryption: config.server_side_encryption.clone(),
    })
}

async fn resolve_root_folder(
    store: &DocStoreClient,
    config: &DestinationConfig,
) -> anyhow::Result<String> {
    if let Some(root_id) = config.root_folder_id() {
        return Ok(root_id.to_string());
    }
    let (organisation, query) = config
        .user_query()
        .with_context(|| format!("destination {} has no root folder", config.name))?;
    let users = store
        .describe_users(organisation, query)
        .await
        .context("failed to query destination users")?;
    for user in &users {
        info!(
            id = %user.id,
            username = user.username.as_deref().unwrap_or_default(),
            email = user.email_address.as_deref().unwrap_or_default(),
            given_name = user.given_name.as_deref().unwrap_or_default(),
            surname = user.surname.as_deref().unwrap_or_default(),
            "matched destination user"
        );
    }
    users
        .into_iter()
        .find_map(|user| user.root_folder_id)
        .with_context(|| format!("no user matching {query:?} has a root folder"))
}
