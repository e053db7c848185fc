use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use drive2docs_core::{DocStoreClient, DocStoreError};
use thiserror::Error;
use tracing::{debug, info};

use super::hierarchy::{
    FolderNode, FolderPaths, PathResolver, ROOT_PATH, SEPARATOR, join_path, normalize_path,
};

#[derive(Debug, Error)]
pub enum MaterializeError {
    #[error("document store request failed: {0}")]
    Store(#[from] DocStoreError),
}

/// Maps logical folder paths to destination folder ids, creating missing
/// folders on demand. At most one create call is issued per path.
pub struct FolderMaterializer {
    store: DocStoreClient,
    root_id: String,
    index: Mutex<FolderPaths>,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl FolderMaterializer {
    pub fn new(store: DocStoreClient, root_id: impl Into<String>, index: FolderPaths) -> Self {
        Self {
            store,
            root_id: root_id.into(),
            index: Mutex::new(index),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Reads the existing folder tree below `root_id` into the index.
    pub async fn load(store: DocStoreClient, root_id: &str) -> Result<Self, MaterializeError> {
        let mut nodes: Vec<FolderNode> = store
            .list_folders_recursive(root_id)
            .await?
            .iter()
            .map(FolderNode::from)
            .collect();
        nodes.push(FolderNode::new(root_id, "", None));
        let index = PathResolver::new(ROOT_PATH).resolve(&nodes);
        info!(root = root_id, folders = index.len(), "destination folders indexed");
        Ok(Self::new(store, root_id, index))
    }

    pub fn root_id(&self) -> &str {
        &self.root_id
    }

    pub fn known_folder(&self, path: &str) -> Option<String> {
        self.index().id_of(&normalize_path(path)).map(str::to_string)
    }

    pub async fn ensure_folder(&self, path: &str) -> Result<String, MaterializeError> {
        let path = normalize_path(path);
        if path == ROOT_PATH {
            return Ok(self.root_id.clone());
        }
        if let Some(id) = self.known_folder(&path) {
            return Ok(id);
        }

        let mut parent_id = self.root_id.clone();
        let mut current = ROOT_PATH.to_string();
        for name in path.split(SEPARATOR).filter(|name| !name.is_empty()) {
            current = join_path(&current, name);
            parent_id = self.ensure_child(&current, &parent_id, name).await?;
        }
        Ok(parent_id)
    }

    async fn ensure_child(
        &self,
        path: &str,
        parent_id: &str,
        name: &str,
    ) -> Result<String, MaterializeError> {
        if let Some(id) = self.known_folder(path) {
            return Ok(id);
        }
        let lock = self.path_lock(path);
        let _held = lock.lock().await;
        if let Some(id) = self.known_folder(path) {
            return Ok(id);
        }

        let created = self.store.create_folder(parent_id, name).await?;
        debug!(path, id = %created.id, "created destination folder");
        self.index().insert(created.id.clone(), path);
        Ok(created.id)
    }

    fn path_lock(&self, path: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(path.to_string()).or_default().clone()
    }

    fn index(&self) -> MutexGuard<'_, FolderPaths> {
        self.index.lock().unwrap_or_else(|e| e.into_inner())
    }
}
