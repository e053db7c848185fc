use std::collections::{HashMap, HashSet};

use drive2docs_core::{DriveFile, FolderMetadata};

pub const SEPARATOR: char = '/';
pub const ROOT_PATH: &str = "/";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderNode {
    pub id: String,
    pub name: String,
    pub parent_id: Option<String>,
}

impl FolderNode {
    pub fn new(id: impl Into<String>, name: impl Into<String>, parent_id: Option<&str>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            parent_id: parent_id.map(str::to_string),
        }
    }
}

impl From<&DriveFile> for FolderNode {
    fn from(file: &DriveFile) -> Self {
        Self::new(file.id.clone(), file.name.clone(), file.first_parent())
    }
}

impl From<&FolderMetadata> for FolderNode {
    fn from(folder: &FolderMetadata) -> Self {
        Self::new(
            folder.id.clone(),
            folder.name.clone(),
            folder.parent_folder_id.as_deref(),
        )
    }
}

/// Two-way index between folder ids and resolved paths.
///
/// Every id keeps its own path. When two ids resolve to the same path (sibling
/// folders sharing a name), the path maps back to the most recently inserted id.
#[derive(Debug, Clone, Default)]
pub struct FolderPaths {
    by_id: HashMap<String, String>,
    by_path: HashMap<String, String>,
}

impl FolderPaths {
    pub fn insert(&mut self, id: impl Into<String>, path: impl Into<String>) {
        let id = id.into();
        let path = path.into();
        if let Some(previous) = self.by_id.get(&id)
            && self.by_path.get(previous) == Some(&id)
        {
            self.by_path.remove(previous);
        }
        self.by_path.insert(path.clone(), id.clone());
        self.by_id.insert(id, path);
    }

    pub fn path_of(&self, id: &str) -> Option<&str> {
        self.by_id.get(id).map(String::as_str)
    }

    pub fn id_of(&self, path: &str) -> Option<&str> {
        self.by_path.get(path).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct PathResolver {
    root_path: String,
}

impl PathResolver {
    pub fn new(root_path: &str) -> Self {
        Self {
            root_path: normalize_path(root_path),
        }
    }

    pub fn root_path(&self) -> &str {
        &self.root_path
    }

    /// Maps every node to its full path. Nodes whose parent is not part of
    /// `nodes` resolve to the root path; a parent chain that loops back on
    /// itself stops at the first repeated id.
    pub fn resolve(&self, nodes: &[FolderNode]) -> FolderPaths {
        let by_id: HashMap<&str, &FolderNode> =
            nodes.iter().map(|node| (node.id.as_str(), node)).collect();
        let mut paths = FolderPaths::default();
        for node in nodes {
            paths.insert(node.id.clone(), self.path_for(node, &by_id));
        }
        paths
    }

    fn path_for(&self, node: &FolderNode, by_id: &HashMap<&str, &FolderNode>) -> String {
        let lookup = |id: Option<&str>| id.and_then(|id| by_id.get(id).copied());
        let Some(mut parent) = lookup(node.parent_id.as_deref()) else {
            return self.root_path.clone();
        };

        let mut names = vec![node.name.as_str()];
        let mut seen = HashSet::from([node.id.as_str()]);
        while seen.insert(parent.id.as_str()) {
            match lookup(parent.parent_id.as_deref()) {
                Some(next) => {
                    names.push(parent.name.as_str());
                    parent = next;
                }
                None => break,
            }
        }

        names
            .iter()
            .rev()
            .fold(self.root_path.clone(), |path, name| join_path(&path, name))
    }
}

/// Exactly one leading separator, no trailing separator except for the root.
pub fn normalize_path(path: &str) -> String {
    let trimmed = path.trim_matches(SEPARATOR);
    if trimmed.is_empty() {
        ROOT_PATH.to_string()
    } else {
        format!("{SEPARATOR}{trimmed}")
    }
}

pub fn join_path(base: &str, name: &str) -> String {
    let name = name.trim_matches(SEPARATOR);
    if name.is_empty() {
        return base.to_string();
    }
    let base = base.trim_end_matches(SEPARATOR);
    format!("{base}{SEPARATOR}{name}")
}
