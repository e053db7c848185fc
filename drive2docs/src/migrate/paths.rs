use std::path::{Component, Path, PathBuf};

use thiserror::Error;

use super::hierarchy::{SEPARATOR, normalize_path};

const DOCUMENT_NAME_ILLEGAL: &[char] = &['*', '/', ':', '<', '>', '?', '\\', '|'];

#[derive(Debug, Error)]
pub enum PathError {
    #[error("file name is empty")]
    Empty,
    #[error("logical path contains unsupported component: {0}")]
    UnsupportedComponent(String),
}

/// `<local_root>/<logical_dir>/<file_name>`.
pub fn local_file_path(
    local_root: &Path,
    logical_dir: &str,
    file_name: &str,
) -> Result<PathBuf, PathError> {
    if file_name.is_empty() {
        return Err(PathError::Empty);
    }
    let mut out = local_dir_path(local_root, logical_dir)?;
    match Path::new(file_name).components().collect::<Vec<_>>().as_slice() {
        [Component::Normal(part)] => out.push(part),
        _ => return Err(PathError::UnsupportedComponent(file_name.to_string())),
    }
    Ok(out)
}

pub fn local_dir_path(local_root: &Path, logical_dir: &str) -> Result<PathBuf, PathError> {
    // Logical paths are POSIX-like ("/Reports/2024"); map them under local_root.
    let mut out = local_root.to_path_buf();
    for component in Path::new(logical_dir).components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::RootDir | Component::CurDir => continue,
            Component::ParentDir | Component::Prefix(_) => {
                return Err(PathError::UnsupportedComponent(logical_dir.to_string()));
            }
        }
    }
    Ok(out)
}

/// Inverse of [`local_dir_path`]: the logical folder holding `local_dir`.
pub fn logical_dir_for(local_root: &Path, local_dir: &Path) -> Option<String> {
    let relative = local_dir.strip_prefix(local_root).ok()?;
    let parts: Vec<_> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect();
    Some(normalize_path(&parts.join(&SEPARATOR.to_string())))
}

/// Name accepted by the document store.
pub fn document_name(file_name: &str) -> String {
    file_name.replace(DOCUMENT_NAME_ILLEGAL, "_")
}
