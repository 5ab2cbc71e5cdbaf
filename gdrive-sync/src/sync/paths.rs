use std::path::{Component, Path, PathBuf};

use thiserror::Error;

const FALLBACK_ROOT_NAME: &str = "root";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("relative path is empty")]
    Empty,
    #[error("path contains unsupported component")]
    UnsupportedComponent,
    #[error("path is not under the sync root")]
    OutsideRoot,
    #[error("path cannot be stored in a line-oriented log")]
    Unrepresentable,
}

/// Maps a POSIX relative path ("sub/b.txt") under the local sync root.
pub fn local_path_for(root: &Path, rel_path: &str) -> Result<PathBuf, PathError> {
    if rel_path.is_empty() {
        return Err(PathError::Empty);
    }

    let mut out = root.to_path_buf();
    for component in Path::new(rel_path).components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => continue,
            Component::RootDir | Component::ParentDir | Component::Prefix(_) => {
                return Err(PathError::UnsupportedComponent);
            }
        }
    }
    Ok(out)
}

/// Relative, forward-slash form of `path` used as the identity key in the
/// todo/done logs.
pub fn relative_posix(root: &Path, path: &Path) -> Result<String, PathError> {
    let relative = path.strip_prefix(root).map_err(|_| PathError::OutsideRoot)?;
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => {
                let part = part.to_str().ok_or(PathError::Unrepresentable)?;
                if part.contains(['\n', '\r']) {
                    return Err(PathError::Unrepresentable);
                }
                parts.push(part);
            }
            Component::CurDir => continue,
            _ => return Err(PathError::UnsupportedComponent),
        }
    }
    if parts.is_empty() {
        return Err(PathError::Empty);
    }
    Ok(parts.join("/"))
}

/// Directory part of a relative path; empty for files directly under the root.
pub fn parent_dir(rel_path: &str) -> &str {
    rel_path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

pub fn file_name(rel_path: &str) -> &str {
    rel_path
        .rsplit_once('/')
        .map(|(_, name)| name)
        .unwrap_or(rel_path)
}

/// Per-root state directory, keyed by the root's base name.
pub fn cache_dir_for(cache_root: &Path, sync_root: &Path) -> PathBuf {
    let name = sync_root
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| FALLBACK_ROOT_NAME.to_string());
    cache_root.join(name)
}
