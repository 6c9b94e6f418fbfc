//! Path validation for agent file-system handles

use std::path::{Component, Path, PathBuf};

use crate::FunctionError;

/// Resolve `path` against `working_dir` and require it to stay inside `base`.
///
/// Steps:
/// 1. Expand `~/`; join relative paths onto the working directory
/// 2. Canonicalize the longest existing ancestor to resolve symlinks, then
///    re-append the missing tail with `..` folded lexically
/// 3. Ensure the result starts with the canonical base
pub async fn resolve_in_workspace(
    path: &str,
    working_dir: &Path,
    base: &Path,
) -> Result<PathBuf, FunctionError> {
    let expanded = if path.starts_with('/') || path.starts_with('~') {
        expand_tilde(path)
    } else {
        working_dir.join(path)
    };

    let absolute = canonicalize_existing_prefix(&normalize(&expanded)).await;
    let canonical_base = canonicalize_existing_prefix(&normalize(base)).await;

    if !is_path_within(&absolute, &canonical_base) {
        return Err(FunctionError::Failed(format!(
            "path {} is outside workspace {}",
            path,
            canonical_base.display()
        )));
    }

    Ok(absolute)
}

/// Canonicalize the deepest ancestor that exists and append the rest
async fn canonicalize_existing_prefix(path: &Path) -> PathBuf {
    let mut existing = path.to_path_buf();
    let mut tail = Vec::new();

    loop {
        if let Ok(canonical) = tokio::fs::canonicalize(&existing).await {
            return tail.into_iter().rev().fold(canonical, |acc, part| acc.join(part));
        }
        match (existing.file_name().map(|n| n.to_os_string()), existing.parent()) {
            (Some(name), Some(parent)) => {
                tail.push(name);
                existing = parent.to_path_buf();
            }
            _ => return path.to_path_buf(),
        }
    }
}

/// Fold `.` and `..` without touching the file system
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Component-wise prefix check
fn is_path_within(path: &Path, root: &Path) -> bool {
    path.starts_with(root)
}

/// Expand tilde (~) to home directory
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
