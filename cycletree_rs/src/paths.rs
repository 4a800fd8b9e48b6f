use std::path::{Component, Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::types::FileId;

/// Turn any path into its canonical file identity.
///
/// Relative paths are absolutized against the current directory, symlinks
/// are resolved where the filesystem allows it (lexical cleanup as the
/// fallback for paths that do not exist yet), and separators are unified
/// to `/` so the same file never appears under two keys.
pub fn normalize_identity(path: &Path) -> FileId {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    let resolved = absolute
        .canonicalize()
        .unwrap_or_else(|_| lexical_normalize(&absolute));
    resolved.to_string_lossy().replace('\\', "/")
}

/// Component-wise cleanup without touching the filesystem: drops `.`
/// segments and folds `..` into the preceding component.
pub fn lexical_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component.as_os_str());
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Format an identity relative to a root for human-facing output.
pub fn display_rel(id: &str, root: &Path) -> String {
    let root_id = normalize_identity(root);
    id.strip_prefix(&root_id)
        .map(|rest| rest.trim_start_matches('/').to_string())
        .unwrap_or_else(|| id.to_string())
}

/// Build a globset from user patterns. Invalid globs are skipped with a
/// warning rather than failing the whole pattern set.
pub fn build_globset(patterns: &[String]) -> Option<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    let mut added = false;
    for pat in patterns {
        if pat.trim().is_empty() {
            continue;
        }
        match Glob::new(pat) {
            Ok(glob) => {
                builder.add(glob);
                added = true;
            }
            Err(err) => tracing::warn!("invalid glob '{}': {}", pat, err),
        }
    }
    if !added { None } else { builder.build().ok() }
}
