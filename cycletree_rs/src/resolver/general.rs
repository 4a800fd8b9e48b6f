//! Filesystem probing shared by every resolution layer.
//!
//! A candidate path is tried literally, then with each configured
//! extension appended, then as a directory via its package manifest
//! entry point and finally its index files. All existence answers go
//! through the session cache.

use std::path::Path;

use serde_json::Value;

use crate::cache::GraphCache;
use crate::paths::normalize_identity;
use crate::types::FileId;

/// Probe one candidate. Extensions are appended to the raw candidate
/// string, so dotted basenames like `user.service` still probe
/// `user.service.ts`.
pub(crate) fn probe_candidate(
    candidate: &Path,
    exts: &[String],
    cache: &mut GraphCache,
) -> Option<FileId> {
    let literal = normalize_identity(candidate);
    if cache.file_exists(&literal) {
        return Some(literal);
    }

    let raw = candidate.to_string_lossy();
    for ext in exts {
        let id = normalize_identity(Path::new(&format!("{raw}.{ext}")));
        if cache.file_exists(&id) {
            return Some(id);
        }
    }

    if candidate.is_dir() {
        if let Some(entry) = package_entry(candidate) {
            let resolved = candidate.join(entry);
            let id = normalize_identity(&resolved);
            if cache.file_exists(&id) {
                return Some(id);
            }
            // Entry points occasionally omit their extension.
            let raw = resolved.to_string_lossy();
            for ext in exts {
                let id = normalize_identity(Path::new(&format!("{raw}.{ext}")));
                if cache.file_exists(&id) {
                    return Some(id);
                }
            }
        }
        for ext in exts {
            let id = normalize_identity(&candidate.join(format!("index.{ext}")));
            if cache.file_exists(&id) {
                return Some(id);
            }
        }
    }

    None
}

/// Entry point declared by a directory's `package.json`, if any.
/// The `exports` map wins over the legacy `module`/`main` fields.
fn package_entry(dir: &Path) -> Option<String> {
    let manifest = dir.join("package.json");
    let content = std::fs::read_to_string(&manifest).ok()?;
    let json: Value = serde_json::from_str(&content).ok()?;

    if let Some(exports) = json.get("exports")
        && let Some(entry) = exports_entry(exports)
    {
        return Some(entry);
    }
    for key in ["module", "main"] {
        if let Some(entry) = json.get(key).and_then(|v| v.as_str()) {
            return Some(entry.to_string());
        }
    }
    None
}

/// Walk an `exports` value down to a concrete path. Conditions are tried
/// in the order import, require, default.
fn exports_entry(value: &Value) -> Option<String> {
    match value {
        Value::String(path) => Some(path.clone()),
        Value::Object(map) => {
            if let Some(dot) = map.get(".") {
                return exports_entry(dot);
            }
            for condition in ["import", "require", "default"] {
                if let Some(nested) = map.get(condition) {
                    return exports_entry(nested);
                }
            }
            None
        }
        _ => None,
    }
}
