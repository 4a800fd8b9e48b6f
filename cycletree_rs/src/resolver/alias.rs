//! Alias/path-mapping resolution backed by tsconfig-style configuration.
//!
//! Supports `paths` patterns with wildcards, `baseUrl` fallback, and
//! `extends` chains merged child-over-parent. Malformed configuration is
//! never fatal: loading simply yields no alias layer and resolution falls
//! through to the next strategy.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::cache::GraphCache;
use crate::types::{AliasConfig, FileId};

use super::probe_candidate;

#[derive(Debug)]
pub(crate) struct AliasResolver {
    base_dir: PathBuf,
    root: PathBuf,
    mappings: Vec<AliasMapping>,
    explicit_base_url: bool,
}

#[derive(Debug, Clone)]
struct AliasMapping {
    pattern: String,
    targets: Vec<String>,
    wildcard_count: usize,
}

impl AliasResolver {
    /// Build from an explicit configuration (host-supplied alias map).
    pub(crate) fn from_config(root: &Path, config: &AliasConfig) -> Self {
        let base_url = config.base_url.as_deref().unwrap_or(".");
        let base_dir = root.join(base_url);

        let mut mappings = Vec::new();
        for (alias, targets) in &config.paths {
            let targets_vec: Vec<String> = targets
                .iter()
                .map(|t| t.replace('\\', "/"))
                .collect();
            if targets_vec.is_empty() {
                continue;
            }
            let pattern = alias.replace('\\', "/");
            let wildcard_count = pattern.matches('*').count();
            mappings.push(AliasMapping {
                pattern,
                targets: targets_vec,
                wildcard_count,
            });
        }

        Self {
            base_dir: base_dir.canonicalize().unwrap_or(base_dir),
            root: root.to_path_buf(),
            mappings,
            explicit_base_url: config.base_url.is_some(),
        }
    }

    /// Build by discovering and parsing `tsconfig.json` upward from root.
    pub(crate) fn from_tsconfig(root: &Path) -> Option<Self> {
        let ts_path = find_tsconfig(root)?;
        let json = load_tsconfig_recursive(&ts_path)?;
        let compiler = json
            .get("compilerOptions")
            .and_then(|v| v.as_object())
            .cloned()
            .unwrap_or_default();

        let base_url = compiler
            .get("baseUrl")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        let mut paths = HashMap::new();
        if let Some(raw) = compiler.get("paths").and_then(|p| p.as_object()) {
            for (alias, targets) in raw {
                let targets_vec: Vec<String> = targets
                    .as_array()
                    .into_iter()
                    .flat_map(|arr| arr.iter())
                    .filter_map(|v| v.as_str())
                    .map(|s| s.to_string())
                    .collect();
                if !targets_vec.is_empty() {
                    paths.insert(alias.clone(), targets_vec);
                }
            }
        }

        let config_root = ts_path.parent().unwrap_or(root);
        Some(Self::from_config(
            config_root,
            &AliasConfig { base_url, paths },
        ))
    }

    /// Whether the configuration carried an explicit `baseUrl`. Path-shaped
    /// bare specifiers stay resolvable in that case.
    pub(crate) fn has_explicit_base_url(&self) -> bool {
        self.explicit_base_url
    }

    /// Cheap pattern-only check: could any mapping cover this specifier?
    /// Used by the external fast path so aliased specifiers that look like
    /// package names are not short-circuited.
    pub(crate) fn has_candidate(&self, spec: &str) -> bool {
        self.mappings.iter().any(|m| {
            if m.wildcard_count == 0 {
                return spec == m.pattern;
            }
            matches_pattern(&m.pattern, spec).is_some()
        })
    }

    /// Resolve through the alias mappings, then the `baseUrl` fallback.
    /// Relative specifiers are not alias territory.
    pub(crate) fn resolve(
        &self,
        spec: &str,
        exts: &[String],
        cache: &mut GraphCache,
    ) -> Option<FileId> {
        if spec.starts_with('.') {
            return None;
        }
        let normalized = spec.replace('\\', "/");

        for mapping in &self.mappings {
            if mapping.wildcard_count > 0 {
                let Some(captures) = matches_pattern(&mapping.pattern, &normalized) else {
                    continue;
                };
                for target in &mapping.targets {
                    let replaced = substitute_wildcards(target, &captures);
                    let candidate = self.base_dir.join(replaced);
                    if let Some(id) = probe_candidate(&candidate, exts, cache) {
                        return Some(id);
                    }
                }
            } else if normalized == mapping.pattern {
                for target in &mapping.targets {
                    let candidate = self.base_dir.join(target);
                    if let Some(id) = probe_candidate(&candidate, exts, cache) {
                        return Some(id);
                    }
                }
            }
        }

        // baseUrl fallback: root-relative for absolute specifiers,
        // base-dir-relative otherwise.
        let candidate = if let Some(stripped) = normalized.strip_prefix('/') {
            self.root.join(stripped)
        } else {
            self.base_dir.join(&normalized)
        };
        probe_candidate(&candidate, exts, cache)
    }
}

/// Match a wildcard pattern against a specifier, returning the captured
/// segments in order, or `None` when the structure does not line up.
fn matches_pattern(pattern: &str, spec: &str) -> Option<Vec<String>> {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() < 2 {
        return None;
    }

    let mut rest = spec;
    let mut captures = Vec::new();
    for (i, part) in parts.iter().enumerate() {
        if i == 0 {
            rest = rest.strip_prefix(part)?;
        } else if i == parts.len() - 1 {
            let captured = rest.strip_suffix(part)?;
            captures.push(captured.to_string());
        } else {
            let idx = rest.find(part)?;
            captures.push(rest[..idx].to_string());
            rest = &rest[idx + part.len()..];
        }
    }
    Some(captures)
}

/// Replace each `*` in a target with the corresponding capture, in order.
fn substitute_wildcards(target: &str, captures: &[String]) -> String {
    let mut result = target.to_string();
    for capture in captures {
        if let Some(idx) = result.find('*') {
            result.replace_range(idx..=idx, capture);
        }
    }
    result
}

/// Walk upward looking for a `tsconfig.json`. A directory carrying a
/// `package.json` marks the project boundary: the walk never crosses it,
/// so a checkout nested under an unrelated tree cannot adopt an
/// ancestor's configuration.
fn find_tsconfig(start: &Path) -> Option<PathBuf> {
    let mut current = start.canonicalize().unwrap_or_else(|_| start.to_path_buf());
    loop {
        let candidate = current.join("tsconfig.json");
        if candidate.exists() {
            return Some(candidate);
        }
        if current.join("package.json").exists() {
            return None;
        }
        match current.parent() {
            Some(parent) if parent != current => current = parent.to_path_buf(),
            _ => return None,
        }
    }
}

/// Load a tsconfig and merge its `extends` chain, child overriding parent.
fn load_tsconfig_recursive(ts_path: &Path) -> Option<Value> {
    let content = std::fs::read_to_string(ts_path).ok()?;
    let mut current = parse_tsconfig_value(&content)?;

    if let Some(ext) = current.get("extends").and_then(|v| v.as_str()) {
        let base_path = if Path::new(ext).is_absolute() {
            PathBuf::from(ext)
        } else {
            ts_path
                .parent()
                .map(|p| p.join(ext))
                .unwrap_or_else(|| PathBuf::from(ext))
        };
        if base_path.exists()
            && let Some(parent) = load_tsconfig_recursive(&base_path)
        {
            let child_co = current
                .get("compilerOptions")
                .and_then(|v| v.as_object())
                .cloned();
            let parent_co = parent
                .get("compilerOptions")
                .and_then(|v| v.as_object())
                .cloned();
            match (child_co, parent_co) {
                (Some(child), Some(parent_opts)) => {
                    current["compilerOptions"] =
                        Value::Object(merge_compiler_options(&parent_opts, &child));
                }
                (None, Some(parent_opts)) => {
                    current["compilerOptions"] = Value::Object(parent_opts);
                }
                _ => {}
            }
        }
    }

    Some(current)
}

/// tsconfig files are frequently JSON5 (comments, trailing commas); try
/// strict JSON first, then the tolerant parser.
fn parse_tsconfig_value(content: &str) -> Option<Value> {
    if let Ok(v) = serde_json::from_str(content) {
        return Some(v);
    }
    if let Ok(v) = json_five::from_str::<Value>(content) {
        return Some(v);
    }
    tracing::warn!("unparseable tsconfig; alias layer skipped");
    None
}

fn merge_compiler_options(
    parent: &serde_json::Map<String, Value>,
    child: &serde_json::Map<String, Value>,
) -> serde_json::Map<String, Value> {
    let mut merged = parent.clone();
    for (k, v) in child {
        if k == "paths" {
            let mut combined = parent
                .get("paths")
                .and_then(|v| v.as_object())
                .cloned()
                .unwrap_or_default();
            if let Some(child_paths) = v.as_object() {
                for (alias, targets) in child_paths {
                    combined.insert(alias.clone(), targets.clone());
                }
            }
            merged.insert(k.clone(), Value::Object(combined));
        } else {
            merged.insert(k.clone(), v.clone());
        }
    }
    merged
}
