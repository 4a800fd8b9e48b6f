//! Import extraction: lightweight pattern scanning over file text,
//! no grammar. Static and dynamic forms are scanned by independent
//! matchers; every specifier goes through the resolver and only edges
//! with a real on-disk target are kept.

use std::collections::HashSet;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use crate::cache::{FileVersion, GraphCache};
use crate::resolver::Resolver;
use crate::types::{FileId, ImportEdge};

fn regex(pattern: &str) -> Regex {
    Regex::new(pattern).expect("valid regex literal")
}

fn regex_import() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| regex(r#"(?m)^\s*import\s+([^;]+?)\s+from\s+["']([^"']+)["']"#))
}

fn regex_side_effect_import() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| regex(r#"(?m)^\s*import\s+["']([^"']+)["']"#))
}

fn regex_reexport_star() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| regex(r#"(?m)^\s*export\s+\*\s+(?:as\s+\S+\s+)?from\s+["']([^"']+)["']"#))
}

fn regex_reexport_named() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| regex(r#"(?m)^\s*export\s+(?:type\s+)?\{[^}]+\}\s+from\s+["']([^"']+)["']"#))
}

fn regex_require() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Top-level require("x") calls; avoids foo.require()
    RE.get_or_init(|| regex(r#"(?m)(?:^|[^A-Za-z0-9_.])require\s*\(\s*["']([^"']+)["']\s*\)"#))
}

fn regex_dynamic_import() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| regex(r#"import\s*\(\s*["']([^"']+)["']\s*\)"#))
}

fn regex_css_import() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // @import "x.css";  @import url("x.css");  @import url(x.css);
    RE.get_or_init(|| regex(r#"(?m)@import\s+(?:url\()?['"]?([^"'()\s;]+)['"]?\)?"#))
}

/// Import edges for one file, served from the cache while its stamp is
/// unchanged. Unreadable files yield an empty list, never an error.
pub fn imports_of(file: &str, resolver: &Resolver, cache: &mut GraphCache) -> Vec<ImportEdge> {
    let path = Path::new(file);
    let current = FileVersion::stamp(path);
    if let Some(edges) = cache.cached_imports(file, current) {
        return edges;
    }
    let previous = cache.known_version(file);

    let edges = match std::fs::read_to_string(path) {
        Ok(text) => scan(file, &text, resolver, cache),
        Err(_) => Vec::new(),
    };

    // Re-stamp after reading so a concurrent edit is caught next call.
    let version = FileVersion::stamp(path);
    if previous.is_some_and(|prev| prev != version) {
        tracing::debug!(file, "file changed; dropping cached graph state");
        cache.bump_graph_version();
    }
    cache.store_imports(file.to_string(), version, edges.clone());
    edges
}

fn scan(file: &str, text: &str, resolver: &Resolver, cache: &mut GraphCache) -> Vec<ImportEdge> {
    let mut edges: Vec<ImportEdge> = Vec::new();
    let mut static_targets: HashSet<FileId> = HashSet::new();

    for specifier in static_specifiers(file, text) {
        if let Some(to) = resolver.resolve(&specifier, file, cache) {
            static_targets.insert(to.clone());
            edges.push(ImportEdge {
                from: file.to_string(),
                to,
                source: specifier,
                dynamic: false,
            });
        }
    }

    for captures in regex_dynamic_import().captures_iter(text) {
        let specifier = captures[1].to_string();
        if let Some(to) = resolver.resolve(&specifier, file, cache) {
            // A static edge to the same target subsumes the dynamic one.
            if static_targets.contains(&to) {
                continue;
            }
            edges.push(ImportEdge {
                from: file.to_string(),
                to,
                source: specifier,
                dynamic: true,
            });
        }
    }

    edges
}

/// All static specifiers in the text, in document order per matcher.
/// Stylesheet files use the `@import` syntax instead of the code forms.
fn static_specifiers(file: &str, text: &str) -> Vec<String> {
    if is_stylesheet(file) {
        return regex_css_import()
            .captures_iter(text)
            .map(|c| c[1].to_string())
            .collect();
    }

    let mut specifiers = Vec::new();
    for captures in regex_import().captures_iter(text) {
        specifiers.push(captures[2].to_string());
    }
    for matcher in [
        regex_side_effect_import(),
        regex_reexport_star(),
        regex_reexport_named(),
        regex_require(),
    ] {
        for captures in matcher.captures_iter(text) {
            specifiers.push(captures[1].to_string());
        }
    }
    specifiers
}

fn is_stylesheet(file: &str) -> bool {
    Path::new(file)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| matches!(ext, "css" | "scss" | "sass" | "less"))
}
