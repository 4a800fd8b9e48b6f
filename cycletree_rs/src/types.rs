use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Canonical file identity: an absolute path with `/` separators.
///
/// Every cache table and graph node is keyed by this form; the same file
/// never appears under two spellings (casing, separators, `..` segments).
pub type FileId = String;

/// Default bound on Phase B path extraction. Cycles longer than this are
/// not materialized (the SCC membership answer is still exact).
pub const DEFAULT_MAX_TRAVERSAL_DEPTH: usize = 64;

/// A single resolved import relationship between two files.
///
/// Derived from file content, never persisted independently: always either
/// recomputed from the file's current text or served from the per-file
/// import cache.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportEdge {
    /// Importing file.
    pub from: FileId,
    /// Imported file (resolved to a real local file).
    pub to: FileId,
    /// Raw specifier as written in the source.
    pub source: String,
    /// True for deferred-load forms (`import("x")`). Dynamic edges are
    /// recorded but excluded from cycle traversal.
    pub dynamic: bool,
}

/// One strongly connected component of the import graph.
///
/// SCCs partition the discovered node set exactly. `has_cycle` is true for
/// multi-file components and for a single file that imports itself.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scc {
    pub files: Vec<FileId>,
    pub has_cycle: bool,
}

/// A closed import loop: consecutive entries have an edge and the last
/// entry equals the first.
///
/// Canonicalized by rotating so the lexicographically smallest member
/// leads, so the same loop discovered from different start files compares
/// equal.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cycle {
    pub files: Vec<FileId>,
}

impl Cycle {
    /// Build the canonical form of a minimal loop.
    ///
    /// `loop_files` is the open form (no repeated tail entry); the result
    /// is rotated to its smallest member and closed.
    pub fn canonical(loop_files: &[FileId]) -> Self {
        if loop_files.is_empty() {
            return Self { files: Vec::new() };
        }
        let pivot = loop_files
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| a.cmp(b))
            .map(|(i, _)| i)
            .unwrap_or(0);
        let mut files: Vec<FileId> = Vec::with_capacity(loop_files.len() + 1);
        files.extend_from_slice(&loop_files[pivot..]);
        files.extend_from_slice(&loop_files[..pivot]);
        files.push(files[0].clone());
        Self { files }
    }

    /// Number of distinct files in the loop.
    pub fn len(&self) -> usize {
        self.files.len().saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Alias/path-mapping configuration, tsconfig-shaped.
///
/// `paths` maps patterns (wildcards allowed, e.g. `@app/*`) to candidate
/// target lists relative to `base_url`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AliasConfig {
    pub base_url: Option<String>,
    pub paths: HashMap<String, Vec<String>>,
}

/// Caller-facing knobs for a `find_cycles` invocation.
#[derive(Clone, Debug)]
pub struct AnalyzeOptions {
    /// Maximum Phase B traversal depth. Caps worst-case work on
    /// pathological graphs; cycles longer than this are not materialized.
    pub max_depth: usize,
    /// Enumerate every distinct cycle reachable from the start file, or
    /// stop at the first one found.
    pub report_all: bool,
    /// Barrel/index file names. Informational, carried for the reporting
    /// layer; the engine itself does not consult them.
    pub barrel_names: Vec<String>,
    /// Ignore globs, applied by the caller before invoking the engine.
    /// Carried so the reporting layer sees the same configuration.
    pub ignore_patterns: Vec<String>,
}

impl Default for AnalyzeOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_TRAVERSAL_DEPTH,
            report_all: true,
            barrel_names: vec!["index".to_string()],
            ignore_patterns: Vec::new(),
        }
    }
}
