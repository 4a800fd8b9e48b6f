//! Session-scoped cache state for the analysis engine.
//!
//! `GraphCache` owns every lookup table the engine touches: file existence,
//! bounded resolution memoization, per-file import edges keyed by
//! `FileVersion`, compiled glob patterns, and the cached SCC partition.
//! It is an owned value injected into each operation — two independent
//! sessions never share state.

use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::path::Path;
use std::time::UNIX_EPOCH;

use globset::GlobSet;
use lru::LruCache;
use serde::{Deserialize, Serialize};

use crate::paths::build_globset;
use crate::types::{FileId, ImportEdge, Scc};

/// Capacity of the bounded resolution cache. Resolution requests are
/// unbounded in a large tree; everything else stays session-sized.
pub const DEFAULT_RESOLUTION_CACHE_CAPACITY: usize = 4096;

/// Staleness stamp for a file: mtime seconds plus byte size.
///
/// Using both fields avoids false positives on fast edits within mtime
/// granularity. If the stamp is unchanged, cached import edges for the
/// file are trusted without re-reading content.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileVersion {
    pub mtime: u64,
    pub size: u64,
}

impl FileVersion {
    /// Stamp for a file that cannot be stat'd.
    pub const MISSING: FileVersion = FileVersion { mtime: 0, size: 0 };

    /// Read the current stamp from disk. Unreadable files get `MISSING`.
    pub fn stamp(path: &Path) -> FileVersion {
        let Ok(metadata) = std::fs::metadata(path) else {
            return FileVersion::MISSING;
        };
        let mtime = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0);
        FileVersion {
            mtime,
            size: metadata.len(),
        }
    }

    pub fn is_missing(&self) -> bool {
        *self == FileVersion::MISSING
    }
}

/// Hit/miss counters, observable by tests and host tooling.
#[derive(Clone, Copy, Debug, Default)]
pub struct CacheStats {
    pub import_hits: u64,
    pub import_misses: u64,
    pub resolution_hits: u64,
    pub resolution_misses: u64,
    pub existence_checks: u64,
    pub scc_computations: u64,
}

/// Per-layer resolution counters. Read-only observability, not part of
/// the correctness contract.
#[derive(Clone, Copy, Debug, Default)]
pub struct ResolverStats {
    pub external_short_circuits: u64,
    pub hook_attempts: u64,
    pub hook_hits: u64,
    pub alias_attempts: u64,
    pub alias_hits: u64,
    pub stylesheet_attempts: u64,
    pub stylesheet_hits: u64,
    pub general_attempts: u64,
    pub general_hits: u64,
}

/// All mutable state for one analysis session.
pub struct GraphCache {
    /// File-level existence answers. Unbounded, cleared per session.
    existence: HashMap<FileId, bool>,
    /// Bounded `(from_file, specifier)` resolution memo, negative results
    /// included. Reads refresh recency; insertion past capacity evicts
    /// the least-recently-used entry.
    resolutions: LruCache<(FileId, String), Option<FileId>>,
    /// Per-file import edges, trusted while the stamp matches.
    imports: HashMap<FileId, (FileVersion, Vec<ImportEdge>)>,
    /// Compiled glob sets keyed by the joined pattern list. Pattern sets
    /// are small and finite per configuration, so unbounded is fine.
    patterns: HashMap<String, Option<GlobSet>>,
    /// Cached SCC partition for the current graph version.
    pub(crate) sccs: Vec<Scc>,
    pub(crate) scc_index: HashMap<FileId, usize>,
    pub(crate) scc_computed: bool,
    /// Files proven acyclic; short-circuits future queries.
    pub(crate) non_cyclic: HashSet<FileId>,
    /// Per-file stamps restored from a snapshot, for change detection.
    pub(crate) loaded_versions: HashMap<FileId, FileVersion>,
    /// False while restored stamps have not been checked against disk.
    pub(crate) loaded_verified: bool,
    pub(crate) graph_version: u64,
    stats: CacheStats,
    pub(crate) resolver_stats: ResolverStats,
}

impl GraphCache {
    pub fn new() -> Self {
        Self::with_resolution_capacity(DEFAULT_RESOLUTION_CACHE_CAPACITY)
    }

    pub fn with_resolution_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity >= 1");
        Self {
            existence: HashMap::new(),
            resolutions: LruCache::new(capacity),
            imports: HashMap::new(),
            patterns: HashMap::new(),
            sccs: Vec::new(),
            scc_index: HashMap::new(),
            scc_computed: false,
            non_cyclic: HashSet::new(),
            loaded_versions: HashMap::new(),
            loaded_verified: true,
            graph_version: 0,
            stats: CacheStats::default(),
            resolver_stats: ResolverStats::default(),
        }
    }

    /// Memoized "is this a regular file" check.
    pub fn file_exists(&mut self, id: &str) -> bool {
        self.stats.existence_checks += 1;
        if let Some(known) = self.existence.get(id) {
            return *known;
        }
        let exists = Path::new(id).is_file();
        self.existence.insert(id.to_string(), exists);
        exists
    }

    /// Look up a memoized resolution. The outer `Option` is the cache
    /// answer; the inner one is the resolution result (`None` = external
    /// or unresolvable).
    pub fn cached_resolution(&mut self, from: &str, specifier: &str) -> Option<Option<FileId>> {
        let key = (from.to_string(), specifier.to_string());
        match self.resolutions.get(&key) {
            Some(result) => {
                self.stats.resolution_hits += 1;
                Some(result.clone())
            }
            None => {
                self.stats.resolution_misses += 1;
                None
            }
        }
    }

    pub fn store_resolution(&mut self, from: FileId, specifier: String, result: Option<FileId>) {
        self.resolutions.put((from, specifier), result);
    }

    /// Cached import edges for a file, valid only when the stamp matches.
    pub fn cached_imports(&mut self, file: &str, current: FileVersion) -> Option<Vec<ImportEdge>> {
        if let Some((version, edges)) = self.imports.get(file)
            && *version == current
            && !current.is_missing()
        {
            self.stats.import_hits += 1;
            return Some(edges.clone());
        }
        self.stats.import_misses += 1;
        None
    }

    /// Stamp previously recorded for a file: this session's extraction,
    /// or the snapshot-restored stamp when the file has not been
    /// extracted yet. Either one counts as "previously cached" for
    /// structural-change detection.
    pub fn known_version(&self, file: &str) -> Option<FileVersion> {
        self.imports
            .get(file)
            .map(|(version, _)| *version)
            .or_else(|| self.loaded_versions.get(file).copied())
    }

    pub fn store_imports(&mut self, file: FileId, version: FileVersion, edges: Vec<ImportEdge>) {
        // A fresh extraction supersedes the restored stamp.
        self.loaded_versions.remove(&file);
        self.imports.insert(file, (version, edges));
    }

    /// Compile (or fetch) the globset for a pattern list.
    pub fn compiled_globs(&mut self, patterns: &[String]) -> Option<GlobSet> {
        if patterns.is_empty() {
            return None;
        }
        let key = patterns.join("\n");
        if let Some(cached) = self.patterns.get(&key) {
            return cached.clone();
        }
        let compiled = build_globset(patterns);
        self.patterns.insert(key, compiled.clone());
        compiled
    }

    /// The graph changed structurally: drop the SCC partition and every
    /// acyclic-file proof. Cheap global invalidation; targeted
    /// invalidation is an optimization this design does not require.
    pub fn bump_graph_version(&mut self) {
        self.graph_version += 1;
        self.sccs.clear();
        self.scc_index.clear();
        self.scc_computed = false;
        self.non_cyclic.clear();
    }

    /// Forget one file's cached state and invalidate the SCC partition.
    /// Watch-style callers use this when the filesystem reports a change.
    pub fn invalidate_file(&mut self, path: &Path) {
        let id = crate::paths::normalize_identity(path);
        self.imports.remove(&id);
        self.existence.remove(&id);
        self.loaded_versions.remove(&id);
        self.bump_graph_version();
    }

    /// Check every snapshot-restored stamp against disk, once per load.
    /// Any file changed since the snapshot drops the restored SCC state
    /// (including the acyclic-file proofs) so the next query recomputes.
    pub(crate) fn verify_loaded_state(&mut self) {
        if self.loaded_verified {
            return;
        }
        self.loaded_verified = true;
        let stale: Vec<FileId> = self
            .loaded_versions
            .iter()
            .filter(|(file, version)| FileVersion::stamp(Path::new(file.as_str())) != **version)
            .map(|(file, _)| file.clone())
            .collect();
        if stale.is_empty() {
            return;
        }
        tracing::debug!(stale = stale.len(), "snapshot is out of date on disk");
        for file in &stale {
            self.loaded_versions.remove(file);
            self.existence.remove(file);
        }
        self.bump_graph_version();
    }

    /// Full reset, for forced re-analysis and tests.
    pub fn clear(&mut self) {
        self.existence.clear();
        self.resolutions.clear();
        self.imports.clear();
        self.patterns.clear();
        self.loaded_versions.clear();
        self.loaded_verified = true;
        self.bump_graph_version();
        self.stats = CacheStats::default();
        self.resolver_stats = ResolverStats::default();
    }

    pub fn graph_version(&self) -> u64 {
        self.graph_version
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn resolver_stats(&self) -> ResolverStats {
        self.resolver_stats
    }

    /// Cached SCC partition, if computed for the current graph version.
    pub fn sccs(&self) -> Option<&[Scc]> {
        if self.scc_computed {
            Some(&self.sccs)
        } else {
            None
        }
    }

    /// SCC membership for a file, O(1) once the partition is computed.
    pub fn scc_of(&self, file: &str) -> Option<&Scc> {
        self.scc_index.get(file).map(|&idx| &self.sccs[idx])
    }

    /// Best-known stamp for every file: session extractions win over
    /// snapshot-restored stamps.
    pub(crate) fn effective_versions(&self) -> HashMap<FileId, FileVersion> {
        let mut versions = self.loaded_versions.clone();
        for (file, (version, _)) in &self.imports {
            versions.insert(file.clone(), *version);
        }
        versions
    }

    pub(crate) fn note_scc_computation(&mut self) {
        self.stats.scc_computations += 1;
    }
}

impl Default for GraphCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_cache_evicts_least_recently_used() {
        let mut cache = GraphCache::with_resolution_capacity(2);
        cache.store_resolution("a.ts".into(), "./x".into(), Some("/x.ts".into()));
        cache.store_resolution("a.ts".into(), "./y".into(), Some("/y.ts".into()));

        // Read refreshes recency, so "./x" survives the next insertion.
        assert!(cache.cached_resolution("a.ts", "./x").is_some());
        cache.store_resolution("a.ts".into(), "./z".into(), None);

        assert!(cache.cached_resolution("a.ts", "./x").is_some());
        assert!(cache.cached_resolution("a.ts", "./y").is_none());
        // Negative results are memoized too.
        assert_eq!(cache.cached_resolution("a.ts", "./z"), Some(None));
    }

    #[test]
    fn import_cache_requires_matching_version() {
        let mut cache = GraphCache::new();
        let v1 = FileVersion { mtime: 10, size: 100 };
        let v2 = FileVersion { mtime: 11, size: 100 };
        cache.store_imports("a.ts".into(), v1, Vec::new());

        assert!(cache.cached_imports("a.ts", v1).is_some());
        assert!(cache.cached_imports("a.ts", v2).is_none());
    }

    #[test]
    fn missing_version_is_never_a_hit() {
        let mut cache = GraphCache::new();
        cache.store_imports("gone.ts".into(), FileVersion::MISSING, Vec::new());
        assert!(cache.cached_imports("gone.ts", FileVersion::MISSING).is_none());
    }

    #[test]
    fn bump_graph_version_drops_scc_state() {
        let mut cache = GraphCache::new();
        cache.sccs.push(Scc {
            files: vec!["a.ts".into()],
            has_cycle: false,
        });
        cache.scc_index.insert("a.ts".into(), 0);
        cache.scc_computed = true;
        cache.non_cyclic.insert("a.ts".into());

        let before = cache.graph_version();
        cache.bump_graph_version();

        assert_eq!(cache.graph_version(), before + 1);
        assert!(cache.sccs().is_none());
        assert!(cache.scc_of("a.ts").is_none());
        assert!(cache.non_cyclic.is_empty());
    }

    #[test]
    fn file_version_stamp_tracks_edits() {
        let tmp = tempfile::tempdir().expect("tmp dir");
        let file = tmp.path().join("a.ts");
        std::fs::write(&file, "export {}").expect("write");

        let first = FileVersion::stamp(&file);
        assert!(!first.is_missing());

        std::fs::write(&file, "export {}; // more bytes").expect("rewrite");
        let second = FileVersion::stamp(&file);
        assert_ne!(first, second);

        assert!(FileVersion::stamp(&tmp.path().join("missing.ts")).is_missing());
    }

    #[test]
    fn pattern_cache_compiles_once() {
        let mut cache = GraphCache::new();
        let patterns = vec!["**/*.test.ts".to_string()];
        let first = cache.compiled_globs(&patterns).expect("compiled");
        assert!(first.is_match("src/a.test.ts"));
        // Second call is served from the cache.
        assert!(cache.compiled_globs(&patterns).is_some());
        assert!(cache.compiled_globs(&[]).is_none());
    }

    #[test]
    fn known_version_falls_back_to_restored_stamps() {
        let mut cache = GraphCache::new();
        let restored = FileVersion { mtime: 5, size: 50 };
        cache.loaded_versions.insert("a.ts".into(), restored);

        assert_eq!(cache.known_version("a.ts"), Some(restored));

        // A session extraction supersedes the restored stamp.
        let fresh = FileVersion { mtime: 9, size: 90 };
        cache.store_imports("a.ts".into(), fresh, Vec::new());
        assert_eq!(cache.known_version("a.ts"), Some(fresh));
        assert!(!cache.loaded_versions.contains_key("a.ts"));
    }

    #[test]
    fn clear_resets_everything() {
        let mut cache = GraphCache::new();
        cache.store_resolution("a.ts".into(), "./x".into(), None);
        cache.store_imports(
            "a.ts".into(),
            FileVersion { mtime: 1, size: 1 },
            Vec::new(),
        );
        cache.non_cyclic.insert("a.ts".into());
        cache.clear();

        assert!(cache.cached_resolution("a.ts", "./x").is_none());
        assert!(cache.known_version("a.ts").is_none());
        assert!(cache.non_cyclic.is_empty());
        assert_eq!(cache.stats().import_hits, 0);
    }
}
