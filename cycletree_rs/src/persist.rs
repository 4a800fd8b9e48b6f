//! Snapshot persistence: serialize cache and SCC state at session end,
//! restore and validate it at the next session start.
//!
//! Loading fails closed. An absent, unreadable, version-mismatched, or
//! expired snapshot leaves the cache untouched and reports "no cache
//! available"; the caller recomputes from scratch.

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::cache::{FileVersion, GraphCache};
use crate::extract::imports_of;
use crate::resolver::Resolver;
use crate::types::{FileId, Scc};

/// Bump when the snapshot layout changes incompatibly.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Snapshots older than this are discarded by default.
pub const DEFAULT_SNAPSHOT_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// On-disk snapshot document. Import edges are deliberately absent: they
/// are derived state, recomputed from file content on demand.
#[derive(Debug, Serialize, Deserialize)]
pub struct Snapshot {
    pub format_version: u32,
    pub created_at: String,
    #[serde(default)]
    pub file_versions: HashMap<FileId, FileVersion>,
    #[serde(default)]
    pub sccs: Vec<Scc>,
    #[serde(default)]
    pub scc_index: HashMap<FileId, usize>,
    #[serde(default)]
    pub non_cyclic: Vec<FileId>,
    #[serde(default)]
    pub graph_version: u64,
}

/// Serialize the session's cache state to `dest`, creating parent
/// directories as needed.
pub fn save(cache: &GraphCache, dest: &Path) -> io::Result<()> {
    let created_at = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(io::Error::other)?;
    let snapshot = Snapshot {
        format_version: SNAPSHOT_FORMAT_VERSION,
        created_at,
        file_versions: cache.effective_versions(),
        sccs: cache.sccs.clone(),
        scc_index: cache.scc_index.clone(),
        non_cyclic: cache.non_cyclic.iter().cloned().collect(),
        graph_version: cache.graph_version,
    };

    if let Some(parent) = dest.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(&snapshot).map_err(io::Error::other)?;
    std::fs::write(dest, json)?;
    tracing::debug!(dest = %dest.display(), files = snapshot.file_versions.len(), "snapshot saved");
    Ok(())
}

/// Restore a snapshot into `cache`. Returns true on success; any reject
/// reason (absent, unparseable, wrong format version, older than
/// `max_age`) returns false and leaves the cache untouched. `None`
/// disables the age check.
pub fn load(cache: &mut GraphCache, source: &Path, max_age: Option<Duration>) -> bool {
    let Ok(content) = std::fs::read_to_string(source) else {
        return false;
    };
    let Ok(snapshot) = serde_json::from_str::<Snapshot>(&content) else {
        tracing::warn!(source = %source.display(), "unparseable snapshot, recomputing");
        return false;
    };
    if snapshot.format_version != SNAPSHOT_FORMAT_VERSION {
        tracing::debug!(
            found = snapshot.format_version,
            expected = SNAPSHOT_FORMAT_VERSION,
            "snapshot format version mismatch"
        );
        return false;
    }
    if let Some(max_age) = max_age {
        let Ok(created) = OffsetDateTime::parse(&snapshot.created_at, &Rfc3339) else {
            return false;
        };
        let age = OffsetDateTime::now_utc() - created;
        if age > max_age {
            tracing::debug!(source = %source.display(), "snapshot expired, recomputing");
            return false;
        }
    }

    cache.loaded_versions = snapshot.file_versions;
    cache.loaded_verified = false;
    cache.sccs = snapshot.sccs;
    cache.scc_index = snapshot.scc_index;
    cache.non_cyclic = snapshot.non_cyclic.into_iter().collect();
    cache.graph_version = snapshot.graph_version;
    // Membership answers are served from the restored partition directly.
    cache.scc_computed = true;
    true
}

/// Given the candidate file set, compute what actually needs re-analysis
/// after a snapshot load: files whose stamp changed, every member of a
/// changed file's SCC, and every candidate that imports a changed file.
pub fn files_needing_reanalysis(
    files: &[FileId],
    resolver: &Resolver,
    cache: &mut GraphCache,
) -> HashSet<FileId> {
    let known = cache.effective_versions();
    let changed: HashSet<FileId> = files
        .iter()
        .filter(|f| known.get(*f) != Some(&FileVersion::stamp(Path::new(f.as_str()))))
        .cloned()
        .collect();
    if changed.is_empty() {
        return changed;
    }

    let mut expanded = changed.clone();
    for file in &changed {
        if let Some(scc) = cache.scc_of(file) {
            expanded.extend(scc.files.iter().cloned());
        }
    }
    // Importers of a changed file may have gained or lost cycle
    // membership. Changed candidates are already in the set.
    for file in files {
        if changed.contains(file) {
            continue;
        }
        if imports_of(file, resolver, cache)
            .iter()
            .any(|edge| changed.contains(&edge.to))
        {
            expanded.insert(file.clone());
        }
    }

    tracing::debug!(
        changed = changed.len(),
        expanded = expanded.len(),
        "change set expanded for re-analysis"
    );
    expanded
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    use crate::engine::find_cycles;
    use crate::paths::normalize_identity;
    use crate::types::AnalyzeOptions;

    fn write(dir: &TempDir, rel: &str, content: &str) -> String {
        let path = dir.path().join(rel);
        fs::write(&path, content).unwrap();
        normalize_identity(&path)
    }

    fn two_cycle(dir: &TempDir) -> (String, String) {
        let a = write(dir, "a.ts", "import {} from './b';\n");
        let b = write(dir, "b.ts", "import {} from './a';\n");
        (a, b)
    }

    #[test]
    fn round_trip_reproduces_membership_answers() {
        let dir = TempDir::new().unwrap();
        let (a, b) = two_cycle(&dir);
        write(&dir, "c.ts", "export {}");

        let resolver = Resolver::new(dir.path());
        let mut cache = GraphCache::new();
        let cycles = find_cycles(
            Path::new(&a),
            &AnalyzeOptions::default(),
            &resolver,
            &mut cache,
        );
        assert_eq!(cycles.len(), 1);

        let snapshot_path = dir.path().join("cache/snapshot.json");
        save(&cache, &snapshot_path).unwrap();

        let mut restored = GraphCache::new();
        assert!(load(&mut restored, &snapshot_path, Some(DEFAULT_SNAPSHOT_MAX_AGE)));

        assert!(restored.sccs().is_some());
        assert_eq!(
            restored.scc_of(&a).map(|s| s.has_cycle),
            cache.scc_of(&a).map(|s| s.has_cycle)
        );
        assert_eq!(restored.scc_of(&a), restored.scc_of(&b));
        assert_eq!(restored.graph_version(), cache.graph_version());
    }

    #[test]
    fn edit_between_save_and_load_is_detected() {
        let dir = TempDir::new().unwrap();
        let a = write(&dir, "a.ts", "import {} from './b';\n");
        write(&dir, "b.ts", "export const b = 1;\n");

        let resolver = Resolver::new(dir.path());
        let mut cache = GraphCache::new();
        let options = AnalyzeOptions::default();

        // Acyclic at save time; a is recorded as proven acyclic.
        assert!(find_cycles(Path::new(&a), &options, &resolver, &mut cache).is_empty());
        let snapshot_path = dir.path().join("snapshot.json");
        save(&cache, &snapshot_path).unwrap();

        // The cycle appears after the snapshot was taken.
        fs::write(dir.path().join("b.ts"), "import {} from './a';\n").unwrap();

        let mut restored = GraphCache::new();
        assert!(load(&mut restored, &snapshot_path, None));
        let cycles = find_cycles(Path::new(&a), &options, &resolver, &mut restored);
        assert_eq!(cycles.len(), 1, "restored stamps must be rechecked against disk");
        assert_eq!(cycles[0].len(), 2);
    }

    #[test]
    fn unchanged_snapshot_still_short_circuits_after_verification() {
        let dir = TempDir::new().unwrap();
        let a = write(&dir, "a.ts", "import {} from './b';\n");
        write(&dir, "b.ts", "export const b = 1;\n");

        let resolver = Resolver::new(dir.path());
        let mut cache = GraphCache::new();
        let options = AnalyzeOptions::default();
        assert!(find_cycles(Path::new(&a), &options, &resolver, &mut cache).is_empty());

        let snapshot_path = dir.path().join("snapshot.json");
        save(&cache, &snapshot_path).unwrap();

        let mut restored = GraphCache::new();
        assert!(load(&mut restored, &snapshot_path, None));
        assert!(find_cycles(Path::new(&a), &options, &resolver, &mut restored).is_empty());
        // Nothing changed, so membership came from the snapshot without
        // re-extracting any file.
        assert_eq!(restored.stats().import_misses, 0);
        assert_eq!(restored.stats().scc_computations, 0);
    }

    #[test]
    fn absent_snapshot_loads_nothing() {
        let dir = TempDir::new().unwrap();
        let mut cache = GraphCache::new();
        assert!(!load(&mut cache, &dir.path().join("missing.json"), None));
        assert!(cache.sccs().is_none());
    }

    #[test]
    fn corrupt_snapshot_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("snapshot.json");
        fs::write(&path, "{not valid json").unwrap();

        let mut cache = GraphCache::new();
        assert!(!load(&mut cache, &path, None));
        assert!(cache.sccs().is_none());
    }

    #[test]
    fn format_version_mismatch_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("snapshot.json");
        fs::write(
            &path,
            r#"{"format_version": 99, "created_at": "2026-01-01T00:00:00Z"}"#,
        )
        .unwrap();

        let mut cache = GraphCache::new();
        assert!(!load(&mut cache, &path, None));
    }

    #[test]
    fn expired_snapshot_is_rejected_unless_age_check_disabled() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("snapshot.json");
        fs::write(
            &path,
            r#"{"format_version": 1, "created_at": "2020-01-01T00:00:00Z"}"#,
        )
        .unwrap();

        let mut cache = GraphCache::new();
        assert!(!load(&mut cache, &path, Some(DEFAULT_SNAPSHOT_MAX_AGE)));
        assert!(load(&mut cache, &path, None));
    }

    #[test]
    fn change_set_expands_to_scc_and_importers() {
        let dir = TempDir::new().unwrap();
        let (a, b) = two_cycle(&dir);
        let c = write(&dir, "c.ts", "import {} from './b';\n");
        let d = write(&dir, "d.ts", "export {}");

        let resolver = Resolver::new(dir.path());
        let mut cache = GraphCache::new();
        for start in [&a, &c, &d] {
            find_cycles(
                Path::new(start),
                &AnalyzeOptions::default(),
                &resolver,
                &mut cache,
            );
        }
        let snapshot_path = dir.path().join("snapshot.json");
        save(&cache, &snapshot_path).unwrap();

        let mut restored = GraphCache::new();
        assert!(load(&mut restored, &snapshot_path, None));

        // Nothing changed: nothing to redo.
        let files = vec![a.clone(), b.clone(), c.clone(), d.clone()];
        assert!(files_needing_reanalysis(&files, &resolver, &mut restored).is_empty());

        // Touch b: its SCC partner a and its importer c join the set; the
        // unrelated d stays out.
        fs::write(
            dir.path().join("b.ts"),
            "import {} from './a';\n// touched\n",
        )
        .unwrap();
        let needs = files_needing_reanalysis(&files, &resolver, &mut restored);
        assert!(needs.contains(&b));
        assert!(needs.contains(&a), "SCC partner of a changed file");
        assert!(needs.contains(&c), "importer of a changed file");
        assert!(!needs.contains(&d));
    }
}
