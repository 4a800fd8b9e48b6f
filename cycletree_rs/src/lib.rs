//! Circular import detection for JS/TS-style module graphs.
//!
//! The crate is the computational core of a circular-dependency lint
//! rule: it resolves import specifiers to file identities, extracts
//! import edges by scanning file text, partitions the reachable graph
//! into strongly connected components, and materializes human-usable
//! cycle paths. All state lives in an explicitly owned [`GraphCache`];
//! nothing is global, so independent sessions never interfere.
//!
//! Module map:
//! - `paths` - file identity normalization and glob compilation
//! - `resolver` - layered specifier resolution (hooks, aliases, stylesheets, general)
//! - `extract` - regex-based import scanning with stamp-gated caching
//! - `cache` - session-scoped lookup tables and invalidation
//! - `engine` - worklist discovery plus iterative Tarjan SCC and path extraction
//! - `persist` - versioned snapshot save/load and change-set expansion
//!
//! ```no_run
//! use std::path::Path;
//! use cycletree::{find_cycles, AnalyzeOptions, GraphCache, Resolver};
//!
//! let resolver = Resolver::new(Path::new("/project"));
//! let mut cache = GraphCache::new();
//! let cycles = find_cycles(
//!     Path::new("/project/src/a.ts"),
//!     &AnalyzeOptions::default(),
//!     &resolver,
//!     &mut cache,
//! );
//! for cycle in cycles {
//!     println!("{}", cycle.files.join(" -> "));
//! }
//! ```

pub mod cache;
pub mod engine;
pub mod extract;
pub mod paths;
pub mod persist;
pub mod resolver;
pub mod types;

pub use cache::{CacheStats, FileVersion, GraphCache, ResolverStats};
pub use engine::find_cycles;
pub use extract::imports_of;
pub use persist::{
    DEFAULT_SNAPSHOT_MAX_AGE, SNAPSHOT_FORMAT_VERSION, Snapshot, files_needing_reanalysis, load,
    save,
};
pub use resolver::{Resolver, ResolverHook, ResolverOptions};
pub use types::{AliasConfig, AnalyzeOptions, Cycle, FileId, ImportEdge, Scc};
