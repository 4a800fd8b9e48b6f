//! Circular import detection using Tarjan's SCC algorithm.
//!
//! Two phases: membership (discover the reachable subgraph, partition it
//! into strongly connected components, cache the partition) and path
//! extraction (depth-first re-traversal that materializes human-usable
//! loops, only when the start file sits in a cyclic component). Both
//! phases drive explicit stacks rather than recursion so deep graphs
//! cannot overflow the call stack.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::cache::GraphCache;
use crate::extract::imports_of;
use crate::paths::normalize_identity;
use crate::resolver::Resolver;
use crate::types::{AnalyzeOptions, Cycle, FileId, Scc};

/// Find import cycles reachable from `start`.
///
/// Membership answers come from the cached SCC partition when it is
/// current; files proven acyclic short-circuit without any traversal.
pub fn find_cycles(
    start: &Path,
    options: &AnalyzeOptions,
    resolver: &Resolver,
    cache: &mut GraphCache,
) -> Vec<Cycle> {
    let start_id = normalize_identity(start);
    // Snapshot-restored membership is only trusted once the restored
    // stamps have been checked against disk.
    cache.verify_loaded_state();

    loop {
        if cache.non_cyclic.contains(&start_id) {
            return Vec::new();
        }

        ensure_membership(&start_id, resolver, cache);

        let in_cycle = cache
            .scc_of(&start_id)
            .is_some_and(|scc| scc.has_cycle);
        if !in_cycle {
            cache.non_cyclic.insert(start_id.clone());
            return Vec::new();
        }

        let version = cache.graph_version();
        let cycles = extract_cycles(&start_id, options, resolver, cache);
        if cache.graph_version() == version {
            return cycles;
        }
        // Extraction observed a file change and dropped the partition;
        // the traversal it fed is unreliable, so run the analysis again
        // against the fresh stamps.
        tracing::debug!(start = %start_id, "graph changed during extraction, restarting");
    }
}

/// Make sure the cached SCC partition covers `start`.
///
/// When the partition is current but `start` was never discovered, the
/// newly found components are appended; components touching already
/// indexed files are identical to the cached ones on an unchanged graph
/// and are skipped.
fn ensure_membership(start: &FileId, resolver: &Resolver, cache: &mut GraphCache) {
    if cache.sccs().is_some() && cache.scc_of(start).is_some() {
        return;
    }

    let (nodes, adjacency) = discover(start, resolver, cache);
    let fresh = compute_sccs(&nodes, &adjacency);
    cache.note_scc_computation();
    tracing::debug!(
        start,
        nodes = nodes.len(),
        components = fresh.len(),
        "computed SCC partition"
    );

    // Discovery itself can invalidate the partition when a file changed
    // on disk, so re-check rather than trusting the earlier state.
    if cache.sccs().is_none() {
        cache.sccs = fresh;
        cache.scc_index.clear();
        for (ordinal, scc) in cache.sccs.iter().enumerate() {
            for file in &scc.files {
                cache.scc_index.insert(file.clone(), ordinal);
            }
        }
        cache.scc_computed = true;
        return;
    }

    for scc in fresh {
        if scc
            .files
            .iter()
            .any(|f| cache.scc_index.contains_key(f))
        {
            continue;
        }
        let ordinal = cache.sccs.len();
        for file in &scc.files {
            cache.scc_index.insert(file.clone(), ordinal);
        }
        cache.sccs.push(scc);
    }
}

/// Worklist discovery of every file reachable from `start` through
/// non-dynamic edges. Returns the node set in discovery order plus the
/// adjacency restricted to it.
fn discover(
    start: &FileId,
    resolver: &Resolver,
    cache: &mut GraphCache,
) -> (Vec<FileId>, HashMap<FileId, Vec<FileId>>) {
    let mut nodes = vec![start.clone()];
    let mut seen: HashSet<FileId> = HashSet::from([start.clone()]);
    let mut adjacency: HashMap<FileId, Vec<FileId>> = HashMap::new();
    let mut worklist = vec![start.clone()];

    while let Some(file) = worklist.pop() {
        let mut targets = Vec::new();
        for edge in imports_of(&file, resolver, cache) {
            if edge.dynamic {
                continue;
            }
            if seen.insert(edge.to.clone()) {
                nodes.push(edge.to.clone());
                worklist.push(edge.to.clone());
            }
            targets.push(edge.to);
        }
        adjacency.insert(file, targets);
    }

    (nodes, adjacency)
}

struct TarjanFrame {
    node: usize,
    edge_idx: usize,
}

/// Iterative Tarjan over the discovered subgraph. One pass, O(nodes +
/// edges); an explicit frame stack stands in for recursion.
fn compute_sccs(nodes: &[FileId], adjacency: &HashMap<FileId, Vec<FileId>>) -> Vec<Scc> {
    let ids: HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, f)| (f.as_str(), i))
        .collect();
    let adj: Vec<Vec<usize>> = nodes
        .iter()
        .map(|file| {
            adjacency
                .get(file)
                .map(|targets| {
                    targets
                        .iter()
                        .filter_map(|t| ids.get(t.as_str()).copied())
                        .collect()
                })
                .unwrap_or_default()
        })
        .collect();

    let n = nodes.len();
    let mut index: Vec<Option<usize>> = vec![None; n];
    let mut lowlink: Vec<usize> = vec![0; n];
    let mut on_stack: Vec<bool> = vec![false; n];
    let mut stack: Vec<usize> = Vec::new();
    let mut next_index = 0usize;
    let mut sccs: Vec<Scc> = Vec::new();

    for root in 0..n {
        if index[root].is_some() {
            continue;
        }
        let mut frames = vec![TarjanFrame {
            node: root,
            edge_idx: 0,
        }];
        while let Some(frame) = frames.last_mut() {
            let v = frame.node;
            if frame.edge_idx == 0 {
                index[v] = Some(next_index);
                lowlink[v] = next_index;
                next_index += 1;
                stack.push(v);
                on_stack[v] = true;
            }

            if let Some(&w) = adj[v].get(frame.edge_idx) {
                frame.edge_idx += 1;
                if index[w].is_none() {
                    frames.push(TarjanFrame {
                        node: w,
                        edge_idx: 0,
                    });
                } else if on_stack[w] {
                    lowlink[v] = lowlink[v].min(index[w].unwrap_or(0));
                }
                continue;
            }

            // All successors handled; emit if v roots a component.
            if Some(lowlink[v]) == index[v] {
                let mut files = Vec::new();
                while let Some(w) = stack.pop() {
                    on_stack[w] = false;
                    files.push(nodes[w].clone());
                    if w == v {
                        break;
                    }
                }
                files.sort();
                let has_cycle = files.len() > 1 || adj[v].contains(&v);
                sccs.push(Scc { files, has_cycle });
            }

            frames.pop();
            if let Some(parent) = frames.last() {
                let p = parent.node;
                lowlink[p] = lowlink[p].min(lowlink[v]);
            }
        }
    }

    sccs
}

/// Phase B: materialize the loops. Depth-first traversal with an explicit
/// path stack, restricted to the start file's own component, bounded by
/// `max_depth`; cycles are sliced minimal at the first repeated file and
/// deduplicated by canonical rotation.
fn extract_cycles(
    start: &FileId,
    options: &AnalyzeOptions,
    resolver: &Resolver,
    cache: &mut GraphCache,
) -> Vec<Cycle> {
    let Some(&ordinal) = cache.scc_index.get(start) else {
        return Vec::new();
    };
    let max_depth = options.max_depth.max(1);

    struct Frame {
        node: FileId,
        targets: Vec<FileId>,
        next: usize,
    }

    let component_targets = |node: &FileId, cache: &mut GraphCache| -> Vec<FileId> {
        imports_of(node, resolver, cache)
            .into_iter()
            .filter(|e| !e.dynamic)
            .map(|e| e.to)
            .filter(|to| cache.scc_index.get(to) == Some(&ordinal))
            .collect()
    };

    let mut cycles: Vec<Cycle> = Vec::new();
    let mut seen: HashSet<Vec<FileId>> = HashSet::new();
    let mut path: Vec<FileId> = vec![start.clone()];
    let mut on_path: HashMap<FileId, usize> = HashMap::from([(start.clone(), 0)]);
    let mut frames = vec![Frame {
        node: start.clone(),
        targets: component_targets(start, cache),
        next: 0,
    }];

    while let Some(frame) = frames.last_mut() {
        if frame.next < frame.targets.len() {
            let next = frame.targets[frame.next].clone();
            frame.next += 1;

            if let Some(&pos) = on_path.get(&next) {
                // First repeated file: slice the minimal loop.
                let cycle = Cycle::canonical(&path[pos..]);
                if seen.insert(cycle.files.clone()) {
                    cycles.push(cycle);
                    if !options.report_all {
                        return cycles;
                    }
                }
            } else if path.len() <= max_depth {
                on_path.insert(next.clone(), path.len());
                path.push(next.clone());
                let targets = component_targets(&next, cache);
                frames.push(Frame {
                    node: next,
                    targets,
                    next: 0,
                });
            }
            continue;
        }

        if let Some(done) = frames.pop() {
            on_path.remove(&done.node);
            path.pop();
        }
    }

    if cycles.is_empty() {
        tracing::debug!(start, max_depth, "cyclic component, no loop within depth bound");
    }
    cycles
}
