//! Process-wide path index: one sorted snapshot of every path under the scan
//! roots, built once in the background, read concurrently by every panel's
//! deep search.
//!
//! The snapshot is an `Arc<Vec<String>>` that is swapped, never mutated: the
//! lock around it only protects the reference read/write, so readers scan a
//! cloned `Arc` with no lock held. Callers that find the index not ready are
//! expected to fall back to a live walk ([`crate::WalkSearch`]); the index
//! never triggers a walk itself.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::{is_protected_system_entry, is_reparse_point, perf_log, AppResult};

const JWALK_THREADS: usize = 8;
/// Entries walked between shutdown polls during a build.
const SHUTDOWN_POLL_INTERVAL: usize = 4_096;

#[derive(Clone)]
pub struct PathIndex {
    snapshot: Arc<Mutex<Arc<Vec<String>>>>,
    ready: Arc<AtomicBool>,
    building: Arc<AtomicBool>,
    launched: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
}

impl Default for PathIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl PathIndex {
    pub fn new() -> Self {
        PathIndex {
            snapshot: Arc::new(Mutex::new(Arc::new(Vec::new()))),
            ready: Arc::new(AtomicBool::new(false)),
            building: Arc::new(AtomicBool::new(false)),
            launched: Arc::new(AtomicBool::new(false)),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(AtomicOrdering::Acquire)
    }

    pub fn is_building(&self) -> bool {
        self.building.load(AtomicOrdering::Acquire)
    }

    /// Number of indexed paths in the current snapshot.
    pub fn len(&self) -> usize {
        self.snapshot.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Launches the one-time background build if it has never been attempted.
    /// Idempotent and non-blocking. The launch flag is never reset: a failed
    /// build leaves the index permanently empty and non-ready, and the
    /// whole-machine walk is never relaunched; deep search keeps using the
    /// live-walk fallback for the rest of the process.
    pub fn ensure_started(&self) {
        if self
            .launched
            .compare_exchange(
                false,
                true,
                AtomicOrdering::AcqRel,
                AtomicOrdering::Acquire,
            )
            .is_err()
        {
            return;
        }
        self.building.store(true, AtomicOrdering::Release);

        let index = self.clone();
        std::thread::spawn(move || {
            let roots = crate::default_scan_roots();
            match index.rebuild_from_roots(&roots) {
                Ok(count) => perf_log(format!("path_index build done entries={count}")),
                Err(e) => perf_log(format!("path_index build failed: {e}")),
            }
            index.building.store(false, AtomicOrdering::Release);
        });
    }

    /// Requests a hard cancel of any in-flight build (process shutdown).
    /// The aborted build leaves the index non-ready.
    pub fn shutdown(&self) {
        self.shutdown.store(true, AtomicOrdering::Release);
    }

    /// Walks `roots`, collects every directory and file path, sorts the whole
    /// collection once, and swaps it in as the new snapshot. Per-directory
    /// enumeration failures skip that subtree and never abort the build.
    ///
    /// `ensure_started` runs this on its worker thread; tests call it directly
    /// over a temp tree.
    pub fn rebuild_from_roots(&self, roots: &[PathBuf]) -> AppResult<usize> {
        let started = Instant::now();
        let mut paths: Vec<String> = Vec::with_capacity(1_000_000);
        let mut walked_any = false;

        for root in roots {
            // Paths in the snapshot are canonical so the prefix search key
            // computed from a canonicalized query root lines up.
            let Ok(root) = std::fs::canonicalize(root) else {
                continue;
            };
            walked_any = true;

            let walker = jwalk::WalkDir::new(&root)
                .follow_links(false)
                .skip_hidden(false)
                .parallelism(jwalk::Parallelism::RayonNewPool(JWALK_THREADS))
                .process_read_dir(move |_depth, path, _state, children| {
                    children.retain(|entry_result| {
                        entry_result
                            .as_ref()
                            .map(|entry| {
                                let full_path = path.join(&entry.file_name);
                                !is_protected_system_entry(&full_path)
                                    && !is_reparse_point(&full_path)
                            })
                            .unwrap_or(false)
                    });
                });

            for result in walker {
                if paths.len() % SHUTDOWN_POLL_INTERVAL == 0
                    && self.shutdown.load(AtomicOrdering::Acquire)
                {
                    perf_log("path_index build aborted by shutdown");
                    return Err("build cancelled".to_string());
                }

                let Ok(entry) = result else {
                    // Permission denied or transient I/O: skip, keep walking.
                    continue;
                };
                if entry.depth == 0 {
                    continue;
                }
                paths.push(entry.path().to_string_lossy().to_string());
            }
        }

        if !walked_any {
            return Err("no accessible scan roots".to_string());
        }

        // One sort at the end amortizes far better than keeping the list
        // ordered during the walk.
        paths.sort_by_cached_key(|p| p.to_lowercase());
        let count = paths.len();

        *self.snapshot.lock() = Arc::new(paths);
        self.ready.store(true, AtomicOrdering::Release);

        perf_log(format!(
            "path_index sorted {} entries in {}ms",
            count,
            started.elapsed().as_millis()
        ));
        Ok(count)
    }

    /// Returns up to `limit` indexed paths strictly under `root` whose final
    /// component contains `needle` case-insensitively, in snapshot
    /// (lexicographic, case-insensitive) order.
    ///
    /// Precondition violations — unresolvable root, empty trimmed needle,
    /// zero limit — return empty rather than erroring.
    pub fn search(&self, root: &Path, needle: &str, limit: usize) -> Vec<String> {
        let needle = needle.trim();
        if needle.is_empty() || limit == 0 {
            return Vec::new();
        }
        let Ok(root) = std::fs::canonicalize(root) else {
            return Vec::new();
        };

        let mut prefix = root.to_string_lossy().to_string();
        if !prefix.ends_with(std::path::MAIN_SEPARATOR) {
            prefix.push(std::path::MAIN_SEPARATOR);
        }

        let snapshot = self.snapshot.lock().clone();
        let t0 = Instant::now();
        let (hits, scanned) =
            search_in_snapshot(&snapshot, &prefix, &needle.to_lowercase(), limit);
        perf_log(format!(
            "path_index search needle={needle:?} scanned={scanned} hits={} in {}us",
            hits.len(),
            t0.elapsed().as_micros()
        ));
        hits
    }
}

/// Core scan over a sorted snapshot. The snapshot is ordered by lowercased
/// full path, so every descendant of `prefix` sits in one contiguous block:
/// lower-bound binary search finds the block start, and the forward scan stops
/// at the first element that no longer carries the prefix.
///
/// Returns the hits plus the number of elements visited by the linear scan.
pub(crate) fn search_in_snapshot(
    snapshot: &[String],
    prefix: &str,
    needle_lower: &str,
    limit: usize,
) -> (Vec<String>, usize) {
    let prefix_lower = prefix.to_lowercase();
    let lo = snapshot.partition_point(|p| p.to_lowercase().as_str() < prefix_lower.as_str());

    let mut hits = Vec::new();
    let mut scanned = 0usize;

    for path in &snapshot[lo..] {
        scanned += 1;
        let path_lower = path.to_lowercase();
        if !path_lower.starts_with(&prefix_lower) {
            break;
        }
        let leaf = path_lower
            .rsplit(std::path::MAIN_SEPARATOR)
            .next()
            .unwrap_or(path_lower.as_str());
        if leaf.contains(needle_lower) {
            hits.push(path.clone());
            if hits.len() >= limit {
                break;
            }
        }
    }

    (hits, scanned)
}
