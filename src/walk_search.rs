//! Deep-search strategies. The coordinator picks one per search generation:
//! [`IndexedSearch`] when the whole-machine index has a snapshot, otherwise
//! [`WalkSearch`], a live bounded walk of the folder's subtree. Both answer
//! the same question — "paths under this root whose leaf name contains the
//! needle" — so either can satisfy the reconcile phase.

use std::path::Path;

use walkdir::WalkDir;

use crate::path_index::PathIndex;
use crate::{is_protected_system_entry, is_reparse_point, perf_log};

/// Entries walked between cancellation polls during a live walk.
const CANCEL_POLL_INTERVAL: usize = 512;

pub trait DeepSearch {
    /// Returns up to `limit` paths under `root` whose final component
    /// contains `needle` case-insensitively. `cancelled` is polled at
    /// suspension points; a cancelled search may return a partial result,
    /// which the superseded caller will discard anyway.
    fn search(
        &self,
        root: &Path,
        needle: &str,
        limit: usize,
        cancelled: &dyn Fn() -> bool,
    ) -> Vec<String>;
}

/// Snapshot-backed lookup. Results come back in whole-index order
/// (lexicographic by full path, case-insensitive).
pub struct IndexedSearch {
    index: PathIndex,
}

impl IndexedSearch {
    pub fn new(index: PathIndex) -> Self {
        IndexedSearch { index }
    }
}

impl DeepSearch for IndexedSearch {
    fn search(
        &self,
        root: &Path,
        needle: &str,
        limit: usize,
        cancelled: &dyn Fn() -> bool,
    ) -> Vec<String> {
        if cancelled() {
            return Vec::new();
        }
        self.index.search(root, needle, limit)
    }
}

/// Live fallback used while the index is still building (or failed to
/// build): walk the subtree directly, bounded by the same result limit.
/// Unreadable subdirectories are skipped, never fatal.
pub struct WalkSearch;

impl DeepSearch for WalkSearch {
    fn search(
        &self,
        root: &Path,
        needle: &str,
        limit: usize,
        cancelled: &dyn Fn() -> bool,
    ) -> Vec<String> {
        let needle = needle.trim().to_lowercase();
        if needle.is_empty() || limit == 0 {
            return Vec::new();
        }

        let mut hits = Vec::new();
        let mut walked = 0usize;

        let walker = WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| {
                !is_protected_system_entry(entry.path()) && !is_reparse_point(entry.path())
            });

        for result in walker {
            walked += 1;
            if walked % CANCEL_POLL_INTERVAL == 0 && cancelled() {
                perf_log(format!("walk_search cancelled after {walked} entries"));
                break;
            }

            let Ok(entry) = result else {
                continue;
            };
            if entry.depth() == 0 {
                continue;
            }

            let name = entry.file_name().to_string_lossy();
            if name.to_lowercase().contains(&needle) {
                hits.push(entry.path().to_string_lossy().to_string());
                if hits.len() >= limit {
                    break;
                }
            }
        }

        hits
    }
}
