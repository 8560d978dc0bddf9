//! Loading and search core for the pane file browser.
//!
//! Three pieces cooperate here:
//!
//! - [`PathIndex`] — a process-wide, background-built sorted list of every
//!   path under the machine's scan roots, answering prefix-scoped
//!   case-insensitive substring queries.
//! - The directory loader ([`Panel::load`]) — streams one folder's visible
//!   entries into panel display state in bounded batches, off the caller
//!   thread, cancellably.
//! - The search coordinator ([`Panel::begin_search`]) — debounces filter
//!   input, partitions already-loaded entries into visible/hidden, pulls deep
//!   matches from the index (or a live walk while the index is still
//!   building), and injects them into the display.
//!
//! Supersession is a per-concern monotonic generation counter on the panel:
//! starting a new load or search increments the counter, and every worker
//! re-checks its captured generation immediately before touching shared
//! display state. Cancellation is never an error.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

pub mod coordinator;
pub mod loader;
pub mod panel;
pub mod path_index;
pub mod walk_search;

pub use panel::{DisplaySink, EntryOrigin, Panel, PanelEntry, PanelOptions, PanelSource};
pub use path_index::PathIndex;
pub use walk_search::{DeepSearch, IndexedSearch, WalkSearch};

/// Entries appended to display state per batch during a folder load.
pub const DEFAULT_BATCH_SIZE: usize = 120;
/// Coalescing delay before a search generation starts doing work.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(150);
/// Cap on deep-search hits injected per search generation.
pub const DEFAULT_DEEP_LIMIT: usize = 100;
/// Minimum trimmed filter length before deep search kicks in.
pub const MIN_DEEP_FILTER_LEN: usize = 2;

/// Base entries re-flagged per lock acquisition during local filtering.
pub(crate) const FILTER_BATCH_SIZE: usize = 256;
/// Inter-batch yield so the consumer thread is never starved.
pub(crate) const BATCH_YIELD: Duration = Duration::from_millis(1);

/// Protected system folders excluded from the index build, folder listings
/// and the fallback walk. Matched against the final path component,
/// case-insensitively.
const PROTECTED_DIR_NAMES: &[&str] = &[
    "$recycle.bin",
    "system volume information",
    "$windows.~bt",
    "recovery",
    "found.000",
    ".trash",
    ".trashes",
];

pub type AppResult<T> = Result<T, String>;

static PERF_LOG_ENABLED: OnceLock<bool> = OnceLock::new();

fn env_truthy(key: &str) -> bool {
    std::env::var(key)
        .ok()
        .map(|value| {
            matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
        .unwrap_or(false)
}

fn perf_log_enabled() -> bool {
    *PERF_LOG_ENABLED.get_or_init(|| env_truthy("PANEFIND_PERF_LOG"))
}

pub(crate) fn perf_log(message: impl AsRef<str>) {
    if perf_log_enabled() {
        eprintln!("[perf] {}", message.as_ref());
    }
}

/// True for entries on the protected-system deny-list.
pub(crate) fn is_protected_system_entry(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let lower = name.to_lowercase();
    PROTECTED_DIR_NAMES.iter().any(|deny| *deny == lower)
}

/// Reparse points (junctions, symlinks) are skipped everywhere: they cannot
/// be enumerated reliably and would duplicate coverage of their targets.
#[cfg(windows)]
pub(crate) fn is_reparse_point(path: &Path) -> bool {
    use std::os::windows::fs::MetadataExt;
    const FILE_ATTRIBUTE_REPARSE_POINT: u32 = 0x400;
    std::fs::symlink_metadata(path)
        .map(|m| m.file_attributes() & FILE_ATTRIBUTE_REPARSE_POINT != 0)
        .unwrap_or(false)
}

#[cfg(not(windows))]
pub(crate) fn is_reparse_point(path: &Path) -> bool {
    std::fs::symlink_metadata(path)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false)
}

#[cfg(windows)]
pub(crate) fn is_hidden_entry(path: &Path, _name: &str) -> bool {
    use std::os::windows::fs::MetadataExt;
    const FILE_ATTRIBUTE_HIDDEN: u32 = 0x2;
    const FILE_ATTRIBUTE_SYSTEM: u32 = 0x4;
    std::fs::symlink_metadata(path)
        .map(|m| m.file_attributes() & (FILE_ATTRIBUTE_HIDDEN | FILE_ATTRIBUTE_SYSTEM) != 0)
        .unwrap_or(false)
}

#[cfg(not(windows))]
pub(crate) fn is_hidden_entry(_path: &Path, name: &str) -> bool {
    name.starts_with('.')
}

/// Drive roots the whole-machine index build walks. Network mounts are the
/// host's problem; only roots that currently resolve are returned.
#[cfg(windows)]
pub fn default_scan_roots() -> Vec<PathBuf> {
    let mut roots = Vec::new();
    for letter in 'A'..='Z' {
        let root = PathBuf::from(format!("{letter}:\\"));
        if root.exists() {
            roots.push(root);
        }
    }
    roots
}

#[cfg(not(windows))]
pub fn default_scan_roots() -> Vec<PathBuf> {
    vec![PathBuf::from("/")]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protected_entries_match_case_insensitively() {
        assert!(is_protected_system_entry(Path::new("/vol/$Recycle.Bin")));
        assert!(is_protected_system_entry(Path::new(
            "/mnt/d/System Volume Information"
        )));
        assert!(!is_protected_system_entry(Path::new("/home/user/recovery-notes")));
    }

    #[cfg(not(windows))]
    #[test]
    fn dot_prefixed_names_are_hidden() {
        assert!(is_hidden_entry(Path::new("/tmp/.cache"), ".cache"));
        assert!(!is_hidden_entry(Path::new("/tmp/cache"), "cache"));
    }
}
