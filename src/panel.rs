//! Per-panel display state: the `base`/`injected` entry partition, the
//! consumer sink, the visibility predicate and the dirs-first resort.
//!
//! A [`Panel`] is a cheap clone-of-`Arc`s handle; loader and coordinator
//! workers clone it into their threads and mutate [`PanelState`] under its
//! lock, each mutation guarded by a generation compare.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;

use crate::path_index::PathIndex;
use crate::{is_hidden_entry, is_protected_system_entry};

/// One displayed item, as handed to the consumer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PanelEntry {
    pub path: String,
    pub name: String,
    pub is_dir: bool,
    /// The ".." pseudo-entry; always visible regardless of filter.
    pub is_parent_nav: bool,
}

/// Whether an entry came from loading the folder itself or was injected to
/// satisfy a deep search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryOrigin {
    Base,
    Injected,
}

#[derive(Debug, Clone)]
pub(crate) struct DisplayedEntry {
    pub entry: PanelEntry,
    pub origin: EntryOrigin,
    pub visible: bool,
}

/// What the panel is currently showing. Deep search only runs for real
/// folders, never for ad-hoc pinned lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelSource {
    Empty,
    Folder(PathBuf),
    PinnedList,
}

#[derive(Debug)]
pub(crate) struct PanelState {
    pub source: PanelSource,
    pub entries: Vec<DisplayedEntry>,
}

impl PanelState {
    fn new() -> Self {
        PanelState {
            source: PanelSource::Empty,
            entries: Vec::new(),
        }
    }
}

/// Consumer interface: ordered batches plus a terminal settle signal. The
/// core never renders; the host reads the panel's visible set on settle.
pub trait DisplaySink: Send + Sync {
    fn apply_batch(&self, batch: &[PanelEntry]);
    fn settle(&self);
}

#[derive(Debug, Clone)]
pub struct PanelOptions {
    /// Entries delivered per batch; hosts rendering heavy thumbnails pass a
    /// smaller value.
    pub batch_size: usize,
    pub debounce: Duration,
    pub deep_result_limit: usize,
    pub show_hidden: bool,
}

impl Default for PanelOptions {
    fn default() -> Self {
        PanelOptions {
            batch_size: crate::DEFAULT_BATCH_SIZE,
            debounce: crate::DEFAULT_DEBOUNCE,
            deep_result_limit: crate::DEFAULT_DEEP_LIMIT,
            show_hidden: false,
        }
    }
}

#[derive(Clone)]
pub struct Panel {
    pub(crate) state: Arc<Mutex<PanelState>>,
    pub(crate) load_generation: Arc<AtomicU64>,
    pub(crate) search_generation: Arc<AtomicU64>,
    pub(crate) show_hidden: Arc<AtomicBool>,
    pub(crate) sink: Arc<dyn DisplaySink>,
    pub(crate) index: PathIndex,
    pub(crate) options: PanelOptions,
}

impl Panel {
    pub fn new(index: PathIndex, sink: Arc<dyn DisplaySink>, options: PanelOptions) -> Self {
        Panel {
            state: Arc::new(Mutex::new(PanelState::new())),
            load_generation: Arc::new(AtomicU64::new(0)),
            search_generation: Arc::new(AtomicU64::new(0)),
            show_hidden: Arc::new(AtomicBool::new(options.show_hidden)),
            sink,
            index,
            options,
        }
    }

    pub fn set_show_hidden(&self, show: bool) {
        self.show_hidden.store(show, AtomicOrdering::Release);
    }

    pub fn show_hidden(&self) -> bool {
        self.show_hidden.load(AtomicOrdering::Acquire)
    }

    pub fn source(&self) -> PanelSource {
        self.state.lock().source.clone()
    }

    /// Currently visible entries, in display order.
    pub fn visible_entries(&self) -> Vec<PanelEntry> {
        self.state
            .lock()
            .entries
            .iter()
            .filter(|d| d.visible)
            .map(|d| d.entry.clone())
            .collect()
    }

    /// All base entries (visible or filtered out), in display order.
    pub fn base_entries(&self) -> Vec<PanelEntry> {
        self.entries_with_origin(EntryOrigin::Base)
    }

    /// Entries injected by the current search generation.
    pub fn injected_entries(&self) -> Vec<PanelEntry> {
        self.entries_with_origin(EntryOrigin::Injected)
    }

    pub fn injected_count(&self) -> usize {
        self.state
            .lock()
            .entries
            .iter()
            .filter(|d| d.origin == EntryOrigin::Injected)
            .count()
    }

    fn entries_with_origin(&self, origin: EntryOrigin) -> Vec<PanelEntry> {
        self.state
            .lock()
            .entries
            .iter()
            .filter(|d| d.origin == origin)
            .map(|d| d.entry.clone())
            .collect()
    }

    pub(crate) fn current_load_generation(&self) -> u64 {
        self.load_generation.load(AtomicOrdering::Acquire)
    }

    pub(crate) fn current_search_generation(&self) -> u64 {
        self.search_generation.load(AtomicOrdering::Acquire)
    }
}

/// Visibility predicate applied to every entry that enters display state,
/// whether loaded or injected. Parent-nav bypasses it entirely.
pub(crate) fn passes_visibility(path: &Path, name: &str, show_hidden: bool) -> bool {
    if is_protected_system_entry(path) {
        return false;
    }
    if !show_hidden && is_hidden_entry(path, name) {
        return false;
    }
    true
}

/// Stable in-place resort of the displayed set: parent-nav first, then
/// directories, then files, each group case-insensitive by name.
pub(crate) fn resort(entries: &mut [DisplayedEntry]) {
    entries.sort_by_cached_key(|d| {
        (
            !d.entry.is_parent_nav,
            !d.entry.is_dir,
            d.entry.name.to_lowercase(),
        )
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn displayed(name: &str, is_dir: bool, is_parent_nav: bool) -> DisplayedEntry {
        DisplayedEntry {
            entry: PanelEntry {
                path: format!("/x/{name}"),
                name: name.to_string(),
                is_dir,
                is_parent_nav,
            },
            origin: EntryOrigin::Base,
            visible: true,
        }
    }

    #[test]
    fn resort_groups_dirs_before_files() {
        let mut entries = vec![
            displayed("zebra.txt", false, false),
            displayed("Alpha", true, false),
            displayed("beta.txt", false, false),
            displayed("..", true, true),
            displayed("gamma", true, false),
        ];
        resort(&mut entries);
        let names: Vec<&str> = entries.iter().map(|d| d.entry.name.as_str()).collect();
        assert_eq!(names, vec!["..", "Alpha", "gamma", "beta.txt", "zebra.txt"]);
    }

    #[test]
    fn resort_is_case_insensitive() {
        let mut entries = vec![
            displayed("banana", true, false),
            displayed("APPLE", true, false),
            displayed("cherry", true, false),
        ];
        resort(&mut entries);
        let names: Vec<&str> = entries.iter().map(|d| d.entry.name.as_str()).collect();
        assert_eq!(names, vec!["APPLE", "banana", "cherry"]);
    }

    #[test]
    fn protected_entries_never_pass_visibility() {
        assert!(!passes_visibility(
            Path::new("/vol/$Recycle.Bin"),
            "$Recycle.Bin",
            true
        ));
        assert!(passes_visibility(Path::new("/vol/docs"), "docs", false));
    }
}
