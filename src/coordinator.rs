//! Search coordinator: owns the search pipeline for one panel.
//!
//! Each `begin_search` bumps the panel's search generation and runs
//! debounce → local filter → deep search → reconcile on a worker thread.
//! A newer keystroke invalidates the generation; the worker notices at the
//! next check (every phase boundary and every batch) and terminates without
//! side effects. The superseding generation performs the resort and settle
//! the superseded one never got to, so the view is never left half-sorted.

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::Ordering as AtomicOrdering;

use crate::panel::{passes_visibility, resort, DisplayedEntry, EntryOrigin, Panel, PanelEntry, PanelSource};
use crate::walk_search::{DeepSearch, IndexedSearch, WalkSearch};
use crate::{perf_log, BATCH_YIELD, FILTER_BATCH_SIZE, MIN_DEEP_FILTER_LEN};

impl Panel {
    /// Starts a new search generation for `filter_text`, superseding any
    /// in-flight one. Empty filter restores the full base listing.
    pub fn begin_search(&self, filter_text: &str) {
        let my_gen = self.search_generation.fetch_add(1, AtomicOrdering::AcqRel) + 1;
        let panel = self.clone();
        let filter = filter_text.to_string();
        std::thread::spawn(move || {
            run_search_job(&panel, my_gen, &filter);
        });
    }

    /// Clears the filter: all base entries visible, all injected removed.
    pub fn clear_search(&self) {
        self.begin_search("");
    }
}

fn superseded(panel: &Panel, my_gen: u64) -> bool {
    panel.current_search_generation() != my_gen
}

fn run_search_job(panel: &Panel, my_gen: u64, filter_text: &str) {
    // Debounce: coalesce rapid keystrokes. Superseded here means terminate
    // with no side effects at all.
    std::thread::sleep(panel.options.debounce);
    if superseded(panel, my_gen) {
        return;
    }

    let needle = filter_text.trim().to_lowercase();

    // Injected entries belong to the previous generation; their prefix block
    // may have changed, so they are dropped before anything else.
    {
        let mut state = panel.state.lock();
        if superseded(panel, my_gen) {
            return;
        }
        state.entries.retain(|d| d.origin == EntryOrigin::Base);
    }

    if !local_filter(panel, my_gen, &needle) {
        return;
    }

    {
        let mut state = panel.state.lock();
        if superseded(panel, my_gen) {
            return;
        }
        resort(&mut state.entries);
    }

    deep_search_and_reconcile(panel, my_gen, &needle);

    if superseded(panel, my_gen) {
        return;
    }
    panel.sink.settle();
}

/// Partitions base entries into visible/hidden by case-insensitive substring
/// match, in batches so the display lock is never held long. Parent-nav stays
/// visible regardless of filter. Returns false if superseded mid-way.
fn local_filter(panel: &Panel, my_gen: u64, needle: &str) -> bool {
    let mut next = 0usize;
    loop {
        {
            let mut state = panel.state.lock();
            if superseded(panel, my_gen) {
                return false;
            }
            let len = state.entries.len();
            if next >= len {
                return true;
            }
            let end = (next + FILTER_BATCH_SIZE).min(len);
            for displayed in &mut state.entries[next..end] {
                displayed.visible = displayed.entry.is_parent_nav
                    || needle.is_empty()
                    || displayed.entry.name.to_lowercase().contains(needle);
            }
            next = end;
        }
        std::thread::sleep(BATCH_YIELD);
    }
}

/// Deep phase: only for filters of at least [`MIN_DEEP_FILTER_LEN`] chars on
/// a real folder panel. Strategy is picked per generation: the index snapshot
/// when ready, a live bounded walk otherwise.
fn deep_search_and_reconcile(panel: &Panel, my_gen: u64, needle: &str) {
    if needle.chars().count() < MIN_DEEP_FILTER_LEN {
        return;
    }
    let folder = {
        let state = panel.state.lock();
        match &state.source {
            PanelSource::Folder(folder) => folder.clone(),
            _ => return,
        }
    };

    let strategy: Box<dyn DeepSearch> = if panel.index.is_ready() {
        Box::new(IndexedSearch::new(panel.index.clone()))
    } else {
        Box::new(WalkSearch)
    };

    let cancelled = || superseded(panel, my_gen);
    let hits = strategy.search(&folder, needle, panel.options.deep_result_limit, &cancelled);
    if superseded(panel, my_gen) {
        return;
    }
    perf_log(format!(
        "deep_search needle={needle:?} indexed={} hits={}",
        panel.index.is_ready(),
        hits.len()
    ));

    // Metadata lookups happen before the lock; a hit that vanished or fails
    // the visibility predicate is dropped like any other unreadable entry.
    let show_hidden = panel.show_hidden();
    let candidates: Vec<PanelEntry> = hits
        .iter()
        .filter_map(|hit| injected_entry_for(Path::new(hit), show_hidden))
        .collect();

    let mut appended: Vec<PanelEntry> = Vec::new();
    {
        let mut state = panel.state.lock();
        if superseded(panel, my_gen) {
            return;
        }
        let mut present: HashSet<String> = state
            .entries
            .iter()
            .map(|d| d.entry.path.to_lowercase())
            .collect();
        for candidate in candidates {
            let key = candidate.path.to_lowercase();
            if !present.insert(key) {
                continue;
            }
            state.entries.push(DisplayedEntry {
                entry: candidate.clone(),
                origin: EntryOrigin::Injected,
                visible: true,
            });
            appended.push(candidate);
        }
        resort(&mut state.entries);
    }

    if !appended.is_empty() {
        panel.sink.apply_batch(&appended);
    }
}

fn injected_entry_for(path: &Path, show_hidden: bool) -> Option<PanelEntry> {
    let metadata = std::fs::symlink_metadata(path).ok()?;
    let name = path.file_name()?.to_string_lossy().to_string();
    if !passes_visibility(path, &name, show_hidden) {
        return None;
    }
    Some(PanelEntry {
        path: path.to_string_lossy().to_string(),
        name,
        is_dir: metadata.is_dir(),
        is_parent_nav: false,
    })
}
