//! Directory loader: streams one folder's visible entries into panel display
//! state in bounded batches, off the caller thread.
//!
//! Starting a load supersedes the previous one by bumping the panel's load
//! generation; the superseded worker notices at its next generation check and
//! drops its remaining batches silently. Root enumeration failure (folder
//! deleted mid-load) degrades to zero entries plus settle, never an error.

use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering as AtomicOrdering;

use crate::panel::{passes_visibility, resort, DisplayedEntry, EntryOrigin, Panel, PanelEntry, PanelSource};
use crate::{perf_log, BATCH_YIELD};

impl Panel {
    /// Loads `folder` into the panel, superseding any in-flight load for it.
    /// Validation happens on the worker thread along with everything else
    /// that touches the filesystem; a folder that fails to resolve is a
    /// silent no-op (the prior load stays cancelled either way).
    pub fn load(&self, folder: &Path) {
        let my_gen = self.load_generation.fetch_add(1, AtomicOrdering::AcqRel) + 1;
        // A folder change invalidates the search state built over the old
        // listing along with any injected entries.
        self.search_generation.fetch_add(1, AtomicOrdering::AcqRel);

        let folder = folder.to_path_buf();
        let panel = self.clone();
        std::thread::spawn(move || {
            run_load_job(&panel, my_gen, folder);
        });
    }

    /// Loads an ad-hoc list of paths as the panel's base entries. Pinned
    /// lists get no parent-nav entry and are never deep-searched.
    pub fn load_pinned(&self, paths: Vec<PathBuf>) {
        let my_gen = self.load_generation.fetch_add(1, AtomicOrdering::AcqRel) + 1;
        self.search_generation.fetch_add(1, AtomicOrdering::AcqRel);

        let panel = self.clone();
        std::thread::spawn(move || {
            run_pinned_load_job(&panel, my_gen, paths);
        });
    }

    /// Cancels the current load without starting a new one.
    pub fn cancel_load(&self) {
        self.load_generation.fetch_add(1, AtomicOrdering::AcqRel);
    }
}

/// Builds a displayable entry, applying the visibility predicate.
fn entry_for_path(path: &Path, is_dir: bool, show_hidden: bool) -> Option<PanelEntry> {
    let name = path.file_name()?.to_string_lossy().to_string();
    if !passes_visibility(path, &name, show_hidden) {
        return None;
    }
    Some(PanelEntry {
        path: path.to_string_lossy().to_string(),
        name,
        is_dir,
        is_parent_nav: false,
    })
}

/// Phase 1: enumerate subdirectories, then files, of `folder` (non-recursive),
/// filtered through the visibility predicate. Enumeration failure degrades to
/// an empty listing.
fn enumerate_folder(folder: &Path, show_hidden: bool) -> Vec<PanelEntry> {
    let Ok(read_dir) = std::fs::read_dir(folder) else {
        perf_log(format!("load enumerate failed: {}", folder.display()));
        return Vec::new();
    };

    let mut dirs: Vec<PanelEntry> = Vec::new();
    let mut files: Vec<PanelEntry> = Vec::new();
    for entry in read_dir.flatten() {
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        let path = entry.path();
        let is_dir = file_type.is_dir();
        if let Some(panel_entry) = entry_for_path(&path, is_dir, show_hidden) {
            if is_dir {
                dirs.push(panel_entry);
            } else {
                files.push(panel_entry);
            }
        }
    }

    dirs.extend(files);
    dirs
}

fn run_load_job(panel: &Panel, my_gen: u64, folder: PathBuf) {
    // Canonicalizing both validates existence and keeps base entry paths
    // aligned with the canonical paths deep search reports, so the reconcile
    // dedup key is stable.
    let Ok(folder) = std::fs::canonicalize(&folder) else {
        perf_log(format!("load skipped, unresolvable: {}", folder.display()));
        return;
    };
    if !folder.is_dir() {
        perf_log(format!("load skipped, not a folder: {}", folder.display()));
        return;
    }

    let listing = enumerate_folder(&folder, panel.show_hidden());

    let parent_nav = folder.parent().map(|parent| PanelEntry {
        path: parent.to_string_lossy().to_string(),
        name: "..".to_string(),
        is_dir: true,
        is_parent_nav: true,
    });

    deliver_listing(panel, my_gen, PanelSource::Folder(folder), parent_nav, listing);
}

fn run_pinned_load_job(panel: &Panel, my_gen: u64, paths: Vec<PathBuf>) {
    let show_hidden = panel.show_hidden();
    let mut listing: Vec<PanelEntry> = Vec::with_capacity(paths.len());
    for path in &paths {
        // Stale pins pointing at deleted files are skipped, not errors.
        let Ok(metadata) = std::fs::symlink_metadata(path) else {
            continue;
        };
        if let Some(entry) = entry_for_path(path, metadata.is_dir(), show_hidden) {
            listing.push(entry);
        }
    }

    deliver_listing(panel, my_gen, PanelSource::PinnedList, None, listing);
}

/// Phase 2: reset the display set for this generation, then hand the listing
/// back in fixed-size batches with an inter-batch yield. Every mutation
/// re-checks that this load is still the panel's current one; a superseded
/// load drops its remaining batches silently.
fn deliver_listing(
    panel: &Panel,
    my_gen: u64,
    source: PanelSource,
    parent_nav: Option<PanelEntry>,
    listing: Vec<PanelEntry>,
) {
    {
        let mut state = panel.state.lock();
        if panel.current_load_generation() != my_gen {
            return;
        }
        state.source = source;
        state.entries.clear();
        if let Some(nav) = &parent_nav {
            state.entries.push(DisplayedEntry {
                entry: nav.clone(),
                origin: EntryOrigin::Base,
                visible: true,
            });
        }
    }
    // The parent-nav pseudo-entry goes through the sink like every other
    // displayed entry, as its own leading batch.
    if let Some(nav) = parent_nav {
        panel.sink.apply_batch(std::slice::from_ref(&nav));
    }

    let batch_size = panel.options.batch_size.max(1);
    for batch in listing.chunks(batch_size) {
        {
            let mut state = panel.state.lock();
            if panel.current_load_generation() != my_gen {
                return;
            }
            state
                .entries
                .extend(batch.iter().map(|entry| DisplayedEntry {
                    entry: entry.clone(),
                    origin: EntryOrigin::Base,
                    visible: true,
                }));
        }
        panel.sink.apply_batch(batch);
        std::thread::sleep(BATCH_YIELD);
    }

    {
        let mut state = panel.state.lock();
        if panel.current_load_generation() != my_gen {
            return;
        }
        resort(&mut state.entries);
    }
    panel.sink.settle();
}
