//! End-to-end panel pipeline tests over real temp directories: batched
//! loading, load supersession, the debounced search pipeline, injected-entry
//! reconciliation and the base/injected partition invariants.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use panefind::{DisplaySink, Panel, PanelEntry, PanelOptions, PathIndex};

struct RecordingSink {
    batches: Mutex<Vec<Vec<PanelEntry>>>,
    settles: AtomicUsize,
}

impl RecordingSink {
    fn new() -> Arc<Self> {
        Arc::new(RecordingSink {
            batches: Mutex::new(Vec::new()),
            settles: AtomicUsize::new(0),
        })
    }

    fn settle_count(&self) -> usize {
        self.settles.load(Ordering::Acquire)
    }
}

impl DisplaySink for RecordingSink {
    fn apply_batch(&self, batch: &[PanelEntry]) {
        self.batches.lock().push(batch.to_vec());
    }

    fn settle(&self) {
        self.settles.fetch_add(1, Ordering::AcqRel);
    }
}

fn wait_until(timeout: Duration, cond: impl Fn() -> bool) -> bool {
    let start = Instant::now();
    loop {
        if cond() {
            return true;
        }
        if start.elapsed() > timeout {
            return false;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}

fn test_options() -> PanelOptions {
    PanelOptions {
        batch_size: 4,
        debounce: Duration::from_millis(10),
        deep_result_limit: 50,
        show_hidden: false,
    }
}

fn fresh_dir(label: &str) -> PathBuf {
    let base = std::env::temp_dir().join(format!("panefind_pipeline_{label}"));
    let _ = fs::remove_dir_all(&base);
    fs::create_dir_all(&base).unwrap();
    base
}

/// root/{alpha.txt, zz.log, beta/, docs/report_q3.pdf}
fn search_tree(label: &str) -> PathBuf {
    let base = fresh_dir(label);
    fs::create_dir_all(base.join("docs")).unwrap();
    fs::create_dir_all(base.join("beta")).unwrap();
    fs::write(base.join("alpha.txt"), b"x").unwrap();
    fs::write(base.join("zz.log"), b"x").unwrap();
    fs::write(base.join("docs/report_q3.pdf"), b"x").unwrap();
    base
}

fn visible_names(panel: &Panel) -> Vec<String> {
    panel
        .visible_entries()
        .iter()
        .map(|e| e.name.clone())
        .collect()
}

#[test]
fn load_streams_batches_and_settles_sorted() {
    let base = search_tree("load_sorted");
    let sink = RecordingSink::new();
    let panel = Panel::new(PathIndex::new(), sink.clone(), test_options());

    panel.load(&base);
    assert!(wait_until(Duration::from_secs(2), || sink.settle_count() >= 1));

    // Parent nav first, dirs before files, names case-insensitive.
    assert_eq!(
        visible_names(&panel),
        vec!["..", "beta", "docs", "alpha.txt", "zz.log"]
    );

    // Every displayed entry arrived through the sink; the parent-nav
    // pseudo-entry leads as its own batch.
    let batches = sink.batches.lock();
    assert!(!batches.is_empty());
    assert!(batches[0][0].is_parent_nav);
    assert_eq!(batches[0][0].name, "..");
    drop(batches);

    let _ = fs::remove_dir_all(&base);
}

#[test]
fn superseded_load_never_reaches_the_display() {
    let folder_a = fresh_dir("supersede_a");
    for i in 0..10 {
        fs::write(folder_a.join(format!("a{i}.txt")), b"x").unwrap();
    }
    let folder_b = fresh_dir("supersede_b");
    for i in 0..3 {
        fs::write(folder_b.join(format!("b{i}.txt")), b"x").unwrap();
    }

    let sink = RecordingSink::new();
    let panel = Panel::new(PathIndex::new(), sink.clone(), test_options());

    // Load A, then B before A's batches can drain.
    panel.load(&folder_a);
    panel.load(&folder_b);

    assert!(wait_until(Duration::from_secs(2), || {
        let names = visible_names(&panel);
        names.contains(&"b0.txt".to_string()) && sink.settle_count() >= 1
    }));
    // Give any stale batch from A a chance to (wrongly) land.
    std::thread::sleep(Duration::from_millis(50));

    let names = visible_names(&panel);
    assert_eq!(names, vec!["..", "b0.txt", "b1.txt", "b2.txt"]);
    assert!(names.iter().all(|n| !n.starts_with('a')));

    let _ = fs::remove_dir_all(&folder_a);
    let _ = fs::remove_dir_all(&folder_b);
}

#[test]
fn empty_filter_is_idempotent() {
    let base = search_tree("empty_filter");
    let sink = RecordingSink::new();
    let panel = Panel::new(PathIndex::new(), sink.clone(), test_options());

    panel.load(&base);
    assert!(wait_until(Duration::from_secs(2), || sink.settle_count() >= 1));
    let full_listing = visible_names(&panel);

    for round in 0..3 {
        panel.begin_search("");
        let expected_settles = 2 + round;
        assert!(wait_until(Duration::from_secs(2), || {
            sink.settle_count() >= expected_settles
        }));
        assert_eq!(visible_names(&panel), full_listing);
        assert_eq!(panel.injected_count(), 0);
    }

    let _ = fs::remove_dir_all(&base);
}

#[test]
fn deep_fallback_walk_injects_nested_match_and_clear_restores() {
    let base = search_tree("walk_inject");
    let sink = RecordingSink::new();
    // Index never built: the coordinator must fall back to the live walk.
    let panel = Panel::new(PathIndex::new(), sink.clone(), test_options());

    panel.load(&base);
    assert!(wait_until(Duration::from_secs(2), || sink.settle_count() >= 1));
    let base_paths: Vec<String> = panel.base_entries().iter().map(|e| e.path.clone()).collect();

    panel.begin_search("report");
    assert!(wait_until(Duration::from_secs(2), || panel.injected_count() == 1));
    assert!(wait_until(Duration::from_secs(2), || sink.settle_count() >= 2));

    // Local filter hid everything but the parent nav; the nested hit came in
    // as injected.
    assert_eq!(visible_names(&panel), vec!["..", "report_q3.pdf"]);

    // base and injected stay disjoint by path.
    let injected: Vec<String> = panel
        .injected_entries()
        .iter()
        .map(|e| e.path.clone())
        .collect();
    assert!(injected.iter().all(|p| !base_paths.contains(p)));

    // Clearing the filter removes all injected entries and leaves base alone.
    panel.clear_search();
    assert!(wait_until(Duration::from_secs(2), || {
        panel.injected_count() == 0 && visible_names(&panel).len() == 5
    }));
    let restored: Vec<String> = panel.base_entries().iter().map(|e| e.path.clone()).collect();
    assert_eq!(restored.len(), base_paths.len());
    assert!(base_paths.iter().all(|p| restored.contains(p)));

    // Searching again re-injects, still disjoint.
    panel.begin_search("report");
    assert!(wait_until(Duration::from_secs(2), || panel.injected_count() == 1));
    let injected: Vec<String> = panel
        .injected_entries()
        .iter()
        .map(|e| e.path.clone())
        .collect();
    assert!(injected.iter().all(|p| !base_paths.contains(p)));

    let _ = fs::remove_dir_all(&base);
}

#[test]
fn deep_search_prefers_ready_index_and_dedups_base_hits() {
    let base = search_tree("index_inject");
    let index = PathIndex::new();
    index.rebuild_from_roots(&[base.clone()]).unwrap();
    assert!(index.is_ready());

    let sink = RecordingSink::new();
    let panel = Panel::new(index, sink.clone(), test_options());

    panel.load(&base);
    assert!(wait_until(Duration::from_secs(2), || sink.settle_count() >= 1));

    panel.begin_search("report");
    assert!(wait_until(Duration::from_secs(2), || panel.injected_count() == 1));
    assert_eq!(visible_names(&panel), vec!["..", "report_q3.pdf"]);

    // A hit already present in base must not be duplicated into injected.
    panel.begin_search("alpha");
    assert!(wait_until(Duration::from_secs(2), || {
        visible_names(&panel) == vec!["..", "alpha.txt"]
    }));
    assert_eq!(panel.injected_count(), 0);

    let _ = fs::remove_dir_all(&base);
}

#[test]
fn rapid_keystrokes_only_apply_the_last_filter() {
    let base = search_tree("keystrokes");
    let sink = RecordingSink::new();
    let panel = Panel::new(PathIndex::new(), sink.clone(), test_options());

    panel.load(&base);
    assert!(wait_until(Duration::from_secs(2), || sink.settle_count() >= 1));

    // Each keystroke supersedes the previous generation inside its debounce.
    panel.begin_search("z");
    panel.begin_search("zz");
    panel.begin_search("report");

    assert!(wait_until(Duration::from_secs(2), || panel.injected_count() == 1));
    assert_eq!(visible_names(&panel), vec!["..", "report_q3.pdf"]);

    let _ = fs::remove_dir_all(&base);
}

#[test]
fn pinned_lists_are_never_deep_searched() {
    let base = search_tree("pinned");
    let sink = RecordingSink::new();
    let panel = Panel::new(PathIndex::new(), sink.clone(), test_options());

    panel.load_pinned(vec![base.join("alpha.txt"), base.join("docs")]);
    assert!(wait_until(Duration::from_secs(2), || sink.settle_count() >= 1));
    assert_eq!(visible_names(&panel), vec!["docs", "alpha.txt"]);

    // "report" matches a file nested under docs, but pinned lists only
    // filter locally.
    panel.begin_search("report");
    assert!(wait_until(Duration::from_secs(2), || sink.settle_count() >= 2));
    assert_eq!(panel.injected_count(), 0);
    assert!(visible_names(&panel).is_empty());

    let _ = fs::remove_dir_all(&base);
}

#[test]
fn cancel_load_discards_the_inflight_load() {
    let big = fresh_dir("cancel_load_big");
    for i in 0..200 {
        fs::write(big.join(format!("f{i:03}.txt")), b"x").unwrap();
    }

    let sink = RecordingSink::new();
    let panel = Panel::new(PathIndex::new(), sink.clone(), test_options());

    // With 200 files at batch size 4, the delivery spans dozens of
    // generation checks; the cancel lands well before the last one.
    panel.load(&big);
    panel.cancel_load();
    std::thread::sleep(Duration::from_millis(300));
    assert_eq!(sink.settle_count(), 0);

    // The panel is still usable after a cancel.
    let small = fresh_dir("cancel_load_small");
    fs::write(small.join("one.txt"), b"x").unwrap();
    panel.load(&small);
    assert!(wait_until(Duration::from_secs(2), || sink.settle_count() >= 1));
    assert_eq!(visible_names(&panel), vec!["..", "one.txt"]);

    let _ = fs::remove_dir_all(&big);
    let _ = fs::remove_dir_all(&small);
}

#[test]
fn empty_folder_still_settles_with_parent_nav() {
    let base = fresh_dir("empty_folder");
    let sink = RecordingSink::new();
    let panel = Panel::new(PathIndex::new(), sink.clone(), test_options());

    panel.load(&base);
    assert!(wait_until(Duration::from_secs(2), || sink.settle_count() >= 1));
    assert_eq!(visible_names(&panel), vec![".."]);

    let _ = fs::remove_dir_all(&base);
}

#[test]
fn loading_a_missing_folder_is_a_silent_noop() {
    let sink = RecordingSink::new();
    let panel = Panel::new(PathIndex::new(), sink.clone(), test_options());

    panel.load(&PathBuf::from("/definitely/not/a/real/folder"));
    std::thread::sleep(Duration::from_millis(50));

    assert_eq!(sink.settle_count(), 0);
    assert!(panel.visible_entries().is_empty());
}

#[cfg(unix)]
#[test]
fn hidden_entries_respect_the_show_hidden_flag() {
    let base = fresh_dir("hidden_flag");
    fs::write(base.join("visible.txt"), b"x").unwrap();
    fs::write(base.join(".dotfile"), b"x").unwrap();

    let sink = RecordingSink::new();
    let panel = Panel::new(PathIndex::new(), sink.clone(), test_options());

    panel.load(&base);
    assert!(wait_until(Duration::from_secs(2), || sink.settle_count() >= 1));
    assert_eq!(visible_names(&panel), vec!["..", "visible.txt"]);

    panel.set_show_hidden(true);
    panel.load(&base);
    assert!(wait_until(Duration::from_secs(2), || sink.settle_count() >= 2));
    assert_eq!(visible_names(&panel), vec!["..", ".dotfile", "visible.txt"]);

    let _ = fs::remove_dir_all(&base);
}
