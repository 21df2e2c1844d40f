//! End-to-end: crawl, watch, mutate the tree, search.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use fsindex::{FixedRoots, IndexEvent, IndexFacade, SearchResult, Settings};
use tempfile::TempDir;

struct Harness {
    _index_dir: TempDir,
    _tree: TempDir,
    root: PathBuf,
    facade: Arc<IndexFacade>,
}

fn harness(debounce_ms: u64) -> Harness {
    let index_dir = TempDir::new().unwrap();
    let tree = TempDir::new().unwrap();
    let root = std::fs::canonicalize(tree.path()).unwrap();

    let mut settings = Settings::default();
    settings.index_path = index_dir.path().join("index");
    settings.watch.debounce_ms = debounce_ms;

    let facade = IndexFacade::with_root_source(
        Arc::new(settings),
        Arc::new(FixedRoots::new(vec![root.clone()])),
    )
    .unwrap();

    Harness {
        _index_dir: index_dir,
        _tree: tree,
        root,
        facade: Arc::new(facade),
    }
}

/// Poll `search` until `done` holds or a few seconds pass.
async fn wait_for(
    facade: &IndexFacade,
    text: &str,
    done: impl Fn(&[SearchResult]) -> bool,
) -> Vec<SearchResult> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let results = facade.search(text).unwrap();
        if done(&results) || tokio::time::Instant::now() >= deadline {
            return results;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

fn paths(results: &[SearchResult]) -> Vec<&str> {
    results.iter().map(|r| r.full_path.as_str()).collect()
}

fn key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_created_file_becomes_searchable() {
    let h = harness(200);

    h.facade.create_index().unwrap();
    assert!(h.facade.search("anything").unwrap().is_empty());

    h.facade.watch().unwrap();
    std::fs::write(h.root.join("report.txt"), "q3 numbers").unwrap();

    let results = wait_for(&h.facade, "report", |r| !r.is_empty()).await;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].file_name, "report.txt");
    assert_eq!(results[0].full_path, key(&h.root.join("report.txt")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_deleted_file_disappears() {
    let h = harness(200);
    std::fs::write(h.root.join("draft.md"), "x").unwrap();
    h.facade.create_index().unwrap();
    assert_eq!(h.facade.search("draft").unwrap().len(), 1);

    h.facade.watch().unwrap();
    std::fs::remove_file(h.root.join("draft.md")).unwrap();

    let results = wait_for(&h.facade, "draft", |r| r.is_empty()).await;
    assert!(results.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_rename_leaves_one_document() {
    let h = harness(200);
    std::fs::write(h.root.join("old.txt"), "x").unwrap();
    std::fs::write(h.root.join("other.txt"), "x").unwrap();
    h.facade.create_index().unwrap();

    h.facade.watch().unwrap();
    std::fs::rename(h.root.join("old.txt"), h.root.join("new.txt")).unwrap();

    let new_key = key(&h.root.join("new.txt"));
    let old_key = key(&h.root.join("old.txt"));
    let results = wait_for(&h.facade, "txt", |r| {
        let p = paths(r);
        p.contains(&new_key.as_str()) && !p.contains(&old_key.as_str())
    })
    .await;

    let p = paths(&results);
    assert_eq!(p.iter().filter(|path| **path == new_key).count(), 1);
    assert!(!p.contains(&old_key.as_str()));
    assert!(p.contains(&key(&h.root.join("other.txt")).as_str()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_new_directory_brings_its_contents() {
    let h = harness(200);
    h.facade.create_index().unwrap();
    h.facade.watch().unwrap();

    // Build the subtree outside the root, then move it in at once.
    let staging = TempDir::new().unwrap();
    let built = staging.path().join("album");
    std::fs::create_dir_all(built.join("disc1")).unwrap();
    std::fs::write(built.join("disc1/track01.flac"), "x").unwrap();
    let moved_in = h.root.join("album");
    if std::fs::rename(&built, &moved_in).is_err() {
        // different file systems: fall back to creating in place
        std::fs::create_dir_all(moved_in.join("disc1")).unwrap();
        std::fs::write(moved_in.join("disc1/track01.flac"), "x").unwrap();
    }

    let results = wait_for(&h.facade, "track01", |r| !r.is_empty()).await;
    assert_eq!(results.len(), 1);
    assert_eq!(
        results[0].full_path,
        key(&moved_in.join("disc1/track01.flac"))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_burst_of_writes_applies_one_change() {
    let h = harness(500);
    let target = h.root.join("autosave.txt");
    std::fs::write(&target, "0").unwrap();
    h.facade.create_index().unwrap();

    let mut events = h.facade.subscribe();
    h.facade.watch().unwrap();

    for i in 1..=10 {
        std::fs::write(&target, i.to_string()).unwrap();
    }

    // Two windows' worth of time for everything to drain.
    tokio::time::sleep(Duration::from_millis(1500)).await;

    let target_key = key(&target);
    let mut removals = 0;
    while let Ok(event) = events.try_recv() {
        if event == (IndexEvent::DocumentRemoved {
            path: target_key.clone(),
        }) {
            removals += 1;
        }
    }
    assert_eq!(removals, 1);
    assert_eq!(h.facade.search("autosave").unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_background_start_crawls_and_watches() {
    let h = harness(200);
    std::fs::write(h.root.join("existing.csv"), "x").unwrap();

    let crawl = h.facade.start_background().unwrap();
    let stats = crawl.await.unwrap().unwrap();
    assert_eq!(stats.files, 1);
    assert!(h.facade.is_watching());

    std::fs::write(h.root.join("arrived.csv"), "x").unwrap();
    let results = wait_for(&h.facade, "arrived", |r| !r.is_empty()).await;
    assert_eq!(results.len(), 1);

    assert!(h.facade.unwatch());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_recreated_file_survives_late_deletion() {
    let h = harness(1000);
    std::fs::write(h.root.join("keep.txt"), "v1").unwrap();
    h.facade.create_index().unwrap();
    h.facade.watch().unwrap();

    // Open the Created window first so it closes before the Deleted one.
    std::fs::write(h.root.join("other.txt"), "x").unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    std::fs::remove_file(h.root.join("keep.txt")).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    std::fs::write(h.root.join("keep.txt"), "v2").unwrap();

    tokio::time::sleep(Duration::from_millis(2500)).await;

    assert!(h.root.join("keep.txt").exists());
    let results = h.facade.search("keep").unwrap();
    assert_eq!(paths(&results), vec![key(&h.root.join("keep.txt")).as_str()]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_rename_into_ignored_name_drops_entry() {
    let index_dir = TempDir::new().unwrap();
    let tree = TempDir::new().unwrap();
    let root = std::fs::canonicalize(tree.path()).unwrap();

    let mut settings = Settings::default();
    settings.index_path = index_dir.path().join("index");
    settings.watch.debounce_ms = 200;
    settings.indexing.ignore_patterns = vec!["*.tmp".to_string()];
    let facade = IndexFacade::with_root_source(
        Arc::new(settings),
        Arc::new(FixedRoots::new(vec![root.clone()])),
    )
    .unwrap();

    std::fs::write(root.join("draft.txt"), "x").unwrap();
    facade.create_index().unwrap();
    facade.watch().unwrap();
    std::fs::rename(root.join("draft.txt"), root.join("draft.tmp")).unwrap();

    let results = wait_for(&facade, "draft", |r| r.is_empty()).await;
    assert!(results.is_empty());
    // Later batches must not bring it back.
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(facade.search("draft").unwrap().is_empty());
}
