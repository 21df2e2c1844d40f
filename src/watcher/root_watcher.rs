//! OS watch on one root, fanned out into per-class debounce tasks.
//!
//! ```text
//! notify (recursive) --classify--> [created] --debounce--+
//!                                  [deleted] --debounce--+--> ChangeBatch channel
//!                                  [renamed] --debounce--+
//!                                  [changed] --debounce--+
//! ```
//!
//! Dropping a [`RootWatcher`] releases the OS handle and stops its tasks;
//! changes still buffered in an open window are discarded.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::debouncer;
use super::error::WatchError;
use super::event::{
    ChangeBatch, ChangeKind, PendingChange, RENAME_PAIR_TIMEOUT, RenameTracker, classify,
};
use crate::indexing::EntryFilter;

/// Window and channel sizing shared by every root.
#[derive(Debug, Clone, Copy)]
pub struct WatchOptions {
    pub debounce: Duration,
    pub channel_capacity: usize,
}

impl WatchOptions {
    pub fn from_settings(settings: &crate::config::Settings) -> Self {
        Self {
            debounce: Duration::from_millis(settings.watch.debounce_ms),
            channel_capacity: settings.watch.channel_capacity.max(1),
        }
    }
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(2000),
            channel_capacity: 1024,
        }
    }
}

/// One sender per change class, indexed by [`ChangeKind::slot`].
#[derive(Clone)]
struct ClassSenders([mpsc::Sender<PendingChange>; 4]);

impl ClassSenders {
    fn for_kind(&self, kind: ChangeKind) -> &mpsc::Sender<PendingChange> {
        &self.0[kind.slot()]
    }
}

/// A live recursive watch on one root.
pub struct RootWatcher {
    root: PathBuf,
    _watcher: RecommendedWatcher,
    tasks: Vec<JoinHandle<()>>,
}

impl RootWatcher {
    /// Start watching `root`, delivering debounced batches to `batches`.
    ///
    /// Tasks are spawned on `runtime`, so this can be called from any
    /// thread that holds a runtime handle.
    pub fn start(
        root: PathBuf,
        options: WatchOptions,
        filter: Arc<EntryFilter>,
        batches: mpsc::Sender<ChangeBatch>,
        runtime: &Handle,
    ) -> Result<Self, WatchError> {
        let mut tasks = Vec::with_capacity(ChangeKind::ALL.len() + 1);
        let mut senders = Vec::with_capacity(ChangeKind::ALL.len());

        for kind in ChangeKind::ALL {
            let (tx, rx) = mpsc::channel(options.channel_capacity);
            senders.push(tx);
            tasks.push(runtime.spawn(debouncer::run(
                root.clone(),
                kind,
                options.debounce,
                rx,
                batches.clone(),
            )));
        }

        let senders = match <[mpsc::Sender<PendingChange>; 4]>::try_from(senders) {
            Ok(array) => ClassSenders(array),
            Err(_) => {
                abort_all(&tasks);
                return Err(WatchError::InitFailed {
                    reason: "class channel setup".to_string(),
                });
            }
        };

        let tracker = Arc::new(Mutex::new(RenameTracker::new(RENAME_PAIR_TIMEOUT)));
        tasks.push(runtime.spawn(sweep_renames(
            Arc::clone(&tracker),
            senders.for_kind(ChangeKind::Deleted).clone(),
        )));

        let watcher = match Self::arm(&root, filter, senders, tracker) {
            Ok(watcher) => watcher,
            Err(e) => {
                abort_all(&tasks);
                return Err(e);
            }
        };

        crate::log_event!("watcher", "watching", "{}", root.display());
        Ok(Self {
            root,
            _watcher: watcher,
            tasks,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn arm(
        root: &Path,
        filter: Arc<EntryFilter>,
        senders: ClassSenders,
        tracker: Arc<Mutex<RenameTracker>>,
    ) -> Result<RecommendedWatcher, WatchError> {
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    tracing::error!("[watcher] file watch error: {e}");
                    return;
                }
            };

            let changes = classify(&event, &mut tracker.lock(), Instant::now(), Path::exists);
            for change in changes {
                if is_filtered(&filter, &change) {
                    continue;
                }
                // notify calls back on its own thread, outside the runtime
                if senders.for_kind(change.kind).blocking_send(change).is_err() {
                    crate::debug_event!("watcher", "debouncer gone, event dropped");
                }
            }
        })?;

        watcher
            .watch(root, RecursiveMode::Recursive)
            .map_err(|e| WatchError::PathWatchFailed {
                path: root.to_path_buf(),
                reason: e.to_string(),
            })?;

        Ok(watcher)
    }
}

impl Drop for RootWatcher {
    fn drop(&mut self) {
        abort_all(&self.tasks);
        crate::debug_event!("watcher", "released", "{}", self.root.display());
    }
}

impl std::fmt::Debug for RootWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RootWatcher")
            .field("root", &self.root)
            .field("tasks", &self.tasks.len())
            .finish()
    }
}

fn abort_all(tasks: &[JoinHandle<()>]) {
    for task in tasks {
        task.abort();
    }
}

/// Whether a change touches only excluded paths.
fn is_filtered(filter: &EntryFilter, change: &PendingChange) -> bool {
    let excluded = |path: &Path| filter.is_excluded_with_parents(path, path.is_dir());
    match &change.old_path {
        // A rename out of an excluded area still needs its new side indexed.
        Some(old_path) => excluded(old_path) && excluded(&change.path),
        None => excluded(&change.path),
    }
}

/// Report rename halves that never found a partner as deletions.
async fn sweep_renames(tracker: Arc<Mutex<RenameTracker>>, deleted: mpsc::Sender<PendingChange>) {
    let mut interval = tokio::time::interval(RENAME_PAIR_TIMEOUT);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        let expired = tracker.lock().expire(Instant::now());
        for path in expired {
            crate::debug_event!("watcher", "moved out", "{}", path.display());
            if deleted.send(PendingChange::deleted(path)).await.is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn options() -> WatchOptions {
        WatchOptions {
            debounce: Duration::from_millis(100),
            channel_capacity: 64,
        }
    }

    async fn next_batch_of(
        rx: &mut mpsc::Receiver<ChangeBatch>,
        kind: ChangeKind,
    ) -> Option<ChangeBatch> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while let Ok(Some(batch)) = tokio::time::timeout_at(deadline, rx.recv()).await {
            if batch.kind == kind {
                return Some(batch);
            }
        }
        None
    }

    #[test]
    fn test_filtered_changes() {
        let filter = EntryFilter::new(Vec::new(), &["*.tmp".to_string()]);

        assert!(is_filtered(&filter, &PendingChange::created("/r/a.tmp")));
        assert!(!is_filtered(&filter, &PendingChange::created("/r/a.txt")));
        // saving through a temp file and renaming over the target
        assert!(!is_filtered(
            &filter,
            &PendingChange::renamed("/r/a.tmp", "/r/a.txt")
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_created_file_is_delivered() {
        let temp_dir = TempDir::new().unwrap();
        let root = std::fs::canonicalize(temp_dir.path()).unwrap();
        let (tx, mut rx) = mpsc::channel(16);

        let watcher = RootWatcher::start(
            root.clone(),
            options(),
            Arc::new(EntryFilter::allow_all()),
            tx,
            &Handle::current(),
        )
        .unwrap();
        assert_eq!(watcher.root(), root.as_path());

        std::fs::write(root.join("report.txt"), "hello").unwrap();

        let batch = next_batch_of(&mut rx, ChangeKind::Created).await.unwrap();
        assert_eq!(batch.root, root);
        assert!(batch.changes.iter().any(|c| c.path == root.join("report.txt")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_drop_stops_delivery() {
        let temp_dir = TempDir::new().unwrap();
        let root = std::fs::canonicalize(temp_dir.path()).unwrap();
        let (tx, mut rx) = mpsc::channel(16);

        let watcher = RootWatcher::start(
            root.clone(),
            options(),
            Arc::new(EntryFilter::allow_all()),
            tx,
            &Handle::current(),
        )
        .unwrap();
        drop(watcher);

        std::fs::write(root.join("late.txt"), "x").unwrap();

        // Every sender lived in the aborted tasks, so the channel closes.
        let closed = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await;
        assert!(matches!(closed, Ok(None)));
    }

    #[test]
    fn test_missing_root_fails() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let (tx, _rx) = mpsc::channel(1);
        let result = RootWatcher::start(
            PathBuf::from("/definitely/not/here"),
            options(),
            Arc::new(EntryFilter::allow_all()),
            tx,
            runtime.handle(),
        );
        assert!(result.is_err());
    }
}
