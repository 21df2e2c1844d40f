//! The single writer that turns debounced change batches into index
//! mutations.
//!
//! | change   | mutation                                               |
//! |----------|--------------------------------------------------------|
//! | Created  | add the entry (a directory brings its subtree)         |
//! | Deleted  | remove the entry and anything below it                 |
//! | Changed  | refresh the entry's own document, nothing below it     |
//! | Renamed  | retire the old entry and subtree, add the new one      |
//!
//! Each class is debounced on its own schedule, so batches for one path can
//! arrive out of order. Adds are checked against the disk (a vanished entry
//! is skipped) and so are removals (an entry that exists again is
//! re-indexed). Excluded paths are never added.
//!
//! A batch is applied under the store's write lock and committed once, so
//! searches see either none or all of it. A failing change is logged and
//! counted; the rest of the batch still applies.

use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc;

use super::crawler::Crawler;
use super::filter::EntryFilter;
use crate::notifications::{IndexEvent, NotificationBroadcaster};
use crate::storage::{EntryAttributes, IndexStore, StorageResult};
use crate::types::{entry_name, path_key};
use crate::watcher::{ChangeBatch, ChangeKind, PendingChange};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ApplyStats {
    pub added: usize,
    pub removed: usize,
    /// Changes whose entry was already gone by the time they were applied.
    pub skipped: usize,
    pub errors: usize,
}

impl std::ops::AddAssign for ApplyStats {
    fn add_assign(&mut self, other: Self) {
        self.added += other.added;
        self.removed += other.removed;
        self.skipped += other.skipped;
        self.errors += other.errors;
    }
}

pub struct MutationApplier {
    store: Arc<RwLock<IndexStore>>,
    filter: Arc<EntryFilter>,
    broadcaster: NotificationBroadcaster,
}

impl MutationApplier {
    pub fn new(
        store: Arc<RwLock<IndexStore>>,
        filter: Arc<EntryFilter>,
        broadcaster: NotificationBroadcaster,
    ) -> Self {
        Self {
            store,
            filter,
            broadcaster,
        }
    }

    /// Consume batches until every sender is gone.
    ///
    /// Blocks the calling thread; run it on a dedicated blocking task.
    pub fn run(self, mut batches: mpsc::Receiver<ChangeBatch>) -> ApplyStats {
        crate::log_event!("applier", "started");
        let mut total = ApplyStats::default();
        while let Some(batch) = batches.blocking_recv() {
            total += self.apply_batch(&batch);
        }
        crate::log_event!(
            "applier",
            "stopped",
            "{} added, {} removed, {} errors",
            total.added,
            total.removed,
            total.errors
        );
        total
    }

    /// Apply one batch under the write lock and commit it.
    pub fn apply_batch(&self, batch: &ChangeBatch) -> ApplyStats {
        let mut stats = ApplyStats::default();
        let mut events = Vec::new();

        {
            let mut store = self.store.write();
            for change in &batch.changes {
                if let Err(e) = self.apply_change(&mut store, change, &mut stats, &mut events) {
                    tracing::error!(
                        "[applier] {} {} failed: {e}",
                        change.kind.as_str(),
                        change.path.display()
                    );
                    stats.errors += 1;
                }
            }

            if let Err(e) = store.commit() {
                tracing::error!("[applier] commit failed, batch discarded: {e}");
                if let Err(e) = store.rollback() {
                    tracing::error!("[applier] rollback failed: {e}");
                }
                stats.errors += 1;
                return stats;
            }
        }

        crate::debug_event!(
            "applier",
            "batch",
            "{} {} change(s) under {}: +{} -{} ({} skipped)",
            batch.changes.len(),
            batch.kind.as_str(),
            batch.root.display(),
            stats.added,
            stats.removed,
            stats.skipped
        );

        for event in events {
            self.broadcaster.send(event);
        }
        stats
    }

    fn apply_change(
        &self,
        store: &mut IndexStore,
        change: &PendingChange,
        stats: &mut ApplyStats,
        events: &mut Vec<IndexEvent>,
    ) -> StorageResult<()> {
        match change.kind {
            ChangeKind::Created => self.add(store, &change.path, stats, events),
            ChangeKind::Deleted => self.retire(store, &change.path, stats, events),
            ChangeKind::Changed => self.refresh(store, &change.path, stats, events),
            ChangeKind::Renamed => {
                if let Some(old_path) = &change.old_path {
                    self.retire(store, old_path, stats, events)?;
                }
                self.add(store, &change.path, stats, events)
            }
        }
    }

    /// Remove `path` and its subtree, unless it has been re-created since.
    fn retire(
        &self,
        store: &mut IndexStore,
        path: &Path,
        stats: &mut ApplyStats,
        events: &mut Vec<IndexEvent>,
    ) -> StorageResult<()> {
        self.remove(store, path, stats, events)?;
        if std::fs::symlink_metadata(path).is_ok() {
            crate::debug_event!("applier", "reappeared", "{}", path.display());
            self.add(store, path, stats, events)?;
        }
        Ok(())
    }

    /// Re-read the attributes of one entry. Its subtree is left alone.
    fn refresh(
        &self,
        store: &mut IndexStore,
        path: &Path,
        stats: &mut ApplyStats,
        events: &mut Vec<IndexEvent>,
    ) -> StorageResult<()> {
        let Ok(metadata) = std::fs::symlink_metadata(path) else {
            crate::debug_event!("applier", "vanished", "{}", path.display());
            stats.skipped += 1;
            return Ok(());
        };
        if self.filter.is_excluded_with_parents(path, metadata.is_dir()) {
            stats.skipped += 1;
            return Ok(());
        }

        let key = path_key(path);
        let name = entry_name(path);
        store.remove(&name, &key)?;
        store.add_entry(&name, &key, EntryAttributes::from_metadata(&metadata))?;
        stats.removed += 1;
        stats.added += 1;
        events.push(IndexEvent::DocumentRemoved { path: key.clone() });
        events.push(IndexEvent::DocumentAdded { path: key });
        Ok(())
    }

    fn add(
        &self,
        store: &mut IndexStore,
        path: &Path,
        stats: &mut ApplyStats,
        events: &mut Vec<IndexEvent>,
    ) -> StorageResult<()> {
        // Gone again before its window closed: the deletion is on its way.
        let Ok(metadata) = std::fs::symlink_metadata(path) else {
            crate::debug_event!("applier", "vanished", "{}", path.display());
            stats.skipped += 1;
            return Ok(());
        };
        if self.filter.is_excluded_with_parents(path, metadata.is_dir()) {
            crate::debug_event!("applier", "excluded", "{}", path.display());
            stats.skipped += 1;
            return Ok(());
        }

        if metadata.is_dir() {
            let crawled = Crawler::new(&self.filter).crawl(store, path);
            stats.added += crawled.documents();
            stats.errors += crawled.errors;
        } else {
            let attributes = EntryAttributes::from_metadata(&metadata);
            store.add_entry(&entry_name(path), &path_key(path), attributes)?;
            stats.added += 1;
        }

        events.push(IndexEvent::DocumentAdded {
            path: path_key(path),
        });
        Ok(())
    }

    fn remove(
        &self,
        store: &mut IndexStore,
        path: &Path,
        stats: &mut ApplyStats,
        events: &mut Vec<IndexEvent>,
    ) -> StorageResult<()> {
        let key = path_key(path);
        store.remove(&entry_name(path), &key)?;
        // A removed or renamed directory takes its subtree with it.
        store.remove_descendants(&key)?;
        stats.removed += 1;
        events.push(IndexEvent::DocumentRemoved { path: key });
        Ok(())
    }
}

impl std::fmt::Debug for MutationApplier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationApplier").finish_non_exhaustive()
    }
}
