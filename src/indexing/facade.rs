//! IndexFacade - the surface a presentation layer talks to.
//!
//! ## Architecture
//!
//! ```text
//! IndexFacade
//!   ├── IndexStore (Arc<RwLock>) - writers: crawl, clear, applier; readers: search
//!   ├── QueryEngine - fuzzy multi-field queries
//!   ├── RootSource (Arc<dyn>) - configured roots or fixed volumes
//!   ├── NotificationBroadcaster - "index changed" fan-out
//!   └── WatchSession (Option) - one RootWatcher per root + the applier worker
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! let facade = Arc::new(IndexFacade::new(Arc::new(settings))?);
//! let background = facade.start_background()?;   // watch + crawl
//! let hits = facade.search("report")?;
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use super::applier::{ApplyStats, MutationApplier};
use super::crawler::{CrawlStats, Crawler};
use super::filter::EntryFilter;
use super::roots::{RootSource, root_source_for};
use crate::config::Settings;
use crate::error::{IndexError, IndexResult};
use crate::notifications::{IndexEvent, NotificationBroadcaster};
use crate::query::QueryEngine;
use crate::storage::IndexStore;
use crate::types::SearchResult;
use crate::watcher::{RootWatcher, WatchError, WatchOptions};

/// Live watchers plus the applier draining their batches.
struct WatchSession {
    watchers: Vec<RootWatcher>,
    _applier: JoinHandle<ApplyStats>,
}

pub struct IndexFacade {
    /// Entry store; every mutation takes the write side
    store: Arc<RwLock<IndexStore>>,

    engine: QueryEngine,

    root_source: Arc<dyn RootSource>,

    broadcaster: NotificationBroadcaster,

    /// Present while watching
    session: Mutex<Option<WatchSession>>,

    settings: Arc<Settings>,
}

impl IndexFacade {
    /// Open (or create) the index at `settings.index_path`.
    ///
    /// Roots come from `indexing.roots`, or from volume discovery when none
    /// are configured.
    pub fn new(settings: Arc<Settings>) -> IndexResult<Self> {
        let root_source: Arc<dyn RootSource> =
            Arc::from(root_source_for(&settings.indexing.roots));
        Self::with_root_source(settings, root_source)
    }

    pub fn with_root_source(
        settings: Arc<Settings>,
        root_source: Arc<dyn RootSource>,
    ) -> IndexResult<Self> {
        let store = IndexStore::open(&settings.index_path, settings.indexing.writer_heap_bytes)
            .map_err(|source| IndexError::OpenFailed {
                path: settings.index_path.clone(),
                source,
            })?;
        let engine = QueryEngine::new(&store, settings.fuzzy_distance(), settings.search.limit)?;

        crate::debug_event!(
            "facade",
            "opened",
            "{} ({} documents)",
            settings.index_path.display(),
            store.document_count()
        );

        Ok(Self {
            store: Arc::new(RwLock::new(store)),
            engine,
            root_source,
            broadcaster: NotificationBroadcaster::default(),
            session: Mutex::new(None),
            settings,
        })
    }

    pub fn settings(&self) -> &Arc<Settings> {
        &self.settings
    }

    /// Roots that would be crawled and watched right now.
    pub fn roots(&self) -> Vec<PathBuf> {
        self.root_source.roots()
    }

    pub fn document_count(&self) -> u64 {
        self.store.read().document_count()
    }

    // =========================================================================
    // Index population
    // =========================================================================

    /// Rebuild the index from scratch by crawling every root.
    ///
    /// Holds the write lock for the whole pass, so watcher batches and
    /// searches wait until it finishes. Each root is committed and
    /// compacted before the next one starts.
    pub fn create_index(&self) -> IndexResult<CrawlStats> {
        let roots = self.roots();
        let filter = self.entry_filter();
        let crawler = Crawler::new(&filter);
        let stats = {
            let mut store = self.store.write();
            match rebuild(&mut store, &crawler, &roots) {
                Ok(stats) => stats,
                Err(e) => {
                    if let Err(rollback) = store.rollback() {
                        tracing::error!("[facade] rollback after failed crawl: {rollback}");
                    }
                    return Err(e);
                }
            }
        };

        crate::log_event!(
            "crawler",
            "done",
            "{} root(s), {} dirs, {} files, {} errors",
            stats.roots,
            stats.directories,
            stats.files,
            stats.errors
        );
        self.broadcaster.send(IndexEvent::Rebuilt);
        Ok(stats)
    }

    /// Remove every document.
    pub fn clear_index(&self) -> IndexResult<()> {
        {
            let mut store = self.store.write();
            store.clear()?;
            store.commit()?;
        }
        crate::log_event!("facade", "cleared");
        self.broadcaster.send(IndexEvent::Cleared);
        Ok(())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Fuzzy search over names, paths and modification times.
    pub fn search(&self, text: &str) -> IndexResult<Vec<SearchResult>> {
        self.search_with_limit(text, self.engine.limit())
    }

    pub fn search_with_limit(&self, text: &str, limit: usize) -> IndexResult<Vec<SearchResult>> {
        let store = self.store.read();
        Ok(self.engine.search_with_limit(&store, text, limit)?)
    }

    // =========================================================================
    // Watching
    // =========================================================================

    /// Start watching every root. Returns the number of roots watched.
    ///
    /// Calling this while already watching does nothing. A root that cannot
    /// be watched is logged and skipped. Must be called with a tokio runtime
    /// available.
    pub fn watch(&self) -> IndexResult<usize> {
        let mut session = self.session.lock();
        if let Some(active) = session.as_ref() {
            crate::debug_event!("facade", "already watching");
            return Ok(active.watchers.len());
        }

        let runtime = Handle::try_current().map_err(|_| WatchError::NoRuntime)?;
        let options = WatchOptions::from_settings(&self.settings);
        let filter = Arc::new(self.entry_filter());
        let (batch_tx, batch_rx) = mpsc::channel(options.channel_capacity);

        let mut watchers = Vec::new();
        for root in self.roots() {
            match RootWatcher::start(
                root.clone(),
                options,
                Arc::clone(&filter),
                batch_tx.clone(),
                &runtime,
            ) {
                Ok(watcher) => watchers.push(watcher),
                Err(e) => tracing::warn!("[watcher] skipping {}: {e}", root.display()),
            }
        }
        // The applier stops once the last root watcher is gone.
        drop(batch_tx);

        let applier =
            MutationApplier::new(Arc::clone(&self.store), filter, self.broadcaster.clone());
        let worker = runtime.spawn_blocking(move || applier.run(batch_rx));

        let count = watchers.len();
        *session = Some(WatchSession {
            watchers,
            _applier: worker,
        });
        crate::log_event!("watcher", "monitoring", "{count} root(s)");
        Ok(count)
    }

    /// Stop watching and release OS handles. Returns false if not watching.
    ///
    /// Changes still waiting in a debounce window are dropped.
    pub fn unwatch(&self) -> bool {
        match self.session.lock().take() {
            Some(session) => {
                crate::log_event!("watcher", "stopping", "{} root(s)", session.watchers.len());
                true
            }
            None => false,
        }
    }

    pub fn is_watching(&self) -> bool {
        self.session.lock().is_some()
    }

    // =========================================================================
    // Notifications and background work
    // =========================================================================

    /// Receive an [`IndexEvent`] after every index change.
    pub fn subscribe(&self) -> broadcast::Receiver<IndexEvent> {
        self.broadcaster.subscribe()
    }

    /// Arm the watchers, then rebuild the index, on a blocking worker.
    ///
    /// Watching starts first so changes made during the crawl are not lost;
    /// the applier waits on the write lock until the crawl is done.
    pub fn start_background(
        self: &Arc<Self>,
    ) -> IndexResult<JoinHandle<IndexResult<CrawlStats>>> {
        let runtime = Handle::try_current().map_err(|_| WatchError::NoRuntime)?;
        let facade = Arc::clone(self);
        Ok(runtime.spawn_blocking(move || {
            facade.watch()?;
            facade.create_index()
        }))
    }

    /// Exclusions for crawling and watching: the index's own directory and
    /// mount points the root source rules out, plus configured patterns.
    fn entry_filter(&self) -> EntryFilter {
        let mut excluded = self.root_source.excluded();
        excluded.push(self.settings.index_path.clone());
        EntryFilter::new(excluded, &self.settings.indexing.ignore_patterns)
    }
}

/// Clear the store and crawl `roots` into it, committing and compacting
/// after each root.
fn rebuild(
    store: &mut IndexStore,
    crawler: &Crawler<'_>,
    roots: &[PathBuf],
) -> IndexResult<CrawlStats> {
    let mut stats = CrawlStats::default();
    store.clear()?;

    for root in roots {
        crate::log_event!("crawler", "crawling", "{}", root.display());
        stats += crawler.crawl(store, root);
        stats.roots += 1;
        // optimize commits first
        store.optimize()?;
    }
    if roots.is_empty() {
        store.commit()?;
    }
    Ok(stats)
}

impl std::fmt::Debug for IndexFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexFacade")
            .field("index_path", &self.settings.index_path)
            .field("watching", &self.is_watching())
            .finish()
    }
}
