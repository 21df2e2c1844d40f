//! Live filesystem name index.
//!
//! Crawls a set of roots into a tantivy-backed store, keeps it in sync with
//! debounced filesystem notifications, and answers fuzzy multi-term
//! queries over entry names, paths and modification times.

pub mod config;
pub mod error;
pub mod indexing;
pub mod logging;
pub mod notifications;
pub mod query;
pub mod storage;
pub mod types;
pub mod watcher;

pub use config::Settings;
pub use error::{IndexError, IndexResult};
pub use indexing::{
    ApplyStats, CrawlStats, Crawler, EntryFilter, FixedRoots, IndexFacade, MutationApplier,
    RootSource, VolumeRoots,
};
pub use notifications::{IndexEvent, NotificationBroadcaster};
pub use query::{QueryEngine, QueryError, is_searchable};
pub use storage::{IndexStore, StorageError};
pub use types::{DocumentId, IndexedDocument, SearchResult};
pub use watcher::{ChangeBatch, ChangeKind, PendingChange, WatchError};
