//! Change watching for indexed roots.
//!
//! Each root gets one recursive OS watch. Raw events are classified into
//! created, deleted, renamed and changed, debounced per (root, class) over a
//! fixed window and delivered as [`ChangeBatch`]es on one bounded channel
//! whose single consumer is the mutation applier.

pub mod debouncer;
mod error;
pub mod event;
mod root_watcher;

pub use debouncer::{DebounceState, Debouncer};
pub use error::WatchError;
pub use event::{ChangeBatch, ChangeKind, PendingChange, RenameTracker, classify};
pub use root_watcher::{RootWatcher, WatchOptions};
