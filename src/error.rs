//! Top-level error type for facade operations.
//!
//! Layer errors convert into [`IndexError`] with `?`. Per-entry failures
//! during crawls and batch application are logged and counted instead, so
//! they never surface here.

use std::path::PathBuf;
use thiserror::Error;

use crate::storage::StorageError;
use crate::watcher::WatchError;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Watch error: {0}")]
    Watch(#[from] WatchError),

    #[error("Cannot open index at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: StorageError,
    },
}

pub type IndexResult<T> = Result<T, IndexError>;
