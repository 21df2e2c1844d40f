//! Recursive crawl of a root into the index store.
//!
//! The walk uses an explicit stack so deep trees cannot overflow the call
//! stack. Each directory gets a document when it is visited; its files are
//! added before any of its subdirectories are entered. Symbolic links are
//! indexed as entries but never followed.
//!
//! Unreadable directories (permission denied, vanished mid-crawl) are
//! logged, counted and treated as having no children. The crawl of the
//! remaining tree continues.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;

use super::filter::EntryFilter;
use crate::storage::{EntryAttributes, IndexStore};
use crate::types::{entry_name, path_key};

/// Counters for one crawl.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CrawlStats {
    pub roots: usize,
    pub directories: usize,
    pub files: usize,
    pub errors: usize,
}

impl CrawlStats {
    pub fn documents(&self) -> usize {
        self.directories + self.files
    }
}

impl std::ops::AddAssign for CrawlStats {
    fn add_assign(&mut self, other: Self) {
        self.roots += other.roots;
        self.directories += other.directories;
        self.files += other.files;
        self.errors += other.errors;
    }
}

/// Lists the children of one directory.
pub type ListDir = fn(&Path) -> io::Result<fs::ReadDir>;

fn read_dir(dir: &Path) -> io::Result<fs::ReadDir> {
    fs::read_dir(dir)
}

/// Walks directory trees and stages one document per entry.
///
/// The crawler only stages writes; committing is left to the caller so a
/// crawl can share a commit with other mutations.
#[derive(Debug, Clone, Copy)]
pub struct Crawler<'a> {
    filter: &'a EntryFilter,
    list_dir: ListDir,
}

impl<'a> Crawler<'a> {
    pub fn new(filter: &'a EntryFilter) -> Self {
        Self {
            filter,
            list_dir: read_dir,
        }
    }

    /// Replace how directories are listed.
    pub fn with_list_dir(mut self, list_dir: ListDir) -> Self {
        self.list_dir = list_dir;
        self
    }

    /// Index `top` and everything below it.
    pub fn crawl(&self, store: &mut IndexStore, top: &Path) -> CrawlStats {
        let mut stats = CrawlStats::default();

        let attributes = match fs::symlink_metadata(top) {
            Ok(metadata) if metadata.is_dir() => EntryAttributes::from_metadata(&metadata),
            Ok(_) => {
                tracing::warn!("[crawler] {} is not a directory", top.display());
                stats.errors += 1;
                return stats;
            }
            Err(e) => {
                tracing::warn!("[crawler] cannot stat {}: {e}", top.display());
                stats.errors += 1;
                return stats;
            }
        };

        let mut stack: Vec<(PathBuf, EntryAttributes)> = vec![(top.to_path_buf(), attributes)];

        while let Some((dir, attributes)) = stack.pop() {
            if self.stage(store, &dir, attributes, &mut stats) {
                stats.directories += 1;
            }

            let entries = match (self.list_dir)(&dir) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!("[crawler] cannot list {}: {e}", dir.display());
                    stats.errors += 1;
                    continue;
                }
            };

            let mut subdirs = Vec::new();
            for entry in entries {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        crate::debug_event!("crawler", "entry skipped", "{}: {e}", dir.display());
                        stats.errors += 1;
                        continue;
                    }
                };

                // DirEntry metadata does not traverse symlinks
                let metadata = match entry.metadata() {
                    Ok(metadata) => metadata,
                    Err(e) => {
                        crate::debug_event!(
                            "crawler",
                            "entry vanished",
                            "{}: {e}",
                            entry.path().display()
                        );
                        stats.errors += 1;
                        continue;
                    }
                };

                let path = entry.path();
                let is_dir = metadata.is_dir();
                if self.filter.is_excluded(&path, is_dir) {
                    crate::debug_event!("crawler", "excluded", "{}", path.display());
                    continue;
                }

                let attributes = EntryAttributes::from_metadata(&metadata);
                if is_dir {
                    subdirs.push((path, attributes));
                } else if self.stage(store, &path, attributes, &mut stats) {
                    stats.files += 1;
                }
            }

            // Reverse so the first listed subdirectory is visited first.
            stack.extend(subdirs.into_iter().rev());
        }

        crate::debug_event!(
            "crawler",
            "tree done",
            "{}: {} dirs, {} files, {} errors",
            top.display(),
            stats.directories,
            stats.files,
            stats.errors
        );
        stats
    }

    fn stage(
        &self,
        store: &mut IndexStore,
        path: &Path,
        attributes: EntryAttributes,
        stats: &mut CrawlStats,
    ) -> bool {
        match store.add_entry(&entry_name(path), &path_key(path), attributes) {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!("[crawler] cannot index {}: {e}", path.display());
                stats.errors += 1;
                false
            }
        }
    }
}
