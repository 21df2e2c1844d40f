//! Decides which filesystem entries stay out of the index.
//!
//! Shared by the crawler and the watcher so both agree on what is indexed:
//! the index's own directory, excluded mount points, and entries matching
//! the configured gitignore-style patterns.

use std::path::{Path, PathBuf};

use ignore::gitignore::{Gitignore, GitignoreBuilder};

#[derive(Debug, Clone)]
pub struct EntryFilter {
    excluded: Vec<PathBuf>,
    patterns: Gitignore,
}

impl EntryFilter {
    /// Build a filter. Invalid patterns are logged and ignored.
    pub fn new(excluded: impl IntoIterator<Item = PathBuf>, patterns: &[String]) -> Self {
        let mut builder = GitignoreBuilder::new(Path::new(std::path::MAIN_SEPARATOR_STR));
        for pattern in patterns {
            if let Err(e) = builder.add_line(None, pattern) {
                tracing::warn!("[filter] invalid ignore pattern '{pattern}': {e}");
            }
        }
        let patterns = builder.build().unwrap_or_else(|e| {
            tracing::warn!("[filter] ignore patterns disabled: {e}");
            Gitignore::empty()
        });

        let excluded = excluded
            .into_iter()
            .flat_map(|path| {
                // Keep both spellings so events reported either way match.
                let canonical = std::fs::canonicalize(&path).ok();
                std::iter::once(path).chain(canonical)
            })
            .collect();

        Self { excluded, patterns }
    }

    /// A filter that lets everything through.
    pub fn allow_all() -> Self {
        Self {
            excluded: Vec::new(),
            patterns: Gitignore::empty(),
        }
    }

    /// Whether a single entry is excluded, without looking at its parents.
    ///
    /// The crawler uses this while descending: an excluded directory is
    /// never entered, so its children are never asked about.
    pub fn is_excluded(&self, path: &Path, is_dir: bool) -> bool {
        self.excluded.iter().any(|excluded| path.starts_with(excluded))
            || self.patterns.matched(path, is_dir).is_ignore()
    }

    /// Whether an entry or any of its parent directories is excluded.
    ///
    /// The watcher uses this for event paths that can sit anywhere in a tree.
    pub fn is_excluded_with_parents(&self, path: &Path, is_dir: bool) -> bool {
        if self.is_excluded(path, is_dir) {
            return true;
        }
        path.ancestors()
            .skip(1)
            .any(|parent| self.patterns.matched(parent, true).is_ignore())
    }
}

impl Default for EntryFilter {
    fn default() -> Self {
        Self::allow_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_excluded_prefixes() {
        let filter = EntryFilter::new(vec![PathBuf::from("/var/lib/fsindex")], &[]);

        assert!(filter.is_excluded(Path::new("/var/lib/fsindex"), true));
        assert!(filter.is_excluded(Path::new("/var/lib/fsindex/meta.json"), false));
        assert!(!filter.is_excluded(Path::new("/var/lib/fsindex-other"), true));
        assert!(!filter.is_excluded(Path::new("/var/lib"), true));
    }

    #[test]
    fn test_patterns() {
        let filter = EntryFilter::new(
            Vec::new(),
            &["*.tmp".to_string(), "node_modules/".to_string()],
        );

        assert!(filter.is_excluded(Path::new("/w/a.tmp"), false));
        assert!(!filter.is_excluded(Path::new("/w/a.txt"), false));
        assert!(filter.is_excluded(Path::new("/w/node_modules"), true));
        // directory-only pattern does not hit a file of the same name
        assert!(!filter.is_excluded(Path::new("/w/node_modules"), false));
    }

    #[test]
    fn test_parent_patterns_apply_to_children() {
        let filter = EntryFilter::new(Vec::new(), &["node_modules/".to_string()]);

        let child = Path::new("/w/node_modules/pkg/index.js");
        assert!(!filter.is_excluded(child, false));
        assert!(filter.is_excluded_with_parents(child, false));
    }

    #[test]
    fn test_allow_all() {
        let filter = EntryFilter::allow_all();
        assert!(!filter.is_excluded_with_parents(Path::new("/anything/at/all"), false));
    }
}
