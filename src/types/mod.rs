use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque unique token assigned to every stored document.
///
/// A fresh id is minted on every `Add`, so re-adding a path yields a new id
/// while the path itself stays the natural key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wrap an id read back from the store.
    pub fn from_stored(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One filesystem entry (file or directory) as held by the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedDocument {
    pub id: DocumentId,
    pub name: String,
    pub full_path: String,
    pub modified: DateTime<Utc>,
    pub is_directory: bool,
}

/// A ranked hit produced by the query engine. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub file_name: String,
    pub full_path: String,
    pub score: f32,
    pub modified: DateTime<Utc>,
    pub is_directory: bool,
}

impl SearchResult {
    pub fn from_document(document: IndexedDocument, score: f32) -> Self {
        Self {
            file_name: document.name,
            full_path: document.full_path,
            score,
            modified: document.modified,
            is_directory: document.is_directory,
        }
    }
}

/// Display name for a path: its last component, or the whole path for
/// roots such as `/` that have none.
pub fn entry_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// Lossy string form of a path, used as the index key.
pub fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
