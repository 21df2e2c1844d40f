//! Durable entry store backed by tantivy.
//!
//! The store is the only owner of persisted documents. Every write is staged
//! in one long-lived `IndexWriter` and becomes visible to searches after
//! [`IndexStore::commit`], which also reloads the reader.

use std::fs::Metadata;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};
use tantivy::collector::{Count, TopDocs};
use tantivy::directory::MmapDirectory;
use tantivy::query::{Query, RegexQuery, TermQuery};
use tantivy::schema::{Field, IndexRecordOption, Value};
use tantivy::{
    Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument as Document, Term,
};

use super::error::{StorageError, StorageResult};
use super::schema::EntrySchema;
use crate::types::{DocumentId, IndexedDocument};

/// Default writer heap: 50MB, tantivy splits it across its indexing threads.
pub const DEFAULT_WRITER_HEAP_BYTES: usize = 50_000_000;

const MODIFIED_TEXT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Filesystem attributes captured alongside an entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntryAttributes {
    pub modified: DateTime<Utc>,
    pub is_directory: bool,
}

impl EntryAttributes {
    /// Read attributes from disk without following symlinks.
    ///
    /// Entries that vanished or cannot be stat'ed are stored as plain files
    /// modified "now".
    pub fn read(path: &Path) -> Self {
        match std::fs::symlink_metadata(path) {
            Ok(metadata) => Self::from_metadata(&metadata),
            Err(e) => {
                crate::debug_event!("store", "stat failed", "{}: {e}", path.display());
                Self {
                    modified: Utc::now(),
                    is_directory: false,
                }
            }
        }
    }

    pub fn from_metadata(metadata: &Metadata) -> Self {
        let modified = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        Self {
            modified,
            is_directory: metadata.is_dir(),
        }
    }
}

/// Entry index on disk.
pub struct IndexStore {
    index: Index,
    reader: IndexReader,
    writer: IndexWriter<Document>,
    fields: EntrySchema,
    index_path: PathBuf,
}

impl std::fmt::Debug for IndexStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexStore")
            .field("index_path", &self.index_path)
            .field("fields", &self.fields)
            .finish()
    }
}

impl IndexStore {
    /// Open the index at `index_path`, creating it if needed.
    pub fn open(index_path: impl AsRef<Path>, writer_heap_bytes: usize) -> StorageResult<Self> {
        let index_path = index_path.as_ref().to_path_buf();
        std::fs::create_dir_all(&index_path)?;

        let (schema, fields) = EntrySchema::build();
        let dir = MmapDirectory::open(&index_path)?;
        let index = Index::open_or_create(dir, schema)?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;
        let writer = index.writer::<Document>(writer_heap_bytes)?;

        crate::debug_event!("store", "opened", "{}", index_path.display());

        Ok(Self {
            index,
            reader,
            writer,
            fields,
            index_path,
        })
    }

    /// Stage an upsert for `full_path`, reading its attributes from disk.
    pub fn add(&mut self, name: &str, full_path: &str) -> StorageResult<DocumentId> {
        let full_path = checked_path("full_path", full_path)?;
        let attributes = EntryAttributes::read(Path::new(full_path));
        self.add_entry(name, full_path, attributes)
    }

    /// Stage an upsert with already known attributes.
    ///
    /// Any live document for the same path is retired in the same commit, so
    /// at most one document per path is ever visible.
    pub fn add_entry(
        &mut self,
        name: &str,
        full_path: &str,
        attributes: EntryAttributes,
    ) -> StorageResult<DocumentId> {
        let full_path = checked_path("full_path", full_path)?;
        let id = DocumentId::new();

        self.writer.delete_term(self.path_term(full_path));

        let mut doc = Document::new();
        doc.add_text(self.fields.id, id.as_str());
        doc.add_text(self.fields.name, name);
        doc.add_text(self.fields.path, full_path);
        doc.add_text(self.fields.path_key, full_path);
        doc.add_text(
            self.fields.modified,
            attributes.modified.format(MODIFIED_TEXT_FORMAT).to_string(),
        );
        doc.add_i64(self.fields.modified_ts, attributes.modified.timestamp());
        doc.add_bool(self.fields.is_dir, attributes.is_directory);
        self.writer.add_document(doc)?;

        Ok(id)
    }

    /// Stage deletion of every document whose path equals `full_path`.
    ///
    /// `name` is accepted for symmetry with `add`; only the exact path is
    /// used to select documents.
    pub fn remove(&mut self, name: &str, full_path: &str) -> StorageResult<()> {
        let full_path = checked_path("full_path", full_path)?;
        crate::debug_event!("store", "remove", "{name} ({full_path})");
        self.writer.delete_term(self.path_term(full_path));
        Ok(())
    }

    /// Stage deletion of every document strictly below `dir_path`.
    pub fn remove_descendants(&mut self, dir_path: &str) -> StorageResult<()> {
        let dir_path = checked_path("dir_path", dir_path)?;
        let mut prefix = dir_path.trim_end_matches(std::path::MAIN_SEPARATOR).to_string();
        prefix.push(std::path::MAIN_SEPARATOR);

        let pattern = format!("{}.*", escape_regex(&prefix));
        let query = RegexQuery::from_pattern(&pattern, self.fields.path_key)?;
        self.writer.delete_query(Box::new(query))?;
        Ok(())
    }

    /// Stage deletion of all documents.
    pub fn clear(&mut self) -> StorageResult<()> {
        self.writer.delete_all_documents()?;
        Ok(())
    }

    /// Make staged writes durable and visible to new searches.
    pub fn commit(&mut self) -> StorageResult<()> {
        self.writer.commit()?;
        self.reader.reload()?;
        Ok(())
    }

    /// Discard staged writes since the last commit.
    pub fn rollback(&mut self) -> StorageResult<()> {
        self.writer.rollback()?;
        Ok(())
    }

    /// Commit, then compact all searchable segments into one.
    pub fn optimize(&mut self) -> StorageResult<()> {
        self.commit()?;

        let segment_ids = self.index.searchable_segment_ids()?;
        if segment_ids.len() > 1 {
            // A background merge may already hold some of these segments.
            if let Err(e) = self.writer.merge(&segment_ids).wait() {
                tracing::warn!("[store] segment merge skipped: {e}");
            }
        }

        self.writer.garbage_collect_files().wait()?;
        self.reader.reload()?;

        crate::debug_event!(
            "store",
            "optimized",
            "{} segment(s) before merge",
            segment_ids.len()
        );
        Ok(())
    }

    /// Run `query` against the last committed generation.
    pub fn search(
        &self,
        query: &dyn Query,
        limit: usize,
    ) -> StorageResult<Vec<(f32, IndexedDocument)>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let searcher = self.reader.searcher();
        let top_docs = searcher.search(query, &TopDocs::with_limit(limit))?;

        let mut results = Vec::with_capacity(top_docs.len());
        for (score, doc_address) in top_docs {
            let doc: Document = searcher.doc(doc_address)?;
            results.push((score, self.to_indexed_document(&doc)?));
        }

        Ok(results)
    }

    /// Look up the live document for an exact path.
    pub fn get(&self, full_path: &str) -> StorageResult<Option<IndexedDocument>> {
        let full_path = checked_path("full_path", full_path)?;
        let query = TermQuery::new(self.path_term(full_path), IndexRecordOption::Basic);
        let mut hits = self.search(&query, 1)?;
        Ok(hits.pop().map(|(_, doc)| doc))
    }

    /// Number of live documents for an exact path.
    pub fn count_path(&self, full_path: &str) -> StorageResult<usize> {
        let full_path = checked_path("full_path", full_path)?;
        let searcher = self.reader.searcher();
        let query = TermQuery::new(self.path_term(full_path), IndexRecordOption::Basic);
        Ok(searcher.search(&query, &Count)?)
    }

    /// Total number of live documents.
    pub fn document_count(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    pub fn fields(&self) -> &EntrySchema {
        &self.fields
    }

    /// Directory holding the index files.
    pub fn path(&self) -> &Path {
        &self.index_path
    }

    fn path_term(&self, full_path: &str) -> Term {
        Term::from_field_text(self.fields.path_key, full_path)
    }

    fn to_indexed_document(&self, doc: &Document) -> StorageResult<IndexedDocument> {
        let text = |field: Field, label: &str| -> StorageResult<String> {
            doc.get_first(field)
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .ok_or_else(|| StorageError::InvalidFieldValue {
                    field: label.to_string(),
                    reason: "missing stored value".to_string(),
                })
        };

        let id = DocumentId::from_stored(text(self.fields.id, "id")?);
        let name = text(self.fields.name, "name")?;
        let full_path = text(self.fields.path, "path")?;

        let seconds = doc
            .get_first(self.fields.modified_ts)
            .and_then(|v| v.as_i64())
            .unwrap_or(0);
        let modified = Utc
            .timestamp_opt(seconds, 0)
            .single()
            .ok_or_else(|| StorageError::InvalidFieldValue {
                field: "modified_ts".to_string(),
                reason: format!("{seconds} is out of range"),
            })?;

        let is_directory = doc
            .get_first(self.fields.is_dir)
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        Ok(IndexedDocument {
            id,
            name,
            full_path,
            modified,
            is_directory,
        })
    }
}

fn checked_path<'a>(argument: &str, path: &'a str) -> StorageResult<&'a str> {
    if path.trim().is_empty() {
        return Err(StorageError::blank_path(argument));
    }
    Ok(path)
}

fn escape_regex(text: &str) -> String {
    const META: &[char] = &[
        '\\', '.', '+', '*', '?', '(', ')', '|', '[', ']', '{', '}', '^', '$', '#', '&', '-', '~',
    ];
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if META.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
