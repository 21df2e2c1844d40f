//! Tantivy schema for filesystem entries.

use tantivy::schema::{
    Field, IndexRecordOption, STORED, STRING, Schema, SchemaBuilder, TextFieldIndexing,
    TextOptions,
};

/// Tokenizer shared by every searchable field: splits on non-alphanumerics
/// and lowercases.
pub const SEARCH_TOKENIZER: &str = "default";

/// Schema fields for the entry index.
#[derive(Debug, Clone, Copy)]
pub struct EntrySchema {
    /// Unique document token, stored only.
    pub id: Field,

    /// Entry name (last path component), tokenized.
    pub name: Field,

    /// Full path, tokenized for search.
    pub path: Field,

    /// Full path as one raw term. Exact-match key for delete and lookup.
    pub path_key: Field,

    /// Modification time rendered as text so dates are searchable.
    pub modified: Field,

    /// Modification time as unix seconds, stored for retrieval.
    pub modified_ts: Field,

    /// Whether the entry is a directory.
    pub is_dir: Field,
}

impl EntrySchema {
    pub fn build() -> (Schema, Self) {
        let mut builder = SchemaBuilder::default();

        let text_options = TextOptions::default()
            .set_indexing_options(
                TextFieldIndexing::default()
                    .set_tokenizer(SEARCH_TOKENIZER)
                    .set_index_option(IndexRecordOption::WithFreqsAndPositions),
            )
            .set_stored();

        let id = builder.add_text_field("id", STORED);
        let name = builder.add_text_field("name", text_options.clone());
        let path = builder.add_text_field("path", text_options.clone());
        let path_key = builder.add_text_field("path_key", STRING);
        let modified = builder.add_text_field("modified", text_options);
        let modified_ts = builder.add_i64_field("modified_ts", STORED);
        let is_dir = builder.add_bool_field("is_dir", STORED);

        let schema = builder.build();
        let fields = Self {
            id,
            name,
            path,
            path_key,
            modified,
            modified_ts,
            is_dir,
        };

        (schema, fields)
    }

    /// Fields the query engine searches, in OR-across-fields order.
    pub fn search_fields(&self) -> Vec<Field> {
        vec![self.name, self.path, self.modified]
    }
}
