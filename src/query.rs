//! Free-text query engine.
//!
//! Input is split on whitespace. Each term is normalized (any trailing fuzzy
//! marker such as `~` or `~2` is stripped), then parsed against the `name`,
//! `path` and `modified` fields with fuzzy matching configured per field, so
//! every term carries exactly one fuzzy level. That level grows with the
//! term: up to two characters must match exactly, up to five allow one
//! edit, longer terms allow the configured maximum. A term matches a
//! document if it matches any of the fields; every surviving term must
//! match.
//!
//! Terms that cannot be parsed, or that contain nothing indexable, are
//! dropped and the rest of the query still runs.

use tantivy::query::{BooleanQuery, Occur, Query, QueryParser};
use tantivy::tokenizer::{TextAnalyzer, TokenStream};
use thiserror::Error;

use crate::storage::{IndexStore, StorageResult};
use crate::types::SearchResult;

#[derive(Error, Debug, PartialEq)]
pub enum QueryError {
    #[error("term is empty after removing fuzzy markers")]
    EmptyTerm,

    #[error("term '{term}' has no searchable text")]
    NoSearchableText { term: String },

    #[error("cannot parse term '{term}': {reason}")]
    Parse { term: String, reason: String },
}

/// Whether free-form input is worth sending to the engine at all.
///
/// Blank input and input starting with a bare wildcard are rejected; this
/// is the caller-side guard, the engine itself tolerates anything.
pub fn is_searchable(text: &str) -> bool {
    let trimmed = text.trim_start();
    !trimmed.is_empty() && !trimmed.starts_with('*') && !trimmed.starts_with('?')
}

/// Remove trailing fuzzy operators (`term~`, `term~2`, `term~0.5`, `term~~`).
pub fn strip_fuzzy_marker(term: &str) -> &str {
    let mut rest = term;
    loop {
        let without_number = rest.trim_end_matches(|c: char| c.is_ascii_digit() || c == '.');
        match without_number.strip_suffix('~') {
            Some(stripped) => rest = stripped,
            None => return rest,
        }
    }
}

/// Edit distance a term of this length may tolerate.
pub fn edit_distance_for(term: &str) -> u8 {
    match term.chars().count() {
        0..=2 => 0,
        3..=5 => 1,
        _ => 2,
    }
}

/// Builds and runs fuzzy multi-field queries against an [`IndexStore`].
pub struct QueryEngine {
    /// Indexed by edit distance, `1..=max`.
    fuzzy_parsers: Vec<QueryParser>,
    exact_parser: QueryParser,
    analyzer: TextAnalyzer,
    limit: usize,
}

impl std::fmt::Debug for QueryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryEngine")
            .field("limit", &self.limit)
            .finish()
    }
}

impl QueryEngine {
    pub fn new(store: &IndexStore, fuzzy_distance: u8, limit: usize) -> StorageResult<Self> {
        let fields = store.fields();
        let search_fields = fields.search_fields();

        let fuzzy_parsers = (1..=fuzzy_distance)
            .map(|distance| {
                let mut parser = QueryParser::for_index(store.index(), search_fields.clone());
                for field in &search_fields {
                    parser.set_field_fuzzy(*field, false, distance, true);
                }
                parser
            })
            .collect();

        // Exact matches add a relevance bonus on top of the fuzzy clause.
        let exact_parser = QueryParser::for_index(store.index(), search_fields);
        let analyzer = store.index().tokenizer_for_field(fields.name)?;

        Ok(Self {
            fuzzy_parsers,
            exact_parser,
            analyzer,
            limit,
        })
    }

    /// Parse one whitespace-free term into a query over all search fields.
    pub fn parse_term(&self, raw: &str) -> Result<Box<dyn Query>, QueryError> {
        let term = strip_fuzzy_marker(raw);
        if term.is_empty() {
            return Err(QueryError::EmptyTerm);
        }
        if !self.has_tokens(term) {
            return Err(QueryError::NoSearchableText {
                term: term.to_string(),
            });
        }

        let parse_error = |e: tantivy::query::QueryParserError| QueryError::Parse {
            term: term.to_string(),
            reason: e.to_string(),
        };

        let distance = usize::from(edit_distance_for(term)).min(self.fuzzy_parsers.len());
        let Some(parser) = distance.checked_sub(1).and_then(|i| self.fuzzy_parsers.get(i)) else {
            return self.exact_parser.parse_query(term).map_err(parse_error);
        };
        let fuzzy = parser.parse_query(term).map_err(parse_error)?;

        match self.exact_parser.parse_query(term) {
            Ok(exact) => Ok(Box::new(BooleanQuery::new(vec![
                (Occur::Must, fuzzy),
                (Occur::Should, exact),
            ]))),
            Err(_) => Ok(fuzzy),
        }
    }

    /// Combine every parseable term with AND. `None` when nothing survives.
    pub fn build_query(&self, text: &str) -> Option<Box<dyn Query>> {
        let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();

        for raw in text.split_whitespace() {
            match self.parse_term(raw) {
                Ok(query) => clauses.push((Occur::Must, query)),
                Err(e) => crate::debug_event!("query", "term skipped", "{e}"),
            }
        }

        if clauses.is_empty() {
            None
        } else {
            Some(Box::new(BooleanQuery::new(clauses)))
        }
    }

    /// Run `text` against the store, best match first.
    pub fn search(&self, store: &IndexStore, text: &str) -> StorageResult<Vec<SearchResult>> {
        self.search_with_limit(store, text, self.limit)
    }

    /// Like [`QueryEngine::search`] with a one-off result cap.
    pub fn search_with_limit(
        &self,
        store: &IndexStore,
        text: &str,
        limit: usize,
    ) -> StorageResult<Vec<SearchResult>> {
        let Some(query) = self.build_query(text) else {
            return Ok(Vec::new());
        };

        let hits = store.search(query.as_ref(), limit)?;
        let mut results: Vec<SearchResult> = hits
            .into_iter()
            .map(|(score, doc)| SearchResult::from_document(doc, score))
            .collect();
        results.sort_by(|a, b| b.score.total_cmp(&a.score));

        crate::debug_event!("query", "searched", "'{text}' -> {} hits", results.len());
        Ok(results)
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    fn has_tokens(&self, term: &str) -> bool {
        let mut analyzer = self.analyzer.clone();
        let mut stream = analyzer.token_stream(term);
        stream.advance()
    }
}
