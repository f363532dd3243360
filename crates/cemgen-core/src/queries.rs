//! Query manager.
//!
//! Compiles the fixed catalog of named queries at construction time and
//! hands out per-call [`Matcher`]s. Compiled queries are immutable and
//! shared across threads; cursors are exclusive to one extraction and
//! released when the matcher drops.

use std::collections::HashMap;
use std::sync::Arc;

use tree_sitter::{Query, QueryCursor};

use crate::embedded_queries::QUERY_CATALOG;
use crate::error::AnalyzerError;
use crate::grammar::Grammar;

/// Owns the compiled query catalog.
pub struct QueryManager {
    queries: HashMap<(Grammar, &'static str), Arc<Query>>,
}

impl QueryManager {
    /// Compile every catalog entry.
    ///
    /// Fails with `QueryCompile` if any query fails to compile; the error
    /// names the offending query for diagnosis.
    pub fn new() -> Result<Self, AnalyzerError> {
        let mut queries = HashMap::with_capacity(QUERY_CATALOG.len());
        for (grammar, name, source) in QUERY_CATALOG {
            let language = grammar.tree_sitter_language();
            let query =
                Query::new(&language, source).map_err(|e| AnalyzerError::QueryCompile {
                    grammar: grammar.as_str(),
                    name: (*name).to_string(),
                    message: format!("{:?}", e),
                })?;
            queries.insert((*grammar, *name), Arc::new(query));
        }
        Ok(Self { queries })
    }

    /// Get a matcher bound to the named query with a fresh cursor.
    pub fn acquire_matcher(&self, grammar: Grammar, name: &str) -> Result<Matcher, AnalyzerError> {
        let query = self
            .queries
            .iter()
            .find(|((g, n), _)| *g == grammar && *n == name)
            .map(|(_, q)| Arc::clone(q))
            .ok_or_else(|| AnalyzerError::UnknownQuery {
                grammar: grammar.as_str(),
                name: name.to_string(),
            })?;

        Ok(Matcher {
            query,
            name: name.to_string(),
            cursor: QueryCursor::new(),
        })
    }

    /// Number of compiled queries.
    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }
}

/// A compiled query plus a per-call cursor.
///
/// The cursor is exclusive to the holder; the compiled query is shared.
/// Dropping the matcher releases the cursor only.
pub struct Matcher {
    query: Arc<Query>,
    name: String,
    cursor: QueryCursor,
}

impl std::fmt::Debug for Matcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Matcher")
            .field("name", &self.name)
            .finish()
    }
}

impl Matcher {
    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Name of the query this matcher is bound to.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The cursor and query together, for running matches.
    pub(crate) fn parts(&mut self) -> (&mut QueryCursor, &Query) {
        (&mut self.cursor, &*self.query)
    }

    /// Capture names defined by the underlying query.
    pub fn capture_names(&self) -> &[&str] {
        self.query.capture_names()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_catalog_compiles() {
        let manager = QueryManager::new().expect("catalog must compile");
        assert_eq!(manager.len(), QUERY_CATALOG.len());
    }

    #[test]
    fn test_acquire_matcher() {
        let manager = QueryManager::new().unwrap();
        let matcher = manager
            .acquire_matcher(Grammar::TypeScript, "classes")
            .unwrap();
        assert_eq!(matcher.name(), "classes");
        assert!(matcher.capture_names().contains(&"class"));
    }

    #[test]
    fn test_unknown_query_is_rejected() {
        let manager = QueryManager::new().unwrap();
        let err = manager
            .acquire_matcher(Grammar::Css, "slotsAndParts")
            .unwrap_err();
        assert!(matches!(err, AnalyzerError::UnknownQuery { .. }));
    }
}
